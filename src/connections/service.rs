//! Connection service
//!
//! Front door for the HTTP layer: resolves providers, enforces the
//! enabled gate before any provider work happens, and publishes account
//! update events once a new link is durable.

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::{CallbackParams, Connection, ConnectionError, ConnectionRegistry};
use crate::database::entities::ConnectedAccount;
use crate::events::{ConnectionEvent, EventSink};

/// Public listing entry for a registered provider.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub id: String,
    pub enabled: bool,
}

pub struct ConnectionService {
    registry: Arc<ConnectionRegistry>,
    events: Arc<dyn EventSink>,
}

impl ConnectionService {
    pub fn new(registry: Arc<ConnectionRegistry>, events: Arc<dyn EventSink>) -> Self {
        Self { registry, events }
    }

    fn resolve(&self, provider_id: &str) -> Result<&Arc<dyn Connection>, ConnectionError> {
        self.registry
            .get(provider_id)
            .ok_or_else(|| ConnectionError::UnknownProvider {
                id: provider_id.to_string(),
                known: self.registry.identifiers(),
            })
    }

    fn resolve_enabled(&self, provider_id: &str) -> Result<&Arc<dyn Connection>, ConnectionError> {
        let provider = self.resolve(provider_id)?;
        if !provider.enabled() {
            return Err(ConnectionError::ProviderDisabled(provider_id.to_string()));
        }
        Ok(provider)
    }

    pub fn authorization_url(
        &self,
        provider_id: &str,
        user_id: &str,
    ) -> Result<String, ConnectionError> {
        self.resolve_enabled(provider_id)?.authorization_url(user_id)
    }

    /// Run the OAuth callback for a provider.
    ///
    /// Returns the new link, or `None` when the external account was
    /// already linked. Update events fire only for new links.
    pub async fn handle_callback(
        &self,
        provider_id: &str,
        params: &CallbackParams,
    ) -> Result<Option<ConnectedAccount>, ConnectionError> {
        let provider = self.resolve_enabled(provider_id)?;

        let linked = provider.handle_callback(params).await?;
        if let Some(account) = &linked {
            info!(
                "Linked {} account {} for user {}",
                account.provider, account.external_id, account.user_id
            );
            let event = ConnectionEvent::connections_update(account);
            if let Err(e) = self.events.publish(event).await {
                // The link itself is already durable
                warn!("Failed to publish connections update: {}", e);
            }
        }
        Ok(linked)
    }

    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.registry
            .providers()
            .iter()
            .map(|p| ConnectionInfo {
                id: p.id().to_string(),
                enabled: p.enabled(),
            })
            .collect()
    }
}
