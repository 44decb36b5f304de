//! Provider registry
//!
//! Providers register once during startup and the set is read-only
//! afterwards. Enumeration preserves registration order so callers get
//! a stable provider listing.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::Connection;
use crate::health::{HealthCheckResult, HealthChecker};

#[derive(Default)]
pub struct ConnectionRegistry {
    providers: Vec<Arc<dyn Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn Connection>) {
        info!("Registered connection provider: {}", provider.id());
        self.providers.push(provider);
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn Connection>> {
        self.providers.iter().find(|p| p.id() == id)
    }

    /// Provider identifiers in registration order.
    pub fn identifiers(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.id().to_string()).collect()
    }

    pub fn providers(&self) -> &[Arc<dyn Connection>] {
        &self.providers
    }
}

/// Health checker reporting each provider's enabled flag and pending
/// state count.
pub struct RegistryHealthChecker {
    registry: Arc<ConnectionRegistry>,
}

impl RegistryHealthChecker {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl HealthChecker for RegistryHealthChecker {
    fn name(&self) -> &str {
        "connections"
    }

    async fn check(&self) -> HealthCheckResult {
        let providers: serde_json::Map<String, serde_json::Value> = self
            .registry
            .providers()
            .iter()
            .map(|p| {
                (
                    p.id().to_string(),
                    serde_json::json!({
                        "enabled": p.enabled(),
                        "pending_states": p.states().len(),
                    }),
                )
            })
            .collect();

        HealthCheckResult::healthy_with_details(serde_json::json!({
            "registered": self.registry.providers().len(),
            "providers": providers,
        }))
    }
}
