//! Account update events
//!
//! A successful link emits a `USER_CONNECTIONS_UPDATE` event to
//! in-process subscribers. The payload carries the sanitized account
//! view only, never token material.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

use crate::database::entities::{ConnectedAccount, ConnectedAccountInfo};

pub const USER_CONNECTIONS_UPDATE: &str = "USER_CONNECTIONS_UPDATE";

#[derive(Debug, Error)]
pub enum EventError {
    #[error("Event delivery failed: {0}")]
    Delivery(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionEvent {
    pub event: String,
    pub user_id: String,
    pub data: ConnectedAccountInfo,
}

impl ConnectionEvent {
    pub fn connections_update(account: &ConnectedAccount) -> Self {
        Self {
            event: USER_CONNECTIONS_UPDATE.to_string(),
            user_id: account.user_id.clone(),
            data: ConnectedAccountInfo::from(account),
        }
    }
}

/// Delivery seam for account update events.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: ConnectionEvent) -> Result<(), EventError>;
}

/// Broadcast-channel sink feeding in-process subscribers.
pub struct BroadcastEventSink {
    tx: broadcast::Sender<ConnectionEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl EventSink for BroadcastEventSink {
    async fn publish(&self, event: ConnectionEvent) -> Result<(), EventError> {
        if self.tx.send(event).is_err() {
            debug!("Connections update dropped: no subscribers");
        }
        Ok(())
    }
}
