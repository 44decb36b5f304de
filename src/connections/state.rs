use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::{Rng, distr::Alphanumeric};

use super::ConnectionError;
use crate::config::StateConfig;

/// 32 alphanumeric characters, comfortably past the 16 byte entropy floor
/// for CSRF tokens
const STATE_TOKEN_LENGTH: usize = 32;

#[derive(Debug, Clone)]
struct StateEntry {
    user_id: String,
    expires_at: DateTime<Utc>,
}

impl StateEntry {
    fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// Single-use CSRF state tokens for one provider's OAuth flow.
///
/// Consuming a token removes it from the map in one atomic step, so of any
/// number of concurrent callbacks presenting the same token exactly one
/// succeeds. Entries expire after the configured TTL; expired entries
/// behave exactly like absent ones.
pub struct StateStore {
    states: DashMap<String, StateEntry>,
    ttl_seconds: u64,
}

impl StateStore {
    pub fn new(config: &StateConfig) -> Self {
        Self {
            states: DashMap::new(),
            ttl_seconds: config.ttl_seconds,
        }
    }

    /// Issue a new state token bound to the given user
    pub fn create(&self, user_id: &str) -> String {
        let state: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(STATE_TOKEN_LENGTH)
            .map(char::from)
            .collect();

        self.states.insert(
            state.clone(),
            StateEntry {
                user_id: user_id.to_string(),
                expires_at: Utc::now() + chrono::Duration::seconds(self.ttl_seconds as i64),
            },
        );

        state
    }

    /// Redeem a state token, returning the user it was issued for. The
    /// entry is removed even when it turns out to be expired.
    pub fn validate_and_consume(&self, state: &str) -> Result<String, ConnectionError> {
        let (_, entry) = self
            .states
            .remove(state)
            .ok_or(ConnectionError::InvalidState)?;

        if entry.is_expired() {
            return Err(ConnectionError::InvalidState);
        }

        Ok(entry.user_id)
    }

    /// Drop expired entries, returning how many were removed
    pub fn sweep(&self) -> usize {
        let before = self.states.len();
        self.states.retain(|_, entry| !entry.is_expired());
        before.saturating_sub(self.states.len())
    }

    /// Number of outstanding state tokens
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
