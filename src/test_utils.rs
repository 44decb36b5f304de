//! Shared helpers for unit and integration tests

use crate::{
    config::Config,
    connections::{
        CallbackParams, Connection, ConnectionEndpoints, ConnectionError, ConnectionSettings,
        ExternalIdentity, Oauth2Client, StateStore,
    },
    database::{ConnectedAccount, DatabaseConfig, DatabaseManager, DatabaseManagerImpl},
    events::{ConnectionEvent, EventError, EventSink},
    server::Server,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Test server builder wiring everything against in-memory backends
pub struct TestServerBuilder {
    config: Config,
    endpoints: ConnectionEndpoints,
}

impl TestServerBuilder {
    pub fn new() -> Self {
        let mut config = Config::default();
        config.database.url = "sqlite::memory:".to_string();
        config.auth.jwt_secret = "test-secret".to_string();
        Self {
            config,
            endpoints: ConnectionEndpoints::default(),
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Enable and configure a provider before the server starts
    pub fn with_connection(mut self, id: &str, settings: ConnectionSettings) -> Self {
        self.config.connections.insert(id.to_string(), settings);
        self
    }

    /// Point provider endpoints at local mock servers
    pub fn with_endpoints(mut self, endpoints: ConnectionEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_state_ttl(mut self, ttl_seconds: u64) -> Self {
        self.config.state.ttl_seconds = ttl_seconds;
        self
    }

    pub async fn build(self) -> Server {
        let server = Server::with_endpoints(self.config, self.endpoints)
            .await
            .unwrap();
        server.database.migrate().await.unwrap();
        server
    }
}

impl Default for TestServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Migrated in-memory database for DAO and provider tests
pub async fn test_database() -> Arc<dyn DatabaseManager> {
    let database = DatabaseManagerImpl::new_from_config(&DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        ..Default::default()
    })
    .await
    .unwrap();
    database.migrate().await.unwrap();
    Arc::new(database)
}

/// Bearer token accepted by the test server's auth middleware
pub fn create_test_jwt(server: &Server, user_id: &str) -> String {
    server.auth.create_token(user_id, 3600).unwrap()
}

/// Scriptable [`Connection`] with canned callback results and a call
/// counter, for registry and service tests
pub struct StubConnection {
    id: &'static str,
    settings: std::sync::RwLock<ConnectionSettings>,
    states: StateStore,
    database: Arc<dyn DatabaseManager>,
    http: reqwest::Client,
    calls: AtomicUsize,
    result: std::sync::Mutex<Option<ConnectedAccount>>,
}

impl StubConnection {
    pub fn new(id: &'static str, database: Arc<dyn DatabaseManager>) -> Self {
        Self {
            id,
            settings: std::sync::RwLock::new(ConnectionSettings::default()),
            states: StateStore::new(&crate::config::StateConfig {
                ttl_seconds: 600,
                sweep_interval_seconds: 60,
            }),
            database,
            http: reqwest::Client::new(),
            calls: AtomicUsize::new(0),
            result: std::sync::Mutex::new(None),
        }
    }

    /// Set what `handle_callback` returns
    pub fn with_result(self, result: Option<ConnectedAccount>) -> Self {
        *self.result.lock().unwrap() = result;
        self
    }

    pub fn callback_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for StubConnection {
    fn id(&self) -> &'static str {
        self.id
    }

    fn scopes(&self) -> &[&str] {
        &[]
    }

    fn settings(&self) -> ConnectionSettings {
        self.settings.read().unwrap().clone()
    }

    fn client(&self) -> Option<Arc<Oauth2Client>> {
        None
    }

    fn states(&self) -> &StateStore {
        &self.states
    }

    fn database(&self) -> &Arc<dyn DatabaseManager> {
        &self.database
    }

    fn http(&self) -> &reqwest::Client {
        &self.http
    }

    fn initialize(&self, settings: ConnectionSettings) -> Result<(), ConnectionError> {
        *self.settings.write().unwrap() = settings;
        Ok(())
    }

    async fn fetch_identity(
        &self,
        _access_token: &str,
    ) -> Result<ExternalIdentity, ConnectionError> {
        Ok(ExternalIdentity {
            id: "stub".to_string(),
            name: "Stub".to_string(),
        })
    }

    fn authorization_url(&self, user_id: &str) -> Result<String, ConnectionError> {
        let state = self.states.create(user_id);
        Ok(format!("https://example.invalid/authorize?state={state}"))
    }

    async fn handle_callback(
        &self,
        _params: &CallbackParams,
    ) -> Result<Option<ConnectedAccount>, ConnectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.result.lock().unwrap().clone())
    }
}

/// Event sink that records everything it is given
#[derive(Default)]
pub struct RecordingEventSink {
    events: tokio::sync::Mutex<Vec<ConnectionEvent>>,
}

impl RecordingEventSink {
    pub async fn recorded(&self) -> Vec<ConnectionEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn publish(&self, event: ConnectionEvent) -> Result<(), EventError> {
        self.events.lock().await.push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_server_builder_uses_memory_database() {
        let server = TestServerBuilder::new().build().await;
        assert_eq!(server.config.database.url, "sqlite::memory:");
    }

    #[tokio::test]
    async fn test_jwt_helper_creates_valid_tokens() {
        let server = TestServerBuilder::new().build().await;

        let token = create_test_jwt(&server, "user-1");
        let claims = server.auth.validate_token(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
    }

    #[tokio::test]
    async fn test_stub_connection_counts_callbacks() {
        let stub = StubConnection::new("battlenet", test_database().await);
        assert_eq!(stub.callback_calls(), 0);

        let params = CallbackParams {
            state: "state".to_string(),
            code: Some("abc".to_string()),
            friend_sync: None,
        };
        stub.handle_callback(&params).await.unwrap();
        assert_eq!(stub.callback_calls(), 1);
    }
}
