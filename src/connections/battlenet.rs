//! Battle.net connection
//!
//! Client credentials travel in the token request body, and the identity
//! comes from the userinfo endpoint as `{id, battletag}`.

use async_trait::async_trait;
use oauth2::AuthType;
use serde::Deserialize;
use std::sync::Arc;

use super::{
    ClientSlot, Connection, ConnectionError, ConnectionSettings, ExternalIdentity, Oauth2Client,
    StateStore, redirect_uri, upstream_error,
};
use crate::config::StateConfig;
use crate::database::DatabaseManager;

/// Battle.net OAuth endpoints
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            authorize_url: "https://oauth.battle.net/authorize".to_string(),
            token_url: "https://oauth.battle.net/token".to_string(),
            userinfo_url: "https://us.battle.net/oauth/userinfo".to_string(),
        }
    }
}

pub struct BattleNetConnection {
    endpoints: Endpoints,
    redirect_uri: String,
    slot: ClientSlot,
    states: StateStore,
    database: Arc<dyn DatabaseManager>,
    http: reqwest::Client,
}

impl BattleNetConnection {
    pub fn new(
        public_base_url: &str,
        state_config: &StateConfig,
        database: Arc<dyn DatabaseManager>,
        http: reqwest::Client,
        endpoints: Endpoints,
    ) -> Self {
        Self {
            redirect_uri: redirect_uri(public_base_url, "battlenet"),
            endpoints,
            slot: ClientSlot::new(),
            states: StateStore::new(state_config),
            database,
            http,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BattleNetUser {
    id: u64,
    battletag: String,
}

#[async_trait]
impl Connection for BattleNetConnection {
    fn id(&self) -> &'static str {
        "battlenet"
    }

    fn scopes(&self) -> &[&str] {
        &[]
    }

    fn settings(&self) -> ConnectionSettings {
        self.slot.settings()
    }

    fn client(&self) -> Option<Arc<Oauth2Client>> {
        self.slot.client()
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
        self.slot.reconfigure(
            self.id(),
            settings,
            &self.endpoints.authorize_url,
            &self.endpoints.token_url,
            &self.redirect_uri,
            AuthType::RequestBody,
        )
    }

    async fn fetch_identity(
        &self,
        access_token: &str,
    ) -> Result<ExternalIdentity, ConnectionError> {
        let response = self
            .http
            .get(&self.endpoints.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| upstream_error(self.id(), "userinfo", e))?;

        if !response.status().is_success() {
            return Err(upstream_error(
                self.id(),
                "userinfo",
                format!("status {}", response.status()),
            ));
        }

        let user: BattleNetUser = response
            .json()
            .await
            .map_err(|e| upstream_error(self.id(), "userinfo", e))?;

        Ok(ExternalIdentity {
            id: user.id.to_string(),
            name: user.battletag,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_database;
    use std::collections::HashMap;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_settings() -> ConnectionSettings {
        ConnectionSettings {
            enabled: true,
            client_id: "bnet-id".to_string(),
            client_secret: "bnet-secret".to_string(),
        }
    }

    async fn test_provider(endpoints: Endpoints) -> BattleNetConnection {
        let provider = BattleNetConnection::new(
            "http://127.0.0.1:3000",
            &StateConfig {
                ttl_seconds: 600,
                sweep_interval_seconds: 60,
            },
            test_database().await,
            reqwest::Client::new(),
            endpoints,
        );
        provider.initialize(test_settings()).unwrap();
        provider
    }

    fn mock_endpoints(server: &MockServer) -> Endpoints {
        Endpoints {
            authorize_url: format!("{}/oauth/authorize", server.uri()),
            token_url: format!("{}/oauth/token", server.uri()),
            userinfo_url: format!("{}/oauth/userinfo", server.uri()),
        }
    }

    #[tokio::test]
    async fn test_authorization_url_composition() {
        let provider = test_provider(Endpoints::default()).await;

        let url = provider.authorization_url("user-1").unwrap();
        let parsed = url::Url::parse(&url).unwrap();
        assert_eq!(parsed.domain(), Some("oauth.battle.net"));
        assert_eq!(parsed.path(), "/authorize");

        let pairs: HashMap<String, String> = parsed.query_pairs().into_owned().collect();
        assert_eq!(pairs.get("response_type").map(String::as_str), Some("code"));
        assert_eq!(pairs.get("client_id").map(String::as_str), Some("bnet-id"));
        assert_eq!(
            pairs.get("redirect_uri").map(String::as_str),
            Some("http://127.0.0.1:3000/connections/battlenet/callback")
        );
        // No scopes are requested for battlenet
        assert!(pairs.get("scope").is_none());

        // The state parameter is bound to the requesting user
        let state = pairs.get("state").unwrap();
        assert_eq!(
            provider.states().validate_and_consume(state).unwrap(),
            "user-1"
        );
    }

    #[tokio::test]
    async fn test_authorization_url_requires_enabled_provider() {
        let provider = test_provider(Endpoints::default()).await;
        provider.initialize(ConnectionSettings::default()).unwrap();

        assert!(matches!(
            provider.authorization_url("user-1"),
            Err(ConnectionError::ProviderDisabled(_))
        ));
    }

    #[tokio::test]
    async fn test_exchange_code_posts_authorization_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=abc"))
            .and(body_string_contains("client_id=bnet-id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "T1",
                "token_type": "bearer",
                "expires_in": 3600,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = test_provider(mock_endpoints(&server)).await;
        let state = provider.states().create("user-1");

        let (user_id, token) = provider.exchange_code(&state, "abc").await.unwrap();
        assert_eq!(user_id, "user-1");
        assert_eq!(token.access_token, "T1");
        assert_eq!(token.expires_in, Some(3600));
    }

    #[tokio::test]
    async fn test_exchange_code_rejects_invalid_state_before_any_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let provider = test_provider(mock_endpoints(&server)).await;

        let result = provider.exchange_code("never-issued", "abc").await;
        assert!(matches!(result, Err(ConnectionError::InvalidState)));
    }

    #[tokio::test]
    async fn test_fetch_identity_normalizes_userinfo() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth/userinfo"))
            .and(header("authorization", "Bearer T1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sub": "42",
                "id": 42,
                "battletag": "Foo#123",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = test_provider(mock_endpoints(&server)).await;

        let identity = provider.fetch_identity("T1").await.unwrap();
        assert_eq!(identity.id, "42");
        assert_eq!(identity.name, "Foo#123");
    }

    #[tokio::test]
    async fn test_fetch_identity_maps_upstream_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth/userinfo"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let provider = test_provider(mock_endpoints(&server)).await;

        let result = provider.fetch_identity("T1").await;
        assert!(matches!(
            result,
            Err(ConnectionError::Upstream { .. })
        ));
    }
}
