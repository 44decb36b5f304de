//! Xbox Live connection
//!
//! The Microsoft token exchange authenticates with HTTP Basic credentials,
//! and the identity requires two more hops: the OAuth access token is
//! traded for an Xbox user token, which an XSTS authorization turns into
//! the gamertag claims.

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

const SCOPES: &[&str] = &["Xboxlive.signin", "Xboxlive.offline_access"];
const AUTHORIZE_PARAMS: &[(&str, &str)] = &[("approval_prompt", "auto")];

/// Xbox Live OAuth and XSTS endpoints
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub authorize_url: String,
    pub token_url: String,
    pub user_auth_url: String,
    pub xsts_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            authorize_url: "https://login.live.com/oauth20_authorize.srf".to_string(),
            token_url: "https://login.live.com/oauth20_token.srf".to_string(),
            user_auth_url: "https://user.auth.xboxlive.com/user/authenticate".to_string(),
            xsts_url: "https://xsts.auth.xboxlive.com/xsts/authorize".to_string(),
        }
    }
}

pub struct XboxConnection {
    endpoints: Endpoints,
    redirect_uri: String,
    slot: ClientSlot,
    states: StateStore,
    database: Arc<dyn DatabaseManager>,
    http: reqwest::Client,
}

impl XboxConnection {
    pub fn new(
        public_base_url: &str,
        state_config: &StateConfig,
        database: Arc<dyn DatabaseManager>,
        http: reqwest::Client,
        endpoints: Endpoints,
    ) -> Self {
        Self {
            redirect_uri: redirect_uri(public_base_url, "xbox"),
            endpoints,
            slot: ClientSlot::new(),
            states: StateStore::new(state_config),
            database,
            http,
        }
    }

    async fn fetch_user_token(&self, access_token: &str) -> Result<String, ConnectionError> {
        let body = serde_json::json!({
            "RelyingParty": "http://auth.xboxlive.com",
            "TokenType": "JWT",
            "Properties": {
                "AuthMethod": "RPS",
                "SiteName": "user.auth.xboxlive.com",
                "RpsTicket": format!("d={access_token}"),
            }
        });

        let response = self
            .http
            .post(&self.endpoints.user_auth_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| upstream_error(self.id(), "user token", e))?;

        if !response.status().is_success() {
            return Err(upstream_error(
                self.id(),
                "user token",
                format!("status {}", response.status()),
            ));
        }

        let token: XboxUserToken = response
            .json()
            .await
            .map_err(|e| upstream_error(self.id(), "user token", e))?;
        Ok(token.token)
    }

    async fn fetch_xsts_claims(&self, user_token: &str) -> Result<XuiClaim, ConnectionError> {
        let body = serde_json::json!({
            "RelyingParty": "http://xboxlive.com",
            "TokenType": "JWT",
            "Properties": {
                "UserTokens": [user_token],
                "SandboxId": "RETAIL",
            }
        });

        let response = self
            .http
            .post(&self.endpoints.xsts_url)
            .header("x-xbl-contract-version", "3")
            .json(&body)
            .send()
            .await
            .map_err(|e| upstream_error(self.id(), "XSTS authorize", e))?;

        if !response.status().is_success() {
            return Err(upstream_error(
                self.id(),
                "XSTS authorize",
                format!("status {}", response.status()),
            ));
        }

        let xsts: XstsResponse = response
            .json()
            .await
            .map_err(|e| upstream_error(self.id(), "XSTS authorize", e))?;

        xsts.display_claims
            .xui
            .into_iter()
            .next()
            .ok_or_else(|| upstream_error(self.id(), "XSTS authorize", "no display claims returned"))
    }
}

#[derive(Debug, Deserialize)]
struct XboxUserToken {
    #[serde(rename = "Token")]
    token: String,
}

#[derive(Debug, Deserialize)]
struct XstsResponse {
    #[serde(rename = "DisplayClaims")]
    display_claims: DisplayClaims,
}

#[derive(Debug, Deserialize)]
struct DisplayClaims {
    xui: Vec<XuiClaim>,
}

#[derive(Debug, Deserialize)]
struct XuiClaim {
    xid: String,
    gtg: String,
}

#[async_trait]
impl Connection for XboxConnection {
    fn id(&self) -> &'static str {
        "xbox"
    }

    fn scopes(&self) -> &[&str] {
        SCOPES
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

    fn extra_authorize_params(&self) -> &[(&str, &str)] {
        AUTHORIZE_PARAMS
    }

    fn extra_token_params(&self) -> Vec<(String, String)> {
        vec![("scope".to_string(), self.scopes().join(" "))]
    }

    fn retains_token_data(&self) -> bool {
        true
    }

    fn initialize(&self, settings: ConnectionSettings) -> Result<(), ConnectionError> {
        self.slot.reconfigure(
            self.id(),
            settings,
            &self.endpoints.authorize_url,
            &self.endpoints.token_url,
            &self.redirect_uri,
            AuthType::BasicAuth,
        )
    }

    async fn fetch_identity(
        &self,
        access_token: &str,
    ) -> Result<ExternalIdentity, ConnectionError> {
        let user_token = self.fetch_user_token(access_token).await?;
        let claims = self.fetch_xsts_claims(&user_token).await?;

        Ok(ExternalIdentity {
            id: claims.xid,
            name: claims.gtg,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_database;
    use std::collections::HashMap;
    use wiremock::matchers::{
        basic_auth, body_partial_json, body_string_contains, header, method, path,
    };
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_settings() -> ConnectionSettings {
        ConnectionSettings {
            enabled: true,
            client_id: "xbox-id".to_string(),
            client_secret: "xbox-secret".to_string(),
        }
    }

    async fn test_provider(endpoints: Endpoints) -> XboxConnection {
        let provider = XboxConnection::new(
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
            authorize_url: format!("{}/oauth20_authorize.srf", server.uri()),
            token_url: format!("{}/oauth20_token.srf", server.uri()),
            user_auth_url: format!("{}/user/authenticate", server.uri()),
            xsts_url: format!("{}/xsts/authorize", server.uri()),
        }
    }

    #[tokio::test]
    async fn test_authorization_url_requests_xbox_scopes() {
        let provider = test_provider(Endpoints::default()).await;

        let url = provider.authorization_url("user-1").unwrap();
        let parsed = url::Url::parse(&url).unwrap();
        assert_eq!(parsed.domain(), Some("login.live.com"));

        let pairs: HashMap<String, String> = parsed.query_pairs().into_owned().collect();
        assert_eq!(
            pairs.get("scope").map(String::as_str),
            Some("Xboxlive.signin Xboxlive.offline_access")
        );
        assert_eq!(
            pairs.get("approval_prompt").map(String::as_str),
            Some("auto")
        );
        assert_eq!(
            pairs.get("redirect_uri").map(String::as_str),
            Some("http://127.0.0.1:3000/connections/xbox/callback")
        );
    }

    #[tokio::test]
    async fn test_exchange_code_uses_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth20_token.srf"))
            .and(basic_auth("xbox-id", "xbox-secret"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("scope=Xboxlive.signin"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ms-token",
                "token_type": "bearer",
                "expires_in": 3600,
                "refresh_token": "ms-refresh",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = test_provider(mock_endpoints(&server)).await;
        let state = provider.states().create("user-1");

        let (user_id, token) = provider.exchange_code(&state, "xyz").await.unwrap();
        assert_eq!(user_id, "user-1");
        assert_eq!(token.access_token, "ms-token");
        assert_eq!(token.refresh_token.as_deref(), Some("ms-refresh"));
        assert!(provider.retains_token_data());
    }

    #[tokio::test]
    async fn test_fetch_identity_walks_the_xsts_chain() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/user/authenticate"))
            .and(body_partial_json(serde_json::json!({
                "Properties": { "RpsTicket": "d=ms-token" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Token": "user-token",
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/xsts/authorize"))
            .and(header("x-xbl-contract-version", "3"))
            .and(body_partial_json(serde_json::json!({
                "Properties": { "UserTokens": ["user-token"], "SandboxId": "RETAIL" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "DisplayClaims": { "xui": [{ "xid": "2535400000000000", "gtg": "Gamer" }] },
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = test_provider(mock_endpoints(&server)).await;

        let identity = provider.fetch_identity("ms-token").await.unwrap();
        assert_eq!(identity.id, "2535400000000000");
        assert_eq!(identity.name, "Gamer");
    }

    #[tokio::test]
    async fn test_fetch_identity_without_claims_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/user/authenticate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Token": "user-token",
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/xsts/authorize"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "DisplayClaims": { "xui": [] },
            })))
            .mount(&server)
            .await;

        let provider = test_provider(mock_endpoints(&server)).await;

        let result = provider.fetch_identity("ms-token").await;
        assert!(matches!(result, Err(ConnectionError::Upstream { .. })));
    }
}
