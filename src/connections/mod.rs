//! OAuth connection framework for linking external accounts
//!
//! Each supported provider implements [`Connection`]. The shared parts of
//! the flow live in default trait methods: composing the authorization
//! URL, exchanging the authorization code, and running a callback end to
//! end. Providers supply what actually differs between services, which is
//! the endpoint set, credential placement, and the identity fetch.

pub mod battlenet;
pub mod registry;
pub mod service;
pub mod state;
pub mod xbox;

pub use battlenet::BattleNetConnection;
pub use registry::{ConnectionRegistry, RegistryHealthChecker};
pub use service::{ConnectionInfo, ConnectionService};
pub use state::StateStore;
pub use xbox::XboxConnection;

use crate::config::HttpConfig;
use crate::database::{ConnectedAccount, DatabaseError, DatabaseManager};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet,
    EndpointSet, RedirectUrl, Scope, TokenResponse as OAuth2TokenResponse, TokenUrl,
    basic::{BasicClient, BasicTokenResponse},
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock, RwLockReadGuard};
use std::time::Duration;
use thiserror::Error;

// Avoid oauth2 type madness
pub type Oauth2Client =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Connection flow error types
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("invalid or expired state token")]
    InvalidState,
    #[error("callback is missing the authorization code")]
    MissingCode,
    #[error("unknown connection provider: {id}")]
    UnknownProvider { id: String, known: Vec<String> },
    #[error("connection provider {0} is disabled")]
    ProviderDisabled(String),
    #[error("connection misconfigured: {0}")]
    Misconfigured(String),
    #[error("{provider} {stage} request failed")]
    Upstream { provider: String, stage: String },
    #[error("internal error: {0}")]
    Internal(String),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Per-provider settings, re-appliable at runtime via
/// [`Connection::initialize`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub enabled: bool,
    pub client_id: String,
    pub client_secret: String,
}

/// Callback request body sent after the provider redirected back
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackParams {
    pub state: String,
    pub code: Option<String>,
    pub friend_sync: Option<bool>,
}

/// Identity a provider reports for the authorizing user. `id` is the
/// provider's stable identifier, `name` the mutable display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    pub id: String,
    pub name: String,
}

/// Normalized token exchange result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthTokenData {
    pub access_token: String,
    pub token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl From<&BasicTokenResponse> for OAuthTokenData {
    fn from(token: &BasicTokenResponse) -> Self {
        let token_type = match serde_json::to_value(token.token_type()) {
            Ok(serde_json::Value::String(s)) => s,
            _ => "bearer".to_string(),
        };

        Self {
            access_token: token.access_token().secret().clone(),
            token_type,
            expires_in: token.expires_in().map(|d| d.as_secs()),
            refresh_token: token.refresh_token().map(|t| t.secret().clone()),
            scope: token.scopes().map(|scopes| {
                scopes
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            }),
            fetched_at: Utc::now(),
        }
    }
}

/// Redirect URI for a provider, derived from the public base URL. Providers
/// match this against their registration with an exact string compare.
pub fn redirect_uri(public_base_url: &str, provider_id: &str) -> String {
    format!(
        "{}/connections/{}/callback",
        public_base_url.trim_end_matches('/'),
        provider_id
    )
}

/// Build the shared outbound HTTP client used for token and identity calls
pub(crate) fn build_http_client(config: &HttpConfig) -> Result<reqwest::Client, ConnectionError> {
    reqwest::ClientBuilder::new()
        // Following redirects opens the client up to SSRF vulnerabilities.
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(config.timeout_seconds))
        .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
        .build()
        .map_err(|e| ConnectionError::Misconfigured(format!("http client build error: {e}")))
}

/// Log the detailed upstream failure and hand back the generic error that
/// is allowed to reach the caller.
pub(crate) fn upstream_error(
    provider: &str,
    stage: &str,
    detail: impl std::fmt::Display,
) -> ConnectionError {
    tracing::error!("{provider} {stage} failed: {detail}");
    ConnectionError::Upstream {
        provider: provider.to_string(),
        stage: stage.to_string(),
    }
}

/// Build an OAuth client for a provider from its settings and endpoints
pub(crate) fn create_oauth_client(
    id: &str,
    settings: &ConnectionSettings,
    authorize_url: &str,
    token_url: &str,
    redirect_uri: &str,
    auth_type: AuthType,
) -> Result<Oauth2Client, ConnectionError> {
    if settings.client_id.is_empty() || settings.client_secret.is_empty() {
        return Err(ConnectionError::Misconfigured(format!(
            "connection {id} is enabled but has no client credentials"
        )));
    }

    let auth_url = AuthUrl::new(authorize_url.to_string()).map_err(|e| {
        ConnectionError::Misconfigured(format!("invalid authorize URL for {id}: {e}"))
    })?;
    let token_url = TokenUrl::new(token_url.to_string())
        .map_err(|e| ConnectionError::Misconfigured(format!("invalid token URL for {id}: {e}")))?;
    let redirect_url = RedirectUrl::new(redirect_uri.to_string()).map_err(|e| {
        ConnectionError::Misconfigured(format!("invalid redirect URI for {id}: {e}"))
    })?;

    Ok(BasicClient::new(ClientId::new(settings.client_id.clone()))
        .set_client_secret(ClientSecret::new(settings.client_secret.clone()))
        .set_auth_uri(auth_url)
        .set_token_uri(token_url)
        .set_redirect_uri(redirect_url)
        .set_auth_type(auth_type))
}

struct SlotState {
    settings: ConnectionSettings,
    client: Option<Arc<Oauth2Client>>,
}

/// Holds a provider's settings and built OAuth client, swappable while the
/// process is running
pub(crate) struct ClientSlot {
    inner: RwLock<SlotState>,
}

impl ClientSlot {
    pub(crate) fn new() -> Self {
        Self {
            inner: RwLock::new(SlotState {
                settings: ConnectionSettings::default(),
                client: None,
            }),
        }
    }

    pub(crate) fn settings(&self) -> ConnectionSettings {
        self.read().settings.clone()
    }

    pub(crate) fn client(&self) -> Option<Arc<Oauth2Client>> {
        self.read().client.clone()
    }

    /// Apply new settings, rebuilding the client. On failure the previous
    /// settings and client stay in place.
    pub(crate) fn reconfigure(
        &self,
        id: &str,
        settings: ConnectionSettings,
        authorize_url: &str,
        token_url: &str,
        redirect_uri: &str,
        auth_type: AuthType,
    ) -> Result<(), ConnectionError> {
        let client = if settings.enabled {
            Some(Arc::new(create_oauth_client(
                id,
                &settings,
                authorize_url,
                token_url,
                redirect_uri,
                auth_type,
            )?))
        } else {
            None
        };

        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.settings = settings;
        inner.client = client;
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, SlotState> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }
}

/// Provider endpoint sets, overridable so tests can point at local mocks
#[derive(Debug, Clone, Default)]
pub struct ConnectionEndpoints {
    pub battlenet: battlenet::Endpoints,
    pub xbox: xbox::Endpoints,
}

/// One external service a user can link their account to.
///
/// Implementations stay cheap to call: settings and client access are
/// snapshots, and all I/O happens in the async operations.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Stable provider identifier, also the path segment in callback URLs
    fn id(&self) -> &'static str;

    /// Scopes requested during authorization
    fn scopes(&self) -> &[&str];

    /// Snapshot of the current settings
    fn settings(&self) -> ConnectionSettings;

    /// OAuth client built from the current settings, `None` while the
    /// provider is disabled
    fn client(&self) -> Option<Arc<Oauth2Client>>;

    /// Outstanding state tokens for this provider
    fn states(&self) -> &StateStore;

    fn database(&self) -> &Arc<dyn DatabaseManager>;

    /// Shared outbound HTTP client
    fn http(&self) -> &reqwest::Client;

    /// Apply settings and rebuild the OAuth client. Called once at startup
    /// and again whenever configuration is reloaded.
    fn initialize(&self, settings: ConnectionSettings) -> Result<(), ConnectionError>;

    /// Resolve the provider-side identity for an access token
    async fn fetch_identity(&self, access_token: &str)
    -> Result<ExternalIdentity, ConnectionError>;

    /// Extra query parameters appended to the authorization URL
    fn extra_authorize_params(&self) -> &[(&str, &str)] {
        &[]
    }

    /// Extra form parameters appended to the token exchange request
    fn extra_token_params(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Whether the exchanged token payload is stored on the link
    fn retains_token_data(&self) -> bool {
        false
    }

    fn enabled(&self) -> bool {
        self.settings().enabled
    }

    /// Compose the authorization URL for a user. Issues a fresh single-use
    /// state token; performs no network I/O.
    fn authorization_url(&self, user_id: &str) -> Result<String, ConnectionError> {
        let client = self
            .client()
            .ok_or_else(|| ConnectionError::ProviderDisabled(self.id().to_string()))?;
        let client = (*client).clone();

        let state = self.states().create(user_id);

        let mut request = client
            .authorize_url(|| CsrfToken::new(state.clone()))
            .add_scopes(self.scopes().iter().map(|s| Scope::new(s.to_string())));
        for (name, value) in self.extra_authorize_params() {
            request = request.add_extra_param(*name, *value);
        }
        let (url, _csrf_token) = request.url();

        Ok(url.to_string())
    }

    /// Exchange an authorization code for tokens. The state token is
    /// consumed first; nothing goes over the wire when it is invalid.
    async fn exchange_code(
        &self,
        state: &str,
        code: &str,
    ) -> Result<(String, OAuthTokenData), ConnectionError> {
        let user_id = self.states().validate_and_consume(state)?;

        let client = self
            .client()
            .ok_or_else(|| ConnectionError::ProviderDisabled(self.id().to_string()))?;
        let client = (*client).clone();

        let mut request = client.exchange_code(AuthorizationCode::new(code.to_string()));
        for (name, value) in self.extra_token_params() {
            request = request.add_extra_param(name, value);
        }

        let token = request
            .request_async(self.http())
            .await
            .map_err(|e| upstream_error(self.id(), "token exchange", e))?;

        Ok((user_id, OAuthTokenData::from(&token)))
    }

    /// Run one linking attempt for a provider callback. Returns the newly
    /// created link, or `None` when the account was already linked.
    async fn handle_callback(
        &self,
        params: &CallbackParams,
    ) -> Result<Option<ConnectedAccount>, ConnectionError> {
        let code = params.code.as_deref().ok_or(ConnectionError::MissingCode)?;

        let (user_id, token_data) = self.exchange_code(&params.state, code).await?;
        let identity = self.fetch_identity(&token_data.access_token).await?;

        let dao = self.database().connected_accounts();
        if let Some(existing) = dao
            .find_by_user_and_external_id(&user_id, &identity.id)
            .await?
        {
            tracing::debug!(
                "user {} already linked to {} account {}",
                user_id,
                existing.provider,
                existing.external_id
            );
            return Ok(None);
        }

        let token_json = if self.retains_token_data() {
            let value = serde_json::to_value(&token_data)
                .map_err(|e| ConnectionError::Internal(format!("token payload: {e}")))?;
            Some(value)
        } else {
            None
        };

        let account = ConnectedAccount::new(
            user_id,
            self.id(),
            identity.id,
            identity.name,
            params.friend_sync.unwrap_or(false),
            token_json,
        );

        let created = dao.create(account).await?;
        if created.is_none() {
            tracing::debug!("{} link already created by a concurrent callback", self.id());
        }
        Ok(created)
    }
}
