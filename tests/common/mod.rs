use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use connection_hub::{
    Server,
    connections::{ConnectionEndpoints, ConnectionSettings},
    test_utils::{TestServerBuilder, create_test_jwt},
};
use serde_json::Value;
use tower::ServiceExt;
use wiremock::MockServer;

/// Full router wired against wiremock provider backends
pub struct TestHarness {
    pub server: Server,
    pub app: Router,
    pub battlenet: MockServer,
    pub xbox: MockServer,
}

impl TestHarness {
    /// Both providers enabled and pointed at local mocks
    pub async fn new() -> Self {
        Self::with_enabled(true, true).await
    }

    /// Battle.net enabled, Xbox left disabled
    #[allow(dead_code)]
    pub async fn battlenet_only() -> Self {
        Self::with_enabled(true, false).await
    }

    async fn with_enabled(battlenet_enabled: bool, xbox_enabled: bool) -> Self {
        let battlenet = MockServer::start().await;
        let xbox = MockServer::start().await;

        let mut endpoints = ConnectionEndpoints::default();
        endpoints.battlenet.token_url = format!("{}/oauth/token", battlenet.uri());
        endpoints.battlenet.userinfo_url = format!("{}/oauth/userinfo", battlenet.uri());
        endpoints.xbox.token_url = format!("{}/oauth20_token.srf", xbox.uri());
        endpoints.xbox.user_auth_url = format!("{}/user/authenticate", xbox.uri());
        endpoints.xbox.xsts_url = format!("{}/xsts/authorize", xbox.uri());

        let server = TestServerBuilder::new()
            .with_connection(
                "battlenet",
                ConnectionSettings {
                    enabled: battlenet_enabled,
                    client_id: "bnet-id".to_string(),
                    client_secret: "bnet-secret".to_string(),
                },
            )
            .with_connection(
                "xbox",
                ConnectionSettings {
                    enabled: xbox_enabled,
                    client_id: "xbox-id".to_string(),
                    client_secret: "xbox-secret".to_string(),
                },
            )
            .with_endpoints(endpoints)
            .build()
            .await;
        let app = server.create_app();

        Self {
            server,
            app,
            battlenet,
            xbox,
        }
    }

    /// Bearer token the authorize endpoint accepts
    pub fn token_for(&self, user_id: &str) -> String {
        create_test_jwt(&self.server, user_id)
    }

    /// Run one request through the router
    pub async fn make_request(&self, request: Request<Body>) -> axum::response::Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    /// Start a link flow and return the provider authorization URL
    #[allow(dead_code)]
    pub async fn authorize(&self, provider_id: &str, user_id: &str) -> String {
        let request = Request::builder()
            .uri(format!("/connections/{provider_id}/authorize"))
            .header(
                "Authorization",
                format!("Bearer {}", self.token_for(user_id)),
            )
            .body(Body::empty())
            .unwrap();
        let response = self.make_request(request).await;
        assert_eq!(
            response.status(),
            StatusCode::OK,
            "authorize should hand out a provider URL"
        );
        body_json(response).await["url"]
            .as_str()
            .unwrap()
            .to_string()
    }

    /// Complete a link flow with the given callback payload
    #[allow(dead_code)]
    pub async fn callback(&self, provider_id: &str, body: Value) -> axum::response::Response {
        let request = Request::builder()
            .uri(format!("/connections/{provider_id}/callback"))
            .method("POST")
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.make_request(request).await
    }
}

/// Parse a response body as JSON
pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Pull the `state` query parameter out of an authorization URL
#[allow(dead_code)]
pub fn state_param(authorization_url: &str) -> String {
    let parsed = url::Url::parse(authorization_url).unwrap();
    parsed
        .query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value.into_owned())
        .unwrap()
}
