//! Connection HTTP surface
//!
//! Three routes: a public listing, an authenticated authorize endpoint
//! handing out provider redirect URLs, and the public OAuth callback.

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use serde::Serialize;

use crate::auth::{AuthenticatedUser, auth_middleware};
use crate::connections::{CallbackParams, ConnectionInfo};
use crate::error::AppError;
use crate::server::Server;

#[derive(Debug, Serialize)]
pub struct AuthorizeResponse {
    pub url: String,
}

pub fn create_connection_routes(server: Server) -> Router<Server> {
    let protected = Router::new()
        .route("/connections/{provider_id}/authorize", get(authorize))
        .layer(axum::middleware::from_fn_with_state(server, auth_middleware));

    Router::new()
        .route("/connections", get(list_connections))
        .route("/connections/{provider_id}/callback", post(callback))
        .merge(protected)
}

async fn list_connections(State(server): State<Server>) -> Json<Vec<ConnectionInfo>> {
    Json(server.connections.connections())
}

async fn authorize(
    State(server): State<Server>,
    Path(provider_id): Path<String>,
    user: AuthenticatedUser,
) -> Result<Json<AuthorizeResponse>, AppError> {
    let url = server
        .connections
        .authorization_url(&provider_id, &user.user_id)?;
    Ok(Json(AuthorizeResponse { url }))
}

async fn callback(
    State(server): State<Server>,
    Path(provider_id): Path<String>,
    Json(params): Json<CallbackParams>,
) -> Result<StatusCode, AppError> {
    server
        .connections
        .handle_callback(&provider_id, &params)
        .await?;

    // Already-linked accounts are a success too; the caller cannot tell
    // the difference and does not need to.
    Ok(StatusCode::NO_CONTENT)
}
