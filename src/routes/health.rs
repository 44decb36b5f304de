use crate::health::{HealthService, OverallHealthResponse};
use axum::{
    Router,
    extract::{Query, State},
    response::Json,
    routing::get,
};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct HealthCheckQuery {
    #[serde(default)]
    check: Option<String>,
}

/// Health check endpoint. Bare requests are a liveness probe;
/// `?check=all` or `?check=<name>` runs the registered component checks.
pub fn create_health_routes() -> Router<Arc<HealthService>> {
    Router::new().route("/", get(health_check))
}

async fn health_check(
    State(health_service): State<Arc<HealthService>>,
    Query(params): Query<HealthCheckQuery>,
) -> Json<OverallHealthResponse> {
    Json(health_service.check_health(params.check.as_deref()).await)
}
