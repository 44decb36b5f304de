use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::connections::ConnectionError;
use crate::database::DatabaseError;

/// Application error type rendered at the HTTP boundary
#[derive(Debug)]
pub enum AppError {
    Config(config::ConfigError),
    Unauthorized(String),
    BadRequest(String),
    /// Validation failure attributed to a single request field, rendered
    /// as an `errors` object keyed by that field
    FieldValidation {
        field: String,
        code: String,
        message: String,
    },
    UpstreamProvider(String),
    Database(DatabaseError),
    Internal(String),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Config(e) => write!(f, "Configuration error: {e}"),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {msg}"),
            AppError::BadRequest(msg) => write!(f, "{msg}"),
            AppError::FieldValidation { message, .. } => write!(f, "{message}"),
            AppError::UpstreamProvider(msg) => write!(f, "{msg}"),
            AppError::Database(e) => write!(f, "Database error: {e}"),
            AppError::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        AppError::Database(err)
    }
}

impl From<ConnectionError> for AppError {
    fn from(err: ConnectionError) -> Self {
        match err {
            ConnectionError::InvalidState => {
                AppError::BadRequest("Invalid or expired state token".to_string())
            }
            ConnectionError::MissingCode => AppError::FieldValidation {
                field: "code".to_string(),
                code: "BASE_TYPE_REQUIRED".to_string(),
                message: "This field is required".to_string(),
            },
            ConnectionError::UnknownProvider { known, .. } => {
                let choices = known
                    .iter()
                    .map(|id| format!("\"{id}\""))
                    .collect::<Vec<_>>()
                    .join(", ");
                AppError::FieldValidation {
                    field: "provider_id".to_string(),
                    code: "BASE_TYPE_CHOICES".to_string(),
                    message: format!("Value must be one of ({choices})."),
                }
            }
            ConnectionError::ProviderDisabled(_) => AppError::FieldValidation {
                field: "provider_id".to_string(),
                code: "CONNECTION_DISABLED".to_string(),
                message: "This connection has been disabled server-side.".to_string(),
            },
            ConnectionError::Misconfigured(msg) => AppError::Internal(msg),
            ConnectionError::Internal(msg) => AppError::Internal(msg),
            // Upstream detail is logged where it happens; the response
            // body stays generic so provider errors never leak out.
            ConnectionError::Upstream { provider, .. } => {
                AppError::UpstreamProvider(format!("Failed to communicate with {provider}."))
            }
            ConnectionError::Database(e) => AppError::Database(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::FieldValidation {
                field,
                code,
                message,
            } => {
                let body = Json(json!({
                    "error": "Invalid request",
                    "errors": {
                        field: {
                            "code": code,
                            "message": message,
                        },
                    },
                }));
                (StatusCode::BAD_REQUEST, body).into_response()
            }
            other => {
                let (status, label) = match &other {
                    AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Configuration error"),
                    AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "Unauthorized"),
                    AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "Bad request"),
                    AppError::UpstreamProvider(_) => (StatusCode::BAD_GATEWAY, "Upstream provider error"),
                    AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Database error"),
                    AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
                    AppError::FieldValidation { .. } => (StatusCode::BAD_REQUEST, "Invalid request"),
                };
                let body = Json(json!({
                    "error": label,
                    "message": other.to_string(),
                }));
                (status, body).into_response()
            }
        }
    }
}
