use axum::{Json, extract::rejection::JsonRejection, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error as ThisError;

use super::{FactoryError, RelayError, SessionError, StoreError};

#[derive(Debug, ThisError)]
pub enum AgentryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Factory(#[from] FactoryError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid request body: {0}")]
    InvalidBody(#[from] JsonRejection),

    #[error("Downstream tool call failed: {0}")]
    ToolCall(#[from] reqwest::Error),

    #[error("Downstream tool responded with status {status}")]
    ToolStatus { status: u16 },

    #[error("Ractor error: {0}")]
    RactorError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Unexpected error: {0}")]
    UnexpectedError(String),
}

fn internal() -> (StatusCode, ApiErrorObject) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        ApiErrorObject {
            code: "INTERNAL_ERROR".to_string(),
            message: "An internal server error occurred.".to_string(),
            details: None,
        },
    )
}

impl IntoResponse for AgentryError {
    fn into_response(self) -> axum::response::Response {
        let message = self.to_string();
        let (status, error_body) = match self {
            AgentryError::Store(StoreError::Corruption { .. }) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorObject {
                    code: "REGISTRY_CORRUPT".to_string(),
                    message: "Registry document is corrupt; restore from backup.".to_string(),
                    details: None,
                },
            ),

            AgentryError::Store(StoreError::NotFound { .. }) => (
                StatusCode::NOT_FOUND,
                ApiErrorObject {
                    code: "REGISTRY_NOT_FOUND".to_string(),
                    message,
                    details: None,
                },
            ),

            AgentryError::Store(StoreError::InvalidDocument { .. }) => (
                StatusCode::BAD_REQUEST,
                ApiErrorObject {
                    code: "INVALID_DOCUMENT".to_string(),
                    message,
                    details: None,
                },
            ),

            AgentryError::Factory(err) if err.is_config() => {
                let details = match &err {
                    FactoryError::Config { missing, .. } => Some(json!({ "missing": missing })),
                    _ => None,
                };
                (
                    StatusCode::BAD_REQUEST,
                    ApiErrorObject {
                        code: "INVALID_AGENT_CONFIG".to_string(),
                        message,
                        details,
                    },
                )
            }

            AgentryError::Factory(err) if err.is_resolution() => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ApiErrorObject {
                    code: "AGENT_RESOLUTION_FAILED".to_string(),
                    message,
                    details: None,
                },
            ),

            AgentryError::Session(SessionError::NotFound { .. })
            | AgentryError::AgentNotFound(_) => (
                StatusCode::NOT_FOUND,
                ApiErrorObject {
                    code: "NOT_FOUND".to_string(),
                    message,
                    details: None,
                },
            ),

            AgentryError::Session(SessionError::InvalidStateTransition { .. }) => (
                StatusCode::CONFLICT,
                ApiErrorObject {
                    code: "INVALID_STATE_TRANSITION".to_string(),
                    message,
                    details: None,
                },
            ),

            AgentryError::Session(SessionError::InvalidValue { .. }) => (
                StatusCode::BAD_REQUEST,
                ApiErrorObject {
                    code: "INVALID_VALUE".to_string(),
                    message,
                    details: None,
                },
            ),

            AgentryError::Relay(RelayError::Absent { .. }) => (
                StatusCode::UNAUTHORIZED,
                ApiErrorObject {
                    code: "AUTHENTICATION_REQUIRED".to_string(),
                    message: "Authentication required.".to_string(),
                    details: None,
                },
            ),

            AgentryError::InvalidBody(_) => (
                StatusCode::BAD_REQUEST,
                ApiErrorObject {
                    code: "INVALID_BODY".to_string(),
                    message,
                    details: None,
                },
            ),

            AgentryError::ToolCall(_) => (
                StatusCode::BAD_GATEWAY,
                ApiErrorObject {
                    code: "TOOL_CALL_FAILED".to_string(),
                    message,
                    details: None,
                },
            ),

            AgentryError::ToolStatus { status } => (
                StatusCode::BAD_GATEWAY,
                ApiErrorObject {
                    code: "TOOL_CALL_FAILED".to_string(),
                    message,
                    details: Some(json!({ "upstream_status": status })),
                },
            ),

            AgentryError::Store(_)
            | AgentryError::Factory(_)
            | AgentryError::Session(SessionError::Database(_))
            | AgentryError::JsonError(_)
            | AgentryError::IoError(_)
            | AgentryError::RactorError(_)
            | AgentryError::DatabaseError(_)
            | AgentryError::UnexpectedError(_) => internal(),
        };
        (status, Json(ApiErrorBody { inner: error_body })).into_response()
    }
}

/// Standardized API error response payload.
#[derive(Serialize)]
pub struct ApiErrorObject {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Serialize)]
pub struct ApiErrorBody {
    #[serde(rename = "error")]
    pub inner: ApiErrorObject,
}
