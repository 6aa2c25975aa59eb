use crate::db::models::SessionStatus;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum SessionError {
    #[error("session not found: {session_id}")]
    NotFound { session_id: String },

    #[error("invalid status transition for session {session_id}: {from} -> {to}")]
    InvalidStateTransition {
        session_id: String,
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("invalid {kind}: '{value}'")]
    InvalidValue { kind: &'static str, value: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl SessionError {
    pub(crate) fn not_found(session_id: impl Into<String>) -> Self {
        SessionError::NotFound {
            session_id: session_id.into(),
        }
    }
}
