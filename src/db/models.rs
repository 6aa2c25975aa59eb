use crate::error::SessionError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// Session lifecycle. Only `Active` may move, and only to a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Expired,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::Active)
    }

    pub fn can_transition_to(self, to: SessionStatus) -> bool {
        self == SessionStatus::Active && to.is_terminal()
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "completed" => Ok(SessionStatus::Completed),
            "expired" => Ok(SessionStatus::Expired),
            other => Err(SessionError::InvalidValue {
                kind: "session status",
                value: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for SessionStatus {
    type Error = SessionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(SessionError::InvalidValue {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = SessionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbSession {
    pub session_id: String,
    pub user_id: String,
    #[sqlx(try_from = "String")]
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbConversationTurn {
    pub id: i64,
    pub session_id: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbAgentInvocation {
    pub id: i64,
    pub session_id: String,
    pub agent_name: String,
    pub query: String,
    pub response: String,
    pub success: bool,
    pub error_message: Option<String>,
    pub duration_ms: i64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbSessionContext {
    pub session_id: String,
    pub last_agent_called: String,
    pub last_query: String,
    pub last_response: String,
    pub updated_at: DateTime<Utc>,
}

/// Row of the `session_summary` view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct SessionSummary {
    pub session_id: String,
    pub user_id: String,
    #[sqlx(try_from = "String")]
    pub status: SessionStatus,
    pub message_count: i64,
    pub invocation_count: i64,
    pub distinct_agents: i64,
    pub last_agent_called: Option<String>,
}

/// Row of the `agent_performance` view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct AgentPerformance {
    pub agent_name: String,
    pub total_invocations: i64,
    pub success_count: i64,
    pub failure_count: i64,
    pub min_duration_ms: i64,
    pub avg_duration_ms: f64,
    pub max_duration_ms: i64,
}

/// Input for `SessionStore::record_invocation`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvocationCreate {
    pub agent_name: String,
    pub query: String,
    pub response: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub duration_ms: u64,
}

impl InvocationCreate {
    pub fn succeeded(
        agent_name: impl Into<String>,
        query: impl Into<String>,
        response: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            query: query.into(),
            response: response.into(),
            success: true,
            error_message: None,
            duration_ms,
        }
    }

    pub fn failed(
        agent_name: impl Into<String>,
        query: impl Into<String>,
        error_message: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            query: query.into(),
            response: String::new(),
            success: false,
            error_message: Some(error_message.into()),
            duration_ms,
        }
    }

    /// What the session context stores as `last_response`: the response, or the error
    /// message when the call failed.
    pub fn context_response(&self) -> &str {
        match (&self.error_message, self.success) {
            (Some(message), false) => message,
            _ => &self.response,
        }
    }
}
