use crate::db::{InvocationCreate, SessionStore};
use crate::error::SessionError;
use std::fmt::Display;
use std::future::Future;
use std::time::Instant;
use tracing::{debug, warn};

/// Times one downstream agent call and writes its bookkeeping rows.
///
/// Every attempt appends an `agent_invocations` row and upserts the session's
/// last-interaction context; a failed attempt stores its error as the last response.
#[derive(Clone)]
pub struct InvocationTracker {
    sessions: SessionStore,
}

impl InvocationTracker {
    pub fn new(sessions: SessionStore) -> Self {
        Self { sessions }
    }

    /// Runs `call` and records it against `session_id`.
    ///
    /// The inner result is the call's own outcome, returned unchanged. The outer error is a
    /// bookkeeping failure.
    pub async fn track<F, Fut, E>(
        &self,
        session_id: &str,
        agent_name: &str,
        query: &str,
        call: F,
    ) -> Result<Result<String, E>, SessionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
        E: Display,
    {
        let start = Instant::now();
        let outcome = call().await;
        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        let record = match &outcome {
            Ok(response) => {
                debug!(session_id, agent = agent_name, duration_ms, "agent call succeeded");
                InvocationCreate::succeeded(agent_name, query, response.as_str(), duration_ms)
            }
            Err(e) => {
                warn!(session_id, agent = agent_name, duration_ms, error = %e, "agent call failed");
                InvocationCreate::failed(agent_name, query, e.to_string(), duration_ms)
            }
        };
        self.sessions.record_invocation(session_id, &record).await?;
        self.sessions
            .update_context(session_id, agent_name, query, record.context_response())
            .await?;

        Ok(outcome)
    }
}
