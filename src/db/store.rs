use crate::db::models::{
    AgentPerformance, DbAgentInvocation, DbConversationTurn, DbSession, DbSessionContext,
    InvocationCreate, Role, SessionStatus, SessionSummary,
};
use crate::db::schema::SQLITE_INIT;
use crate::error::SessionError;
use chrono::{DateTime, Utc};
use moka::sync::Cache;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::{str::FromStr, sync::Arc, time::Duration};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

const SESSION_LOCK_IDLE: Duration = Duration::from_secs(600);

/// Relational store for sessions and their dependent rows.
///
/// Every child write runs in one transaction that also advances the parent's
/// `updated_at`. Writes on one session are serialised by a per-session mutex.
#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
    locks: Cache<String, Arc<Mutex<()>>>,
}

impl SessionStore {
    /// Opens (creating if missing) the SQLite database and applies the schema.
    pub async fn connect(database_url: &str) -> Result<Self, SessionError> {
        let connect_opts = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5))
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .connect_with(connect_opts)
            .await?;

        apply_schema(&pool).await?;
        info!(database_url, "SessionStore initialized");
        Ok(Self::from_pool(pool))
    }

    /// Wraps an existing pool. The schema must already be applied.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            locks: Cache::builder().time_to_idle(SESSION_LOCK_IDLE).build(),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn lock(&self, session_id: &str) -> OwnedMutexGuard<()> {
        self.locks
            .get_with_by_ref(session_id, || Arc::new(Mutex::new(())))
            .lock_owned()
            .await
    }

    pub async fn create_session(&self, user_id: &str) -> Result<String, SessionError> {
        let session_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        sqlx::query(
            r#"
        INSERT INTO sessions (session_id, user_id, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
        )
        .bind(&session_id)
        .bind(user_id)
        .bind(SessionStatus::Active.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        info!(session_id = %session_id, user_id, "session created");
        Ok(session_id)
    }

    pub async fn get_session(&self, session_id: &str) -> Result<DbSession, SessionError> {
        sqlx::query_as::<_, DbSession>(
            r#"
        SELECT session_id, user_id, status, created_at, updated_at
        FROM sessions
        WHERE session_id = ?
        "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| SessionError::not_found(session_id))
    }

    /// Sessions of one user, most recently active first.
    pub async fn list_sessions(&self, user_id: &str) -> Result<Vec<DbSession>, SessionError> {
        let rows = sqlx::query_as::<_, DbSession>(
            r#"
        SELECT session_id, user_id, status, created_at, updated_at
        FROM sessions
        WHERE user_id = ?
        ORDER BY updated_at DESC, created_at DESC
        "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn append_turn(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
    ) -> Result<i64, SessionError> {
        let _guard = self.lock(session_id).await;
        let mut tx = self.pool.begin().await?;
        let (_, now) = touch(&mut tx, session_id).await?;

        let id: i64 = sqlx::query_scalar(
            r#"
        INSERT INTO conversation_history (session_id, role, content, timestamp)
        VALUES (?, ?, ?, ?)
        RETURNING id
        "#,
        )
        .bind(session_id)
        .bind(role.as_str())
        .bind(content)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(session_id, role = %role, turn_id = id, "turn appended");
        Ok(id)
    }

    pub async fn record_invocation(
        &self,
        session_id: &str,
        invocation: &InvocationCreate,
    ) -> Result<i64, SessionError> {
        let duration_ms = i64::try_from(invocation.duration_ms).unwrap_or(i64::MAX);

        let _guard = self.lock(session_id).await;
        let mut tx = self.pool.begin().await?;
        let (_, now) = touch(&mut tx, session_id).await?;

        let id: i64 = sqlx::query_scalar(
            r#"
        INSERT INTO agent_invocations (
            session_id, agent_name, query, response, success, error_message, duration_ms, timestamp
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
        )
        .bind(session_id)
        .bind(&invocation.agent_name)
        .bind(&invocation.query)
        .bind(&invocation.response)
        .bind(invocation.success)
        .bind(&invocation.error_message)
        .bind(duration_ms)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(
            session_id,
            agent = %invocation.agent_name,
            success = invocation.success,
            duration_ms,
            "invocation recorded"
        );
        Ok(id)
    }

    pub async fn update_context(
        &self,
        session_id: &str,
        last_agent: &str,
        last_query: &str,
        last_response: &str,
    ) -> Result<(), SessionError> {
        let _guard = self.lock(session_id).await;
        let mut tx = self.pool.begin().await?;
        let (_, now) = touch(&mut tx, session_id).await?;

        sqlx::query(
            r#"
        INSERT INTO session_context (
            session_id, last_agent_called, last_query, last_response, updated_at
        )
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(session_id) DO UPDATE SET
            last_agent_called = excluded.last_agent_called,
            last_query = excluded.last_query,
            last_response = excluded.last_response,
            updated_at = excluded.updated_at
        "#,
        )
        .bind(session_id)
        .bind(last_agent)
        .bind(last_query)
        .bind(last_response)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Moves an `active` session to a terminal status.
    pub async fn close_session(
        &self,
        session_id: &str,
        final_status: SessionStatus,
    ) -> Result<DbSession, SessionError> {
        let _guard = self.lock(session_id).await;
        let mut tx = self.pool.begin().await?;
        let (from, now) = touch(&mut tx, session_id).await?;

        if !from.can_transition_to(final_status) {
            return Err(SessionError::InvalidStateTransition {
                session_id: session_id.to_string(),
                from,
                to: final_status,
            });
        }

        let session = sqlx::query_as::<_, DbSession>(
            r#"
        UPDATE sessions SET status = ?, updated_at = ?
        WHERE session_id = ?
        RETURNING session_id, user_id, status, created_at, updated_at
        "#,
        )
        .bind(final_status.as_str())
        .bind(now)
        .bind(session_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(session_id, from = %from, to = %final_status, "session closed");
        Ok(session)
    }

    /// Deletes the session; turns, invocations and context go with it.
    pub async fn delete_session(&self, session_id: &str) -> Result<(), SessionError> {
        let guard = self.lock(session_id).await;
        let res = sqlx::query("DELETE FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        drop(guard);
        self.locks.invalidate(session_id);

        if res.rows_affected() == 0 {
            return Err(SessionError::not_found(session_id));
        }
        info!(session_id, "session deleted");
        Ok(())
    }

    pub async fn session_summary(&self, session_id: &str) -> Result<SessionSummary, SessionError> {
        sqlx::query_as::<_, SessionSummary>(
            r#"
        SELECT session_id, user_id, status, message_count, invocation_count,
               distinct_agents, last_agent_called
        FROM session_summary
        WHERE session_id = ?
        "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| SessionError::not_found(session_id))
    }

    /// `None` when the agent has never been invoked.
    pub async fn agent_performance(
        &self,
        agent_name: &str,
    ) -> Result<Option<AgentPerformance>, SessionError> {
        let row = sqlx::query_as::<_, AgentPerformance>(
            r#"
        SELECT agent_name, total_invocations, success_count, failure_count,
               min_duration_ms, avg_duration_ms, max_duration_ms
        FROM agent_performance
        WHERE agent_name = ?
        "#,
        )
        .bind(agent_name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Turns in order; with `limit`, only the most recent `limit` of them.
    pub async fn history(
        &self,
        session_id: &str,
        limit: Option<u32>,
    ) -> Result<Vec<DbConversationTurn>, SessionError> {
        self.get_session(session_id).await?;
        // SQLite treats a negative LIMIT as unbounded.
        let limit = limit.map(i64::from).unwrap_or(-1);
        let rows = sqlx::query_as::<_, DbConversationTurn>(
            r#"
        SELECT id, session_id, role, content, timestamp FROM (
            SELECT id, session_id, role, content, timestamp
            FROM conversation_history
            WHERE session_id = ?
            ORDER BY id DESC
            LIMIT ?
        )
        ORDER BY id ASC
        "#,
        )
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn context(
        &self,
        session_id: &str,
    ) -> Result<Option<DbSessionContext>, SessionError> {
        self.get_session(session_id).await?;
        let row = sqlx::query_as::<_, DbSessionContext>(
            r#"
        SELECT session_id, last_agent_called, last_query, last_response, updated_at
        FROM session_context
        WHERE session_id = ?
        "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn invocations(
        &self,
        session_id: &str,
    ) -> Result<Vec<DbAgentInvocation>, SessionError> {
        self.get_session(session_id).await?;
        let rows = sqlx::query_as::<_, DbAgentInvocation>(
            r#"
        SELECT id, session_id, agent_name, query, response, success, error_message,
               duration_ms, timestamp
        FROM agent_invocations
        WHERE session_id = ?
        ORDER BY id
        "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Expires every active session idle since before `older_than`; returns their ids.
    pub async fn expire_idle(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<String>, SessionError> {
        let candidates: Vec<(String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT session_id, updated_at FROM sessions WHERE status = ?",
        )
        .bind(SessionStatus::Active.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut expired = Vec::new();
        for (session_id, updated_at) in candidates {
            if updated_at >= older_than {
                continue;
            }
            // Re-checked under the lock; a concurrent write may have revived it.
            let _guard = self.lock(&session_id).await;
            let current = match self.get_session(&session_id).await {
                Ok(s) => s,
                Err(SessionError::NotFound { .. }) => continue,
                Err(e) => return Err(e),
            };
            if current.status != SessionStatus::Active || current.updated_at >= older_than {
                continue;
            }
            sqlx::query("UPDATE sessions SET status = ? WHERE session_id = ? AND status = ?")
                .bind(SessionStatus::Expired.as_str())
                .bind(&session_id)
                .bind(SessionStatus::Active.as_str())
                .execute(&self.pool)
                .await?;
            expired.push(session_id);
        }

        if !expired.is_empty() {
            info!(count = expired.len(), "idle sessions expired");
        }
        Ok(expired)
    }
}

/// Takes the write lock on the session row and advances its `updated_at`.
///
/// The first statement is a write so the transaction never has to upgrade a read
/// snapshot. The new timestamp is `max(stored, now)`.
async fn touch(
    tx: &mut Transaction<'_, Sqlite>,
    session_id: &str,
) -> Result<(SessionStatus, DateTime<Utc>), SessionError> {
    let row: Option<(String, DateTime<Utc>)> = sqlx::query_as(
        r#"
        UPDATE sessions SET updated_at = updated_at
        WHERE session_id = ?
        RETURNING status, updated_at
        "#,
    )
    .bind(session_id)
    .fetch_optional(&mut **tx)
    .await?;

    let (status, stored) = row.ok_or_else(|| SessionError::not_found(session_id))?;
    let now = Utc::now().max(stored);

    sqlx::query("UPDATE sessions SET updated_at = ? WHERE session_id = ?")
        .bind(now)
        .bind(session_id)
        .execute(&mut **tx)
        .await?;

    Ok((status.parse()?, now))
}

pub(crate) async fn apply_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for stmt in SQLITE_INIT.split(';') {
        let s = stmt.trim();
        if s.is_empty() {
            continue;
        }
        sqlx::query(s).execute(pool).await?;
    }
    Ok(())
}
