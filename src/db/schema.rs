//! SQL DDL for the session store.
//! Statements are separated by `;` and applied one at a time, so no statement body
//! (views included) may contain a semicolon.

/// SQLite schema includes:
/// - `sessions` (one row per conversation, forward-only `status`)
/// - `conversation_history`, `agent_invocations`, `session_context` (cascade on session delete)
/// - `session_summary` and `agent_performance` read-only aggregate views
pub const SQLITE_INIT: &str = r#"
-- ---------------------------------------------------------------------------
-- Sessions
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS sessions (
    session_id TEXT PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active'
        CHECK (status IN ('active', 'completed', 'expired')),
    created_at TEXT NOT NULL, -- RFC3339
    updated_at TEXT NOT NULL  -- RFC3339
);

CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);

-- ---------------------------------------------------------------------------
-- Conversation turns (append-only)
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS conversation_history (
    id INTEGER PRIMARY KEY NOT NULL,
    session_id TEXT NOT NULL
        REFERENCES sessions(session_id) ON DELETE CASCADE,
    role TEXT NOT NULL CHECK (role IN ('user', 'assistant', 'system')),
    content TEXT NOT NULL,
    timestamp TEXT NOT NULL -- RFC3339
);

CREATE INDEX IF NOT EXISTS idx_history_session ON conversation_history(session_id, id);

-- ---------------------------------------------------------------------------
-- Agent invocations (append-only)
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS agent_invocations (
    id INTEGER PRIMARY KEY NOT NULL,
    session_id TEXT NOT NULL
        REFERENCES sessions(session_id) ON DELETE CASCADE,
    agent_name TEXT NOT NULL,
    query TEXT NOT NULL,
    response TEXT NOT NULL,
    success INTEGER NOT NULL,
    error_message TEXT NULL,
    duration_ms INTEGER NOT NULL,
    timestamp TEXT NOT NULL -- RFC3339
);

CREATE INDEX IF NOT EXISTS idx_invocations_session ON agent_invocations(session_id);
CREATE INDEX IF NOT EXISTS idx_invocations_agent ON agent_invocations(agent_name);

-- ---------------------------------------------------------------------------
-- Last-interaction context (at most one row per session)
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS session_context (
    session_id TEXT PRIMARY KEY NOT NULL
        REFERENCES sessions(session_id) ON DELETE CASCADE,
    last_agent_called TEXT NOT NULL,
    last_query TEXT NOT NULL,
    last_response TEXT NOT NULL,
    updated_at TEXT NOT NULL -- RFC3339
);

-- ---------------------------------------------------------------------------
-- Aggregate views
-- ---------------------------------------------------------------------------
CREATE VIEW IF NOT EXISTS session_summary AS
SELECT
    s.session_id,
    s.user_id,
    s.status,
    (SELECT COUNT(*) FROM conversation_history h WHERE h.session_id = s.session_id)
        AS message_count,
    (SELECT COUNT(*) FROM agent_invocations i WHERE i.session_id = s.session_id)
        AS invocation_count,
    (SELECT COUNT(DISTINCT i.agent_name) FROM agent_invocations i WHERE i.session_id = s.session_id)
        AS distinct_agents,
    c.last_agent_called
FROM sessions s
LEFT JOIN session_context c ON c.session_id = s.session_id;

CREATE VIEW IF NOT EXISTS agent_performance AS
SELECT
    agent_name,
    COUNT(*) AS total_invocations,
    SUM(CASE WHEN success = 1 THEN 1 ELSE 0 END) AS success_count,
    SUM(CASE WHEN success = 1 THEN 0 ELSE 1 END) AS failure_count,
    MIN(duration_ms) AS min_duration_ms,
    AVG(duration_ms) AS avg_duration_ms,
    MAX(duration_ms) AS max_duration_ms
FROM agent_invocations
GROUP BY agent_name;
"#;
