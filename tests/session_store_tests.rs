use agentry::db::{InvocationCreate, Role, SessionStatus, SessionStore};
use agentry::error::SessionError;
use agentry::service::InvocationTracker;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

async fn open_store(tag: &str) -> (SessionStore, PathBuf) {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before UNIX_EPOCH")
        .as_nanos();

    let mut temp_path = std::env::temp_dir();
    temp_path.push(format!(
        "agentry-sessions-{tag}-{}-{}.sqlite",
        std::process::id(),
        nanos
    ));
    let database_url = format!("sqlite:{}", temp_path.display());
    let store = SessionStore::connect(&database_url)
        .await
        .expect("session store should open");
    (store, temp_path)
}

async fn count(store: &SessionStore, table: &str, session_id: &str) -> i64 {
    sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {table} WHERE session_id = ?"
    ))
    .bind(session_id)
    .fetch_one(store.pool())
    .await
    .unwrap()
}

#[tokio::test]
async fn delete_session_cascades_to_every_dependent_row() {
    let (store, path) = open_store("cascade").await;
    let sid = store.create_session("user-1").await.unwrap();

    store.append_turn(&sid, Role::User, "hi").await.unwrap();
    store.append_turn(&sid, Role::Assistant, "hello").await.unwrap();
    store.append_turn(&sid, Role::User, "refund please").await.unwrap();
    store
        .record_invocation(&sid, &InvocationCreate::succeeded("billing", "refund", "ok", 12))
        .await
        .unwrap();
    store
        .record_invocation(&sid, &InvocationCreate::failed("tickets", "status", "timeout", 30))
        .await
        .unwrap();
    store
        .update_context(&sid, "billing", "refund", "ok")
        .await
        .unwrap();

    assert_eq!(count(&store, "conversation_history", &sid).await, 3);
    assert_eq!(count(&store, "agent_invocations", &sid).await, 2);

    store.delete_session(&sid).await.unwrap();

    assert_eq!(count(&store, "sessions", &sid).await, 0);
    assert_eq!(count(&store, "conversation_history", &sid).await, 0);
    assert_eq!(count(&store, "agent_invocations", &sid).await, 0);
    assert_eq!(count(&store, "session_context", &sid).await, 0);
    assert!(matches!(
        store.get_session(&sid).await,
        Err(SessionError::NotFound { .. })
    ));
    assert!(matches!(
        store.delete_session(&sid).await,
        Err(SessionError::NotFound { .. })
    ));

    let _ = tokio::fs::remove_file(&path).await;
}

#[tokio::test]
async fn status_only_moves_forward() {
    let (store, path) = open_store("forward").await;
    let sid = store.create_session("user-1").await.unwrap();

    let err = store
        .close_session(&sid, SessionStatus::Active)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidStateTransition { .. }));

    let closed = store
        .close_session(&sid, SessionStatus::Completed)
        .await
        .unwrap();
    assert_eq!(closed.status, SessionStatus::Completed);

    for target in [SessionStatus::Active, SessionStatus::Expired, SessionStatus::Completed] {
        match store.close_session(&sid, target).await {
            Err(SessionError::InvalidStateTransition { from, to, .. }) => {
                assert_eq!(from, SessionStatus::Completed);
                assert_eq!(to, target);
            }
            other => panic!("expected invalid transition, got {other:?}"),
        }
    }
    assert_eq!(
        store.get_session(&sid).await.unwrap().status,
        SessionStatus::Completed
    );

    let _ = tokio::fs::remove_file(&path).await;
}

#[tokio::test]
async fn child_writes_advance_updated_at() {
    let (store, path) = open_store("touch").await;
    let sid = store.create_session("user-1").await.unwrap();
    let created = store.get_session(&sid).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    store.append_turn(&sid, Role::User, "one").await.unwrap();
    let after_turn = store.get_session(&sid).await.unwrap();
    assert!(after_turn.updated_at > created.updated_at);
    assert_eq!(after_turn.created_at, created.created_at);

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    store
        .record_invocation(&sid, &InvocationCreate::succeeded("a", "q", "r", 1))
        .await
        .unwrap();
    let after_invocation = store.get_session(&sid).await.unwrap();
    assert!(after_invocation.updated_at > after_turn.updated_at);

    let _ = tokio::fs::remove_file(&path).await;
}

#[tokio::test]
async fn summary_and_performance_aggregate_rows() {
    let (store, path) = open_store("aggregate").await;
    let sid = store.create_session("user-1").await.unwrap();
    let other = store.create_session("user-2").await.unwrap();

    store.append_turn(&sid, Role::User, "q1").await.unwrap();
    store.append_turn(&sid, Role::Assistant, "a1").await.unwrap();
    for (agent, ok, ms) in [("billing", true, 10), ("billing", false, 30), ("tickets", true, 20)] {
        let inv = if ok {
            InvocationCreate::succeeded(agent, "q", "r", ms)
        } else {
            InvocationCreate::failed(agent, "q", "boom", ms)
        };
        store.record_invocation(&sid, &inv).await.unwrap();
    }
    store
        .record_invocation(&other, &InvocationCreate::succeeded("billing", "q", "r", 50))
        .await
        .unwrap();
    store
        .update_context(&sid, "tickets", "q", "r")
        .await
        .unwrap();

    let summary = store.session_summary(&sid).await.unwrap();
    assert_eq!(summary.message_count, 2);
    assert_eq!(summary.invocation_count, 3);
    assert_eq!(summary.distinct_agents, 2);
    assert_eq!(summary.last_agent_called.as_deref(), Some("tickets"));
    assert_eq!(summary.status, SessionStatus::Active);

    let empty = store.session_summary(&other).await.unwrap();
    assert_eq!(empty.message_count, 0);
    assert_eq!(empty.last_agent_called, None);

    let perf = store.agent_performance("billing").await.unwrap().unwrap();
    assert_eq!(perf.total_invocations, 3);
    assert_eq!(perf.success_count, 2);
    assert_eq!(perf.failure_count, 1);
    assert_eq!(perf.min_duration_ms, 10);
    assert_eq!(perf.max_duration_ms, 50);
    assert!((perf.avg_duration_ms - 30.0).abs() < f64::EPSILON);

    assert!(store.agent_performance("nobody").await.unwrap().is_none());

    let _ = tokio::fs::remove_file(&path).await;
}

#[tokio::test]
async fn history_limit_keeps_most_recent_in_order() {
    let (store, path) = open_store("history").await;
    let sid = store.create_session("user-1").await.unwrap();
    for i in 0..5 {
        store
            .append_turn(&sid, Role::User, &format!("m{i}"))
            .await
            .unwrap();
    }

    let all = store.history(&sid, None).await.unwrap();
    assert_eq!(all.len(), 5);

    let last_two: Vec<String> = store
        .history(&sid, Some(2))
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.content)
        .collect();
    assert_eq!(last_two, vec!["m3".to_string(), "m4".to_string()]);

    let _ = tokio::fs::remove_file(&path).await;
}

#[tokio::test]
async fn writes_to_unknown_session_are_not_found() {
    let (store, path) = open_store("unknown").await;

    assert!(matches!(
        store.append_turn("missing", Role::User, "x").await,
        Err(SessionError::NotFound { .. })
    ));
    assert!(matches!(
        store
            .record_invocation("missing", &InvocationCreate::succeeded("a", "q", "r", 1))
            .await,
        Err(SessionError::NotFound { .. })
    ));
    assert!(matches!(
        store.update_context("missing", "a", "q", "r").await,
        Err(SessionError::NotFound { .. })
    ));
    assert!(matches!(
        store.session_summary("missing").await,
        Err(SessionError::NotFound { .. })
    ));

    let _ = tokio::fs::remove_file(&path).await;
}

#[tokio::test]
async fn expire_idle_only_touches_stale_active_sessions() {
    let (store, path) = open_store("expire").await;
    let stale = store.create_session("user-1").await.unwrap();
    let closed = store.create_session("user-1").await.unwrap();
    store
        .close_session(&closed, SessionStatus::Completed)
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let cutoff = chrono::Utc::now();
    let fresh = store.create_session("user-1").await.unwrap();

    let expired = store.expire_idle(cutoff).await.unwrap();
    assert_eq!(expired, vec![stale.clone()]);
    assert_eq!(
        store.get_session(&stale).await.unwrap().status,
        SessionStatus::Expired
    );
    assert_eq!(
        store.get_session(&closed).await.unwrap().status,
        SessionStatus::Completed
    );
    assert_eq!(
        store.get_session(&fresh).await.unwrap().status,
        SessionStatus::Active
    );
    assert_eq!(store.list_sessions("user-1").await.unwrap().len(), 3);

    let _ = tokio::fs::remove_file(&path).await;
}

#[tokio::test]
async fn concurrent_writes_on_one_session_all_land() {
    let (store, path) = open_store("concurrent").await;
    let sid = store.create_session("user-1").await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..20 {
        let store = store.clone();
        let sid = sid.clone();
        tasks.push(tokio::spawn(async move {
            store
                .append_turn(&sid, Role::User, &format!("t{i}"))
                .await
                .unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(store.history(&sid, None).await.unwrap().len(), 20);

    let _ = tokio::fs::remove_file(&path).await;
}

#[tokio::test]
async fn tracker_records_outcome_and_context() {
    let (store, path) = open_store("tracker").await;
    let tracker = InvocationTracker::new(store.clone());
    let sid = store.create_session("user-1").await.unwrap();

    let ok = tracker
        .track(&sid, "billing", "balance?", || async {
            Ok::<_, String>("42".to_string())
        })
        .await
        .unwrap();
    assert_eq!(ok.as_deref(), Ok("42"));

    let failed = tracker
        .track(&sid, "tickets", "status?", || async {
            Err::<String, _>("upstream down".to_string())
        })
        .await
        .unwrap();
    assert_eq!(failed, Err("upstream down".to_string()));

    let rows = store.invocations(&sid).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows[0].success);
    assert!(!rows[1].success);
    assert_eq!(rows[1].error_message.as_deref(), Some("upstream down"));

    // Context follows every call; a failure stores its error.
    let ctx = store.context(&sid).await.unwrap().unwrap();
    assert_eq!(ctx.last_agent_called, "tickets");
    assert_eq!(ctx.last_query, "status?");
    assert_eq!(ctx.last_response, "upstream down");

    let _ = tokio::fs::remove_file(&path).await;
}
