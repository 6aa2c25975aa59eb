use crate::db::{
    DbConversationTurn, DbSession, InvocationCreate, Role, SessionStatus, SessionSummary,
};
use crate::error::{AgentryError, RelayError};
use crate::factory::Agent;
use crate::relay::{RequestIdentity, ToolAuthorization, authorize_tool_call};
use crate::server::guards::bearer::MaybeBearer;
use crate::server::router::AgentryState;
use axum::{
    Json, Router,
    extract::{Extension, Path, Query, Request, State, rejection::JsonRejection},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// Routes under `/sessions/{id}` run with the caller's bearer bound to the session id.
pub fn router(state: AgentryState) -> Router<AgentryState> {
    let per_session = Router::new()
        .route("/sessions/{id}", get(get_session).delete(delete_session))
        .route("/sessions/{id}/summary", get(session_summary))
        .route("/sessions/{id}/history", get(history))
        .route("/sessions/{id}/turns", post(append_turn))
        .route("/sessions/{id}/invocations", post(record_invocation))
        .route("/sessions/{id}/close", post(close_session))
        .route("/sessions/{id}/tool-headers", get(tool_headers))
        .route("/sessions/{id}/tool-call", post(tool_call))
        .route_layer(middleware::from_fn_with_state(state, bind_session_credential));

    Router::new()
        .route("/sessions", post(create_session).get(list_sessions))
        .merge(per_session)
}

/// Gives each request on a session its own relay identity (`{session_id}/{request_id}`)
/// and binds the bearer under it for the duration of the handler. Handlers read the
/// identity from the request extensions.
async fn bind_session_credential(
    State(state): State<AgentryState>,
    Path(params): Path<HashMap<String, String>>,
    MaybeBearer(credential): MaybeBearer,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(session_id) = params.get("id") else {
        return next.run(req).await;
    };
    let identity = request_identity(session_id);
    req.extensions_mut().insert(identity.clone());

    let scope = credential.map(|credential| {
        debug!(identity = %identity, "request credential bound");
        state.relay.scope(identity, credential)
    });

    let resp = next.run(req).await;
    drop(scope);
    resp
}

fn request_identity(session_id: &str) -> RequestIdentity {
    RequestIdentity::from(format!("{session_id}/{}", Uuid::new_v4().simple()))
}

#[derive(Debug, Deserialize)]
pub struct CreateSession {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct CreatedSession {
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct AppendTurn {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct Created {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct CloseSession {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct ToolCallRequest {
    pub agent: String,
    pub query: String,
    pub url: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Serialize)]
pub struct ToolCallResponse {
    pub agent: String,
    /// Name reported by the agent the record resolved to.
    pub resolved_agent: String,
    pub response: String,
}

/// POST /sessions
async fn create_session(
    State(state): State<AgentryState>,
    payload: Result<Json<CreateSession>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedSession>), AgentryError> {
    let Json(body) = payload?;
    let session_id = state.sessions.create_session(&body.user_id).await?;
    Ok((StatusCode::CREATED, Json(CreatedSession { session_id })))
}

/// GET /sessions?user_id=
async fn list_sessions(
    State(state): State<AgentryState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<DbSession>>, AgentryError> {
    Ok(Json(state.sessions.list_sessions(&query.user_id).await?))
}

/// GET /sessions/{id}
async fn get_session(
    State(state): State<AgentryState>,
    Path(id): Path<String>,
) -> Result<Json<DbSession>, AgentryError> {
    Ok(Json(state.sessions.get_session(&id).await?))
}

/// DELETE /sessions/{id}
async fn delete_session(
    State(state): State<AgentryState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AgentryError> {
    state.sessions.delete_session(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /sessions/{id}/summary
async fn session_summary(
    State(state): State<AgentryState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSummary>, AgentryError> {
    Ok(Json(state.sessions.session_summary(&id).await?))
}

/// GET /sessions/{id}/history?limit=
async fn history(
    State(state): State<AgentryState>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<DbConversationTurn>>, AgentryError> {
    Ok(Json(state.sessions.history(&id, query.limit).await?))
}

/// POST /sessions/{id}/turns
async fn append_turn(
    State(state): State<AgentryState>,
    Path(id): Path<String>,
    payload: Result<Json<AppendTurn>, JsonRejection>,
) -> Result<(StatusCode, Json<Created>), AgentryError> {
    let Json(body) = payload?;
    let role: Role = body.role.parse()?;
    let turn_id = state.sessions.append_turn(&id, role, &body.content).await?;
    Ok((StatusCode::CREATED, Json(Created { id: turn_id })))
}

/// POST /sessions/{id}/invocations
///
/// Records an outcome reported by the caller and refreshes the session context.
async fn record_invocation(
    State(state): State<AgentryState>,
    Path(id): Path<String>,
    payload: Result<Json<InvocationCreate>, JsonRejection>,
) -> Result<(StatusCode, Json<Created>), AgentryError> {
    let Json(body) = payload?;
    let invocation_id = state.sessions.record_invocation(&id, &body).await?;
    state
        .sessions
        .update_context(&id, &body.agent_name, &body.query, body.context_response())
        .await?;
    Ok((StatusCode::CREATED, Json(Created { id: invocation_id })))
}

/// POST /sessions/{id}/close
async fn close_session(
    State(state): State<AgentryState>,
    Path(id): Path<String>,
    payload: Result<Json<CloseSession>, JsonRejection>,
) -> Result<Json<DbSession>, AgentryError> {
    let Json(body) = payload?;
    let status: SessionStatus = body.status.parse()?;
    Ok(Json(state.sessions.close_session(&id, status).await?))
}

/// GET /sessions/{id}/tool-headers
async fn tool_headers(
    State(state): State<AgentryState>,
    Extension(identity): Extension<RequestIdentity>,
) -> Result<Json<Map<String, Value>>, AgentryError> {
    match authorize_tool_call(&state.relay, &identity) {
        ToolAuthorization::Authorized(headers) => {
            let map = headers
                .iter()
                .filter_map(|(name, value)| {
                    let value = value.to_str().ok()?;
                    Some((name.as_str().to_string(), Value::from(value)))
                })
                .collect();
            Ok(Json(map))
        }
        ToolAuthorization::AuthenticationRequired => {
            Err(RelayError::Absent { identity }.into())
        }
    }
}

/// POST /sessions/{id}/tool-call
///
/// Resolves the named agent (refusing disabled or unresolvable records), dispatches one
/// downstream tool call with this request's bound credential attached, and records the
/// attempt against the session under the registry key.
async fn tool_call(
    State(state): State<AgentryState>,
    Path(id): Path<String>,
    Extension(identity): Extension<RequestIdentity>,
    payload: Result<Json<ToolCallRequest>, JsonRejection>,
) -> Result<Json<ToolCallResponse>, AgentryError> {
    let Json(ToolCallRequest {
        agent,
        query,
        url,
        payload,
    }) = payload?;

    state.sessions.get_session(&id).await?;
    let record = state.registry.get(agent.as_str()).await?;
    let resolved_agent = state.resolver.resolve_record(&record)?.name().to_string();

    let tools = state.tools.clone();
    let outcome = state
        .tracker
        .track(&id, &agent, &query, || async move {
            let resp = tools.post_json(&identity, &url, &payload).await?;
            let status = resp.status();
            let text = resp.text().await?;
            if status.is_success() {
                Ok(text)
            } else {
                Err(AgentryError::ToolStatus {
                    status: status.as_u16(),
                })
            }
        })
        .await?;

    Ok(Json(ToolCallResponse {
        agent,
        resolved_agent,
        response: outcome?,
    }))
}
