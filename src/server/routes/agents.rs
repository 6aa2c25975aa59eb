use crate::db::AgentPerformance;
use crate::error::AgentryError;
use crate::factory::CacheStats;
use crate::server::router::AgentryState;
use agentry_schema::{AgentRecord, FactoryReference, RegistrySnapshot};
use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub fn router() -> Router<AgentryState> {
    Router::new()
        .route("/agents", get(list_agents))
        .route(
            "/agents/{name}",
            get(get_agent).put(upsert_agent).delete(remove_agent),
        )
        .route("/agents/{name}/enabled", put(set_enabled))
        .route("/agents/{name}/performance", get(agent_performance))
        .route("/registry/restore", post(restore_registry))
        .route("/factories", get(list_factories))
}

#[derive(Debug, Deserialize)]
pub struct AgentUpsert {
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub factory_reference: FactoryReference,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct EnabledToggle {
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct FactoryListing {
    /// Agent types served by a registered override.
    pub overrides: BTreeSet<String>,
    /// Importable factory modules, builtins included.
    pub modules: BTreeSet<String>,
    pub cache: CacheStats,
}

/// GET /agents
async fn list_agents(State(state): State<AgentryState>) -> Result<Json<RegistrySnapshot>, AgentryError> {
    Ok(Json(state.registry.snapshot().await?))
}

/// GET /agents/{name}
async fn get_agent(
    State(state): State<AgentryState>,
    Path(name): Path<String>,
) -> Result<Json<AgentRecord>, AgentryError> {
    Ok(Json(state.registry.get(name).await?))
}

/// PUT /agents/{name}
///
/// The path segment is the record's name; a `name` in the body is ignored.
async fn upsert_agent(
    State(state): State<AgentryState>,
    Path(name): Path<String>,
    payload: Result<Json<AgentUpsert>, JsonRejection>,
) -> Result<Json<AgentRecord>, AgentryError> {
    let Json(body) = payload?;
    let mut record = AgentRecord::new(name, body.description, body.factory_reference);
    record.enabled = body.enabled;
    Ok(Json(state.registry.upsert(record).await?))
}

/// DELETE /agents/{name}
async fn remove_agent(
    State(state): State<AgentryState>,
    Path(name): Path<String>,
) -> Result<Json<AgentRecord>, AgentryError> {
    Ok(Json(state.registry.remove(name).await?))
}

/// PUT /agents/{name}/enabled
async fn set_enabled(
    State(state): State<AgentryState>,
    Path(name): Path<String>,
    payload: Result<Json<EnabledToggle>, JsonRejection>,
) -> Result<Json<AgentRecord>, AgentryError> {
    let Json(body) = payload?;
    Ok(Json(state.registry.set_enabled(name, body.enabled).await?))
}

/// GET /agents/{name}/performance
async fn agent_performance(
    State(state): State<AgentryState>,
    Path(name): Path<String>,
) -> Result<Json<AgentPerformance>, AgentryError> {
    state
        .sessions
        .agent_performance(&name)
        .await?
        .map(Json)
        .ok_or(AgentryError::AgentNotFound(name))
}

/// POST /registry/restore
async fn restore_registry(
    State(state): State<AgentryState>,
) -> Result<Json<RegistrySnapshot>, AgentryError> {
    Ok(Json(state.registry.restore_from_backup().await?))
}

/// GET /factories
async fn list_factories(State(state): State<AgentryState>) -> Json<FactoryListing> {
    Json(FactoryListing {
        overrides: state.resolver.list_available_factories(),
        modules: state.resolver.catalog().module_names(),
        cache: state.resolver.cache_stats(),
    })
}
