use crate::error::{AgentryError, StoreError};
use crate::registry::durable_store::DurableStore;
use agentry_schema::{AgentRecord, RegistrySnapshot};
use chrono::Utc;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Debug)]
pub enum RegistryMessage {
    /// Current registry document.
    Snapshot(RpcReplyPort<Result<RegistrySnapshot, AgentryError>>),

    /// One record by name.
    Get(String, RpcReplyPort<Result<AgentRecord, AgentryError>>),

    /// Insert or replace a record and persist; returns the stored record.
    Upsert(AgentRecord, RpcReplyPort<Result<AgentRecord, AgentryError>>),

    /// Remove a record and persist; returns the removed record.
    Remove(String, RpcReplyPort<Result<AgentRecord, AgentryError>>),

    /// Flip a record's `enabled` flag and persist.
    SetEnabled {
        name: String,
        enabled: bool,
        reply: RpcReplyPort<Result<AgentRecord, AgentryError>>,
    },

    /// Replace the primary with the backup and adopt it as the in-memory document.
    RestoreFromBackup(RpcReplyPort<Result<RegistrySnapshot, AgentryError>>),
}

/// Cloneable handle to the single writer of the registry document.
#[derive(Clone)]
pub struct RegistryHandle {
    actor: ActorRef<RegistryMessage>,
}

impl RegistryHandle {
    pub async fn snapshot(&self) -> Result<RegistrySnapshot, AgentryError> {
        ractor::call!(self.actor, RegistryMessage::Snapshot).map_err(|e| {
            AgentryError::RactorError(format!("RegistryActor Snapshot RPC failed: {e}"))
        })?
    }

    pub async fn get(&self, name: impl Into<String>) -> Result<AgentRecord, AgentryError> {
        ractor::call!(self.actor, RegistryMessage::Get, name.into())
            .map_err(|e| AgentryError::RactorError(format!("RegistryActor Get RPC failed: {e}")))?
    }

    pub async fn upsert(&self, record: AgentRecord) -> Result<AgentRecord, AgentryError> {
        ractor::call!(self.actor, RegistryMessage::Upsert, record).map_err(|e| {
            AgentryError::RactorError(format!("RegistryActor Upsert RPC failed: {e}"))
        })?
    }

    pub async fn remove(&self, name: impl Into<String>) -> Result<AgentRecord, AgentryError> {
        ractor::call!(self.actor, RegistryMessage::Remove, name.into()).map_err(|e| {
            AgentryError::RactorError(format!("RegistryActor Remove RPC failed: {e}"))
        })?
    }

    pub async fn set_enabled(
        &self,
        name: impl Into<String>,
        enabled: bool,
    ) -> Result<AgentRecord, AgentryError> {
        let name = name.into();
        ractor::call!(self.actor, |reply| RegistryMessage::SetEnabled {
            name,
            enabled,
            reply
        })
        .map_err(|e| AgentryError::RactorError(format!("RegistryActor SetEnabled RPC failed: {e}")))?
    }

    pub async fn restore_from_backup(&self) -> Result<RegistrySnapshot, AgentryError> {
        ractor::call!(self.actor, RegistryMessage::RestoreFromBackup).map_err(|e| {
            AgentryError::RactorError(format!("RegistryActor RestoreFromBackup RPC failed: {e}"))
        })?
    }

    pub fn stop(&self) {
        self.actor.stop(None);
    }
}

struct RegistryActorState {
    store: DurableStore,
    /// `None` while the primary is corrupt; every access re-reads until it parses.
    snapshot: Option<RegistrySnapshot>,
}

struct RegistryActor;

#[ractor::async_trait]
impl Actor for RegistryActor {
    type Msg = RegistryMessage;
    type State = RegistryActorState;
    type Arguments = PathBuf;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        path: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let store = DurableStore::new(path);
        let snapshot = match run_blocking(store.clone(), |s| s.load_or_default()).await {
            Ok(snapshot) => {
                info!(
                    path = %store.path().display(),
                    agents = snapshot.agents.len(),
                    "RegistryActor initialized"
                );
                Some(snapshot)
            }
            Err(AgentryError::Store(e)) if e.is_corruption() => {
                // Surfaced on every call until an explicit restore.
                error!(error = %e, "RegistryActor started with a corrupt registry");
                None
            }
            Err(e) => {
                return Err(ActorProcessingErr::from(format!(
                    "registry load failed: {e}"
                )));
            }
        };
        Ok(RegistryActorState { store, snapshot })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            RegistryMessage::Snapshot(reply) => {
                let res = current(state).await.map(|s| s.clone());
                let _ = reply.send(res);
            }
            RegistryMessage::Get(name, reply) => {
                let res = current(state).await.and_then(|s| match s.get(&name) {
                    // The key names a record whose document left `name` empty.
                    Some(record) if record.name.is_empty() => Ok(AgentRecord {
                        name,
                        ..record.clone()
                    }),
                    Some(record) => Ok(record.clone()),
                    None => Err(AgentryError::AgentNotFound(name)),
                });
                let _ = reply.send(res);
            }
            RegistryMessage::Upsert(record, reply) => {
                let res = self.upsert(state, record).await;
                let _ = reply.send(res);
            }
            RegistryMessage::Remove(name, reply) => {
                let res = self.remove(state, name).await;
                let _ = reply.send(res);
            }
            RegistryMessage::SetEnabled {
                name,
                enabled,
                reply,
            } => {
                let res = self.set_enabled(state, name, enabled).await;
                let _ = reply.send(res);
            }
            RegistryMessage::RestoreFromBackup(reply) => {
                let res = run_blocking(state.store.clone(), |s| s.restore_from_backup()).await;
                if let Ok(restored) = &res {
                    state.snapshot = Some(restored.clone());
                }
                let _ = reply.send(res);
            }
        }
        Ok(())
    }
}

impl RegistryActor {
    async fn upsert(
        &self,
        state: &mut RegistryActorState,
        mut record: AgentRecord,
    ) -> Result<AgentRecord, AgentryError> {
        let now = Utc::now();
        let mut next = current(state).await?.clone();
        let existing = next.get(&record.name);
        let created_at = existing
            .and_then(|existing| existing.created_at)
            .or(record.created_at)
            .unwrap_or(now);
        // Fields the caller does not model are kept from the stored record.
        if let Some(existing) = existing {
            for (key, value) in &existing.extra {
                record
                    .extra
                    .entry(key.clone())
                    .or_insert_with(|| value.clone());
            }
        }
        record.created_at = Some(created_at);
        record.updated_at = Some(now);
        next.agents.insert(record.name.clone(), record.clone());

        commit(state, next).await?;
        info!(agent = %record.name, enabled = record.enabled, "registry record upserted");
        Ok(record)
    }

    async fn remove(
        &self,
        state: &mut RegistryActorState,
        name: String,
    ) -> Result<AgentRecord, AgentryError> {
        let mut next = current(state).await?.clone();
        let removed = next
            .agents
            .remove(&name)
            .ok_or_else(|| AgentryError::AgentNotFound(name.clone()))?;

        commit(state, next).await?;
        info!(agent = %name, "registry record removed");
        Ok(removed)
    }

    async fn set_enabled(
        &self,
        state: &mut RegistryActorState,
        name: String,
        enabled: bool,
    ) -> Result<AgentRecord, AgentryError> {
        let mut next = current(state).await?.clone();
        let record = next
            .agents
            .get_mut(&name)
            .ok_or_else(|| AgentryError::AgentNotFound(name.clone()))?;
        record.enabled = enabled;
        record.updated_at = Some(Utc::now());
        let record = record.clone();

        commit(state, next).await?;
        Ok(record)
    }
}

async fn current(state: &mut RegistryActorState) -> Result<&RegistrySnapshot, AgentryError> {
    if state.snapshot.is_none() {
        let loaded = run_blocking(state.store.clone(), |s| s.load()).await?;
        state.snapshot = Some(loaded);
    }
    state
        .snapshot
        .as_ref()
        .ok_or_else(|| AgentryError::UnexpectedError("registry snapshot missing".to_string()))
}

/// Persist first; the in-memory document only moves once the disk write succeeded.
async fn commit(state: &mut RegistryActorState, next: RegistrySnapshot) -> Result<(), AgentryError> {
    let to_save = next.clone();
    run_blocking(state.store.clone(), move |s| s.save(&to_save)).await?;
    state.snapshot = Some(next);
    Ok(())
}

async fn run_blocking<T, F>(store: DurableStore, f: F) -> Result<T, AgentryError>
where
    T: Send + 'static,
    F: FnOnce(&DurableStore) -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&store))
        .await
        .map_err(|e| AgentryError::UnexpectedError(format!("registry task failed: {e}")))?
        .map_err(AgentryError::from)
}

/// Spawn the registry actor over the document at `path`.
pub async fn spawn(path: impl Into<PathBuf>) -> Result<RegistryHandle, AgentryError> {
    let (actor, _jh) = ractor::Actor::spawn(None, RegistryActor, path.into())
        .await
        .map_err(|e| AgentryError::RactorError(format!("failed to spawn RegistryActor: {e}")))?;

    Ok(RegistryHandle { actor })
}
