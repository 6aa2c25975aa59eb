use crate::identity::{Credential, RequestIdentity};
use crate::scope::RelayScope;
use moka::ops::compute::Op;
use moka::sync::Cache;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error as ThisError;

#[derive(Debug, Clone, ThisError, PartialEq, Eq)]
pub enum RelayError {
    #[error("no credential bound for request identity {identity}")]
    Absent { identity: RequestIdentity },
}

/// Observable lifecycle of one identity. A cleared or expired binding reads as `Unset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    Unset,
    Bound,
    Consumed,
}

pub(crate) struct Binding {
    pub(crate) credential: Credential,
    pub(crate) reads: AtomicU64,
}

type BindingStore = Cache<RequestIdentity, Arc<Binding>>;

/// Identity-keyed credential store.
///
/// Every operation takes the identity explicitly and touches only that identity's entry.
/// Entries carry a time-to-live so a binding whose request never reached `clear` still
/// disappears. Cloning yields a handle to the same store.
#[derive(Clone)]
pub struct CredentialRelay {
    bindings: BindingStore,
}

impl CredentialRelay {
    pub fn new(ttl_secs: u64, max_capacity: u64) -> Self {
        let bindings = BindingStore::builder()
            .time_to_live(Duration::from_secs(ttl_secs.max(1)))
            .max_capacity(max_capacity.max(1))
            .build();
        Self { bindings }
    }

    /// Bind `credential` to `identity`. Re-binding replaces the previous credential.
    pub fn bind(&self, identity: &RequestIdentity, credential: Credential) {
        self.bind_shared(identity, credential);
    }

    fn bind_shared(&self, identity: &RequestIdentity, credential: Credential) -> Arc<Binding> {
        let binding = Arc::new(Binding {
            credential,
            reads: AtomicU64::new(0),
        });
        self.bindings.insert(identity.clone(), binding.clone());
        binding
    }

    pub fn resolve(&self, identity: &RequestIdentity) -> Result<Credential, RelayError> {
        match self.bindings.get(identity) {
            Some(binding) => {
                binding.reads.fetch_add(1, Ordering::Relaxed);
                Ok(binding.credential.clone())
            }
            None => Err(RelayError::Absent {
                identity: identity.clone(),
            }),
        }
    }

    pub fn clear(&self, identity: &RequestIdentity) {
        self.bindings.invalidate(identity);
    }

    pub fn state(&self, identity: &RequestIdentity) -> BindingState {
        match self.bindings.get(identity) {
            None => BindingState::Unset,
            Some(b) if b.reads.load(Ordering::Relaxed) == 0 => BindingState::Bound,
            Some(_) => BindingState::Consumed,
        }
    }

    /// Bind for the lifetime of the returned guard. On drop the guard removes its own
    /// binding; a later bind under the same identity is left in place.
    pub fn scope(&self, identity: RequestIdentity, credential: Credential) -> RelayScope {
        let binding = self.bind_shared(&identity, credential);
        RelayScope::new(self.clone(), identity, binding)
    }

    /// Remove `identity` only while it still maps to `binding`.
    pub(crate) fn release(&self, identity: &RequestIdentity, binding: &Arc<Binding>) {
        let _ = self
            .bindings
            .entry_by_ref(identity)
            .and_compute_with(|current| match current {
                Some(entry) if Arc::ptr_eq(entry.value(), binding) => Op::Remove,
                _ => Op::Nop,
            });
    }

    /// Approximate count of live bindings after flushing pending maintenance.
    pub fn active_bindings(&self) -> u64 {
        self.bindings.run_pending_tasks();
        self.bindings.entry_count()
    }
}
