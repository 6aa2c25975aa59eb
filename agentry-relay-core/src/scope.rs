use crate::engine::{Binding, CredentialRelay};
use crate::identity::{Credential, RequestIdentity};
use std::sync::Arc;
use std::sync::atomic::Ordering;

/// Guard owning one request's binding. Dropping it removes that binding, so the credential
/// cannot outlive the request that bound it.
#[must_use = "dropping the scope immediately clears the binding"]
pub struct RelayScope {
    relay: CredentialRelay,
    identity: RequestIdentity,
    binding: Arc<Binding>,
}

impl RelayScope {
    pub(crate) fn new(
        relay: CredentialRelay,
        identity: RequestIdentity,
        binding: Arc<Binding>,
    ) -> Self {
        Self {
            relay,
            identity,
            binding,
        }
    }

    pub fn identity(&self) -> &RequestIdentity {
        &self.identity
    }

    /// The credential this scope bound, even if the identity has since been re-bound.
    pub fn credential(&self) -> Credential {
        self.binding.reads.fetch_add(1, Ordering::Relaxed);
        self.binding.credential.clone()
    }
}

impl Drop for RelayScope {
    fn drop(&mut self) {
        self.relay.release(&self.identity, &self.binding);
    }
}

#[cfg(test)]
mod tests {
    use crate::{BindingState, Credential, CredentialRelay, RequestIdentity};

    #[test]
    fn scope_clears_on_drop() {
        let relay = CredentialRelay::new(3600, 64);
        let id = RequestIdentity::from("s-1");
        {
            let scope = relay.scope(id.clone(), Credential::from("tok"));
            assert_eq!(scope.credential().expose(), "tok");
            assert_eq!(relay.state(&id), BindingState::Consumed);
        }
        assert_eq!(relay.state(&id), BindingState::Unset);
    }

    #[test]
    fn scope_clears_when_request_panics() {
        let relay = CredentialRelay::new(3600, 64);
        let id = RequestIdentity::from("s-panic");
        let inner = relay.clone();
        let inner_id = id.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _scope = inner.scope(inner_id, Credential::from("tok"));
            panic!("handler failed");
        }));
        assert!(result.is_err());
        assert!(relay.resolve(&id).is_err());
    }

    #[test]
    fn overlapping_scopes_on_one_identity_keep_their_own_binding() {
        let relay = CredentialRelay::new(3600, 64);
        let id = RequestIdentity::from("session-1");

        let first = relay.scope(id.clone(), Credential::from("tok-A"));
        let second = relay.scope(id.clone(), Credential::from("tok-B"));
        assert_eq!(first.credential().expose(), "tok-A");
        assert_eq!(second.credential().expose(), "tok-B");

        drop(first);
        assert_eq!(relay.resolve(&id).unwrap().expose(), "tok-B");
        assert_eq!(second.credential().expose(), "tok-B");

        drop(second);
        assert_eq!(relay.state(&id), BindingState::Unset);
        assert_eq!(relay.active_bindings(), 0);
    }

    #[test]
    fn scope_leaves_an_explicit_rebind_alone() {
        let relay = CredentialRelay::new(3600, 64);
        let id = RequestIdentity::from("session-2");
        let scope = relay.scope(id.clone(), Credential::from("tok-old"));
        relay.bind(&id, Credential::from("tok-new"));
        drop(scope);
        assert_eq!(relay.resolve(&id).unwrap().expose(), "tok-new");
    }
}
