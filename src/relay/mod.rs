//! Request-scoped credential relay: the engine lives in `agentry-relay-core`; this module
//! turns a bound credential into outbound tool-call headers.

mod headers;

pub use agentry_relay_core::{
    BindingState, Credential, CredentialRelay, RelayError, RelayScope, RequestIdentity,
};
pub use headers::{
    AuthorizedRequest, ToolAuthorization, ToolCaller, X_REQUEST_IDENTITY, authorize_tool_call,
    outbound_headers,
};

use crate::config::RelayConfig;

/// Relay sized from the `relay` config table.
pub fn from_config(cfg: &RelayConfig) -> CredentialRelay {
    CredentialRelay::new(cfg.binding_ttl_secs, cfg.max_bindings)
}
