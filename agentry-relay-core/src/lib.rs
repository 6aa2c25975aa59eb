pub mod engine;
pub mod identity;
pub mod scope;

pub use engine::{BindingState, CredentialRelay, RelayError};
pub use identity::{Credential, RequestIdentity};
pub use scope::RelayScope;
