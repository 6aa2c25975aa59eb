mod agentry;
mod factory;
mod session;
mod store;

pub use agentry::{AgentryError, ApiErrorBody, ApiErrorObject};
pub use agentry_relay_core::RelayError;
pub use factory::FactoryError;
pub use session::SessionError;
pub use store::StoreError;
