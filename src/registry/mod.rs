mod actor;
pub mod durable_store;

pub use actor::{RegistryHandle, RegistryMessage, spawn};
pub use durable_store::DurableStore;
