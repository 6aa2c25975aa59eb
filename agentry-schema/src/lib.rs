pub mod agent_config;
pub mod registry;

pub use agent_config::{AgentConfig, FactoryParams};
pub use registry::{AgentRecord, FactoryReference, RegistrySnapshot};
