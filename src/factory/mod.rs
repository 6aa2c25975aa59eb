//! Agent construction: override table first, then the module catalog.

pub mod agent;
pub mod catalog;
mod resolver;

pub use agent::{Agent, NamedAgent, ResolvedAgent};
pub use catalog::{AgentFactory, BuiltinModule, FactoryModule, FunctionTable, ModuleCatalog};
pub use resolver::{CacheStats, FactoryResolver};
