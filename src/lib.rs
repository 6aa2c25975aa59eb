pub mod config;
pub mod db;
pub mod error;
pub mod factory;
pub mod registry;
pub mod relay;
pub mod server;
pub mod service;
pub(crate) mod utils;

pub use error::AgentryError;
