//! Session persistence: models and schema for the relational session store.
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows and view rows
//! - `schema.rs`: SQL DDL for initializing the database (SQLite)
//! - `store.rs`: `SessionStore`, the only writer of these tables

pub mod models;
pub mod schema;
mod store;

pub use models::{
    AgentPerformance, DbAgentInvocation, DbConversationTurn, DbSession, DbSessionContext,
    InvocationCreate, Role, SessionStatus, SessionSummary,
};
pub use schema::SQLITE_INIT;
pub use store::SessionStore;
