pub mod guards;
pub mod router;
pub mod routes;

pub use router::{AgentryState, agentry_router};
