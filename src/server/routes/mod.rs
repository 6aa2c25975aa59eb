pub mod agents;
pub mod sessions;
