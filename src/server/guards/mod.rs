pub mod auth;
pub mod bearer;
