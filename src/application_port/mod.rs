mod auth_service;
mod refresh_session_service;

pub use auth_service::*;
pub use refresh_session_service::*;
