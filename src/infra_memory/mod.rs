mod principal_repo_memory;
mod refresh_session_store_memory;

pub use principal_repo_memory::*;
pub use refresh_session_store_memory::*;
