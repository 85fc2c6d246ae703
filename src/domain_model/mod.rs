mod principal;
mod refresh_session;

pub use principal::*;
pub use refresh_session::*;
