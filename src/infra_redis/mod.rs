mod refresh_session_store_redis;

pub use refresh_session_store_redis::*;
