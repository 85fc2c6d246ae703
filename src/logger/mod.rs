//! Process-wide `tracing` setup: a bootstrap subscriber at `info`, reloaded
//! with `[log].filter` once settings are parsed.

mod logger;
pub use logger::*;

pub use tracing::{debug, error, info, trace, warn};
