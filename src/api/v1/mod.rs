mod error;
mod handler;
mod router;

pub use error::{ApiError, ApiErrorCode, recover_error};
pub use handler::{ApiResponse, REFRESH_COOKIE_NAME, REFRESH_COOKIE_PATH};
pub use router::routes;
