mod error;
mod handler;
mod router;

pub use error::{ApiError, ApiErrorCode, recover_error};
pub use handler::{ApiResponse, SessionAuthRepo};
pub use router::{REQUEST_ID_HEADER, routes, with_verification};
