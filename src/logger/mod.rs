//! The `logger` module is a simple utility that requires manual verification.
//! `main.rs` and `bin/token_demo.rs` show it in use.

mod logger;
pub use logger::*;

pub use tracing::{debug, error, info, trace, warn};
