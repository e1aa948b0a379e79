//! Ordered todo lists: a SQLite-backed store that keeps positions dense,
//! an HTTP API over it, and a client controller that applies mutations
//! optimistically and reconciles with the server.

pub mod api;
pub mod client;
pub mod config;
pub mod db;
mod error;
pub mod logging;
pub mod migrate;
pub mod model;
pub mod ordering;
pub mod seed;
pub mod state;
pub mod store;
pub mod time;

pub use error::{AppError, AppResult, ErrorKind};
pub use logging::{init_logging, LogFormat, LogGuard};

/// Error codes carried in [`AppError::code`].
pub mod codes {
    pub use crate::error::{
        DB_POOL_TIMEOUT, DB_TX_CONFLICT, NET_BAD_RESPONSE, NET_UNREACHABLE, TODO_DENSITY_VIOLATION,
        TODO_INVALID_MOVE, TODO_NOT_FOUND, VALIDATION_HEADLINE_REQUIRED, VALIDATION_INVALID_ID,
        VALIDATION_LIST_ID, VALIDATION_PAYLOAD,
    };
}
