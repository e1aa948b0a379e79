use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;

use anyhow::Error as AnyhowError;
use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeJsonError;
use sqlx::Error as SqlxError;
use ts_rs::TS;

pub const TODO_NOT_FOUND: &str = "TODO/NOT_FOUND";
pub const TODO_INVALID_MOVE: &str = "TODO/INVALID_MOVE";
pub const TODO_DENSITY_VIOLATION: &str = "TODO/DENSITY_VIOLATION";
pub const VALIDATION_HEADLINE_REQUIRED: &str = "VALIDATION/HEADLINE_REQUIRED";
pub const VALIDATION_INVALID_ID: &str = "VALIDATION/INVALID_ID";
pub const VALIDATION_LIST_ID: &str = "VALIDATION/LIST_ID";
pub const VALIDATION_PAYLOAD: &str = "VALIDATION/PAYLOAD";
pub const DB_TX_CONFLICT: &str = "DB/TX_CONFLICT";
pub const DB_POOL_TIMEOUT: &str = "DB/POOL_TIMEOUT";
pub const NET_UNREACHABLE: &str = "NET/UNREACHABLE";
pub const NET_BAD_RESPONSE: &str = "NET/BAD_RESPONSE";

const UNKNOWN_CODE: &str = "APP/UNKNOWN";

/// SQLite primary and extended result codes that mean another writer got there
/// first: BUSY, LOCKED, BUSY_RECOVERY, LOCKED_SHAREDCACHE, BUSY_SNAPSHOT.
const SQLITE_CONFLICT_CODES: &[&str] = &["5", "6", "261", "262", "517"];

/// Coarse classification of an [`AppError`] used for status mapping and retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum ErrorKind {
    NotFound,
    InvalidMove,
    Validation,
    TransactionConflict,
    Network,
    Internal,
}

/// Error returned by the store, the API and the client transports.
///
/// Serialized as a flat `{ code, message, context?, cause? }` object, which is
/// also the HTTP error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AppError {
    /// `AREA/REASON`, e.g. `TODO/NOT_FOUND`.
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    #[ts(as = "Option<HashMap<String, String>>", optional)]
    pub context: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub cause: Option<Box<AppError>>,
}

pub type AppResult<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        AppError {
            code: code.into(),
            message: message.into(),
            context: HashMap::new(),
            cause: None,
        }
    }

    pub fn not_found(id: i64) -> Self {
        AppError::new(TODO_NOT_FOUND, "Todo not found").with_context("id", id.to_string())
    }

    pub fn invalid_move(message: impl Into<String>) -> Self {
        AppError::new(TODO_INVALID_MOVE, message)
    }

    pub fn validation(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        debug_assert!(code.starts_with("VALIDATION/"));
        AppError::new(code, message)
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &HashMap<String, String> {
        &self.context
    }

    pub fn cause(&self) -> Option<&AppError> {
        self.cause.as_deref()
    }

    pub fn kind(&self) -> ErrorKind {
        match self.code.as_str() {
            TODO_NOT_FOUND | "SQLX/ROW_NOT_FOUND" => ErrorKind::NotFound,
            TODO_INVALID_MOVE => ErrorKind::InvalidMove,
            DB_TX_CONFLICT => ErrorKind::TransactionConflict,
            code if code.starts_with("VALIDATION/") || code.starts_with("JSON/") => {
                ErrorKind::Validation
            }
            code if code.starts_with("NET/") => ErrorKind::Network,
            _ => ErrorKind::Internal,
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.context.is_empty() {
            write!(f, "[{}] {}", self.code, self.message)
        } else {
            write!(f, "[{}] {} ({:?})", self.code, self.message, self.context)
        }
    }
}

impl StdError for AppError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn StdError + 'static))
    }
}

impl From<AnyhowError> for AppError {
    fn from(error: AnyhowError) -> Self {
        fn unwind(err: &(dyn StdError + 'static)) -> AppError {
            if let Some(app) = err.downcast_ref::<AppError>() {
                return app.clone();
            }
            let mut node = AppError::new(UNKNOWN_CODE, err.to_string());
            node.cause = err.source().map(|source| Box::new(unwind(source)));
            node
        }

        unwind(error.as_ref())
    }
}

impl From<SerdeJsonError> for AppError {
    fn from(error: SerdeJsonError) -> Self {
        let code = if error.is_syntax() {
            "JSON/SYNTAX"
        } else if error.is_eof() {
            "JSON/EOF"
        } else {
            "JSON/DATA"
        };
        let mut app_error = AppError::new(code, error.to_string());
        if error.line() > 0 {
            app_error = app_error
                .with_context("line", error.line().to_string())
                .with_context("column", error.column().to_string());
        }
        app_error
    }
}

impl From<SqlxError> for AppError {
    fn from(error: SqlxError) -> Self {
        match error {
            SqlxError::RowNotFound => AppError::new("SQLX/ROW_NOT_FOUND", "Record not found"),
            SqlxError::PoolTimedOut => AppError::new(
                DB_POOL_TIMEOUT,
                "Timed out waiting for a database connection",
            ),
            SqlxError::PoolClosed => AppError::new("SQLX/POOL_CLOSED", "Database pool is closed"),
            SqlxError::Database(db) => {
                let sqlite_code = db.code().map(|code| code.into_owned());
                if let Some(code) = sqlite_code
                    .as_deref()
                    .filter(|code| SQLITE_CONFLICT_CODES.contains(code))
                {
                    return AppError::new(
                        DB_TX_CONFLICT,
                        "Another write touched the same rows; retry the operation",
                    )
                    .with_context("sqlite_code", code.to_string())
                    .with_context("detail", db.message().to_string());
                }
                let code = sqlite_code
                    .map(|code| format!("SQLITE/{code}"))
                    .unwrap_or_else(|| "SQLX/DATABASE".to_string());
                let mut app_error = AppError::new(code, db.message().to_string());
                if let Some(constraint) = db.constraint() {
                    app_error = app_error.with_context("constraint", constraint.to_string());
                }
                app_error
            }
            SqlxError::ColumnDecode { index, source } => {
                AppError::new("SQLX/COLUMN_DECODE", source.to_string()).with_context("column", index.to_string())
            }
            other => AppError::new("SQLX/ERROR", other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_codes() {
        assert_eq!(AppError::not_found(4).kind(), ErrorKind::NotFound);
        assert_eq!(AppError::invalid_move("same").kind(), ErrorKind::InvalidMove);
        assert_eq!(
            AppError::validation(VALIDATION_HEADLINE_REQUIRED, "empty").kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            AppError::new(DB_TX_CONFLICT, "busy").kind(),
            ErrorKind::TransactionConflict
        );
        assert_eq!(AppError::new(NET_UNREACHABLE, "down").kind(), ErrorKind::Network);
        assert_eq!(AppError::new("SQLITE/19", "constraint").kind(), ErrorKind::Internal);
    }

    #[test]
    fn anyhow_context_keeps_the_move_error_as_cause() {
        let inner =
            AppError::invalid_move("Cannot move a todo onto itself").with_context("from_id", "3");
        let err = AnyhowError::from(inner.clone()).context("move failed");

        let converted = AppError::from(err);
        assert_eq!(converted.code(), UNKNOWN_CODE);
        assert_eq!(converted.message(), "move failed");
        assert_eq!(converted.cause(), Some(&inner));
    }

    #[test]
    fn malformed_json_is_a_validation_failure() {
        let err = serde_json::from_str::<serde_json::Value>("{\"headline\": }").unwrap_err();
        let app_error = AppError::from(err);
        assert_eq!(app_error.code(), "JSON/SYNTAX");
        assert_eq!(app_error.kind(), ErrorKind::Validation);
        assert!(app_error.context().contains_key("line"));
    }

    #[test]
    fn pool_exhaustion_is_not_a_conflict() {
        let app_error = AppError::from(SqlxError::PoolTimedOut);
        assert_eq!(app_error.code(), DB_POOL_TIMEOUT);
        assert_eq!(app_error.kind(), ErrorKind::Internal);
    }

    #[test]
    fn missing_row_is_not_found() {
        let app_error = AppError::from(SqlxError::RowNotFound);
        assert_eq!(app_error.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn serializes_as_flat_object() {
        let value = serde_json::to_value(AppError::not_found(9)).unwrap();
        assert_eq!(value["code"], TODO_NOT_FOUND);
        assert_eq!(value["context"]["id"], "9");
        assert!(value.get("cause").is_none());

        let back: AppError = serde_json::from_value(value).unwrap();
        assert_eq!(back, AppError::not_found(9));
    }
}
