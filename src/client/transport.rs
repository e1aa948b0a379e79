use async_trait::async_trait;
use thiserror::Error;

use crate::error::{DB_TX_CONFLICT, NET_BAD_RESPONSE, NET_UNREACHABLE};
use crate::model::{ListId, NewTodo, TodoId, TodoItem, TodoPatch};
use crate::{AppError, ErrorKind};

/// Why a request to the todo service did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request never got an answer.
    #[error("todo service unreachable: {0}")]
    Network(String),
    /// The service answered with a structured error.
    #[error("request rejected: {0}")]
    Rejected(AppError),
    /// The service answered with a non-success status and no usable error body.
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Decode(String),
}

impl TransportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::Network(_) => ErrorKind::Network,
            TransportError::Rejected(err) => err.kind(),
            TransportError::Status { status: 404, .. } => ErrorKind::NotFound,
            TransportError::Status { status: 409, .. } => ErrorKind::TransactionConflict,
            TransportError::Status { status: 400, .. } => ErrorKind::Validation,
            TransportError::Status { .. } | TransportError::Decode(_) => ErrorKind::Internal,
        }
    }

    /// True when re-sending the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Network | ErrorKind::TransactionConflict
        )
    }

    pub fn conflict(detail: impl Into<String>) -> Self {
        TransportError::Rejected(AppError::new(DB_TX_CONFLICT, detail))
    }
}

impl From<AppError> for TransportError {
    fn from(error: AppError) -> Self {
        TransportError::Rejected(error)
    }
}

impl From<TransportError> for AppError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Rejected(app_error) => app_error,
            TransportError::Network(detail) => {
                AppError::new(NET_UNREACHABLE, "Todo service unreachable").with_context("detail", detail)
            }
            TransportError::Status { status, body } => {
                AppError::new(NET_BAD_RESPONSE, format!("Unexpected status {status}"))
                    .with_context("status", status.to_string())
                    .with_context("body", body)
            }
            TransportError::Decode(detail) => {
                AppError::new(NET_BAD_RESPONSE, "Malformed response").with_context("detail", detail)
            }
        }
    }
}

/// Request/response access to one todo service, scoped per list.
#[async_trait]
pub trait TodoTransport: Send + Sync {
    /// Full list in ascending position order.
    async fn list(&self, list: &ListId) -> Result<Vec<TodoItem>, TransportError>;

    async fn create(&self, list: &ListId, todo: &NewTodo) -> Result<TodoItem, TransportError>;

    async fn update(
        &self,
        list: &ListId,
        id: TodoId,
        patch: &TodoPatch,
    ) -> Result<TodoItem, TransportError>;

    /// Moves `from_id` into the slot of `to_id`; returns the moved row.
    async fn move_between(
        &self,
        list: &ListId,
        from_id: TodoId,
        to_id: TodoId,
    ) -> Result<TodoItem, TransportError>;

    /// Deletes and returns the row.
    async fn delete(&self, list: &ListId, id: TodoId) -> Result<TodoItem, TransportError>;
}
