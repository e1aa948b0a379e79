//! Client side of the todo service: transports and the optimistic list controller.

use thiserror::Error;

use crate::model::TodoId;
use crate::{AppError, ErrorKind};

mod controller;
mod http;
mod local;
mod optimistic;
mod transport;

pub use controller::{ListController, Settlement};
pub use http::HttpTransport;
pub use local::StoreTransport;
pub use optimistic::{replay, ListView, Mutation, PendingMutation};
pub use transport::{TodoTransport, TransportError};

/// Why a controller operation did not take effect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("todo {0} is not in the list")]
    UnknownItem(TodoId),
    #[error("invalid input: {0}")]
    Invalid(AppError),
    #[error("cannot move a todo onto its own slot")]
    InvalidMove,
    #[error("list controller has shut down")]
    Closed,
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Transport(err) => err.kind(),
            ClientError::UnknownItem(_) => ErrorKind::NotFound,
            ClientError::Invalid(_) => ErrorKind::Validation,
            ClientError::InvalidMove => ErrorKind::InvalidMove,
            ClientError::Closed => ErrorKind::Internal,
        }
    }
}
