//! Error types for requests, sessions and the transaction manager

use crate::request::RequestState;
use hearth_core::{EntityId, SessionId, TxnId};
use hearth_graph::GraphError;
use thiserror::Error;

/// Transaction errors
#[derive(Debug, Error)]
pub enum TxnError {
    /// Lifecycle contract violated, e.g. undo before commit
    #[error("Cannot {op} a request that is {state}")]
    InvalidLifecycle { op: &'static str, state: RequestState },

    /// Failure inside the entity graph
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// No factory registered for the kind
    #[error("Unknown request kind: {0}")]
    UnknownRequestKind(String),

    /// Factory rejected its parameter list
    #[error("Invalid parameters for {kind}: {reason}")]
    InvalidParams { kind: String, reason: String },

    /// Session is not the active one, or is the default session
    #[error("Session {0} is not the active session")]
    SessionMismatch(SessionId),

    /// The active session already has an uncommitted request
    #[error("Request {0} is still in flight")]
    RequestInFlight(TxnId),

    /// Entity missing from the document
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// Configuration could not be parsed
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Domain-specific commit failure
    #[error("{0}")]
    Domain(String),
}

impl TxnError {
    /// Build an [`InvalidParams`](Self::InvalidParams) error
    pub fn params(kind: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParams {
            kind: kind.to_owned(),
            reason: reason.into(),
        }
    }
}

/// Result type for transaction operations
pub type TxnResult<T> = std::result::Result<T, TxnError>;
