//! Hearth Txn - reversible edits over the Hearth entity graph
//!
//! Every change to a [`Document`](hearth_graph::Document) goes through a
//! [`Request`]: a command object that can commit, undo and redo one edit.
//!
//! - [`Txn`] wraps a request and enforces its lifecycle
//! - [`StateRequest`] captures per-entity snapshots so undo and redo replay
//!   state instead of recomputing it
//! - [`CompositeRequest`] runs an ordered list of requests as one
//! - [`TransactionManager`] builds requests by kind, records history in
//!   nested [`Session`]s and publishes [`TransactionEvent`]s
//!
//! ```ignore
//! let mut manager = TransactionManager::with_builtin_requests(ManagerConfig::default());
//! let txn = manager.create_request("move", vec!["e1".into(), 5.0.into(), 5.0.into()])?;
//! manager.commit(&mut doc, txn, false)?;
//! manager.undo(&mut doc)?;
//! ```

pub mod composite;
pub mod config;
pub mod error;
pub mod event;
pub mod manager;
pub mod request;
pub mod requests;
pub mod session;
pub mod state_request;
pub mod txn_state;

pub use composite::CompositeRequest;
pub use config::{ManagerConfig, SessionOptions};
pub use error::{TxnError, TxnResult};
pub use event::{EventBus, RequestInfo, SubscriberId, TransactionEvent};
pub use manager::{ParamAdapter, RequestFactory, SessionStack, TransactionManager};
pub use request::{Request, RequestCategory, RequestState, Txn};
pub use requests::register_builtin_requests;
pub use session::Session;
pub use state_request::StateRequest;
pub use txn_state::{
    EntityTransactionType, Snapshot, TransactionStateEnum, TxnState, TxnStateFactory, TxnStateKind,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::composite::CompositeRequest;
    pub use crate::config::{ManagerConfig, SessionOptions};
    pub use crate::error::{TxnError, TxnResult};
    pub use crate::event::TransactionEvent;
    pub use crate::manager::TransactionManager;
    pub use crate::request::{Request, RequestCategory, RequestState, Txn};
    pub use crate::requests::*;
    pub use crate::state_request::StateRequest;
    pub use crate::txn_state::EntityTransactionType;
    pub use hearth_graph::prelude::*;
}
