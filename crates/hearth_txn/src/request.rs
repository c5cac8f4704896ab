//! The request contract and its lifecycle wrapper
//!
//! A [`Request`] is the domain half of a reversible edit: it knows how to
//! commit, undo and redo one operation. A [`Txn`] wraps a boxed request and
//! enforces the lifecycle around it:
//!
//! ```text
//! Created --commit--> Committed --undo--> Undone --redo--> Committed ...
//!    |
//!    +--(commit failed / abort)--> Aborted
//! ```
//!
//! Calls out of order return [`TxnError::InvalidLifecycle`] and leave the
//! request untouched.

use crate::error::{TxnError, TxnResult};
use crate::state_request::StateRequest;
use futures_util::future::LocalBoxFuture;
use hearth_core::{TxnId, Value};
use hearth_graph::Document;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::{Rc, Weak};

/// Lifecycle position of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestState {
    Created,
    Committed,
    Undone,
    /// Terminal: the commit failed or the request was aborted
    Aborted,
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Committed => "committed",
            Self::Undone => "undone",
            Self::Aborted => "aborted",
        })
    }
}

/// Grouping tag reported to logging and history consumers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestCategory {
    Edit,
    Transform,
    Layer,
    Structure,
    Group,
    Delete,
    Material,
    Association,
    /// A merged session or explicit composite
    Composite,
    Custom(String),
}

impl fmt::Display for RequestCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Edit => f.write_str("edit"),
            Self::Transform => f.write_str("transform"),
            Self::Layer => f.write_str("layer"),
            Self::Structure => f.write_str("structure"),
            Self::Group => f.write_str("group"),
            Self::Delete => f.write_str("delete"),
            Self::Material => f.write_str("material"),
            Self::Association => f.write_str("association"),
            Self::Composite => f.write_str("composite"),
            Self::Custom(name) => f.write_str(name),
        }
    }
}

/// A reversible unit of mutation.
///
/// `on_undo` must put back exactly what `on_commit` captured, and `on_redo`
/// must replay the captured result rather than recompute it.
pub trait Request {
    /// Human-readable description for the operation history
    fn description(&self) -> &str;

    fn category(&self) -> RequestCategory {
        RequestCategory::Edit
    }

    /// Capture "before", mutate, capture "after"
    fn on_commit(&mut self, doc: &mut Document) -> TxnResult<()>;

    /// Cooperative commit. Requests that await an external collaborator
    /// override this; the default runs [`on_commit`](Self::on_commit).
    fn on_commit_async<'a>(&'a mut self, doc: &'a mut Document) -> LocalBoxFuture<'a, TxnResult<()>> {
        Box::pin(async move { self.on_commit(doc) })
    }

    fn on_undo(&mut self, doc: &mut Document) -> TxnResult<()>;

    fn on_redo(&mut self, doc: &mut Document) -> TxnResult<()>;

    /// Interactive gesture message (drag start/move/end) delivered while the
    /// request is in flight. Returns whether the message was handled.
    fn on_receive(&mut self, _doc: &mut Document, _message: &str, _params: &Value) -> TxnResult<bool> {
        Ok(false)
    }

    /// Called when an in-flight request is abandoned. Requests that mutated
    /// the document while receiving gestures put it back here.
    fn on_abort(&mut self, _doc: &mut Document) -> TxnResult<()> {
        Ok(())
    }

    /// What the commit produced, e.g. the id of a created entity
    fn result(&self) -> Option<Value> {
        None
    }

    /// Requests with equal keys may be folded into one history entry
    fn compose_key(&self) -> Option<String> {
        None
    }

    /// Snapshot state backing this request, when it has one
    fn state_request_mut(&mut self) -> Option<&mut StateRequest> {
        None
    }
}

/// A request plus its lifecycle
pub struct Txn {
    id: TxnId,
    kind: Option<String>,
    state: RequestState,
    body: Box<dyn Request>,
    /// Held while the manager tracks this request as in flight
    lease: Option<Rc<()>>,
}

impl Txn {
    pub fn new(body: impl Request + 'static) -> Self {
        Self::from_boxed(Box::new(body))
    }

    pub fn from_boxed(body: Box<dyn Request>) -> Self {
        Self {
            id: TxnId::new(),
            kind: None,
            state: RequestState::Created,
            body,
            lease: None,
        }
    }

    /// Wrap a body whose effects are already applied, e.g. a composite of
    /// requests committed one by one inside a session
    pub(crate) fn committed(body: impl Request + 'static) -> Self {
        let mut txn = Self::new(body);
        txn.state = RequestState::Committed;
        txn
    }

    /// Builder: tag with the registered request kind
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Weak handle that dies with this request
    pub(crate) fn lease(&mut self) -> Weak<()> {
        Rc::downgrade(self.lease.get_or_insert_with(|| Rc::new(())))
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn is_committed(&self) -> bool {
        self.state == RequestState::Committed
    }

    pub fn description(&self) -> &str {
        self.body.description()
    }

    pub fn category(&self) -> RequestCategory {
        self.body.category()
    }

    pub fn result(&self) -> Option<Value> {
        self.body.result()
    }

    pub fn body(&self) -> &dyn Request {
        self.body.as_ref()
    }

    pub fn body_mut(&mut self) -> &mut dyn Request {
        self.body.as_mut()
    }

    fn require(&self, op: &'static str, expected: RequestState) -> TxnResult<()> {
        if self.state == expected {
            return Ok(());
        }
        log::error!(
            target: "hearth::txn",
            "Cannot {} {} '{}': request is {}",
            op,
            self.id,
            self.description(),
            self.state
        );
        Err(TxnError::InvalidLifecycle { op, state: self.state })
    }

    pub fn commit(&mut self, doc: &mut Document) -> TxnResult<()> {
        self.require("commit", RequestState::Created)?;
        log::debug!(target: "hearth::txn", "Commit {} '{}'", self.id, self.description());
        match self.body.on_commit(doc) {
            Ok(()) => {
                self.state = RequestState::Committed;
                Ok(())
            }
            Err(err) => {
                self.state = RequestState::Aborted;
                Err(err)
            }
        }
    }

    pub async fn commit_async(&mut self, doc: &mut Document) -> TxnResult<()> {
        self.require("commit", RequestState::Created)?;
        log::debug!(target: "hearth::txn", "Commit (async) {} '{}'", self.id, self.description());
        match self.body.on_commit_async(doc).await {
            Ok(()) => {
                self.state = RequestState::Committed;
                Ok(())
            }
            Err(err) => {
                self.state = RequestState::Aborted;
                Err(err)
            }
        }
    }

    pub fn undo(&mut self, doc: &mut Document) -> TxnResult<()> {
        self.require("undo", RequestState::Committed)?;
        log::debug!(target: "hearth::txn", "Undo {} '{}'", self.id, self.description());
        self.body.on_undo(doc)?;
        self.state = RequestState::Undone;
        Ok(())
    }

    pub fn redo(&mut self, doc: &mut Document) -> TxnResult<()> {
        self.require("redo", RequestState::Undone)?;
        log::debug!(target: "hearth::txn", "Redo {} '{}'", self.id, self.description());
        self.body.on_redo(doc)?;
        self.state = RequestState::Committed;
        Ok(())
    }

    /// Forward a gesture message to a request that is still in flight
    pub fn receive(&mut self, doc: &mut Document, message: &str, params: &Value) -> TxnResult<bool> {
        self.require("receive", RequestState::Created)?;
        self.body.on_receive(doc, message, params)
    }

    /// Abandon a request that was never committed
    pub fn abort(&mut self, doc: &mut Document) -> TxnResult<()> {
        self.require("abort", RequestState::Created)?;
        log::debug!(target: "hearth::txn", "Abort {} '{}'", self.id, self.description());
        self.state = RequestState::Aborted;
        self.body.on_abort(doc)
    }

    /// Fold a later committed request into this one when both are backed by
    /// composable snapshot state. Returns whether the merge happened.
    pub(crate) fn compose(&mut self, later: &mut Txn) -> bool {
        if self.kind != later.kind || !self.is_committed() || !later.is_committed() {
            return false;
        }
        match (self.body.compose_key(), later.body.compose_key()) {
            (Some(a), Some(b)) if a == b => {}
            _ => return false,
        }
        let Some(later_state) = later.body.state_request_mut().map(std::mem::take) else {
            return false;
        };
        match self.body.state_request_mut() {
            Some(state) => {
                state.compose(later_state);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Txn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Txn")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("description", &self.description())
            .finish()
    }
}
