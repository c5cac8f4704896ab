//! Sessions - one level of undo/redo history
//!
//! The manager keeps a stack of sessions. The bottom one is the document's
//! history; nested sessions collect the requests of one interactive gesture
//! and are folded into their parent (or discarded) when they close.

use crate::config::SessionOptions;
use crate::error::TxnResult;
use crate::event::RequestInfo;
use crate::request::{RequestCategory, Txn};
use hearth_core::{SessionId, TxnId};
use hearth_graph::Document;
use std::collections::VecDeque;
use std::rc::Weak;

/// A request handed out by the manager and not yet committed or aborted.
/// The slot frees itself once the request is dropped.
struct InFlight {
    id: TxnId,
    lease: Weak<()>,
}

/// Undo and redo stacks plus the session's own settings
pub struct Session {
    id: SessionId,
    description: Option<String>,
    /// Oldest first; trimmed from the front
    undo_stack: VecDeque<Txn>,
    redo_stack: Vec<Txn>,
    max_undo_steps: usize,
    undo_redo: bool,
    in_flight: Option<InFlight>,
}

impl Session {
    pub fn new(options: &SessionOptions, default_max_undo_steps: usize) -> Self {
        Self {
            id: SessionId::new(),
            description: options.description.clone(),
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            max_undo_steps: options.max_undo_steps.unwrap_or(default_max_undo_steps),
            undo_redo: options.undo_redo,
            in_flight: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Whether manager-level undo/redo may operate on this session
    pub fn undo_redo_enabled(&self) -> bool {
        self.undo_redo
    }

    pub fn max_undo_steps(&self) -> usize {
        self.max_undo_steps
    }

    pub fn set_max_undo_steps(&mut self, steps: usize) {
        self.max_undo_steps = steps;
        self.trim();
    }

    /// Request created through the manager and not yet committed or aborted
    pub fn in_flight(&self) -> Option<TxnId> {
        self.in_flight
            .as_ref()
            .filter(|f| f.lease.strong_count() > 0)
            .map(|f| f.id)
    }

    pub(crate) fn set_in_flight(&mut self, id: TxnId, lease: Weak<()>) {
        self.in_flight = Some(InFlight { id, lease });
    }

    /// Forget `id` if it is the in-flight request. Returns whether it was.
    pub(crate) fn release_in_flight(&mut self, id: TxnId) -> bool {
        match &self.in_flight {
            Some(f) if f.id == id => {
                self.in_flight = None;
                true
            }
            _ => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    /// Next request `undo` would reverse
    pub fn peek_undo(&self) -> Option<&Txn> {
        self.undo_stack.back()
    }

    /// Next request `redo` would replay
    pub fn peek_redo(&self) -> Option<&Txn> {
        self.redo_stack.last()
    }

    /// Record a committed request. New history invalidates the redo stack.
    /// With `compose`, a request that folds into the top entry does not
    /// take a slot of its own.
    pub fn push(&mut self, mut txn: Txn, compose: bool) {
        self.redo_stack.clear();
        if compose {
            if let Some(top) = self.undo_stack.back_mut() {
                if top.compose(&mut txn) {
                    log::trace!(target: "hearth::txn", "Composed {} into {}", txn.id(), top.id());
                    return;
                }
            }
        }
        self.undo_stack.push_back(txn);
        self.trim();
    }

    fn trim(&mut self) {
        while self.undo_stack.len() > self.max_undo_steps {
            if let Some(dropped) = self.undo_stack.pop_front() {
                log::trace!(target: "hearth::txn", "History full, dropping {}", dropped.id());
            }
        }
    }

    /// Undo the top request. A request whose undo fails stays on the undo
    /// stack.
    pub fn undo(&mut self, doc: &mut Document) -> TxnResult<Option<RequestInfo>> {
        let Some(mut txn) = self.undo_stack.pop_back() else {
            return Ok(None);
        };
        if let Err(err) = txn.undo(doc) {
            self.undo_stack.push_back(txn);
            return Err(err);
        }
        let info = RequestInfo::of(&txn);
        self.redo_stack.push(txn);
        Ok(Some(info))
    }

    /// Redo the most recently undone request
    pub fn redo(&mut self, doc: &mut Document) -> TxnResult<Option<RequestInfo>> {
        let Some(mut txn) = self.redo_stack.pop() else {
            return Ok(None);
        };
        if let Err(err) = txn.redo(doc) {
            self.redo_stack.push(txn);
            return Err(err);
        }
        let info = RequestInfo::of(&txn);
        self.undo_stack.push_back(txn);
        Ok(Some(info))
    }

    /// Undo everything on the undo stack, newest first, and forget it all.
    /// Keeps going past failures and reports the first one.
    pub fn abort(&mut self, doc: &mut Document) -> TxnResult<Vec<RequestInfo>> {
        let mut undone = Vec::new();
        let mut first_err = None;
        while let Some(mut txn) = self.undo_stack.pop_back() {
            match txn.undo(doc) {
                Ok(()) => undone.push(RequestInfo::of(&txn)),
                Err(err) => {
                    log::error!(
                        target: "hearth::txn",
                        "Undo of {} during abort of {} failed: {}",
                        txn.id(),
                        self.id,
                        err
                    );
                    first_err.get_or_insert(err);
                }
            }
        }
        self.redo_stack.clear();
        match first_err {
            Some(err) => Err(err),
            None => Ok(undone),
        }
    }

    /// Drop both stacks without touching the document
    pub fn reset(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.in_flight = None;
    }

    /// Committed requests in commit order; the redo stack is discarded
    pub fn into_requests(self) -> Vec<Txn> {
        self.undo_stack.into_iter().collect()
    }

    /// (description, category) of the undo stack, oldest first
    pub fn history(&self) -> Vec<(String, RequestCategory)> {
        self.undo_stack
            .iter()
            .map(|t| (t.description().to_owned(), t.category()))
            .collect()
    }

    /// Descriptions of both stacks, each oldest first
    pub fn descriptions(&self) -> (Vec<String>, Vec<String>) {
        (
            self.undo_stack.iter().map(|t| t.description().to_owned()).collect(),
            self.redo_stack.iter().map(|t| t.description().to_owned()).collect(),
        )
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("undo", &self.undo_stack.len())
            .field("redo", &self.redo_stack.len())
            .field("undo_redo", &self.undo_redo)
            .finish()
    }
}
