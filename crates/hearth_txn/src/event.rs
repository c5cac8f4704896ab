//! Transaction signals
//!
//! The manager publishes a [`TransactionEvent`] around every lifecycle step so
//! that an operation history, audit log or UI can follow along. Dispatch is
//! synchronous and in subscription order. Events serialize for hosts that
//! forward them to an audit log.

use crate::request::{RequestCategory, Txn};
use hearth_core::TxnId;
use serde::Serialize;

/// What listeners learn about a request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestInfo {
    pub id: TxnId,
    pub kind: Option<String>,
    pub description: String,
    pub category: RequestCategory,
}

impl RequestInfo {
    pub fn of(txn: &Txn) -> Self {
        Self {
            id: txn.id(),
            kind: txn.kind().map(str::to_owned),
            description: txn.description().to_owned(),
            category: txn.category(),
        }
    }
}

/// Manager signals
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TransactionEvent {
    Created(RequestInfo),
    Committing(RequestInfo),
    Committed(RequestInfo),
    Aborting(RequestInfo),
    Aborted(RequestInfo),
    Undoing(RequestInfo),
    Undone(RequestInfo),
    Redoing(RequestInfo),
    Redone(RequestInfo),
    UndoRedoStateChanged { can_undo: bool, can_redo: bool },
}

impl TransactionEvent {
    /// The request the event is about, if any
    pub fn request(&self) -> Option<&RequestInfo> {
        match self {
            Self::Created(info)
            | Self::Committing(info)
            | Self::Committed(info)
            | Self::Aborting(info)
            | Self::Aborted(info)
            | Self::Undoing(info)
            | Self::Undone(info)
            | Self::Redoing(info)
            | Self::Redone(info) => Some(info),
            Self::UndoRedoStateChanged { .. } => None,
        }
    }
}

/// Event handler function type
pub type EventHandler = Box<dyn FnMut(&TransactionEvent)>;

/// Subscriber ID for unsubscribing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub u64);

/// Synchronous event bus with optional blocking
#[derive(Default)]
pub struct EventBus {
    handlers: Vec<(SubscriberId, EventHandler)>,
    next_id: u64,
    blocking: bool,
    blocked: Vec<TransactionEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every event
    pub fn subscribe<F>(&mut self, handler: F) -> SubscriberId
    where
        F: FnMut(&TransactionEvent) + 'static,
    {
        let id = SubscriberId(self.next_id);
        self.next_id += 1;
        self.handlers.push((id, Box::new(handler)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) {
        self.handlers.retain(|(sid, _)| *sid != id);
    }

    /// Dispatch now, or queue while blocking
    pub fn publish(&mut self, event: TransactionEvent) {
        if self.blocking {
            self.blocked.push(event);
            return;
        }
        self.dispatch(&event);
    }

    fn dispatch(&mut self, event: &TransactionEvent) {
        for (_, handler) in &mut self.handlers {
            handler(event);
        }
    }

    /// Queue events instead of dispatching them
    pub fn start_blocking(&mut self) {
        self.blocking = true;
    }

    /// Resume dispatch. Queued events stay queued.
    pub fn stop_blocking(&mut self) {
        self.blocking = false;
    }

    /// Dispatch every queued event in order
    pub fn flush_blocked(&mut self) {
        for event in std::mem::take(&mut self.blocked) {
            self.dispatch(&event);
        }
    }

    pub fn blocked_count(&self) -> usize {
        self.blocked.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.len()
    }
}
