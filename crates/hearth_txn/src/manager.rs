//! Transaction manager
//!
//! The single entry point for reversible edits. The manager
//! - builds requests from registered factories
//! - commits them and records them in the active session
//! - keeps a stack of nested sessions over the document's own history
//! - runs undo/redo on the innermost session that allows it
//! - publishes a [`TransactionEvent`] around every step

use crate::composite::CompositeRequest;
use crate::config::{ManagerConfig, SessionOptions};
use crate::error::{TxnError, TxnResult};
use crate::event::{EventBus, RequestInfo, SubscriberId, TransactionEvent};
use crate::request::{Request, RequestCategory, Txn};
use crate::session::Session;
use hearth_core::{SessionId, TxnId, Value};
use hearth_graph::Document;
use std::collections::BTreeMap;

/// Builds an uncommitted request from its parameter list
pub type RequestFactory = Box<dyn Fn(&[Value]) -> TxnResult<Box<dyn Request>>>;

/// Rewrites a parameter list before the factory sees it
pub type ParamAdapter = Box<dyn Fn(Vec<Value>) -> TxnResult<Vec<Value>>>;

struct Registration {
    factory: RequestFactory,
    adapter: Option<ParamAdapter>,
}

/// One open session as listed by [`TransactionManager::request_stack`]
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStack {
    pub id: SessionId,
    pub undo: Vec<String>,
    pub redo: Vec<String>,
}

pub struct TransactionManager {
    config: ManagerConfig,
    registry: BTreeMap<String, Registration>,
    /// Never empty: index 0 is the default session
    sessions: Vec<Session>,
    enabled: bool,
    undo_redo_blocked: bool,
    events: EventBus,
}

impl TransactionManager {
    pub fn new(config: ManagerConfig) -> Self {
        let default_session = Session::new(&SessionOptions::default(), config.max_undo_steps);
        Self {
            enabled: config.undo_redo_enabled,
            config,
            registry: BTreeMap::new(),
            sessions: vec![default_session],
            undo_redo_blocked: false,
            events: EventBus::new(),
        }
    }

    /// Manager with every built-in request kind registered
    pub fn with_builtin_requests(config: ManagerConfig) -> Self {
        let mut manager = Self::new(config);
        crate::requests::register_builtin_requests(&mut manager);
        manager
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    // ---------------------------------------------------------------
    // Registry
    // ---------------------------------------------------------------

    /// Register a factory for `kind`, replacing any previous one
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&[Value]) -> TxnResult<Box<dyn Request>> + 'static,
    {
        self.insert_registration(kind.into(), Box::new(factory), None);
    }

    /// Register a factory whose parameters first go through `adapter`
    pub fn register_with_adapter<F, A>(&mut self, kind: impl Into<String>, factory: F, adapter: A)
    where
        F: Fn(&[Value]) -> TxnResult<Box<dyn Request>> + 'static,
        A: Fn(Vec<Value>) -> TxnResult<Vec<Value>> + 'static,
    {
        self.insert_registration(kind.into(), Box::new(factory), Some(Box::new(adapter)));
    }

    fn insert_registration(&mut self, kind: String, factory: RequestFactory, adapter: Option<ParamAdapter>) {
        if self
            .registry
            .insert(kind.clone(), Registration { factory, adapter })
            .is_some()
        {
            log::warn!(target: "hearth::txn", "Request kind '{}' registered twice", kind);
        }
    }

    pub fn is_registered(&self, kind: &str) -> bool {
        self.registry.contains_key(kind)
    }

    pub fn registered_kinds(&self) -> impl Iterator<Item = &str> {
        self.registry.keys().map(String::as_str)
    }

    /// Build an uncommitted request. The document is not touched. The
    /// request becomes the active session's in-flight request until it is
    /// committed, aborted or dropped.
    pub fn create_request(&mut self, kind: &str, params: Vec<Value>) -> TxnResult<Txn> {
        if let Some(in_flight) = self.active_session().in_flight() {
            return Err(TxnError::RequestInFlight(in_flight));
        }
        let registration = self
            .registry
            .get(kind)
            .ok_or_else(|| TxnError::UnknownRequestKind(kind.to_owned()))?;
        let params = match &registration.adapter {
            Some(adapter) => adapter(params)?,
            None => params,
        };
        let mut txn = Txn::from_boxed((registration.factory)(&params)?).with_kind(kind);

        log::debug!(target: "hearth::txn", "Created {} '{}' ({})", txn.id(), txn.description(), kind);
        let lease = txn.lease();
        self.active_session_mut().set_in_flight(txn.id(), lease);
        self.events.publish(TransactionEvent::Created(RequestInfo::of(&txn)));
        Ok(txn)
    }

    // ---------------------------------------------------------------
    // Commit / abort
    // ---------------------------------------------------------------

    /// Commit `txn` and record it in the active session. `skip_undo`
    /// commits without history. Returns the request's result.
    pub fn commit(&mut self, doc: &mut Document, mut txn: Txn, skip_undo: bool) -> TxnResult<Option<Value>> {
        let info = self.before_commit(&txn)?;
        let outcome = txn.commit(doc);
        self.after_commit(txn, info, outcome, skip_undo)
    }

    /// [`commit`](Self::commit) for requests with a cooperative commit body
    pub async fn commit_async(
        &mut self,
        doc: &mut Document,
        mut txn: Txn,
        skip_undo: bool,
    ) -> TxnResult<Option<Value>> {
        let info = self.before_commit(&txn)?;
        let outcome = txn.commit_async(doc).await;
        self.after_commit(txn, info, outcome, skip_undo)
    }

    fn before_commit(&mut self, txn: &Txn) -> TxnResult<RequestInfo> {
        match self.active_session().in_flight() {
            Some(in_flight) if in_flight != txn.id() => return Err(TxnError::RequestInFlight(in_flight)),
            _ => {}
        }
        let info = RequestInfo::of(txn);
        self.events.publish(TransactionEvent::Committing(info.clone()));
        Ok(info)
    }

    fn after_commit(
        &mut self,
        txn: Txn,
        info: RequestInfo,
        outcome: TxnResult<()>,
        skip_undo: bool,
    ) -> TxnResult<Option<Value>> {
        self.release_in_flight(txn.id());
        if let Err(err) = outcome {
            log::warn!(target: "hearth::txn", "Commit of {} '{}' failed: {}", info.id, info.description, err);
            self.events.publish(TransactionEvent::Aborted(info));
            return Err(err);
        }

        let result = txn.result();
        self.events.publish(TransactionEvent::Committed(info));
        if skip_undo || !self.enabled {
            log::trace!(target: "hearth::txn", "{} committed without history", txn.id());
        } else {
            self.record(self.sessions.len() - 1, txn);
        }
        Ok(result)
    }

    /// Push a committed request onto session `index`
    fn record(&mut self, index: usize, txn: Txn) {
        let compose = self.config.compose_consecutive;
        self.sessions[index].push(txn, compose);
        if Some(index) == self.undo_redo_index() {
            self.publish_undo_redo_state();
        }
    }

    /// Release a request that will never be committed
    pub fn abort(&mut self, doc: &mut Document, mut txn: Txn) -> TxnResult<()> {
        let info = RequestInfo::of(&txn);
        self.events.publish(TransactionEvent::Aborting(info.clone()));
        let outcome = txn.abort(doc);
        self.release_in_flight(txn.id());
        outcome?;
        self.events.publish(TransactionEvent::Aborted(info));
        Ok(())
    }

    /// Free the in-flight slot of whichever open session handed out `id`.
    /// It need not be the active one: a request may be created before a
    /// session opens and committed inside it.
    fn release_in_flight(&mut self, id: TxnId) {
        if let Some(session) = self.sessions.iter_mut().rev().find(|s| s.in_flight() == Some(id)) {
            session.release_in_flight(id);
        }
    }

    /// Forward a gesture message to an in-flight request
    pub fn receive(&mut self, doc: &mut Document, txn: &mut Txn, message: &str, params: &Value) -> TxnResult<bool> {
        txn.receive(doc, message, params)
    }

    // ---------------------------------------------------------------
    // Sessions
    // ---------------------------------------------------------------

    /// Open a nested session on top of the stack. Its history is unbounded
    /// unless `options` sets a depth, so closing it merges or aborts every
    /// request it saw.
    pub fn begin_session(&mut self, options: SessionOptions) -> SessionId {
        let session = Session::new(&options, usize::MAX);
        let id = session.id();
        log::debug!(
            target: "hearth::txn",
            "Begin {} (depth {})",
            id,
            self.sessions.len()
        );
        self.sessions.push(session);
        id
    }

    pub fn active_session(&self) -> &Session {
        // The default session is never popped.
        &self.sessions[self.sessions.len() - 1]
    }

    fn active_session_mut(&mut self) -> &mut Session {
        let top = self.sessions.len() - 1;
        &mut self.sessions[top]
    }

    pub fn active_session_id(&self) -> SessionId {
        self.active_session().id()
    }

    /// Number of open sessions, the default one included
    pub fn session_depth(&self) -> usize {
        self.sessions.len()
    }

    /// Pop `id`, which must be the active nested session
    fn pop_session(&mut self, id: SessionId) -> TxnResult<Session> {
        if self.sessions.len() < 2 || self.active_session_id() != id {
            log::error!(target: "hearth::txn", "Cannot close {}: not the active nested session", id);
            return Err(TxnError::SessionMismatch(id));
        }
        self.sessions.pop().ok_or(TxnError::SessionMismatch(id))
    }

    /// Close the session, recording its requests as one history entry in
    /// the parent
    pub fn end_session(&mut self, id: SessionId) -> TxnResult<()> {
        let session = self.pop_session(id)?;
        let description = session.description().unwrap_or("Session").to_owned();
        let mut requests = session.into_requests();
        log::debug!(target: "hearth::txn", "End {} merging {} requests", id, requests.len());

        let merged = match requests.len() {
            0 => return Ok(()),
            1 => requests.remove(0),
            _ => {
                let mut composite = CompositeRequest::new(description);
                for txn in requests {
                    composite.append(txn);
                }
                Txn::committed(composite)
            }
        };
        if self.enabled {
            self.record(self.sessions.len() - 1, merged);
        }
        Ok(())
    }

    /// Close the session, moving each of its requests into the parent
    pub fn end_session_unmerged(&mut self, id: SessionId) -> TxnResult<()> {
        let session = self.pop_session(id)?;
        let requests = session.into_requests();
        log::debug!(target: "hearth::txn", "End {} keeping {} requests", id, requests.len());
        if self.enabled {
            let parent = self.sessions.len() - 1;
            for txn in requests {
                self.record(parent, txn);
            }
        }
        Ok(())
    }

    /// Close the session keeping its effects but recording nothing
    pub fn terminate_session(&mut self, id: SessionId) -> TxnResult<()> {
        let session = self.pop_session(id)?;
        log::debug!(
            target: "hearth::txn",
            "Terminate {} dropping {} history entries",
            id,
            session.undo_count()
        );
        Ok(())
    }

    /// Undo every request of the session, newest first, and discard it
    pub fn abort_session(&mut self, doc: &mut Document, id: SessionId) -> TxnResult<()> {
        let mut session = self.pop_session(id)?;
        log::debug!(target: "hearth::txn", "Abort {} ({} requests)", id, session.undo_count());
        let undone = session.abort(doc);
        if let Ok(undone) = &undone {
            for info in undone {
                self.events.publish(TransactionEvent::Aborted(info.clone()));
            }
        }
        undone.map(|_| ())
    }

    // ---------------------------------------------------------------
    // Undo / redo
    // ---------------------------------------------------------------

    /// Innermost session that allows undo/redo
    fn undo_redo_index(&self) -> Option<usize> {
        self.sessions.iter().rposition(Session::undo_redo_enabled)
    }

    fn undo_redo_session(&self) -> Option<&Session> {
        self.undo_redo_index().map(|i| &self.sessions[i])
    }

    /// Abort every session opened above the undo/redo session
    fn prepare_undo_redo(&mut self, doc: &mut Document, index: usize) -> TxnResult<()> {
        while self.sessions.len() - 1 > index {
            let id = self.active_session_id();
            log::debug!(target: "hearth::txn", "Aborting {} before undo/redo", id);
            self.abort_session(doc, id)?;
        }
        Ok(())
    }

    fn undo_redo_allowed(&self, op: &str) -> Option<usize> {
        if !self.enabled || self.undo_redo_blocked {
            log::debug!(target: "hearth::txn", "{} ignored: undo/redo is disabled or blocked", op);
            return None;
        }
        self.undo_redo_index()
    }

    /// Undo the newest entry. Returns false when there was nothing to undo.
    pub fn undo(&mut self, doc: &mut Document) -> TxnResult<bool> {
        let Some(index) = self.undo_redo_allowed("undo") else {
            return Ok(false);
        };
        self.prepare_undo_redo(doc, index)?;
        let Some(info) = self.sessions[index].peek_undo().map(RequestInfo::of) else {
            return Ok(false);
        };
        self.events.publish(TransactionEvent::Undoing(info));
        if let Some(info) = self.sessions[index].undo(doc)? {
            self.events.publish(TransactionEvent::Undone(info));
        }
        self.publish_undo_redo_state();
        Ok(true)
    }

    /// Redo the newest undone entry. Returns false when there was nothing
    /// to redo.
    pub fn redo(&mut self, doc: &mut Document) -> TxnResult<bool> {
        let Some(index) = self.undo_redo_allowed("redo") else {
            return Ok(false);
        };
        self.prepare_undo_redo(doc, index)?;
        let Some(info) = self.sessions[index].peek_redo().map(RequestInfo::of) else {
            return Ok(false);
        };
        self.events.publish(TransactionEvent::Redoing(info));
        if let Some(info) = self.sessions[index].redo(doc)? {
            self.events.publish(TransactionEvent::Redone(info));
        }
        self.publish_undo_redo_state();
        Ok(true)
    }

    pub fn can_undo(&self) -> bool {
        self.enabled
            && !self.undo_redo_blocked
            && self.undo_redo_session().is_some_and(Session::can_undo)
    }

    pub fn can_redo(&self) -> bool {
        self.enabled
            && !self.undo_redo_blocked
            && self.undo_redo_session().is_some_and(Session::can_redo)
    }

    pub fn peek_undo(&self) -> Option<&Txn> {
        self.undo_redo_session()?.peek_undo()
    }

    pub fn peek_redo(&self) -> Option<&Txn> {
        self.undo_redo_session()?.peek_redo()
    }

    pub fn undo_count(&self) -> usize {
        self.undo_redo_session().map_or(0, Session::undo_count)
    }

    pub fn redo_count(&self) -> usize {
        self.undo_redo_session().map_or(0, Session::redo_count)
    }

    fn publish_undo_redo_state(&mut self) {
        let event = TransactionEvent::UndoRedoStateChanged {
            can_undo: self.can_undo(),
            can_redo: self.can_redo(),
        };
        self.events.publish(event);
    }

    /// Drop every nested session and all history. The document is left as
    /// it is.
    pub fn clear(&mut self) {
        self.sessions.truncate(1);
        self.sessions[0].reset();
        log::debug!(target: "hearth::txn", "History cleared");
        self.publish_undo_redo_state();
    }

    /// Empty the undo/redo session's stacks only
    pub fn reset(&mut self) {
        if let Some(index) = self.undo_redo_index() {
            self.sessions[index].reset();
            self.publish_undo_redo_state();
        }
    }

    /// (description, category) of the undo/redo session's undo stack,
    /// oldest first
    pub fn history(&self) -> Vec<(String, RequestCategory)> {
        self.undo_redo_session().map(Session::history).unwrap_or_default()
    }

    /// Every open session's stacks, bottom session first
    pub fn request_stack(&self) -> Vec<SessionStack> {
        self.sessions
            .iter()
            .map(|s| {
                let (undo, redo) = s.descriptions();
                SessionStack { id: s.id(), undo, redo }
            })
            .collect()
    }

    // ---------------------------------------------------------------
    // Gating
    // ---------------------------------------------------------------

    /// Record history again, with the configured depth
    pub fn enable(&mut self) {
        self.enabled = true;
        let steps = self.config.max_undo_steps;
        self.sessions[0].set_max_undo_steps(steps);
        self.publish_undo_redo_state();
    }

    /// Drop all history and commit without recording until re-enabled
    pub fn disable(&mut self) {
        self.clear();
        self.enabled = false;
        self.publish_undo_redo_state();
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Keep recording but refuse undo/redo
    pub fn block_undo_redo(&mut self) {
        self.undo_redo_blocked = true;
    }

    pub fn unblock_undo_redo(&mut self) {
        self.undo_redo_blocked = false;
    }

    pub fn is_undo_redo_blocked(&self) -> bool {
        self.undo_redo_blocked
    }

    // ---------------------------------------------------------------
    // Signals
    // ---------------------------------------------------------------

    pub fn subscribe<F>(&mut self, handler: F) -> SubscriberId
    where
        F: FnMut(&TransactionEvent) + 'static,
    {
        self.events.subscribe(handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) {
        self.events.unsubscribe(id);
    }

    /// Queue events instead of dispatching them
    pub fn start_block_signals(&mut self) {
        self.events.start_blocking();
    }

    /// Dispatch new events again. Queued ones stay queued.
    pub fn stop_block_signals(&mut self) {
        self.events.stop_blocking();
    }

    /// Dispatch the queued events in order
    pub fn clear_blocked_signals(&mut self) {
        self.events.flush_blocked();
    }

    /// The in-flight request of the active session, if any
    pub fn in_flight(&self) -> Option<TxnId> {
        self.active_session().in_flight()
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new(ManagerConfig::default())
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("config", &self.config)
            .field("kinds", &self.registry.keys().collect::<Vec<_>>())
            .field("sessions", &self.sessions)
            .field("enabled", &self.enabled)
            .field("undo_redo_blocked", &self.undo_redo_blocked)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requests::MoveRequest;
    use hearth_core::EntityId;
    use hearth_graph::{Entity, EntityKind};

    fn doc() -> Document {
        let mut doc = Document::new();
        let root = doc.root_id().clone();
        doc.add_entity(&root, Entity::new("e1", EntityKind::Content).with_position(0.0, 0.0))
            .unwrap();
        doc
    }

    fn x(doc: &Document) -> f64 {
        doc.get(&EntityId::new("e1")).unwrap().position()[0]
    }

    #[test]
    fn test_disabled_manager_records_nothing() {
        let mut doc = doc();
        let mut manager = TransactionManager::default();
        manager.disable();

        manager
            .commit(&mut doc, Txn::new(MoveRequest::new("e1", 1.0, 1.0)), false)
            .unwrap();
        assert_eq!(x(&doc), 1.0);
        assert!(!manager.can_undo());

        manager.enable();
        manager
            .commit(&mut doc, Txn::new(MoveRequest::new("e1", 2.0, 2.0)), false)
            .unwrap();
        assert_eq!(manager.undo_count(), 1);
    }

    #[test]
    fn test_blocked_undo_is_refused() {
        let mut doc = doc();
        let mut manager = TransactionManager::default();
        manager
            .commit(&mut doc, Txn::new(MoveRequest::new("e1", 1.0, 1.0)), false)
            .unwrap();

        manager.block_undo_redo();
        assert!(!manager.can_undo());
        assert!(!manager.undo(&mut doc).unwrap());
        assert_eq!(x(&doc), 1.0);

        manager.unblock_undo_redo();
        assert!(manager.undo(&mut doc).unwrap());
        assert_eq!(x(&doc), 0.0);
    }

    #[test]
    fn test_skip_undo_commits_without_history() {
        let mut doc = doc();
        let mut manager = TransactionManager::default();
        manager
            .commit(&mut doc, Txn::new(MoveRequest::new("e1", 4.0, 0.0)), true)
            .unwrap();
        assert_eq!(x(&doc), 4.0);
        assert_eq!(manager.undo_count(), 0);
    }

    #[test]
    fn test_only_active_session_can_close() {
        let mut manager = TransactionManager::default();
        let outer = manager.begin_session(SessionOptions::default());
        let inner = manager.begin_session(SessionOptions::default());

        assert!(matches!(manager.end_session(outer), Err(TxnError::SessionMismatch(_))));
        manager.end_session(inner).unwrap();
        manager.end_session(outer).unwrap();

        let default_id = manager.active_session_id();
        assert!(manager.end_session(default_id).is_err());
        assert_eq!(manager.session_depth(), 1);
    }

    #[test]
    fn test_reset_keeps_document() {
        let mut doc = doc();
        let mut manager = TransactionManager::default();
        manager
            .commit(&mut doc, Txn::new(MoveRequest::new("e1", 3.0, 0.0)), false)
            .unwrap();
        manager.reset();
        assert_eq!(manager.undo_count(), 0);
        assert_eq!(x(&doc), 3.0);
    }
}
