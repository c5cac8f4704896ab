//! Snapshot-based request bodies
//!
//! [`StateRequest`] is the workhorse behind most domain requests: a request
//! transacts every entity it is about to touch, mutates the document, and
//! lets the state request capture before/after snapshots. Undo and redo then
//! replay those snapshots instead of recomputing anything.

use crate::error::TxnResult;
use crate::txn_state::{EntityTransactionType, TransactionStateEnum, TxnState, TxnStateFactory};
use hearth_core::EntityId;
use hearth_graph::{Association, Document};
use std::collections::HashMap;

/// Per-entity snapshots plus the association set around one commit
#[derive(Debug, Default)]
pub struct StateRequest {
    states: Vec<TxnState>,
    index: HashMap<EntityId, usize>,
    associations_before: Option<Vec<Association>>,
    associations_after: Option<Vec<Association>>,
}

impl StateRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the association set before any mutation
    pub fn begin(&mut self, doc: &Document) {
        if self.associations_before.is_none() {
            self.associations_before = Some(doc.associations().snapshot());
        }
    }

    /// Start tracking `id`. The first call per entity allocates its state and
    /// captures "before"; later calls only re-tag it. A created entity must
    /// already be in the document so its kind is known.
    pub fn transact(
        &mut self,
        doc: &Document,
        id: &EntityId,
        transaction_type: EntityTransactionType,
    ) -> TxnResult<()> {
        if let Some(&i) = self.index.get(id) {
            if transaction_type != EntityTransactionType::Modification {
                self.states[i].retag(transaction_type);
            }
            return Ok(());
        }

        let entity = doc.get(id)?;
        let mut state = TxnStateFactory::create_txn_state(entity, transaction_type);
        state.capture_before(doc)?;
        log::trace!(
            target: "hearth::txn",
            "Transact {} as {:?} ({:?})",
            id,
            transaction_type,
            state.kind()
        );
        self.index.insert(id.clone(), self.states.len());
        self.states.push(state);
        Ok(())
    }

    /// Capture every "after" snapshot. Modified entities left orphaned by
    /// the commit are re-tagged as deletions.
    pub fn finish(&mut self, doc: &Document) {
        for state in &mut self.states {
            if state.last_transaction_type() == EntityTransactionType::Modification
                && doc.contains(state.entity())
                && !doc.is_alive(state.entity())
            {
                state.retag(EntityTransactionType::Deletion);
            }
            state.capture_after(doc);
        }
        self.associations_after = Some(doc.associations().snapshot());
    }

    /// Run a commit body between [`begin`](Self::begin) and
    /// [`finish`](Self::finish). A failing body has its "before" snapshots
    /// restored before the error is returned.
    pub fn run<F>(&mut self, doc: &mut Document, body: F) -> TxnResult<()>
    where
        F: FnOnce(&mut Self, &mut Document) -> TxnResult<()>,
    {
        self.begin(doc);
        match body(self, doc) {
            Ok(()) => {
                self.finish(doc);
                Ok(())
            }
            Err(err) => {
                log::warn!(
                    target: "hearth::txn",
                    "Commit failed after touching {} entities, rolling back: {}",
                    self.states.len(),
                    err
                );
                self.rollback(doc);
                Err(err)
            }
        }
    }

    /// True when the commit changed the association set
    pub fn needs_association_restore(&self) -> bool {
        self.associations_before != self.associations_after
    }

    pub fn restore_before(&mut self, doc: &mut Document) {
        self.restore(doc, TransactionStateEnum::Undo);
    }

    pub fn restore_after(&mut self, doc: &mut Document) {
        self.restore(doc, TransactionStateEnum::Redo);
    }

    fn restore(&mut self, doc: &mut Document, direction: TransactionStateEnum) {
        let restored: Vec<usize> = self
            .states
            .iter_mut()
            .enumerate()
            .filter_map(|(i, state)| state.restore(doc, direction).then_some(i))
            .collect();

        if self.needs_association_restore() {
            let snapshot = match direction {
                TransactionStateEnum::Redo => self.associations_after.as_deref(),
                _ => self.associations_before.as_deref(),
            };
            if let Some(snapshot) = snapshot {
                doc.associations_mut().restore(snapshot);
            }
        }

        for i in restored {
            self.states[i].post_restore(doc);
        }
    }

    /// Restore every "before" snapshot of a commit that never finished
    pub fn rollback(&mut self, doc: &mut Document) {
        for state in &mut self.states {
            state.restore(doc, TransactionStateEnum::Undo);
        }
        if let Some(snapshot) = &self.associations_before {
            doc.associations_mut().restore(snapshot);
        }
        for state in &self.states {
            state.post_restore(doc);
        }
    }

    /// Fold a later request into this one: earliest "before" and latest
    /// "after" win, per entity and for the association set.
    pub fn compose(&mut self, later: StateRequest) {
        for state in later.states {
            match self.index.get(state.entity()) {
                Some(&i) => self.states[i].merge_later(state),
                None => {
                    self.index.insert(state.entity().clone(), self.states.len());
                    self.states.push(state);
                }
            }
        }
        if self.associations_before.is_none() {
            self.associations_before = later.associations_before;
        }
        if later.associations_after.is_some() {
            self.associations_after = later.associations_after;
        }
    }

    pub fn state(&self, id: &EntityId) -> Option<&TxnState> {
        self.index.get(id).map(|&i| &self.states[i])
    }

    /// Tracked entities in transact order
    pub fn entity_ids(&self) -> impl Iterator<Item = &EntityId> {
        self.states.iter().map(TxnState::entity)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TxnError;
    use hearth_graph::{AssociationKind, Entity, EntityKind};

    fn id(s: &str) -> EntityId {
        EntityId::new(s)
    }

    fn doc_with(ids: &[&str]) -> Document {
        let mut doc = Document::new();
        let root = doc.root_id().clone();
        for s in ids {
            doc.add_entity(&root, Entity::new(*s, EntityKind::Content).with_position(0.0, 0.0))
                .unwrap();
        }
        doc
    }

    #[test]
    fn test_transact_captures_once() {
        let mut doc = doc_with(&["a"]);
        let mut state = StateRequest::new();
        state.begin(&doc);
        state.transact(&doc, &id("a"), EntityTransactionType::Modification).unwrap();
        doc.set_field(&id("a"), "x", 1.0).unwrap();
        state.transact(&doc, &id("a"), EntityTransactionType::Modification).unwrap();
        state.finish(&doc);

        assert_eq!(state.len(), 1);
        state.restore_before(&mut doc);
        assert_eq!(doc.get(&id("a")).unwrap().position(), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_orphaned_modification_is_retagged() {
        let mut doc = doc_with(&["a"]);
        let root = doc.root_id().clone();
        let mut state = StateRequest::new();
        state
            .run(&mut doc, |s, doc| {
                s.transact(doc, &id("a"), EntityTransactionType::Modification)?;
                s.transact(doc, &root, EntityTransactionType::Modification)?;
                doc.detach(&id("a"))?;
                Ok(())
            })
            .unwrap();

        assert_eq!(
            state.state(&id("a")).unwrap().last_transaction_type(),
            EntityTransactionType::Deletion
        );
        state.restore_before(&mut doc);
        assert!(doc.is_alive(&id("a")));
        state.restore_after(&mut doc);
        assert!(!doc.is_alive(&id("a")));
    }

    #[test]
    fn test_failed_body_rolls_back() {
        let mut doc = doc_with(&["a", "b"]);
        let mut state = StateRequest::new();
        let err = state
            .run(&mut doc, |s, doc| {
                s.transact(doc, &id("a"), EntityTransactionType::Modification)?;
                doc.set_field(&id("a"), "x", 7.0)?;
                doc.associations_mut()
                    .add_association(AssociationKind::Generic, &id("a"), &id("b"));
                s.transact(doc, &id("missing"), EntityTransactionType::Modification)?;
                Ok(())
            })
            .unwrap_err();

        assert!(matches!(err, TxnError::Graph(_)));
        assert_eq!(doc.get(&id("a")).unwrap().position(), [0.0, 0.0, 0.0]);
        assert!(doc.associations().is_empty());
    }

    #[test]
    fn test_associations_restored_only_when_changed() {
        let mut doc = doc_with(&["a", "b"]);
        let mut state = StateRequest::new();
        state
            .run(&mut doc, |_, doc| {
                doc.associations_mut()
                    .add_association(AssociationKind::Generic, &id("a"), &id("b"));
                Ok(())
            })
            .unwrap();
        assert!(state.needs_association_restore());

        state.restore_before(&mut doc);
        assert!(doc.associations().is_empty());
        state.restore_after(&mut doc);
        assert_eq!(doc.associations().len(), 1);

        let mut untouched = StateRequest::new();
        untouched.run(&mut doc, |_, _| Ok(())).unwrap();
        assert!(!untouched.needs_association_restore());
    }

    #[test]
    fn test_compose_keeps_earliest_before_latest_after() {
        let mut doc = doc_with(&["a"]);

        let mut first = StateRequest::new();
        first
            .run(&mut doc, |s, doc| {
                s.transact(doc, &id("a"), EntityTransactionType::Modification)?;
                doc.set_field(&id("a"), "x", 1.0)?;
                Ok(())
            })
            .unwrap();

        let mut second = StateRequest::new();
        second
            .run(&mut doc, |s, doc| {
                s.transact(doc, &id("a"), EntityTransactionType::Modification)?;
                doc.set_field(&id("a"), "x", 2.0)?;
                Ok(())
            })
            .unwrap();

        first.compose(second);
        first.restore_before(&mut doc);
        assert_eq!(doc.get(&id("a")).unwrap().position()[0], 0.0);
        first.restore_after(&mut doc);
        assert_eq!(doc.get(&id("a")).unwrap().position()[0], 2.0);
    }
}
