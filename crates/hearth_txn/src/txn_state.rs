//! Per-entity snapshot states
//!
//! A [`TxnState`] records one entity's "before" and "after" snapshots for a
//! single request. Which parts of the entity a state restores, and which
//! invalidations follow a restore, depend on the entity kind. The
//! [`TxnStateFactory`] picks that behaviour from the entity's kind.

use crate::error::{TxnError, TxnResult};
use hearth_core::EntityId;
use hearth_graph::entity::POSITION_FIELDS;
use hearth_graph::{Document, Entity, EntityKind, EntityRecord, FieldScope, RecordScope};
use serde::{Deserialize, Serialize};

/// How a request treats an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityTransactionType {
    /// Entity comes into existence
    Creation,
    /// Entity is edited in place
    Modification,
    /// Entity leaves the graph
    Deletion,
    /// Entity is handed over for reuse and never restored
    Recycling,
}

/// Which snapshot a state restored last
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionStateEnum {
    #[default]
    Default,
    Undo,
    Redo,
}

/// Snapshot behaviour, one per entity-kind family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxnStateKind {
    Layer,
    CustomizedModel,
    CustomizedFeatureModel,
    Content,
    Vertex,
    RoomBuilder,
    /// Fallback for every other kind
    Entity,
}

impl TxnStateKind {
    /// Most specific kinds first: the content check must not shadow the
    /// customized model arms.
    pub fn for_kind(kind: &EntityKind) -> Self {
        match kind {
            EntityKind::Layer => Self::Layer,
            EntityKind::CustomizedModel => Self::CustomizedModel,
            EntityKind::CustomizedFeatureModel => Self::CustomizedFeatureModel,
            k if k.is_content() => Self::Content,
            EntityKind::Vertex => Self::Vertex,
            EntityKind::RoomBuilder => Self::RoomBuilder,
            _ => Self::Entity,
        }
    }

    /// Parts of the entity restored for a modification
    pub fn restore_scope(&self) -> RecordScope {
        match self {
            Self::Vertex => RecordScope::fields_only(&POSITION_FIELDS),
            Self::Content => RecordScope {
                fields: FieldScope::All,
                children: false,
                parents: true,
            },
            Self::Layer | Self::RoomBuilder => RecordScope {
                fields: FieldScope::All,
                children: true,
                parents: false,
            },
            Self::CustomizedModel | Self::CustomizedFeatureModel | Self::Entity => RecordScope::FULL,
        }
    }

    /// Invalidations sent after restoring `id`
    fn post_restore(&self, doc: &Document, id: &EntityId) {
        let Some(entity) = doc.entity(id) else {
            return;
        };
        match self {
            Self::Layer => {
                doc.dirty_geometry(id);
                entity.children().iter().for_each(|c| doc.dirty_position(c));
            }
            Self::CustomizedModel => {
                doc.dirty_position(id);
                doc.dirty_child_models(id, false);
            }
            Self::CustomizedFeatureModel => {
                doc.dirty_geometry(id);
                doc.dirty_child_models(id, true);
            }
            Self::Content => {
                doc.dirty_position(id);
                doc.dirty_clip_geometry(id);
            }
            Self::Vertex => {
                doc.dirty_position(id);
                entity.parents().iter().for_each(|p| doc.dirty_geometry(p));
            }
            Self::RoomBuilder => {
                doc.dirty_geometry(id);
                entity.children().iter().for_each(|c| doc.dirty_geometry(c));
            }
            Self::Entity => {
                doc.dirty_geometry(id);
                doc.dirty_position(id);
            }
        }
    }
}

/// One entity's captured state
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    /// The entity did not exist
    Absent,
    Present(EntityRecord),
}

/// Before/after snapshots of one entity within one request
#[derive(Debug, Clone)]
pub struct TxnState {
    entity: EntityId,
    kind: TxnStateKind,
    transaction_type: EntityTransactionType,
    last_transaction_type: EntityTransactionType,
    current: TransactionStateEnum,
    before: Option<Snapshot>,
    after: Option<Snapshot>,
}

impl TxnState {
    pub fn new(entity: EntityId, kind: TxnStateKind, transaction_type: EntityTransactionType) -> Self {
        Self {
            entity,
            kind,
            transaction_type,
            last_transaction_type: transaction_type,
            current: TransactionStateEnum::Default,
            before: None,
            after: None,
        }
    }

    pub fn entity(&self) -> &EntityId {
        &self.entity
    }

    pub fn kind(&self) -> TxnStateKind {
        self.kind
    }

    /// Type the entity was first transacted with
    pub fn transaction_type(&self) -> EntityTransactionType {
        self.transaction_type
    }

    /// Type after any re-tagging
    pub fn last_transaction_type(&self) -> EntityTransactionType {
        self.last_transaction_type
    }

    pub fn current_state(&self) -> TransactionStateEnum {
        self.current
    }

    pub fn before(&self) -> Option<&Snapshot> {
        self.before.as_ref()
    }

    pub fn after(&self) -> Option<&Snapshot> {
        self.after.as_ref()
    }

    pub fn retag(&mut self, transaction_type: EntityTransactionType) {
        self.last_transaction_type = transaction_type;
    }

    fn snapshot(&self, doc: &Document) -> Snapshot {
        doc.entity(&self.entity)
            .map(|e| Snapshot::Present(e.dump()))
            .unwrap_or(Snapshot::Absent)
    }

    /// Record the "before" snapshot, once. A created entity had none.
    pub fn capture_before(&mut self, doc: &Document) -> TxnResult<()> {
        if self.before.is_some() {
            return Ok(());
        }
        let snapshot = match self.transaction_type {
            EntityTransactionType::Creation => Snapshot::Absent,
            _ => match self.snapshot(doc) {
                Snapshot::Absent => return Err(TxnError::EntityNotFound(self.entity.clone())),
                present => present,
            },
        };
        self.before = Some(snapshot);
        Ok(())
    }

    /// Record the "after" snapshot, replacing any earlier one
    pub fn capture_after(&mut self, doc: &Document) {
        self.after = Some(self.snapshot(doc));
    }

    fn scope(&self) -> RecordScope {
        let structural = |t: EntityTransactionType| {
            matches!(
                t,
                EntityTransactionType::Creation | EntityTransactionType::Deletion
            )
        };
        if structural(self.transaction_type) || structural(self.last_transaction_type) {
            return RecordScope::FULL;
        }
        // Relations the request changed are restored whatever the kind
        // scope says, or a reparented entity would keep a dead parent.
        let mut scope = self.kind.restore_scope();
        if let (Some(Snapshot::Present(before)), Some(Snapshot::Present(after))) = (&self.before, &self.after) {
            scope.parents |= before.parents != after.parents;
            scope.children |= before.children != after.children;
        }
        scope
    }

    /// Restore the snapshot for `direction` (`Undo` -> before, `Redo` ->
    /// after). Returns false when nothing was restored: same direction as
    /// last time, a recycled entity, or no snapshot captured.
    pub fn restore(&mut self, doc: &mut Document, direction: TransactionStateEnum) -> bool {
        if direction == self.current
            || self.last_transaction_type == EntityTransactionType::Recycling
        {
            return false;
        }
        let snapshot = match direction {
            TransactionStateEnum::Undo => self.before.as_ref(),
            TransactionStateEnum::Redo => self.after.as_ref(),
            TransactionStateEnum::Default => None,
        };
        let Some(snapshot) = snapshot else {
            return false;
        };

        match snapshot {
            Snapshot::Absent => {
                doc.evict(&self.entity);
            }
            Snapshot::Present(record) => doc.restore_record(record, self.scope()),
        }
        self.current = direction;
        true
    }

    /// Kind-specific invalidations after a restore
    pub fn post_restore(&self, doc: &Document) {
        self.kind.post_restore(doc, &self.entity);
    }

    /// Fold a later state of the same entity into this one: this state's
    /// "before" and the later state's "after" survive.
    pub fn merge_later(&mut self, later: TxnState) {
        if later.after.is_some() {
            self.after = later.after;
        }
        if later.last_transaction_type != EntityTransactionType::Modification {
            self.last_transaction_type = later.last_transaction_type;
        }
    }
}

/// Picks the snapshot behaviour for an entity
pub struct TxnStateFactory;

impl TxnStateFactory {
    /// Allocate an empty state for `entity`. Nothing is captured yet.
    pub fn create_txn_state(entity: &Entity, transaction_type: EntityTransactionType) -> TxnState {
        TxnState::new(
            entity.id().clone(),
            TxnStateKind::for_kind(entity.kind()),
            transaction_type,
        )
    }
}
