//! Hearth Graph - the mutable entity graph behind every edit
//!
//! A [`Document`] owns an identity-keyed arena of [`Entity`] nodes rooted at a
//! single root entity. Entities own their children and keep weak back-references
//! to their parents. Independent of that ownership tree, an
//! [`AssociationManager`] keeps typed many-to-many relations between an owning
//! entity and a set of targets.
//!
//! Everything here is serializable through flat records (`EntityRecord`,
//! `AssociationRecord`, `DocumentRecord`) resolved through a [`LoadContext`].

pub mod association;
pub mod association_manager;
pub mod context;
pub mod document;
pub mod entity;
pub mod error;
pub mod invalidation;
pub mod registry;

pub use association::{Association, AssociationKind, AssociationRecord};
pub use association_manager::AssociationManager;
pub use context::{EntityResolver, LoadContext};
pub use document::{Document, DocumentRecord, FieldObserver, ObserverId};
pub use entity::{Entity, EntityKind, EntityRecord, FieldChange, FieldScope, RecordScope};
pub use error::{GraphError, GraphResult};
pub use invalidation::{Invalidation, InvalidationQueue};
pub use registry::AssociationRegistry;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::association::{Association, AssociationKind};
    pub use crate::association_manager::AssociationManager;
    pub use crate::context::LoadContext;
    pub use crate::document::Document;
    pub use crate::entity::{Entity, EntityKind};
    pub use crate::error::{GraphError, GraphResult};
    pub use crate::invalidation::Invalidation;
    pub use crate::registry::AssociationRegistry;
    pub use hearth_core::prelude::*;
}
