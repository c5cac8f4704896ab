//! Error types for the entity graph

use hearth_core::{AssociationId, EntityId};
use thiserror::Error;

/// Entity graph errors
#[derive(Debug, Error)]
pub enum GraphError {
    /// A referenced id could not be resolved while loading
    #[error("Unresolved {role} reference: {id}")]
    UnresolvedReference { id: EntityId, role: &'static str },

    /// Entity not present in the document
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// Entity id already taken
    #[error("Duplicate entity id: {0}")]
    DuplicateEntity(EntityId),

    /// Association record carries a type tag nobody registered
    #[error("Unknown association type: {0}")]
    UnknownAssociationType(String),

    /// Association not present in the manager
    #[error("Association not found: {0}")]
    AssociationNotFound(AssociationId),

    /// Linking would make an entity its own ancestor
    #[error("Linking {child} under {parent} would create a cycle")]
    Cycle { parent: EntityId, child: EntityId },

    /// Operation not allowed on the document root
    #[error("Operation not allowed on root entity {0}")]
    RootEntity(EntityId),

    /// Record is structurally incomplete
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// JSON encoding/decoding failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for graph operations
pub type GraphResult<T> = std::result::Result<T, GraphError>;
