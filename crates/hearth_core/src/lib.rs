//! Hearth Core - shared primitives for the transactional entity graph
//!
//! This crate carries the pieces every other Hearth crate agrees on:
//! - String identifiers for entities and associations
//! - Numeric identifiers for transactions and sessions
//! - The dynamic [`Value`] stored in entity fields

pub mod id;
pub mod value;

pub use id::{AssociationId, EntityId, IdGenerator, SessionId, TxnId};
pub use value::Value;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::id::{AssociationId, EntityId, IdGenerator, SessionId, TxnId};
    pub use crate::value::Value;
}
