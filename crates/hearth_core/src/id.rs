//! Identifiers for graph nodes, relations, transactions and sessions
//!
//! Entities and associations are keyed by stable strings so that they survive
//! a dump/load round-trip unchanged. Transactions and sessions only live in
//! memory and use process-wide counters.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing identifier string
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the identifier text
            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume into the identifier text
            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id! {
    /// Stable identifier of an entity in a document
    EntityId
}

string_id! {
    /// Stable identifier of an association
    AssociationId
}

/// Identifier of a transaction request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxnId(u64);

impl TxnId {
    /// Create a new unique transaction ID
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for TxnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn#{}", self.0)
    }
}

/// Identifier of a transaction session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(u64);

impl SessionId {
    /// Create a new unique session ID
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// Thread-safe generator of prefixed string identifiers (`"<prefix><n>"`)
pub struct IdGenerator {
    prefix: &'static str,
    next: AtomicU64,
}

impl IdGenerator {
    /// Create a new ID generator
    pub const fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            next: AtomicU64::new(1),
        }
    }

    /// The prefix every generated id starts with
    pub fn prefix(&self) -> &'static str {
        self.prefix
    }

    /// Generate the next identifier string
    pub fn next_string(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}{}", self.prefix, n)
    }

    /// Generate the next entity id
    pub fn next_entity(&self) -> EntityId {
        EntityId(self.next_string())
    }

    /// Generate the next association id
    pub fn next_association(&self) -> AssociationId {
        AssociationId(self.next_string())
    }

    /// Advance past an id that was produced elsewhere (e.g. by a loaded
    /// document) so that later ids never collide with it.
    pub fn observe(&self, id: &str) {
        let Some(suffix) = id.strip_prefix(self.prefix) else {
            return;
        };
        if let Ok(n) = suffix.parse::<u64>() {
            self.next.fetch_max(n.saturating_add(1), Ordering::Relaxed);
        }
    }
}

impl fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdGenerator")
            .field("prefix", &self.prefix)
            .field("next", &self.next.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_txn_ids_are_unique() {
        let a = TxnId::new();
        let b = TxnId::new();
        assert_ne!(a, b);
        assert!(b.raw() > a.raw());
    }

    #[test]
    fn test_generator_prefix() {
        let ids = IdGenerator::new("g");
        assert_eq!(ids.next_entity().as_str(), "g1");
        assert_eq!(ids.next_entity().as_str(), "g2");
    }

    #[test]
    fn test_generator_observe_skips_loaded_ids() {
        let ids = IdGenerator::new("e");
        ids.observe("e41");
        ids.observe("other7");
        ids.observe("e3");
        assert_eq!(ids.next_string(), "e42");
    }

    #[test]
    fn test_entity_id_serializes_as_plain_string() {
        let id = EntityId::new("wall-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"wall-1\"");
        let back: EntityId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
