//! Association type registry
//!
//! Maps serialized type tags back to association constructors. The registry
//! is built once at startup and handed to every dump/load call.

use crate::association::{Association, AssociationKind};
use crate::error::{GraphError, GraphResult};
use hearth_core::{AssociationId, EntityId};
use std::collections::BTreeMap;
use std::fmt;

/// Builds an empty association of one registered kind
pub type AssociationConstructor = Box<dyn Fn(AssociationId, EntityId) -> Association + Send + Sync>;

/// Registry of association kinds by tag
pub struct AssociationRegistry {
    /// Long tag -> kind
    by_tag: BTreeMap<String, AssociationKind>,
    /// Short tag -> long tag
    short_to_long: BTreeMap<String, String>,
    /// Long tag -> short tag
    long_to_short: BTreeMap<String, String>,
    /// Long tag -> constructor
    constructors: BTreeMap<String, AssociationConstructor>,
}

impl AssociationRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            by_tag: BTreeMap::new(),
            short_to_long: BTreeMap::new(),
            long_to_short: BTreeMap::new(),
            constructors: BTreeMap::new(),
        }
    }

    /// Registry with every built-in kind
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for (kind, short) in AssociationKind::builtins() {
            registry.register(kind, Some(short));
        }
        registry
    }

    /// Register a kind under its long tag and an optional compact tag
    pub fn register(&mut self, kind: AssociationKind, short: Option<&str>) -> &mut Self {
        let ctor_kind = kind.clone();
        self.register_with(kind, short, move |id, entity| {
            Association::new(id, ctor_kind.clone(), entity)
        })
    }

    /// Register a kind with a custom constructor
    pub fn register_with<F>(&mut self, kind: AssociationKind, short: Option<&str>, ctor: F) -> &mut Self
    where
        F: Fn(AssociationId, EntityId) -> Association + Send + Sync + 'static,
    {
        let long = kind.long_tag().to_owned();
        if self.by_tag.contains_key(&long) {
            log::warn!(target: "hearth::registry", "Re-registering association type {}", long);
        }
        if let Some(short) = short {
            self.short_to_long.insert(short.to_owned(), long.clone());
            self.long_to_short.insert(long.clone(), short.to_owned());
        }
        self.by_tag.insert(long.clone(), kind);
        self.constructors.insert(long, Box::new(ctor));
        self
    }

    /// Normalize a short or long tag to the registered long tag
    pub fn resolve_tag<'a>(&'a self, tag: &'a str) -> Option<&'a str> {
        let long = self.short_to_long.get(tag).map(String::as_str).unwrap_or(tag);
        self.by_tag.contains_key(long).then_some(long)
    }

    /// Tag to write into records: the compact one when registered
    pub fn short_tag<'a>(&'a self, kind: &'a AssociationKind) -> &'a str {
        self.long_to_short
            .get(kind.long_tag())
            .map(String::as_str)
            .unwrap_or_else(|| kind.long_tag())
    }

    /// Look up the kind for a short or long tag
    pub fn kind(&self, tag: &str) -> Option<&AssociationKind> {
        self.resolve_tag(tag).and_then(|long| self.by_tag.get(long))
    }

    /// Check if a tag is registered
    pub fn contains(&self, tag: &str) -> bool {
        self.resolve_tag(tag).is_some()
    }

    /// Construct an empty association from a short or long tag
    pub fn construct(&self, tag: &str, id: AssociationId, entity: EntityId) -> GraphResult<Association> {
        let ctor = self
            .resolve_tag(tag)
            .and_then(|long| self.constructors.get(long))
            .ok_or_else(|| GraphError::UnknownAssociationType(tag.to_owned()))?;
        Ok(ctor(id, entity))
    }

    /// Get the number of registered kinds
    pub fn len(&self) -> usize {
        self.by_tag.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.by_tag.is_empty()
    }
}

impl Default for AssociationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AssociationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssociationRegistry")
            .field("tags", &self.by_tag.keys().collect::<Vec<_>>())
            .field("short", &self.short_to_long)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_and_long_tags_resolve_to_same_kind() {
        let registry = AssociationRegistry::with_defaults();
        assert_eq!(registry.len(), 4);
        assert_eq!(registry.kind("pop"), Some(&AssociationKind::PointOnPoint));
        assert_eq!(
            registry.kind("hearth.PointOnPointAssociation"),
            Some(&AssociationKind::PointOnPoint)
        );
    }

    #[test]
    fn test_unknown_tag_fails_construction() {
        let registry = AssociationRegistry::new();
        let err = registry
            .construct("a", AssociationId::new("x"), EntityId::new("e"))
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownAssociationType(tag) if tag == "a"));
    }

    #[test]
    fn test_custom_kind_without_short_tag_dumps_long_tag() {
        let mut registry = AssociationRegistry::new();
        let kind = AssociationKind::Custom("acme.Hinge".into());
        registry.register(kind.clone(), None);

        assert_eq!(registry.short_tag(&kind), "acme.Hinge");
        let a = registry
            .construct("acme.Hinge", AssociationId::new("h"), EntityId::new("door"))
            .unwrap();
        assert_eq!(a.kind(), &kind);
    }
}
