//! Associations - typed relations between an owner and a set of targets
//!
//! Associations sit beside the ownership tree: a target may be referenced by
//! any number of associations without being owned by them.

use crate::context::LoadContext;
use crate::document::Document;
use crate::error::{GraphError, GraphResult};
use crate::registry::AssociationRegistry;
use hearth_core::{AssociationId, EntityId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of association kinds, plus an escape hatch for kinds
/// registered at runtime
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssociationKind {
    /// Plain owner -> targets relation
    Generic,
    /// A point constrained onto a line
    PointOnLine,
    /// An edge constrained onto a line
    EdgeOnLine,
    /// A point pinned onto another point
    PointOnPoint,
    /// A kind registered under its own long tag
    Custom(String),
}

impl AssociationKind {
    /// Fully-qualified serialized tag
    pub fn long_tag(&self) -> &str {
        match self {
            Self::Generic => "hearth.Association",
            Self::PointOnLine => "hearth.PointOnLineAssociation",
            Self::EdgeOnLine => "hearth.EdgeOnLineAssociation",
            Self::PointOnPoint => "hearth.PointOnPointAssociation",
            Self::Custom(tag) => tag,
        }
    }

    /// Parse a long or compact tag. Unknown tags become [`Custom`](Self::Custom).
    pub fn from_tag(tag: &str) -> Self {
        Self::builtins()
            .into_iter()
            .find(|(kind, short)| *short == tag || kind.long_tag() == tag)
            .map(|(kind, _)| kind)
            .unwrap_or_else(|| Self::Custom(tag.to_owned()))
    }

    /// Built-in kinds with their compact record tags
    pub fn builtins() -> [(Self, &'static str); 4] {
        [
            (Self::Generic, "a"),
            (Self::PointOnLine, "pol"),
            (Self::EdgeOnLine, "eol"),
            (Self::PointOnPoint, "pop"),
        ]
    }
}

impl fmt::Display for AssociationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.long_tag())
    }
}

/// Flat serialized form of an association
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationRecord {
    #[serde(rename = "l")]
    pub tag: String,
    pub id: AssociationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<EntityId>,
}

/// A relation from one owning entity to an ordered set of targets
#[derive(Debug, Clone, PartialEq)]
pub struct Association {
    id: AssociationId,
    kind: AssociationKind,
    entity: EntityId,
    targets: Vec<EntityId>,
}

impl Association {
    pub fn new(id: impl Into<AssociationId>, kind: AssociationKind, entity: impl Into<EntityId>) -> Self {
        Self {
            id: id.into(),
            kind,
            entity: entity.into(),
            targets: Vec::new(),
        }
    }

    pub fn id(&self) -> &AssociationId {
        &self.id
    }

    pub fn kind(&self) -> &AssociationKind {
        &self.kind
    }

    /// Owning entity
    pub fn entity(&self) -> &EntityId {
        &self.entity
    }

    /// Targets in insertion order
    pub fn targets(&self) -> &[EntityId] {
        &self.targets
    }

    pub fn first_target(&self) -> Option<&EntityId> {
        self.targets.first()
    }

    pub fn is_bound(&self, target: &EntityId) -> bool {
        self.targets.contains(target)
    }

    /// Add a target. No-op when already bound.
    pub fn bind(&mut self, target: impl Into<EntityId>) -> bool {
        let target = target.into();
        if self.targets.contains(&target) {
            return false;
        }
        self.targets.push(target);
        true
    }

    /// Remove a target. No-op when not bound.
    pub fn unbind(&mut self, target: &EntityId) -> bool {
        let before = self.targets.len();
        self.targets.retain(|t| t != target);
        before != self.targets.len()
    }

    pub fn unbind_all(&mut self) {
        self.targets.clear();
    }

    /// True iff there is at least one target and every target has a live parent
    pub fn is_valid(&self, doc: &Document) -> bool {
        !self.targets.is_empty() && self.targets.iter().all(|t| doc.has_live_parent(t))
    }

    /// Serialize, preferring the registry's compact tag
    pub fn dump(&self, registry: &AssociationRegistry) -> AssociationRecord {
        AssociationRecord {
            tag: registry.short_tag(&self.kind).to_owned(),
            id: self.id.clone(),
            entity: Some(self.entity.clone()),
            targets: self.targets.clone(),
        }
    }

    /// Rebuild from a record. The owner and every target must resolve.
    pub fn load(
        record: &AssociationRecord,
        registry: &AssociationRegistry,
        ctx: &LoadContext<'_>,
    ) -> GraphResult<Self> {
        let owner = record
            .entity
            .as_ref()
            .ok_or_else(|| GraphError::MalformedRecord(format!("association {} has no owner", record.id)))?;
        let owner = ctx.resolve(owner, "association owner")?;

        let mut association = registry.construct(&record.tag, record.id.clone(), owner)?;
        for target in &record.targets {
            association.bind(ctx.resolve(target, "association target")?);
        }
        Ok(association)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_is_idempotent_and_ordered() {
        let mut a = Association::new("a1", AssociationKind::Generic, "owner");
        assert!(a.bind("t2"));
        assert!(a.bind("t1"));
        assert!(!a.bind("t2"));
        assert_eq!(a.targets(), &[EntityId::new("t2"), EntityId::new("t1")]);

        assert!(a.unbind(&EntityId::new("t2")));
        assert!(!a.unbind(&EntityId::new("t2")));
        assert_eq!(a.first_target(), Some(&EntityId::new("t1")));

        a.unbind_all();
        assert!(a.targets().is_empty());
    }

    #[test]
    fn test_kind_from_tag() {
        assert_eq!(AssociationKind::from_tag("pol"), AssociationKind::PointOnLine);
        assert_eq!(
            AssociationKind::from_tag("hearth.PointOnPointAssociation"),
            AssociationKind::PointOnPoint
        );
        assert_eq!(
            AssociationKind::from_tag("acme.Hinge"),
            AssociationKind::Custom("acme.Hinge".into())
        );
    }

    #[test]
    fn test_dump_uses_short_tag() {
        let registry = AssociationRegistry::with_defaults();
        let mut a = Association::new("a1", AssociationKind::PointOnLine, "v1");
        a.bind("wall");

        let record = a.dump(&registry);
        assert_eq!(record.tag, "pol");
        assert_eq!(record.entity, Some(EntityId::new("v1")));
    }

    #[test]
    fn test_load_rejects_missing_target() {
        let registry = AssociationRegistry::with_defaults();
        let record = AssociationRecord {
            tag: "a".into(),
            id: AssociationId::new("a1"),
            entity: Some(EntityId::new("owner")),
            targets: vec![EntityId::new("gone")],
        };
        let ctx = LoadContext::new().with_entities([EntityId::new("owner")]);

        let err = Association::load(&record, &registry, &ctx).unwrap_err();
        assert!(matches!(err, GraphError::UnresolvedReference { role: "association target", .. }));
    }
}
