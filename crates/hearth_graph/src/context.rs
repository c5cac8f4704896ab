//! Id resolution while loading records

use crate::entity::Entity;
use crate::error::{GraphError, GraphResult};
use hearth_core::EntityId;
use std::collections::{HashMap, HashSet};

/// Secondary lookup consulted when an id is missing from the load table
pub trait EntityResolver {
    fn get_entity_by_id(&self, id: &EntityId) -> Option<&Entity>;
}

/// Caller-supplied context for `load` calls.
///
/// Resolution order for a referenced id:
/// 1. remap through the migration table
/// 2. look the (possibly remapped) id up in the entity table
/// 3. ask the fallback resolver, if any
#[derive(Default)]
pub struct LoadContext<'a> {
    entities: HashSet<EntityId>,
    migrate_entities_map: HashMap<EntityId, EntityId>,
    fallback: Option<&'a dyn EntityResolver>,
}

impl<'a> LoadContext<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: register ids known to this load
    pub fn with_entities(mut self, ids: impl IntoIterator<Item = EntityId>) -> Self {
        self.entities.extend(ids);
        self
    }

    /// Builder: stale id -> current id remapping
    pub fn with_migrations(mut self, map: HashMap<EntityId, EntityId>) -> Self {
        self.migrate_entities_map.extend(map);
        self
    }

    /// Builder: slower per-document resolver for lookahead misses
    pub fn with_fallback(mut self, resolver: &'a dyn EntityResolver) -> Self {
        self.fallback = Some(resolver);
        self
    }

    pub fn insert_entity(&mut self, id: EntityId) {
        self.entities.insert(id);
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains(id)
    }

    /// Apply the migration table, returning the id unchanged when unmapped
    pub fn migrate<'b>(&'b self, id: &'b EntityId) -> &'b EntityId {
        self.migrate_entities_map.get(id).unwrap_or(id)
    }

    /// Resolve a reference. `role` names what the reference is for and ends
    /// up in the error when resolution fails.
    pub fn resolve(&self, id: &EntityId, role: &'static str) -> GraphResult<EntityId> {
        let id = self.migrate(id);
        if self.entities.contains(id) {
            return Ok(id.clone());
        }
        if let Some(entity) = self.fallback.and_then(|r| r.get_entity_by_id(id)) {
            log::trace!(target: "hearth::load", "{} resolved through fallback", id);
            return Ok(entity.id().clone());
        }
        Err(GraphError::UnresolvedReference {
            id: id.clone(),
            role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityKind;

    struct OneEntity(Entity);

    impl EntityResolver for OneEntity {
        fn get_entity_by_id(&self, id: &EntityId) -> Option<&Entity> {
            (self.0.id() == id).then_some(&self.0)
        }
    }

    #[test]
    fn test_migration_applies_before_lookup() {
        let ctx = LoadContext::new()
            .with_entities([EntityId::new("new")])
            .with_migrations(HashMap::from([(EntityId::new("old"), EntityId::new("new"))]));

        assert_eq!(ctx.resolve(&EntityId::new("old"), "target").unwrap(), EntityId::new("new"));
    }

    #[test]
    fn test_fallback_covers_lookahead_miss() {
        let doc = OneEntity(Entity::new("late", EntityKind::Content));
        let ctx = LoadContext::new().with_fallback(&doc);

        assert!(ctx.resolve(&EntityId::new("late"), "target").is_ok());
        assert!(matches!(
            ctx.resolve(&EntityId::new("nope"), "target"),
            Err(GraphError::UnresolvedReference { role: "target", .. })
        ));
    }
}
