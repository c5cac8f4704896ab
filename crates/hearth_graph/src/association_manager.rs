//! Document-wide association bookkeeping
//!
//! Tracks two mappings:
//! - owner entity -> associations (one-to-many)
//! - target entity -> owner entity (many-to-one)

use crate::association::{Association, AssociationKind, AssociationRecord};
use crate::context::LoadContext;
use crate::document::Document;
use crate::error::GraphResult;
use crate::registry::AssociationRegistry;
use hearth_core::{AssociationId, EntityId, IdGenerator};
use std::collections::{BTreeMap, HashMap};

/// Owns every association of one document
#[derive(Debug)]
pub struct AssociationManager {
    associations: BTreeMap<EntityId, Vec<Association>>,
    target_to_entity: HashMap<EntityId, EntityId>,
    ids: IdGenerator,
}

impl AssociationManager {
    pub fn new() -> Self {
        Self {
            associations: BTreeMap::new(),
            target_to_entity: HashMap::new(),
            ids: IdGenerator::new("assoc-"),
        }
    }

    /// Relate `entity` to `target`. No-op (returns `None`) when `entity`
    /// already has an association whose first target is `target`.
    pub fn add_association(
        &mut self,
        kind: AssociationKind,
        entity: &EntityId,
        target: &EntityId,
    ) -> Option<AssociationId> {
        if self.association_exists(entity, target) {
            return None;
        }
        let mut association = Association::new(self.ids.next_association(), kind, entity.clone());
        association.bind(target.clone());
        let id = association.id().clone();
        self.insert(association);
        Some(id)
    }

    /// Register a fully built association
    pub fn insert(&mut self, association: Association) {
        self.ids.observe(association.id().as_str());
        for target in association.targets() {
            self.target_to_entity.insert(target.clone(), association.entity().clone());
        }
        self.associations
            .entry(association.entity().clone())
            .or_default()
            .push(association);
    }

    fn association_exists(&self, entity: &EntityId, target: &EntityId) -> bool {
        self.associations
            .get(entity)
            .is_some_and(|list| list.iter().any(|a| a.first_target() == Some(target)))
    }

    /// Remove the association from `entity` whose first target is `target`
    pub fn remove_association(&mut self, entity: &EntityId, target: &EntityId) -> Option<Association> {
        let list = self.associations.get_mut(entity)?;
        let index = list.iter().position(|a| a.first_target() == Some(target))?;
        let removed = list.remove(index);
        if list.is_empty() {
            self.associations.remove(entity);
        }
        self.forget_targets(&removed);
        Some(removed)
    }

    /// Remove an association by id
    pub fn remove_by_id(&mut self, id: &AssociationId) -> Option<Association> {
        let owner = self
            .associations
            .iter()
            .find(|(_, list)| list.iter().any(|a| a.id() == id))
            .map(|(owner, _)| owner.clone())?;
        let list = self.associations.get_mut(&owner)?;
        let index = list.iter().position(|a| a.id() == id)?;
        let removed = list.remove(index);
        if list.is_empty() {
            self.associations.remove(&owner);
        }
        self.forget_targets(&removed);
        Some(removed)
    }

    fn forget_targets(&mut self, association: &Association) {
        for target in association.targets() {
            if self.target_to_entity.get(target) == Some(association.entity()) {
                self.target_to_entity.remove(target);
            }
        }
    }

    /// Associations owned by `entity`
    pub fn get_association(&self, entity: &EntityId) -> &[Association] {
        self.associations.get(entity).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every association, grouped by owner in id order
    pub fn iter(&self) -> impl Iterator<Item = &Association> {
        self.associations.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.associations.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.associations.is_empty()
    }

    /// Owner of `target`. With `recursive`, keep following the owner's own
    /// owner until the chain ends.
    pub fn get_entity_by_target_id(&self, target: &EntityId, recursive: bool) -> Option<&EntityId> {
        let mut entity = self.target_to_entity.get(target)?;
        if recursive {
            let mut steps = 0;
            while let Some(next) = self.target_to_entity.get(entity) {
                // Cyclic chains end where they started
                steps += 1;
                if next == target || steps > self.target_to_entity.len() {
                    break;
                }
                entity = next;
            }
        }
        Some(entity)
    }

    /// Every target of every association owned by `entity`
    pub fn association_entities(&self, entity: &EntityId) -> Vec<&EntityId> {
        self.get_association(entity)
            .iter()
            .flat_map(|a| a.targets())
            .collect()
    }

    /// Drop all associations of `entity` and add new ones, one per target
    pub fn replace_association(&mut self, entity: &EntityId, by_kind: BTreeMap<AssociationKind, Vec<EntityId>>) {
        if let Some(old) = self.associations.remove(entity) {
            old.iter().for_each(|a| self.forget_targets(a));
        }
        for (kind, targets) in by_kind {
            for target in targets {
                self.add_association(kind.clone(), entity, &target);
            }
        }
    }

    pub fn clear(&mut self) {
        self.associations.clear();
        self.target_to_entity.clear();
    }

    /// Copy of every association, for later [`restore`](Self::restore)
    pub fn snapshot(&self) -> Vec<Association> {
        self.iter().cloned().collect()
    }

    /// Replace the whole set with a previous snapshot
    pub fn restore(&mut self, snapshot: &[Association]) {
        self.clear();
        for association in snapshot {
            self.insert(association.clone());
        }
    }

    /// Serialize the valid associations only
    pub fn dump(&self, doc: &Document, registry: &AssociationRegistry) -> Vec<AssociationRecord> {
        self.iter()
            .filter(|a| a.is_valid(doc))
            .map(|a| a.dump(registry))
            .collect()
    }

    /// Load records on top of the current set. Strict loads fail on the first
    /// bad record. Lenient loads log and skip it.
    pub fn load(
        &mut self,
        records: &[AssociationRecord],
        registry: &AssociationRegistry,
        ctx: &LoadContext<'_>,
        strict: bool,
    ) -> GraphResult<()> {
        for record in records {
            match Association::load(record, registry, ctx) {
                Ok(association) => self.insert(association),
                Err(err) if strict => return Err(err),
                Err(err) => {
                    log::warn!(target: "hearth::load", "Skipping association {}: {}", record.id, err);
                }
            }
        }
        Ok(())
    }
}

impl Default for AssociationManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> EntityId {
        EntityId::new(s)
    }

    #[test]
    fn test_add_association_skips_existing_first_target() {
        let mut manager = AssociationManager::new();
        assert!(manager.add_association(AssociationKind::Generic, &id("a"), &id("b")).is_some());
        assert!(manager.add_association(AssociationKind::PointOnLine, &id("a"), &id("b")).is_none());
        assert!(manager.add_association(AssociationKind::Generic, &id("a"), &id("c")).is_some());

        assert_eq!(manager.len(), 2);
        assert_eq!(manager.association_entities(&id("a")), vec![&id("b"), &id("c")]);
    }

    #[test]
    fn test_remove_association_cleans_target_map() {
        let mut manager = AssociationManager::new();
        manager.add_association(AssociationKind::Generic, &id("a"), &id("b"));

        assert!(manager.remove_association(&id("a"), &id("b")).is_some());
        assert!(manager.get_entity_by_target_id(&id("b"), false).is_none());
        assert!(manager.is_empty());
        assert!(manager.remove_association(&id("a"), &id("b")).is_none());
    }

    #[test]
    fn test_target_lookup_follows_chain() {
        let mut manager = AssociationManager::new();
        manager.add_association(AssociationKind::PointOnPoint, &id("b"), &id("c"));
        manager.add_association(AssociationKind::PointOnPoint, &id("a"), &id("b"));

        assert_eq!(manager.get_entity_by_target_id(&id("c"), false), Some(&id("b")));
        assert_eq!(manager.get_entity_by_target_id(&id("c"), true), Some(&id("a")));
    }

    #[test]
    fn test_target_lookup_terminates_on_cycle() {
        let mut manager = AssociationManager::new();
        manager.add_association(AssociationKind::Generic, &id("a"), &id("b"));
        manager.add_association(AssociationKind::Generic, &id("b"), &id("a"));

        assert!(manager.get_entity_by_target_id(&id("a"), true).is_some());
    }

    #[test]
    fn test_snapshot_restore() {
        let mut manager = AssociationManager::new();
        manager.add_association(AssociationKind::Generic, &id("a"), &id("b"));
        let snapshot = manager.snapshot();

        manager.add_association(AssociationKind::Generic, &id("x"), &id("y"));
        manager.remove_association(&id("a"), &id("b"));
        manager.restore(&snapshot);

        assert_eq!(manager.snapshot(), snapshot);
        assert_eq!(manager.get_entity_by_target_id(&id("b"), false), Some(&id("a")));
        assert!(manager.get_entity_by_target_id(&id("y"), false).is_none());
    }

    #[test]
    fn test_replace_association() {
        let mut manager = AssociationManager::new();
        manager.add_association(AssociationKind::Generic, &id("a"), &id("old"));
        manager.replace_association(
            &id("a"),
            BTreeMap::from([(AssociationKind::EdgeOnLine, vec![id("n1"), id("n2")])]),
        );

        assert_eq!(manager.association_entities(&id("a")), vec![&id("n1"), &id("n2")]);
        assert!(manager.get_entity_by_target_id(&id("old"), false).is_none());
    }
}
