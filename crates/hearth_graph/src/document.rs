//! The document - an identity-keyed entity arena with a single root
//!
//! The document is the only place that edits parent/child relations, so it
//! keeps every `children` list symmetric with the matching `parents` lists.
//! It also owns the association set, the field observers and the
//! invalidation queue.

use crate::association::{Association, AssociationRecord};
use crate::association_manager::AssociationManager;
use crate::context::{EntityResolver, LoadContext};
use crate::entity::{Entity, EntityKind, EntityRecord, FieldChange, RecordScope};
use crate::error::{GraphError, GraphResult};
use crate::invalidation::{Invalidation, InvalidationQueue};
use crate::registry::AssociationRegistry;
use crossbeam_channel::Receiver;
use hearth_core::{EntityId, IdGenerator, Value};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Callback invoked for every field change
pub type FieldObserver = Box<dyn FnMut(&FieldChange)>;

/// Handle returned by [`Document::observe_fields`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Flat serialized form of a whole document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub root: EntityId,
    pub entities: Vec<EntityRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub associations: Vec<AssociationRecord>,
}

/// The mutable entity graph
pub struct Document {
    root: EntityId,
    entities: HashMap<EntityId, Entity>,
    associations: AssociationManager,
    invalidations: InvalidationQueue,
    observers: Vec<(ObserverId, FieldObserver)>,
    next_observer: u64,
    ids: IdGenerator,
}

impl Document {
    /// Document with an empty floorplan root
    pub fn new() -> Self {
        Self::with_root(Entity::new("floorplan", EntityKind::Floorplan))
    }

    /// Document rooted at `root`
    pub fn with_root(root: Entity) -> Self {
        let root_id = root.id().clone();
        let ids = IdGenerator::new("e");
        ids.observe(root_id.as_str());
        let mut entities = HashMap::new();
        entities.insert(root_id.clone(), root);
        Self {
            root: root_id,
            entities,
            associations: AssociationManager::new(),
            invalidations: InvalidationQueue::new(),
            observers: Vec::new(),
            next_observer: 0,
            ids,
        }
    }

    pub fn root_id(&self) -> &EntityId {
        &self.root
    }

    pub fn root(&self) -> &Entity {
        &self.entities[&self.root]
    }

    pub fn entity(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// Like [`entity`](Self::entity) but with a typed error
    pub fn get(&self, id: &EntityId) -> GraphResult<&Entity> {
        self.entities
            .get(id)
            .ok_or_else(|| GraphError::EntityNotFound(id.clone()))
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Every entity in the arena, attached or not
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// A fresh id not used by any entity in the arena
    pub fn next_entity_id(&self) -> EntityId {
        self.next_entity_id_from(&self.ids)
    }

    /// Next id from `ids` that no entity in the arena uses yet
    pub fn next_entity_id_from(&self, ids: &IdGenerator) -> EntityId {
        loop {
            let id = ids.next_entity();
            if !self.entities.contains_key(&id) {
                return id;
            }
        }
    }

    /// Put an entity into the arena as-is. Relations listed on the entity
    /// are trusted; use [`add_child`](Self::add_child) to link it.
    pub fn insert(&mut self, entity: Entity) -> GraphResult<()> {
        if self.entities.contains_key(entity.id()) {
            return Err(GraphError::DuplicateEntity(entity.id().clone()));
        }
        self.ids.observe(entity.id().as_str());
        self.entities.insert(entity.id().clone(), entity);
        Ok(())
    }

    /// Insert `entity` and link it under `parent`
    pub fn add_entity(&mut self, parent: &EntityId, entity: Entity) -> GraphResult<EntityId> {
        self.get(parent)?;
        let id = entity.id().clone();
        self.insert(entity)?;
        self.add_child(parent, &id)?;
        Ok(id)
    }

    /// Link `child` under `parent`. Returns false when already linked.
    pub fn add_child(&mut self, parent: &EntityId, child: &EntityId) -> GraphResult<bool> {
        self.get(parent)?;
        self.get(child)?;
        if child == parent || self.is_descendant(parent, child) {
            return Err(GraphError::Cycle {
                parent: parent.clone(),
                child: child.clone(),
            });
        }
        let linked = self.entity_mut(parent)?.link_child(child);
        self.entity_mut(child)?.link_parent(parent);
        Ok(linked)
    }

    /// Unlink `child` from `parent`. Returns false when not linked.
    pub fn remove_child(&mut self, parent: &EntityId, child: &EntityId) -> GraphResult<bool> {
        let unlinked = self.entity_mut(parent)?.unlink_child(child);
        if let Some(entity) = self.entities.get_mut(child) {
            entity.unlink_parent(parent);
        }
        Ok(unlinked)
    }

    /// Unlink `id` from every parent, returning the former parents.
    /// The entity stays in the arena.
    pub fn detach(&mut self, id: &EntityId) -> GraphResult<Vec<EntityId>> {
        if *id == self.root {
            return Err(GraphError::RootEntity(id.clone()));
        }
        let parents = self.get(id)?.parents().to_vec();
        for parent in &parents {
            self.remove_child(parent, id)?;
        }
        Ok(parents)
    }

    /// Detach `id`, unlink it from its children and drop it from the arena
    pub fn release(&mut self, id: &EntityId) -> GraphResult<Entity> {
        self.detach(id)?;
        let children = self.get(id)?.children().to_vec();
        for child in &children {
            self.remove_child(id, child)?;
        }
        self.evict(id).ok_or_else(|| GraphError::EntityNotFound(id.clone()))
    }

    /// Drop `id` from the arena without touching any relation list
    pub fn evict(&mut self, id: &EntityId) -> Option<Entity> {
        if *id == self.root {
            log::warn!(target: "hearth::graph", "Refusing to evict root {}", id);
            return None;
        }
        self.entities.remove(id)
    }

    /// Bring `id` to the state described by `record` within `scope`.
    /// Missing entities are recreated whole. Relation lists are written
    /// verbatim, so callers restoring a consistent set of records end up
    /// with consistent relations.
    pub fn restore_record(&mut self, record: &EntityRecord, scope: RecordScope) {
        let changes = match self.entities.get_mut(&record.id) {
            Some(entity) => entity.apply_record(record, scope),
            None => {
                self.ids.observe(record.id.as_str());
                self.entities.insert(record.id.clone(), Entity::from_record(record));
                Vec::new()
            }
        };
        for change in &changes {
            self.notify(change);
        }
    }

    fn entity_mut(&mut self, id: &EntityId) -> GraphResult<&mut Entity> {
        self.entities
            .get_mut(id)
            .ok_or_else(|| GraphError::EntityNotFound(id.clone()))
    }

    /// Set a field and notify observers. `Ok(None)` when nothing changed.
    pub fn set_field(
        &mut self,
        id: &EntityId,
        name: &str,
        value: impl Into<Value>,
    ) -> GraphResult<Option<FieldChange>> {
        let change = self.entity_mut(id)?.write_field(name, Some(value.into()));
        if let Some(change) = &change {
            self.notify(change);
        }
        Ok(change)
    }

    /// Remove a field and notify observers. `Ok(None)` when it was absent.
    pub fn remove_field(&mut self, id: &EntityId, name: &str) -> GraphResult<Option<FieldChange>> {
        let change = self.entity_mut(id)?.write_field(name, None);
        if let Some(change) = &change {
            self.notify(change);
        }
        Ok(change)
    }

    /// Register a field observer. Observers run in registration order.
    pub fn observe_fields(&mut self, observer: impl FnMut(&FieldChange) + 'static) -> ObserverId {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    pub fn unobserve(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(oid, _)| *oid != id);
        before != self.observers.len()
    }

    fn notify(&mut self, change: &FieldChange) {
        for (_, observer) in &mut self.observers {
            observer(change);
        }
    }

    /// Root, or reachable from the root through parent links
    pub fn is_alive(&self, id: &EntityId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if *current == self.root {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(entity) = self.entities.get(current) {
                stack.extend(entity.parents());
            }
        }
        false
    }

    /// At least one parent of `id` is alive
    pub fn has_live_parent(&self, id: &EntityId) -> bool {
        self.entities
            .get(id)
            .is_some_and(|e| e.parents().iter().any(|p| self.is_alive(p)))
    }

    /// `id` is `ancestor` or sits somewhere below it
    pub fn is_descendant(&self, id: &EntityId, ancestor: &EntityId) -> bool {
        self.descendants(ancestor).contains(id)
    }

    /// All entities below `id`, depth first, each listed once
    pub fn descendants(&self, id: &EntityId) -> Vec<EntityId> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut stack: Vec<&EntityId> = self
            .entities
            .get(id)
            .map(|e| e.children().iter().rev().collect())
            .unwrap_or_default();
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            out.push(current.clone());
            if let Some(entity) = self.entities.get(current) {
                stack.extend(entity.children().iter().rev());
            }
        }
        out
    }

    pub fn associations(&self) -> &AssociationManager {
        &self.associations
    }

    pub fn associations_mut(&mut self) -> &mut AssociationManager {
        &mut self.associations
    }

    /// Garbage-collect associations that are no longer valid
    pub fn prune_invalid_associations(&mut self) -> Vec<Association> {
        let invalid: Vec<_> = self
            .associations
            .iter()
            .filter(|a| !a.is_valid(self))
            .map(|a| a.id().clone())
            .collect();
        let pruned: Vec<_> = invalid
            .iter()
            .filter_map(|id| self.associations.remove_by_id(id))
            .collect();
        if !pruned.is_empty() {
            log::debug!(target: "hearth::graph", "Pruned {} invalid associations", pruned.len());
        }
        pruned
    }

    /// Open the invalidation channel, replacing any previous receiver
    pub fn connect_invalidations(&mut self) -> Receiver<Invalidation> {
        self.invalidations.connect()
    }

    pub fn invalidate(&self, message: Invalidation) {
        self.invalidations.send(message);
    }

    pub fn dirty_position(&self, id: &EntityId) {
        self.invalidate(Invalidation::Position(id.clone()));
    }

    pub fn dirty_geometry(&self, id: &EntityId) {
        self.invalidate(Invalidation::Geometry(id.clone()));
    }

    pub fn dirty_clip_geometry(&self, id: &EntityId) {
        self.invalidate(Invalidation::ClipGeometry(id.clone()));
    }

    pub fn dirty_child_models(&self, id: &EntityId, recursive: bool) {
        self.invalidate(Invalidation::ChildModels {
            entity: id.clone(),
            recursive,
        });
    }

    /// Serialize the document. Entities are sorted by id.
    pub fn dump(&self, registry: &AssociationRegistry) -> DocumentRecord {
        let mut entities: Vec<_> = self.entities.values().map(Entity::dump).collect();
        entities.sort_by(|a, b| a.id.cmp(&b.id));
        DocumentRecord {
            root: self.root.clone(),
            entities,
            associations: self.associations.dump(self, registry),
        }
    }

    /// Rebuild a document from its record
    pub fn load(
        record: &DocumentRecord,
        registry: &AssociationRegistry,
        migrations: HashMap<EntityId, EntityId>,
    ) -> GraphResult<Self> {
        Self::load_with_fallback(record, registry, migrations, None)
    }

    /// Two-phase load: register every id first, then resolve relations,
    /// field references and associations. Misses fall through to `fallback`.
    pub fn load_with_fallback(
        record: &DocumentRecord,
        registry: &AssociationRegistry,
        migrations: HashMap<EntityId, EntityId>,
        fallback: Option<&dyn EntityResolver>,
    ) -> GraphResult<Self> {
        let mut ctx = LoadContext::new()
            .with_entities(record.entities.iter().map(|e| e.id.clone()))
            .with_migrations(migrations);
        if let Some(fallback) = fallback {
            ctx = ctx.with_fallback(fallback);
        }

        let root_id = ctx.resolve(&record.root, "root")?;
        let mut loaded = HashMap::with_capacity(record.entities.len());
        for entity_record in &record.entities {
            let entity = Entity::load(entity_record, &ctx)?;
            if loaded.insert(entity.id().clone(), entity).is_some() {
                return Err(GraphError::DuplicateEntity(entity_record.id.clone()));
            }
        }
        let root = loaded
            .remove(&root_id)
            .ok_or_else(|| GraphError::EntityNotFound(root_id.clone()))?;

        let mut doc = Self::with_root(root);
        for entity in loaded.into_values() {
            doc.insert(entity)?;
        }
        doc.associations.load(&record.associations, registry, &ctx, true)?;

        log::debug!(
            target: "hearth::load",
            "Loaded document {} ({} entities, {} associations)",
            doc.root,
            doc.len(),
            doc.associations.len()
        );
        Ok(doc)
    }

    pub fn to_json(&self, registry: &AssociationRegistry) -> GraphResult<String> {
        Ok(serde_json::to_string(&self.dump(registry))?)
    }

    pub fn from_json(json: &str, registry: &AssociationRegistry) -> GraphResult<Self> {
        let record: DocumentRecord = serde_json::from_str(json)?;
        Self::load(&record, registry, HashMap::new())
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityResolver for Document {
    fn get_entity_by_id(&self, id: &EntityId) -> Option<&Entity> {
        self.entity(id)
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("root", &self.root)
            .field("entities", &self.entities.len())
            .field("associations", &self.associations.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}
