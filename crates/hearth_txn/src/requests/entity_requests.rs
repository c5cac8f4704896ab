//! Structural edits: grouping, creation, deletion and plain field edits

use super::{entity_list_param, entity_param, object_param, param, str_param};
use crate::error::{TxnError, TxnResult};
use crate::request::{Request, RequestCategory};
use crate::state_request::StateRequest;
use crate::txn_state::EntityTransactionType;
use hearth_core::{EntityId, IdGenerator, Value};
use hearth_graph::entity::POSITION_FIELDS;
use hearth_graph::{Document, Entity, EntityKind};
use std::collections::BTreeMap;

static GROUP_IDS: IdGenerator = IdGenerator::new("group-");
static STRUCTURE_IDS: IdGenerator = IdGenerator::new("structure-");

/// Gather entities that share a parent under a new group.
///
/// Unless the caller picks one, the group id is drawn from the document on
/// first commit. Redo recreates the very same group.
pub struct GroupTransactionRequest {
    group: Option<EntityId>,
    members: Vec<EntityId>,
    meta: BTreeMap<String, Value>,
    state: StateRequest,
}

impl GroupTransactionRequest {
    pub const KIND: &'static str = "group";

    pub fn new(members: Vec<EntityId>, meta: BTreeMap<String, Value>) -> Self {
        Self {
            group: None,
            members,
            meta,
            state: StateRequest::new(),
        }
    }

    pub fn with_id(group: impl Into<EntityId>, members: Vec<EntityId>, meta: BTreeMap<String, Value>) -> Self {
        Self {
            group: Some(group.into()),
            ..Self::new(members, meta)
        }
    }

    /// `[members[], meta{}?, group_id?]`
    pub fn from_params(params: &[Value]) -> TxnResult<Self> {
        let members = entity_list_param(Self::KIND, params, 0)?;
        let meta = object_param(Self::KIND, params, 1)?;
        match params.get(2) {
            None | Some(Value::Null) => Ok(Self::new(members, meta)),
            Some(_) => Ok(Self::with_id(entity_param(Self::KIND, params, 2)?, members, meta)),
        }
    }

    /// `None` until the first commit, unless set with [`with_id`](Self::with_id)
    pub fn group_id(&self) -> Option<&EntityId> {
        self.group.as_ref()
    }

    pub fn members(&self) -> &[EntityId] {
        &self.members
    }

    /// The one parent every member currently sits under
    fn common_parent(&self, doc: &Document) -> TxnResult<EntityId> {
        let Some(first) = self.members.first() else {
            return Err(TxnError::Domain("Cannot group an empty selection".into()));
        };
        let parent = doc
            .get(first)?
            .parents()
            .first()
            .cloned()
            .ok_or_else(|| TxnError::Domain(format!("{} has no parent to group under", first)))?;
        for member in &self.members {
            if !doc.get(member)?.has_parent(&parent) {
                return Err(TxnError::Domain(format!(
                    "{} is not under {}, members must share a parent",
                    member, parent
                )));
            }
        }
        Ok(parent)
    }
}

impl Request for GroupTransactionRequest {
    fn description(&self) -> &str {
        "Group"
    }

    fn category(&self) -> RequestCategory {
        RequestCategory::Group
    }

    fn on_commit(&mut self, doc: &mut Document) -> TxnResult<()> {
        let parent = self.common_parent(doc)?;
        let gid = self
            .group
            .get_or_insert_with(|| doc.next_entity_id_from(&GROUP_IDS))
            .clone();
        let mut group = Entity::new(gid.clone(), EntityKind::Group);
        for (name, value) in &self.meta {
            group = group.with_field(name.clone(), value.clone());
        }
        let (gid, members) = (&gid, &self.members);

        self.state.run(doc, |s, doc| {
            s.transact(doc, &parent, EntityTransactionType::Modification)?;
            for member in members {
                s.transact(doc, member, EntityTransactionType::Modification)?;
            }
            doc.insert(group)?;
            s.transact(doc, gid, EntityTransactionType::Creation)?;

            for member in members {
                doc.remove_child(&parent, member)?;
                doc.add_child(gid, member)?;
            }
            doc.add_child(&parent, gid)?;
            doc.dirty_child_models(&parent, true);
            Ok(())
        })?;

        log::debug!(
            target: "hearth::txn",
            "Grouped {} entities under {}",
            self.members.len(),
            gid
        );
        Ok(())
    }

    fn on_undo(&mut self, doc: &mut Document) -> TxnResult<()> {
        self.state.restore_before(doc);
        Ok(())
    }

    fn on_redo(&mut self, doc: &mut Document) -> TxnResult<()> {
        self.state.restore_after(doc);
        Ok(())
    }

    fn result(&self) -> Option<Value> {
        self.group.clone().map(Value::entity_ref)
    }

    fn state_request_mut(&mut self) -> Option<&mut StateRequest> {
        Some(&mut self.state)
    }
}

/// Create a structure entity (wall, slab, opening...) under a layer.
/// The id is drawn from the document on first commit unless given.
pub struct AddStructureRequest {
    id: Option<EntityId>,
    layer: EntityId,
    kind: EntityKind,
    fields: BTreeMap<String, Value>,
    state: StateRequest,
}

impl AddStructureRequest {
    pub const KIND: &'static str = "add_structure";

    pub fn new(layer: impl Into<EntityId>, kind: EntityKind, fields: BTreeMap<String, Value>) -> Self {
        Self {
            id: None,
            layer: layer.into(),
            kind,
            fields,
            state: StateRequest::new(),
        }
    }

    /// Builder: use a caller-chosen id
    pub fn with_id(mut self, id: impl Into<EntityId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// `[layer, kind_tag?, fields{}?]`
    pub fn from_params(params: &[Value]) -> TxnResult<Self> {
        let layer = entity_param(Self::KIND, params, 0)?;
        let kind = match params.get(1) {
            None | Some(Value::Null) => EntityKind::Structure,
            Some(_) => EntityKind::from_tag(str_param(Self::KIND, params, 1)?),
        };
        Ok(Self::new(layer, kind, object_param(Self::KIND, params, 2)?))
    }

    pub fn entity_id(&self) -> Option<&EntityId> {
        self.id.as_ref()
    }
}

impl Request for AddStructureRequest {
    fn description(&self) -> &str {
        "Add structure"
    }

    fn category(&self) -> RequestCategory {
        RequestCategory::Structure
    }

    fn on_commit(&mut self, doc: &mut Document) -> TxnResult<()> {
        if *doc.get(&self.layer)?.kind() != EntityKind::Layer {
            return Err(TxnError::Domain(format!("{} is not a layer", self.layer)));
        }
        let id = self
            .id
            .get_or_insert_with(|| doc.next_entity_id_from(&STRUCTURE_IDS))
            .clone();
        let mut entity = Entity::new(id.clone(), self.kind.clone());
        for (name, value) in &self.fields {
            entity = entity.with_field(name.clone(), value.clone());
        }
        let (id, layer) = (&id, &self.layer);

        self.state.run(doc, |s, doc| {
            s.transact(doc, layer, EntityTransactionType::Modification)?;
            doc.insert(entity)?;
            s.transact(doc, id, EntityTransactionType::Creation)?;
            doc.add_child(layer, id)?;
            doc.dirty_geometry(id);
            doc.dirty_child_models(layer, false);
            Ok(())
        })
    }

    fn on_undo(&mut self, doc: &mut Document) -> TxnResult<()> {
        self.state.restore_before(doc);
        Ok(())
    }

    fn on_redo(&mut self, doc: &mut Document) -> TxnResult<()> {
        self.state.restore_after(doc);
        Ok(())
    }

    fn result(&self) -> Option<Value> {
        self.id.clone().map(Value::entity_ref)
    }

    fn state_request_mut(&mut self) -> Option<&mut StateRequest> {
        Some(&mut self.state)
    }
}

/// Detach an entity from the graph and drop the associations that lost
/// their last live target
pub struct DeleteEntityRequest {
    entity: EntityId,
    state: StateRequest,
}

impl DeleteEntityRequest {
    pub const KIND: &'static str = "delete_entity";

    pub fn new(entity: impl Into<EntityId>) -> Self {
        Self {
            entity: entity.into(),
            state: StateRequest::new(),
        }
    }

    /// `[entity]`
    pub fn from_params(params: &[Value]) -> TxnResult<Self> {
        Ok(Self::new(entity_param(Self::KIND, params, 0)?))
    }
}

impl Request for DeleteEntityRequest {
    fn description(&self) -> &str {
        "Delete"
    }

    fn category(&self) -> RequestCategory {
        RequestCategory::Delete
    }

    fn on_commit(&mut self, doc: &mut Document) -> TxnResult<()> {
        let entity = &self.entity;
        self.state.run(doc, |s, doc| {
            let parents = doc.get(entity)?.parents().to_vec();
            s.transact(doc, entity, EntityTransactionType::Deletion)?;
            for parent in &parents {
                s.transact(doc, parent, EntityTransactionType::Modification)?;
            }
            doc.detach(entity)?;
            let pruned = doc.prune_invalid_associations();
            log::debug!(
                target: "hearth::txn",
                "Deleted {} ({} associations pruned)",
                entity,
                pruned.len()
            );
            for parent in &parents {
                doc.dirty_child_models(parent, true);
            }
            Ok(())
        })
    }

    fn on_undo(&mut self, doc: &mut Document) -> TxnResult<()> {
        self.state.restore_before(doc);
        Ok(())
    }

    fn on_redo(&mut self, doc: &mut Document) -> TxnResult<()> {
        self.state.restore_after(doc);
        Ok(())
    }

    fn state_request_mut(&mut self) -> Option<&mut StateRequest> {
        Some(&mut self.state)
    }
}

/// Write one field, e.g. a material or a dimension
pub struct SetFieldRequest {
    entity: EntityId,
    field: String,
    value: Value,
    category: RequestCategory,
    state: StateRequest,
}

impl SetFieldRequest {
    pub const KIND: &'static str = "set_field";

    pub fn new(entity: impl Into<EntityId>, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let field = field.into();
        let category = if field.starts_with("material") {
            RequestCategory::Material
        } else {
            RequestCategory::Edit
        };
        Self {
            entity: entity.into(),
            field,
            value: value.into(),
            category,
            state: StateRequest::new(),
        }
    }

    /// Builder: override the reported category
    pub fn with_category(mut self, category: RequestCategory) -> Self {
        self.category = category;
        self
    }

    /// `[entity, field, value]`
    pub fn from_params(params: &[Value]) -> TxnResult<Self> {
        Ok(Self::new(
            entity_param(Self::KIND, params, 0)?,
            str_param(Self::KIND, params, 1)?,
            param(Self::KIND, params, 2)?.clone(),
        ))
    }
}

impl Request for SetFieldRequest {
    fn description(&self) -> &str {
        "Set field"
    }

    fn category(&self) -> RequestCategory {
        self.category.clone()
    }

    fn on_commit(&mut self, doc: &mut Document) -> TxnResult<()> {
        let (entity, field, value) = (&self.entity, self.field.as_str(), &self.value);
        self.state.run(doc, |s, doc| {
            s.transact(doc, entity, EntityTransactionType::Modification)?;
            doc.set_field(entity, field, value.clone())?;
            if POSITION_FIELDS.contains(&field) {
                doc.dirty_position(entity);
            } else {
                doc.dirty_geometry(entity);
            }
            Ok(())
        })
    }

    fn on_undo(&mut self, doc: &mut Document) -> TxnResult<()> {
        self.state.restore_before(doc);
        Ok(())
    }

    fn on_redo(&mut self, doc: &mut Document) -> TxnResult<()> {
        self.state.restore_after(doc);
        Ok(())
    }

    fn compose_key(&self) -> Option<String> {
        Some(format!("set_field:{}:{}", self.entity, self.field))
    }

    fn state_request_mut(&mut self) -> Option<&mut StateRequest> {
        Some(&mut self.state)
    }
}
