//! Entities - identity-keyed nodes of the document graph

use crate::context::LoadContext;
use crate::error::GraphResult;
use hearth_core::{EntityId, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Field names holding an entity's position
pub const POSITION_FIELDS: [&str; 3] = ["x", "y", "z"];

/// Field name holding an entity's rotation in degrees
pub const ROTATION_FIELD: &str = "rotation";

/// Closed set of entity kinds known to the engine.
///
/// Unknown tags met while loading are kept verbatim in [`EntityKind::Other`]
/// so a document round-trips even when it carries kinds this build does not
/// understand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityKind {
    Floorplan,
    Layer,
    Group,
    Structure,
    Content,
    CustomizedModel,
    CustomizedFeatureModel,
    Vertex,
    RoomBuilder,
    Other(String),
}

impl EntityKind {
    /// Serialized type tag
    pub fn tag(&self) -> &str {
        match self {
            Self::Floorplan => "Floorplan",
            Self::Layer => "Layer",
            Self::Group => "Group",
            Self::Structure => "Structure",
            Self::Content => "Content",
            Self::CustomizedModel => "CustomizedModel",
            Self::CustomizedFeatureModel => "CustomizedFeatureModel",
            Self::Vertex => "Vertex",
            Self::RoomBuilder => "RoomBuilder",
            Self::Other(tag) => tag,
        }
    }

    /// Parse a serialized type tag
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "Floorplan" => Self::Floorplan,
            "Layer" => Self::Layer,
            "Group" => Self::Group,
            "Structure" => Self::Structure,
            "Content" => Self::Content,
            "CustomizedModel" => Self::CustomizedModel,
            "CustomizedFeatureModel" => Self::CustomizedFeatureModel,
            "Vertex" => Self::Vertex,
            "RoomBuilder" => Self::RoomBuilder,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Placeable content, including both customized model flavours
    pub fn is_content(&self) -> bool {
        matches!(
            self,
            Self::Content | Self::CustomizedModel | Self::CustomizedFeatureModel
        )
    }
}

impl From<String> for EntityKind {
    fn from(tag: String) -> Self {
        Self::from_tag(&tag)
    }
}

impl From<EntityKind> for String {
    fn from(kind: EntityKind) -> Self {
        kind.tag().to_owned()
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A field mutation as reported to observers: `(name, old, new)`.
/// `None` means the field was absent.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub entity: EntityId,
    pub name: String,
    pub old: Option<Value>,
    pub new: Option<Value>,
}

/// Which fields a partial record application touches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldScope {
    All,
    Only(&'static [&'static str]),
}

impl FieldScope {
    pub fn contains(&self, name: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(names) => names.contains(&name),
        }
    }
}

/// Which parts of an [`EntityRecord`] are applied onto a live entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordScope {
    pub fields: FieldScope,
    pub children: bool,
    pub parents: bool,
}

impl RecordScope {
    /// Everything: fields, children and parents
    pub const FULL: Self = Self {
        fields: FieldScope::All,
        children: true,
        parents: true,
    };

    /// The given fields only
    pub const fn fields_only(names: &'static [&'static str]) -> Self {
        Self {
            fields: FieldScope::Only(names),
            children: false,
            parents: false,
        }
    }
}

/// Flat serialized form of an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    #[serde(rename = "l")]
    pub kind: EntityKind,
    pub id: EntityId,
    #[serde(rename = "f", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, Value>,
    #[serde(rename = "c", default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<EntityId>,
    #[serde(rename = "p", default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<EntityId>,
}

/// A node in the document graph.
///
/// Children are owned and ordered. Parents are back-references only. The
/// [`Document`](crate::Document) keeps both lists symmetric, so relation
/// edits go through it rather than through the entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    id: EntityId,
    kind: EntityKind,
    fields: BTreeMap<String, Value>,
    children: Vec<EntityId>,
    parents: Vec<EntityId>,
}

impl Entity {
    /// Create a detached entity with no fields
    pub fn new(id: impl Into<EntityId>, kind: EntityKind) -> Self {
        Self {
            id: id.into(),
            kind,
            fields: BTreeMap::new(),
            children: Vec::new(),
            parents: Vec::new(),
        }
    }

    /// Builder: set a field
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Builder: set the planar position
    pub fn with_position(self, x: f64, y: f64) -> Self {
        self.with_field("x", x).with_field("y", y)
    }

    pub fn id(&self) -> &EntityId {
        &self.id
    }

    pub fn kind(&self) -> &EntityKind {
        &self.kind
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Numeric field, `None` when absent or not a number
    pub fn field_f64(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(Value::as_float)
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub fn children(&self) -> &[EntityId] {
        &self.children
    }

    pub fn parents(&self) -> &[EntityId] {
        &self.parents
    }

    pub fn has_child(&self, id: &EntityId) -> bool {
        self.children.contains(id)
    }

    pub fn has_parent(&self, id: &EntityId) -> bool {
        self.parents.contains(id)
    }

    /// Position from the `x`/`y`/`z` fields, missing axes read as zero
    pub fn position(&self) -> [f64; 3] {
        POSITION_FIELDS.map(|axis| self.field_f64(axis).unwrap_or(0.0))
    }

    /// Rotation in degrees, zero when unset
    pub fn rotation(&self) -> f64 {
        self.field_f64(ROTATION_FIELD).unwrap_or(0.0)
    }

    /// Write a field, reporting the change. `None` removes the field.
    /// Returns `None` when the stored value is already equal.
    pub(crate) fn write_field(&mut self, name: &str, value: Option<Value>) -> Option<FieldChange> {
        let old = self.fields.get(name).cloned();
        if old == value {
            return None;
        }
        match &value {
            Some(v) => {
                self.fields.insert(name.to_owned(), v.clone());
            }
            None => {
                self.fields.remove(name);
            }
        }
        Some(FieldChange {
            entity: self.id.clone(),
            name: name.to_owned(),
            old,
            new: value,
        })
    }

    pub(crate) fn link_child(&mut self, child: &EntityId) -> bool {
        if self.children.contains(child) {
            return false;
        }
        self.children.push(child.clone());
        true
    }

    pub(crate) fn unlink_child(&mut self, child: &EntityId) -> bool {
        let before = self.children.len();
        self.children.retain(|c| c != child);
        before != self.children.len()
    }

    pub(crate) fn link_parent(&mut self, parent: &EntityId) -> bool {
        if self.parents.contains(parent) {
            return false;
        }
        self.parents.push(parent.clone());
        true
    }

    pub(crate) fn unlink_parent(&mut self, parent: &EntityId) -> bool {
        let before = self.parents.len();
        self.parents.retain(|p| p != parent);
        before != self.parents.len()
    }

    /// Apply the scoped parts of `record`, returning the field changes made.
    /// Relation lists are replaced verbatim without touching the entities
    /// on the other side.
    pub(crate) fn apply_record(&mut self, record: &EntityRecord, scope: RecordScope) -> Vec<FieldChange> {
        let mut names: Vec<String> = match scope.fields {
            FieldScope::All => self.fields.keys().chain(record.fields.keys()).cloned().collect(),
            FieldScope::Only(names) => names.iter().map(|n| (*n).to_owned()).collect(),
        };
        names.sort();
        names.dedup();

        let changes = names
            .iter()
            .filter_map(|name| self.write_field(name, record.fields.get(name).cloned()))
            .collect();

        if scope.children {
            self.children = record.children.clone();
        }
        if scope.parents {
            self.parents = record.parents.clone();
        }
        changes
    }

    /// Serialize to a flat record
    pub fn dump(&self) -> EntityRecord {
        EntityRecord {
            kind: self.kind.clone(),
            id: self.id.clone(),
            fields: self.fields.clone(),
            children: self.children.clone(),
            parents: self.parents.clone(),
        }
    }

    /// Rebuild an entity from its record verbatim, without resolving anything
    pub(crate) fn from_record(record: &EntityRecord) -> Self {
        Self {
            id: record.id.clone(),
            kind: record.kind.clone(),
            fields: record.fields.clone(),
            children: record.children.clone(),
            parents: record.parents.clone(),
        }
    }

    /// Rebuild an entity from its record. Every child, parent and field
    /// reference must resolve through `ctx`.
    pub fn load(record: &EntityRecord, ctx: &LoadContext<'_>) -> GraphResult<Self> {
        let children = record
            .children
            .iter()
            .map(|id| ctx.resolve(id, "child"))
            .collect::<GraphResult<Vec<_>>>()?;
        let parents = record
            .parents
            .iter()
            .map(|id| ctx.resolve(id, "parent"))
            .collect::<GraphResult<Vec<_>>>()?;
        let fields = record
            .fields
            .iter()
            .map(|(name, value)| {
                let value = value.try_map_references(&mut |id| ctx.resolve(id, "field"))?;
                Ok((name.clone(), value))
            })
            .collect::<GraphResult<BTreeMap<_, _>>>()?;

        Ok(Self {
            id: record.id.clone(),
            kind: record.kind.clone(),
            fields,
            children,
            parents,
        })
    }
}
