//! Dynamic values stored in entity fields
//!
//! Values are JSON-compatible so that entity records can be persisted
//! without knowing the concrete domain type behind each field.

use crate::id::EntityId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A dynamic value that can represent any entity field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    /// Null/None value
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// 2D vector
    Vec2([f64; 2]),
    /// 3D vector
    Vec3([f64; 3]),
    /// Reference to another entity, persisted as `{"$ref": "<id>"}`
    Ref {
        #[serde(rename = "$ref")]
        id: EntityId,
    },
    /// Array of values
    Array(Vec<Value>),
    /// Object/map of values
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Create a reference to an entity
    pub fn entity_ref(id: impl Into<EntityId>) -> Self {
        Self::Ref { id: id.into() }
    }

    /// Check if value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Try to get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as i64
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    /// Try to get as f64
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get as string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as vec3
    pub fn as_vec3(&self) -> Option<[f64; 3]> {
        match self {
            Self::Vec3(v) => Some(*v),
            Self::Vec2([x, y]) => Some([*x, *y, 0.0]),
            Self::Array(arr) if arr.len() == 3 => {
                Some([arr[0].as_float()?, arr[1].as_float()?, arr[2].as_float()?])
            }
            _ => None,
        }
    }

    /// Try to get the referenced entity id. Plain strings are accepted
    /// as references too, since request parameters usually carry bare ids.
    pub fn as_entity_id(&self) -> Option<EntityId> {
        match self {
            Self::Ref { id } => Some(id.clone()),
            Self::String(s) => Some(EntityId::new(s.as_str())),
            _ => None,
        }
    }

    /// Try to get as array
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Try to get as object
    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Get a field from an object value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object()?.get(key)
    }

    /// Collect every entity id referenced by this value, depth first.
    pub fn references(&self) -> Vec<&EntityId> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a EntityId>) {
        match self {
            Self::Ref { id } => out.push(id),
            Self::Array(items) => items.iter().for_each(|v| v.collect_references(out)),
            Self::Object(map) => map.values().for_each(|v| v.collect_references(out)),
            _ => {}
        }
    }

    /// Rebuild this value with every entity reference passed through `resolve`.
    /// The first failure aborts the rewrite.
    pub fn try_map_references<E>(
        &self,
        resolve: &mut impl FnMut(&EntityId) -> Result<EntityId, E>,
    ) -> Result<Value, E> {
        Ok(match self {
            Self::Ref { id } => Self::Ref { id: resolve(id)? },
            Self::Array(items) => Self::Array(
                items
                    .iter()
                    .map(|v| v.try_map_references(resolve))
                    .collect::<Result<_, _>>()?,
            ),
            Self::Object(map) => Self::Object(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), v.try_map_references(resolve)?)))
                    .collect::<Result<_, E>>()?,
            ),
            other => other.clone(),
        })
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<[f64; 2]> for Value {
    fn from(v: [f64; 2]) -> Self {
        Self::Vec2(v)
    }
}

impl From<[f64; 3]> for Value {
    fn from(v: [f64; 3]) -> Self {
        Self::Vec3(v)
    }
}

impl From<EntityId> for Value {
    fn from(id: EntityId) -> Self {
        Self::Ref { id }
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::Array(v.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_accessors() {
        assert_eq!(Value::Int(3).as_float(), Some(3.0));
        assert_eq!(Value::Float(2.5).as_int(), Some(2));
        assert_eq!(Value::from("x").as_float(), None);
    }

    #[test]
    fn test_reference_json_shape() {
        let v = Value::entity_ref("wall-1");
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, r#"{"$ref":"wall-1"}"#);

        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn test_untagged_decoding_prefers_specific_shapes() {
        let v: Value = serde_json::from_str("[1.0, 2.0, 3.0]").unwrap();
        assert_eq!(v, Value::Vec3([1.0, 2.0, 3.0]));

        let v: Value = serde_json::from_str(r#"["a", "b"]"#).unwrap();
        assert_eq!(v.as_array().map(|a| a.len()), Some(2));

        let v: Value = serde_json::from_str("7").unwrap();
        assert_eq!(v, Value::Int(7));
    }

    #[test]
    fn test_map_references_rewrites_nested_ids() {
        let v = Value::Array(vec![
            Value::entity_ref("a"),
            Value::Object(BTreeMap::from([("host".to_owned(), Value::entity_ref("b"))])),
        ]);
        assert_eq!(v.references().len(), 2);

        let mapped = v
            .try_map_references(&mut |id| Ok::<_, ()>(EntityId::new(format!("new-{id}"))))
            .unwrap();
        let ids: Vec<_> = mapped.references().into_iter().map(|id| id.as_str().to_owned()).collect();
        assert_eq!(ids, vec!["new-a", "new-b"]);
    }

    #[test]
    fn test_map_references_stops_at_first_failure() {
        let v = Value::Array(vec![Value::entity_ref("a"), Value::entity_ref("b")]);
        let err = v.try_map_references(&mut |id| Err::<EntityId, _>(id.clone()));
        assert_eq!(err, Err(EntityId::new("a")));
    }
}
