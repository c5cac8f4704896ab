//! Position and rotation requests

use super::{entity_param, f64_param, opt_f64_param};
use crate::error::{TxnError, TxnResult};
use crate::request::{Request, RequestCategory};
use crate::state_request::StateRequest;
use crate::txn_state::EntityTransactionType;
use hearth_core::{EntityId, Value};
use hearth_graph::entity::{POSITION_FIELDS, ROTATION_FIELD};
use hearth_graph::{Document, EntityKind};

/// Move an entity to an absolute position.
///
/// While in flight the request follows a drag gesture: `drag_move` messages
/// carrying `{x, y[, z]}` move the entity live, and the commit that ends the
/// gesture records one history entry from the pre-drag position.
pub struct MoveRequest {
    entity: EntityId,
    target: [Option<f64>; 3],
    state: StateRequest,
}

impl MoveRequest {
    pub const KIND: &'static str = "move";

    pub fn new(entity: impl Into<EntityId>, x: f64, y: f64) -> Self {
        Self {
            entity: entity.into(),
            target: [Some(x), Some(y), None],
            state: StateRequest::new(),
        }
    }

    /// Builder: also set the elevation
    pub fn with_z(mut self, z: f64) -> Self {
        self.target[2] = Some(z);
        self
    }

    /// `[entity, x, y, z?]`
    pub fn from_params(params: &[Value]) -> TxnResult<Self> {
        let mut request = Self::new(
            entity_param(Self::KIND, params, 0)?,
            f64_param(Self::KIND, params, 1)?,
            f64_param(Self::KIND, params, 2)?,
        );
        request.target[2] = opt_f64_param(Self::KIND, params, 3)?;
        Ok(request)
    }

    pub fn entity(&self) -> &EntityId {
        &self.entity
    }

    fn apply(entity: &EntityId, target: &[Option<f64>; 3], doc: &mut Document) -> TxnResult<()> {
        for (axis, value) in POSITION_FIELDS.iter().zip(target) {
            if let Some(value) = value {
                doc.set_field(entity, axis, *value)?;
            }
        }
        doc.dirty_position(entity);
        Ok(())
    }
}

impl Request for MoveRequest {
    fn description(&self) -> &str {
        "Move"
    }

    fn category(&self) -> RequestCategory {
        RequestCategory::Transform
    }

    fn on_commit(&mut self, doc: &mut Document) -> TxnResult<()> {
        let (entity, target) = (&self.entity, &self.target);
        self.state.run(doc, |s, doc| {
            s.transact(doc, entity, EntityTransactionType::Modification)?;
            Self::apply(entity, target, doc)
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

    fn on_receive(&mut self, doc: &mut Document, message: &str, params: &Value) -> TxnResult<bool> {
        match message {
            "drag_start" => {
                self.state.begin(doc);
                self.state
                    .transact(doc, &self.entity, EntityTransactionType::Modification)?;
                Ok(true)
            }
            "drag_move" => {
                self.state.begin(doc);
                self.state
                    .transact(doc, &self.entity, EntityTransactionType::Modification)?;
                for (slot, axis) in self.target.iter_mut().zip(POSITION_FIELDS) {
                    if let Some(v) = params.get(axis).and_then(Value::as_float) {
                        *slot = Some(v);
                    }
                }
                Self::apply(&self.entity, &self.target, doc)?;
                Ok(true)
            }
            "drag_end" => Ok(true),
            _ => Ok(false),
        }
    }

    fn on_abort(&mut self, doc: &mut Document) -> TxnResult<()> {
        self.state.rollback(doc);
        Ok(())
    }

    fn compose_key(&self) -> Option<String> {
        Some(format!("move:{}", self.entity))
    }

    fn state_request_mut(&mut self) -> Option<&mut StateRequest> {
        Some(&mut self.state)
    }
}

/// Rotate an entity by a delta in degrees; the result is kept in [0, 360)
pub struct RotateRequest {
    entity: EntityId,
    delta: f64,
    state: StateRequest,
}

impl RotateRequest {
    pub const KIND: &'static str = "rotate";

    pub fn new(entity: impl Into<EntityId>, delta_degrees: f64) -> Self {
        Self {
            entity: entity.into(),
            delta: delta_degrees,
            state: StateRequest::new(),
        }
    }

    /// `[entity, delta_degrees]`
    pub fn from_params(params: &[Value]) -> TxnResult<Self> {
        Ok(Self::new(
            entity_param(Self::KIND, params, 0)?,
            f64_param(Self::KIND, params, 1)?,
        ))
    }
}

/// Map any angle into [0, 360)
pub fn normalize_degrees(degrees: f64) -> f64 {
    let normalized = degrees.rem_euclid(360.0);
    // rem_euclid can round up to the modulus for tiny negative inputs
    if normalized >= 360.0 {
        0.0
    } else {
        normalized
    }
}

impl Request for RotateRequest {
    fn description(&self) -> &str {
        "Rotate"
    }

    fn category(&self) -> RequestCategory {
        RequestCategory::Transform
    }

    fn on_commit(&mut self, doc: &mut Document) -> TxnResult<()> {
        let (entity, delta) = (&self.entity, self.delta);
        self.state.run(doc, |s, doc| {
            s.transact(doc, entity, EntityTransactionType::Modification)?;
            let rotation = normalize_degrees(doc.get(entity)?.rotation() + delta);
            doc.set_field(entity, ROTATION_FIELD, rotation)?;
            doc.dirty_geometry(entity);
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
        Some(format!("rotate:{}", self.entity))
    }

    fn state_request_mut(&mut self) -> Option<&mut StateRequest> {
        Some(&mut self.state)
    }
}

/// Offset every direct member of a layer in the plane
pub struct TranslateLayerRequest {
    layer: EntityId,
    offset: [f64; 2],
    state: StateRequest,
}

impl TranslateLayerRequest {
    pub const KIND: &'static str = "translate_layer";

    pub fn new(layer: impl Into<EntityId>, dx: f64, dy: f64) -> Self {
        Self {
            layer: layer.into(),
            offset: [dx, dy],
            state: StateRequest::new(),
        }
    }

    /// `[layer, dx, dy]`
    pub fn from_params(params: &[Value]) -> TxnResult<Self> {
        Ok(Self::new(
            entity_param(Self::KIND, params, 0)?,
            f64_param(Self::KIND, params, 1)?,
            f64_param(Self::KIND, params, 2)?,
        ))
    }
}

impl Request for TranslateLayerRequest {
    fn description(&self) -> &str {
        "Translate layer"
    }

    fn category(&self) -> RequestCategory {
        RequestCategory::Layer
    }

    fn on_commit(&mut self, doc: &mut Document) -> TxnResult<()> {
        let layer = doc.get(&self.layer)?;
        if *layer.kind() != EntityKind::Layer {
            return Err(TxnError::Domain(format!(
                "{} is a {}, not a layer",
                self.layer,
                layer.kind()
            )));
        }
        let members = layer.children().to_vec();
        let (layer, [dx, dy]) = (&self.layer, self.offset);

        self.state.run(doc, |s, doc| {
            for member in &members {
                s.transact(doc, member, EntityTransactionType::Modification)?;
                let [x, y, _] = doc.get(member)?.position();
                doc.set_field(member, "x", x + dx)?;
                doc.set_field(member, "y", y + dy)?;
                doc.dirty_position(member);
            }
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

    fn state_request_mut(&mut self) -> Option<&mut StateRequest> {
        Some(&mut self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Txn;
    use hearth_graph::Entity;

    fn id(s: &str) -> EntityId {
        EntityId::new(s)
    }

    fn doc() -> Document {
        let mut doc = Document::new();
        let root = doc.root_id().clone();
        doc.add_entity(&root, Entity::new("layer", EntityKind::Layer)).unwrap();
        doc.add_entity(&id("layer"), Entity::new("e1", EntityKind::Content).with_position(0.0, 0.0))
            .unwrap();
        doc.add_entity(&id("layer"), Entity::new("e2", EntityKind::Content).with_position(1.0, 1.0))
            .unwrap();
        doc
    }

    #[test]
    fn test_normalize_degrees() {
        assert_eq!(normalize_degrees(370.0), 10.0);
        assert_eq!(normalize_degrees(-90.0), 270.0);
        assert_eq!(normalize_degrees(360.0), 0.0);
        assert!(normalize_degrees(-1e-20) < 360.0);
    }

    #[test]
    fn test_rotate_wraps_and_undoes() {
        let mut doc = doc();
        doc.set_field(&id("e1"), ROTATION_FIELD, 300.0).unwrap();
        let mut txn = Txn::new(RotateRequest::new("e1", 90.0));

        txn.commit(&mut doc).unwrap();
        assert_eq!(doc.get(&id("e1")).unwrap().rotation(), 30.0);
        txn.undo(&mut doc).unwrap();
        assert_eq!(doc.get(&id("e1")).unwrap().rotation(), 300.0);
    }

    #[test]
    fn test_translate_layer_moves_members() {
        let mut doc = doc();
        let mut txn = Txn::new(TranslateLayerRequest::new("layer", 2.0, -1.0));

        txn.commit(&mut doc).unwrap();
        assert_eq!(doc.get(&id("e1")).unwrap().position(), [2.0, -1.0, 0.0]);
        assert_eq!(doc.get(&id("e2")).unwrap().position(), [3.0, 0.0, 0.0]);

        txn.undo(&mut doc).unwrap();
        assert_eq!(doc.get(&id("e2")).unwrap().position(), [1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_translate_rejects_non_layer() {
        let mut doc = doc();
        let mut txn = Txn::new(TranslateLayerRequest::new("e1", 1.0, 1.0));
        assert!(matches!(txn.commit(&mut doc), Err(TxnError::Domain(_))));
    }

    #[test]
    fn test_drag_gesture_records_pre_drag_position() {
        let mut doc = doc();
        let mut txn = Txn::new(MoveRequest::new("e1", 0.0, 0.0));

        txn.receive(&mut doc, "drag_start", &Value::Null).unwrap();
        let mut step = std::collections::BTreeMap::new();
        step.insert("x".to_owned(), Value::from(3.0));
        step.insert("y".to_owned(), Value::from(4.0));
        assert!(txn.receive(&mut doc, "drag_move", &Value::Object(step)).unwrap());
        assert_eq!(doc.get(&id("e1")).unwrap().position(), [3.0, 4.0, 0.0]);

        txn.commit(&mut doc).unwrap();
        txn.undo(&mut doc).unwrap();
        assert_eq!(doc.get(&id("e1")).unwrap().position(), [0.0, 0.0, 0.0]);
        txn.redo(&mut doc).unwrap();
        assert_eq!(doc.get(&id("e1")).unwrap().position(), [3.0, 4.0, 0.0]);
    }

    #[test]
    fn test_aborted_drag_puts_entity_back() {
        let mut doc = doc();
        let mut txn = Txn::new(MoveRequest::new("e1", 0.0, 0.0));
        let mut step = std::collections::BTreeMap::new();
        step.insert("x".to_owned(), Value::from(9.0));
        txn.receive(&mut doc, "drag_move", &Value::Object(step)).unwrap();

        txn.abort(&mut doc).unwrap();
        assert_eq!(doc.get(&id("e1")).unwrap().position(), [0.0, 0.0, 0.0]);
    }
}
