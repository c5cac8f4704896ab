//! Association edits

use super::{entity_param, str_param};
use crate::error::TxnResult;
use crate::request::{Request, RequestCategory};
use crate::state_request::StateRequest;
use hearth_core::{AssociationId, EntityId, Value};
use hearth_graph::{AssociationKind, Document};

/// Relate `owner` to `target`. Binding an already related pair is a no-op
/// that still records a (trivial) history entry.
pub struct BindAssociationRequest {
    kind: AssociationKind,
    owner: EntityId,
    target: EntityId,
    created: Option<AssociationId>,
    state: StateRequest,
}

impl BindAssociationRequest {
    pub const KIND: &'static str = "bind_association";

    pub fn new(kind: AssociationKind, owner: impl Into<EntityId>, target: impl Into<EntityId>) -> Self {
        Self {
            kind,
            owner: owner.into(),
            target: target.into(),
            created: None,
            state: StateRequest::new(),
        }
    }

    /// `[kind_tag, owner, target]`
    pub fn from_params(params: &[Value]) -> TxnResult<Self> {
        Ok(Self::new(
            AssociationKind::from_tag(str_param(Self::KIND, params, 0)?),
            entity_param(Self::KIND, params, 1)?,
            entity_param(Self::KIND, params, 2)?,
        ))
    }
}

impl Request for BindAssociationRequest {
    fn description(&self) -> &str {
        "Bind association"
    }

    fn category(&self) -> RequestCategory {
        RequestCategory::Association
    }

    fn on_commit(&mut self, doc: &mut Document) -> TxnResult<()> {
        doc.get(&self.owner)?;
        doc.get(&self.target)?;
        let (kind, owner, target) = (&self.kind, &self.owner, &self.target);
        let mut created = None;
        self.state.run(doc, |_, doc| {
            created = doc
                .associations_mut()
                .add_association(kind.clone(), owner, target);
            Ok(())
        })?;
        if created.is_none() {
            log::debug!(target: "hearth::txn", "{} already bound to {}", owner, target);
        }
        self.created = created;
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

    /// Id of the new association, `Null` when the pair was already bound
    fn result(&self) -> Option<Value> {
        Some(
            self.created
                .as_ref()
                .map(|id| Value::from(id.as_str()))
                .unwrap_or(Value::Null),
        )
    }

    fn state_request_mut(&mut self) -> Option<&mut StateRequest> {
        Some(&mut self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Txn;
    use hearth_graph::{Entity, EntityKind};

    fn doc() -> Document {
        let mut doc = Document::new();
        let root = doc.root_id().clone();
        doc.add_entity(&root, Entity::new("v1", EntityKind::Vertex)).unwrap();
        doc.add_entity(&root, Entity::new("wall", EntityKind::Structure)).unwrap();
        doc
    }

    #[test]
    fn test_bind_is_reversible() {
        let mut doc = doc();
        let mut txn = Txn::new(BindAssociationRequest::new(AssociationKind::PointOnLine, "v1", "wall"));

        txn.commit(&mut doc).unwrap();
        assert!(matches!(txn.result(), Some(Value::String(_))));
        assert_eq!(
            doc.associations().get_entity_by_target_id(&EntityId::new("wall"), false),
            Some(&EntityId::new("v1"))
        );

        txn.undo(&mut doc).unwrap();
        assert!(doc.associations().is_empty());
        txn.redo(&mut doc).unwrap();
        assert_eq!(doc.associations().len(), 1);
    }

    #[test]
    fn test_bind_to_missing_target_fails() {
        let mut doc = doc();
        let mut txn = Txn::new(BindAssociationRequest::new(AssociationKind::Generic, "v1", "ghost"));
        assert!(txn.commit(&mut doc).is_err());
        assert!(doc.associations().is_empty());
    }

    #[test]
    fn test_params_accept_short_tags() {
        let params = vec![Value::from("pop"), Value::from("v1"), Value::from("wall")];
        let request = BindAssociationRequest::from_params(&params).unwrap();
        assert_eq!(request.kind, AssociationKind::PointOnPoint);
    }
}
