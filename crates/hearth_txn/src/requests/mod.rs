//! Concrete domain requests
//!
//! Every request here is backed by a [`StateRequest`](crate::StateRequest):
//! it transacts the entities it touches, mutates the document, and undoes or
//! redoes by replaying the captured snapshots.

mod association_requests;
mod entity_requests;
mod transform_requests;

pub use association_requests::BindAssociationRequest;
pub use entity_requests::{AddStructureRequest, DeleteEntityRequest, GroupTransactionRequest, SetFieldRequest};
pub use transform_requests::{MoveRequest, RotateRequest, TranslateLayerRequest};

use crate::error::{TxnError, TxnResult};
use crate::manager::TransactionManager;
use crate::request::Request;
use hearth_core::{EntityId, Value};
use std::collections::BTreeMap;

/// Register every built-in request kind
pub fn register_builtin_requests(manager: &mut TransactionManager) {
    manager.register_with_adapter(
        MoveRequest::KIND,
        |params| boxed(MoveRequest::from_params(params)),
        expand_vector_param,
    );
    manager.register(RotateRequest::KIND, |params| boxed(RotateRequest::from_params(params)));
    manager.register(TranslateLayerRequest::KIND, |params| {
        boxed(TranslateLayerRequest::from_params(params))
    });
    manager.register(GroupTransactionRequest::KIND, |params| {
        boxed(GroupTransactionRequest::from_params(params))
    });
    manager.register(AddStructureRequest::KIND, |params| {
        boxed(AddStructureRequest::from_params(params))
    });
    manager.register(DeleteEntityRequest::KIND, |params| {
        boxed(DeleteEntityRequest::from_params(params))
    });
    manager.register(SetFieldRequest::KIND, |params| boxed(SetFieldRequest::from_params(params)));
    manager.register(BindAssociationRequest::KIND, |params| {
        boxed(BindAssociationRequest::from_params(params))
    });
    log::debug!(target: "hearth::txn", "Registered built-in request kinds");
}

fn boxed<R: Request + 'static>(request: TxnResult<R>) -> TxnResult<Box<dyn Request>> {
    request.map(|r| Box::new(r) as Box<dyn Request>)
}

/// `[entity, [x, y(, z)]]` -> `[entity, x, y(, z)]`. Other shapes pass
/// through untouched.
fn expand_vector_param(mut params: Vec<Value>) -> TxnResult<Vec<Value>> {
    if params.len() != 2 {
        return Ok(params);
    }
    let expanded = match &params[1] {
        Value::Vec2([x, y]) => vec![Value::Float(*x), Value::Float(*y)],
        Value::Vec3([x, y, z]) => vec![Value::Float(*x), Value::Float(*y), Value::Float(*z)],
        _ => return Ok(params),
    };
    params.truncate(1);
    params.extend(expanded);
    Ok(params)
}

// Positional parameter readers shared by the `from_params` constructors.

pub(crate) fn param<'a>(kind: &str, params: &'a [Value], index: usize) -> TxnResult<&'a Value> {
    params
        .get(index)
        .ok_or_else(|| TxnError::params(kind, format!("missing parameter {}", index)))
}

pub(crate) fn entity_param(kind: &str, params: &[Value], index: usize) -> TxnResult<EntityId> {
    param(kind, params, index)?
        .as_entity_id()
        .ok_or_else(|| TxnError::params(kind, format!("parameter {} is not an entity id", index)))
}

pub(crate) fn f64_param(kind: &str, params: &[Value], index: usize) -> TxnResult<f64> {
    param(kind, params, index)?
        .as_float()
        .ok_or_else(|| TxnError::params(kind, format!("parameter {} is not a number", index)))
}

pub(crate) fn opt_f64_param(kind: &str, params: &[Value], index: usize) -> TxnResult<Option<f64>> {
    match params.get(index) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => f64_param(kind, params, index).map(Some),
    }
}

pub(crate) fn str_param<'a>(kind: &str, params: &'a [Value], index: usize) -> TxnResult<&'a str> {
    param(kind, params, index)?
        .as_str()
        .ok_or_else(|| TxnError::params(kind, format!("parameter {} is not a string", index)))
}

pub(crate) fn entity_list_param(kind: &str, params: &[Value], index: usize) -> TxnResult<Vec<EntityId>> {
    let items = param(kind, params, index)?
        .as_array()
        .ok_or_else(|| TxnError::params(kind, format!("parameter {} is not a list", index)))?;
    items
        .iter()
        .map(|v| {
            v.as_entity_id()
                .ok_or_else(|| TxnError::params(kind, format!("parameter {} holds a non-id", index)))
        })
        .collect()
}

/// Optional object parameter, empty when absent
pub(crate) fn object_param(kind: &str, params: &[Value], index: usize) -> TxnResult<BTreeMap<String, Value>> {
    match params.get(index) {
        None | Some(Value::Null) => Ok(BTreeMap::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(_) => Err(TxnError::params(kind, format!("parameter {} is not an object", index))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_param_is_expanded() {
        let params = vec![Value::from("e1"), Value::from([1.0, 2.0, 3.0])];
        let expanded = expand_vector_param(params).unwrap();
        assert_eq!(expanded.len(), 4);
        assert_eq!(expanded[3], Value::Float(3.0));

        let plain = vec![Value::from("e1"), Value::from(1.0), Value::from(2.0)];
        assert_eq!(expand_vector_param(plain.clone()).unwrap(), plain);
    }

    #[test]
    fn test_param_readers_report_position() {
        let params = vec![Value::from("e1"), Value::from("oops")];
        assert_eq!(entity_param("move", &params, 0).unwrap(), EntityId::new("e1"));
        assert!(matches!(
            f64_param("move", &params, 1),
            Err(TxnError::InvalidParams { ref kind, .. }) if kind == "move"
        ));
        assert!(param("move", &params, 2).is_err());
        assert_eq!(opt_f64_param("move", &params, 5).unwrap(), None);
        assert!(object_param("move", &params, 3).unwrap().is_empty());
    }
}
