//! End-to-end edit scenarios through the transaction manager

use hearth_core::{EntityId, Value};
use hearth_graph::{AssociationKind, AssociationRegistry, Document, Entity, EntityKind, Invalidation};
use hearth_txn::prelude::*;
use std::collections::BTreeMap;

fn id(s: &str) -> EntityId {
    EntityId::new(s)
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// root -> layer -> {e1 at (0,0), e2 at (2,0), wall}
fn floorplan() -> Document {
    let mut doc = Document::new();
    let root = doc.root_id().clone();
    doc.add_entity(&root, Entity::new("layer", EntityKind::Layer)).unwrap();
    doc.add_entity(&id("layer"), Entity::new("e1", EntityKind::Content).with_position(0.0, 0.0))
        .unwrap();
    doc.add_entity(&id("layer"), Entity::new("e2", EntityKind::Content).with_position(2.0, 0.0))
        .unwrap();
    doc.add_entity(&id("layer"), Entity::new("wall", EntityKind::Structure))
        .unwrap();
    doc
}

fn position(doc: &Document, s: &str) -> [f64; 3] {
    doc.get(&id(s)).unwrap().position()
}

#[test]
fn test_move_undo_redo() {
    init_logger();
    let mut doc = floorplan();
    let mut manager = TransactionManager::with_builtin_requests(ManagerConfig::default());

    let txn = manager
        .create_request("move", vec![Value::from("e1"), Value::from(5.0), Value::from(5.0)])
        .unwrap();
    manager.commit(&mut doc, txn, false).unwrap();
    assert_eq!(position(&doc, "e1"), [5.0, 5.0, 0.0]);

    assert!(manager.undo(&mut doc).unwrap());
    assert_eq!(position(&doc, "e1"), [0.0, 0.0, 0.0]);

    assert!(manager.redo(&mut doc).unwrap());
    assert_eq!(position(&doc, "e1"), [5.0, 5.0, 0.0]);
}

#[test]
fn test_move_through_vector_adapter() {
    let mut doc = floorplan();
    let mut manager = TransactionManager::with_builtin_requests(ManagerConfig::default());

    let txn = manager
        .create_request("move", vec![Value::from("e1"), Value::from([1.0, 2.0, 3.0])])
        .unwrap();
    manager.commit(&mut doc, txn, false).unwrap();
    assert_eq!(position(&doc, "e1"), [1.0, 2.0, 3.0]);
}

#[test]
fn test_group_undo_redo_keeps_group_id() {
    init_logger();
    let mut doc = floorplan();
    let mut manager = TransactionManager::with_builtin_requests(ManagerConfig::default());

    let mut meta = BTreeMap::new();
    meta.insert("name".to_owned(), Value::from("Sofa set"));
    let request = GroupTransactionRequest::new(vec![id("e1"), id("e2")], meta);
    assert!(request.group_id().is_none());

    let gid = manager
        .commit(&mut doc, Txn::new(request), false)
        .unwrap()
        .and_then(|v| v.as_entity_id())
        .unwrap();
    let group = doc.get(&gid).unwrap();
    assert_eq!(group.children(), &[id("e1"), id("e2")]);
    assert!(group.has_parent(&id("layer")));
    assert_eq!(group.field("name"), Some(&Value::from("Sofa set")));
    assert!(!doc.get(&id("layer")).unwrap().has_child(&id("e1")));

    manager.undo(&mut doc).unwrap();
    assert!(!doc.contains(&gid));
    for e in ["e1", "e2"] {
        let entity = doc.get(&id(e)).unwrap();
        assert_eq!(entity.parents(), &[id("layer")]);
        assert!(doc.is_alive(&id(e)));
    }
    assert_eq!(
        doc.get(&id("layer")).unwrap().children(),
        &[id("e1"), id("e2"), id("wall")]
    );

    manager.redo(&mut doc).unwrap();
    let group = doc.get(&gid).unwrap();
    assert_eq!(group.children(), &[id("e1"), id("e2")]);
    assert!(doc.is_alive(&id("e1")));
    assert!(doc.get(&id("e2")).unwrap().has_parent(&gid));
}

#[test]
fn test_group_vertices_undo_reattaches_them() {
    let mut doc = floorplan();
    for v in ["v1", "v2"] {
        doc.add_entity(&id("layer"), Entity::new(v, EntityKind::Vertex).with_position(1.0, 1.0))
            .unwrap();
    }
    let mut manager = TransactionManager::with_builtin_requests(ManagerConfig::default());
    let txn = manager
        .create_request(
            "group",
            vec![Value::Array(vec![Value::from("v1"), Value::from("v2")])],
        )
        .unwrap();
    let gid = manager
        .commit(&mut doc, txn, false)
        .unwrap()
        .and_then(|v| v.as_entity_id())
        .unwrap();

    manager.undo(&mut doc).unwrap();
    assert!(!doc.contains(&gid));
    for v in ["v1", "v2"] {
        let vertex = doc.get(&id(v)).unwrap();
        assert_eq!(vertex.parents(), &[id("layer")]);
        assert_eq!(vertex.position(), [1.0, 1.0, 0.0]);
        assert!(doc.is_alive(&id(v)));
    }

    manager.redo(&mut doc).unwrap();
    assert_eq!(doc.get(&gid).unwrap().children(), &[id("v1"), id("v2")]);
    assert!(doc.get(&id("v1")).unwrap().has_parent(&gid));
}

#[test]
fn test_group_layers_undo_reattaches_them() {
    let mut doc = Document::new();
    let root = doc.root_id().clone();
    for l in ["l1", "l2"] {
        doc.add_entity(&root, Entity::new(l, EntityKind::Layer)).unwrap();
    }
    doc.add_entity(&id("l1"), Entity::new("wall", EntityKind::Structure)).unwrap();
    let mut manager = TransactionManager::new(ManagerConfig::default());

    let request = GroupTransactionRequest::with_id("levels", vec![id("l1"), id("l2")], BTreeMap::new());
    manager.commit(&mut doc, Txn::new(request), false).unwrap();
    assert!(doc.get(&id("l1")).unwrap().has_parent(&id("levels")));

    manager.undo(&mut doc).unwrap();
    assert!(!doc.contains(&id("levels")));
    for l in ["l1", "l2"] {
        assert_eq!(doc.get(&id(l)).unwrap().parents(), &[root.clone()]);
    }
    assert!(doc.is_alive(&id("wall")));
    assert_eq!(doc.root().children(), &[id("l1"), id("l2")]);
}

#[test]
fn test_new_structure_after_reload_gets_unused_id() {
    let registry = AssociationRegistry::with_defaults();
    let mut saved = floorplan();
    for n in 1..=16 {
        saved
            .add_entity(&id("layer"), Entity::new(format!("structure-{}", n), EntityKind::Structure))
            .unwrap();
    }
    let json = saved.to_json(&registry).unwrap();
    let mut doc = Document::from_json(&json, &registry).unwrap();
    let mut manager = TransactionManager::new(ManagerConfig::default());

    let created = manager
        .commit(
            &mut doc,
            Txn::new(AddStructureRequest::new("layer", EntityKind::Structure, BTreeMap::new())),
            false,
        )
        .unwrap()
        .and_then(|v| v.as_entity_id())
        .unwrap();
    assert!(doc.is_alive(&created));
    assert_eq!(doc.get(&id("layer")).unwrap().children().len(), 20);
}

#[test]
fn test_undo_restores_every_touched_field() {
    let mut doc = floorplan();
    let before = doc.get(&id("e1")).unwrap().dump();
    let mut manager = TransactionManager::with_builtin_requests(ManagerConfig::default());

    let edits = vec![
        Txn::new(MoveRequest::new("e1", 3.0, 4.0).with_z(1.0)),
        Txn::new(RotateRequest::new("e1", 45.0)),
        Txn::new(SetFieldRequest::new("e1", "material", "walnut")),
    ];
    for txn in edits {
        manager.commit(&mut doc, txn, false).unwrap();
    }
    let after = doc.get(&id("e1")).unwrap().dump();

    while manager.undo(&mut doc).unwrap() {}
    assert_eq!(doc.get(&id("e1")).unwrap().dump(), before);

    while manager.redo(&mut doc).unwrap() {}
    assert_eq!(doc.get(&id("e1")).unwrap().dump(), after);
}

#[test]
fn test_delete_then_undo_revives_associations() {
    let mut doc = floorplan();
    let mut manager = TransactionManager::with_builtin_requests(ManagerConfig::default());
    let bind = manager
        .create_request(
            "bind_association",
            vec![Value::from("pol"), Value::from("e1"), Value::from("wall")],
        )
        .unwrap();
    manager.commit(&mut doc, bind, false).unwrap();
    assert_eq!(doc.associations().len(), 1);

    let delete = manager
        .create_request("delete_entity", vec![Value::from("wall")])
        .unwrap();
    manager.commit(&mut doc, delete, false).unwrap();
    assert!(!doc.is_alive(&id("wall")));
    assert!(doc.associations().is_empty());

    manager.undo(&mut doc).unwrap();
    assert!(doc.is_alive(&id("wall")));
    let associations = doc.associations().get_association(&id("e1"));
    assert_eq!(associations.len(), 1);
    assert_eq!(*associations[0].kind(), AssociationKind::PointOnLine);
}

#[test]
fn test_add_structure_by_kind() {
    let mut doc = floorplan();
    let mut manager = TransactionManager::with_builtin_requests(ManagerConfig::default());
    let mut fields = BTreeMap::new();
    fields.insert("width".to_owned(), Value::from(0.9));

    let txn = manager
        .create_request(
            "add_structure",
            vec![Value::from("layer"), Value::from("Structure"), Value::Object(fields)],
        )
        .unwrap();
    let created = manager
        .commit(&mut doc, txn, false)
        .unwrap()
        .and_then(|v| v.as_entity_id())
        .unwrap();
    assert!(doc.is_alive(&created));
    assert_eq!(*doc.get(&created).unwrap().kind(), EntityKind::Structure);

    manager.undo(&mut doc).unwrap();
    assert!(!doc.contains(&created));
}

#[test]
fn test_translate_layer_and_invalidations() {
    let mut doc = floorplan();
    let invalidations = doc.connect_invalidations();
    let mut manager = TransactionManager::with_builtin_requests(ManagerConfig::default());

    let txn = manager
        .create_request(
            "translate_layer",
            vec![Value::from("layer"), Value::from(1.0), Value::from(1.0)],
        )
        .unwrap();
    manager.commit(&mut doc, txn, false).unwrap();
    assert_eq!(position(&doc, "e2"), [3.0, 1.0, 0.0]);

    let sent: Vec<_> = invalidations.try_iter().collect();
    assert!(sent.contains(&Invalidation::Position(id("e1"))));
    assert!(sent.contains(&Invalidation::ChildModels {
        entity: id("layer"),
        recursive: false
    }));

    manager.undo(&mut doc).unwrap();
    assert_eq!(position(&doc, "e2"), [2.0, 0.0, 0.0]);
    assert!(invalidations
        .try_iter()
        .any(|m| m == Invalidation::Position(id("e2"))));
}

#[test]
fn test_consecutive_moves_compose() {
    let mut doc = floorplan();
    let config = ManagerConfig::default().with_compose_consecutive(true);
    let mut manager = TransactionManager::with_builtin_requests(config);

    for step in 1..=3 {
        let txn = manager
            .create_request("move", vec![Value::from("e1"), Value::from(step as f64), Value::from(0.0)])
            .unwrap();
        manager.commit(&mut doc, txn, false).unwrap();
    }
    assert_eq!(manager.undo_count(), 1);
    assert_eq!(position(&doc, "e1"), [3.0, 0.0, 0.0]);

    manager.undo(&mut doc).unwrap();
    assert_eq!(position(&doc, "e1"), [0.0, 0.0, 0.0]);
    manager.redo(&mut doc).unwrap();
    assert_eq!(position(&doc, "e1"), [3.0, 0.0, 0.0]);
}

#[test]
fn test_moves_of_different_entities_do_not_compose() {
    let mut doc = floorplan();
    let config = ManagerConfig::default().with_compose_consecutive(true);
    let mut manager = TransactionManager::new(config);

    manager
        .commit(&mut doc, Txn::new(MoveRequest::new("e1", 1.0, 0.0)), false)
        .unwrap();
    manager
        .commit(&mut doc, Txn::new(MoveRequest::new("e2", 1.0, 0.0)), false)
        .unwrap();
    assert_eq!(manager.undo_count(), 2);
}

#[test]
fn test_history_depth_from_toml() {
    let config = ManagerConfig::from_toml_str("max_undo_steps = 2").unwrap();
    let mut doc = floorplan();
    let mut manager = TransactionManager::new(config);

    for x in [1.0, 2.0, 3.0] {
        manager
            .commit(&mut doc, Txn::new(MoveRequest::new("e1", x, 0.0)), false)
            .unwrap();
    }
    assert_eq!(manager.undo_count(), 2);
    while manager.undo(&mut doc).unwrap() {}
    assert_eq!(position(&doc, "e1"), [1.0, 0.0, 0.0]);
}
