// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test code readability over pedantic
#![allow(clippy::items_after_statements)] // Test helpers
#![allow(clippy::too_many_lines)] // Scenario tests
#![allow(clippy::missing_panics_doc)] // Tests panic on failure

//! End-to-end registry scenarios
//!
//! Registration, class lookup, the initialization order of hooks and the
//! rejection paths for duplicate names and final parents.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use xtype::{
    ErrorCode, FundamentalFlags, FundamentalInfo, InterfaceInfo, RegistryConfig, TypeFlags,
    TypeId, TypeInfo, TypeRegistry,
};

fn object_flags() -> FundamentalFlags {
    FundamentalFlags::CLASSED
        | FundamentalFlags::INSTANTIATABLE
        | FundamentalFlags::DERIVABLE
        | FundamentalFlags::DEEP_DERIVABLE
}

/// Registry with `xobject_t` at fundamental index 20.
fn setup_registry(object_info: TypeInfo) -> TypeRegistry {
    let _ = env_logger::builder().is_test(true).try_init();
    let registry = TypeRegistry::new(RegistryConfig::default());
    let object = registry
        .register_fundamental(
            TypeId::make_fundamental(20),
            "xobject_t",
            object_info,
            FundamentalInfo::new(object_flags()),
            TypeFlags::NONE,
        )
        .expect("register xobject_t");
    assert_eq!(object, TypeId::OBJECT);
    registry
}

#[test]
fn test_register_and_lookup_child() {
    let registry = setup_registry(TypeInfo::new(64, 16));
    registry
        .register_static(TypeId::OBJECT, "MyObj", TypeInfo::new(64, 32), TypeFlags::NONE)
        .expect("register MyObj");

    let t = registry.from_name("MyObj").expect("MyObj registered");
    assert!(t.is_valid());
    assert_eq!(registry.parent(t), Some(TypeId::OBJECT));
    assert_eq!(registry.depth(t), 2);
    assert_eq!(registry.fundamental(t), TypeId::OBJECT);
    assert_eq!(registry.name(t).as_deref(), Some("MyObj"));

    let first = registry.class_ref(t).expect("class_ref");
    let second = registry.class_ref(t).expect("class_ref again");
    assert_eq!(first, second);
    assert_eq!(first.type_id(), t);
    assert_eq!(registry.class_peek(t), Some(first));
    registry.class_unref(second);
    registry.class_unref(first);
}

#[test]
fn test_first_instance_runs_state_machine_in_order() {
    let step = Arc::new(AtomicUsize::new(0));
    let record = Arc::new(Mutex::new(Vec::<(&'static str, usize)>::new()));

    let hook = |label: &'static str| {
        let step = Arc::clone(&step);
        let record = Arc::clone(&record);
        move || {
            let n = step.fetch_add(1, Ordering::SeqCst);
            record.lock().push((label, n));
        }
    };

    let object_base_init = hook("object.base_init");
    let registry = setup_registry(
        TypeInfo::new(64, 16).with_base_init(move |_, _| object_base_init()),
    );

    let my_class_init = hook("MyObj.class_init");
    let my_instance_init = hook("MyObj.instance_init");
    let my_obj = registry
        .register_static(
            TypeId::OBJECT,
            "MyObj",
            TypeInfo::new(64, 32)
                .with_class_init(move |_, _, _| my_class_init())
                .with_instance_init(move |_, _, _| my_instance_init()),
            TypeFlags::NONE,
        )
        .unwrap();

    let iface = registry
        .register_static(TypeId::INTERFACE, "MyIface", TypeInfo::new(32, 0), TypeFlags::NONE)
        .unwrap();
    assert_eq!(registry.fundamental(iface), TypeId::INTERFACE);
    let iface_init = hook("MyIface.iface_init");
    registry
        .add_interface_static(my_obj, iface, InterfaceInfo::new(move |_, _, _| iface_init()))
        .unwrap();

    let instance = registry.create_instance(my_obj).unwrap();
    let record = record.lock().clone();
    let at = |label: &str| {
        record
            .iter()
            .filter(|(l, _)| *l == label)
            .map(|(_, n)| *n)
            .collect::<Vec<_>>()
    };

    // base_init of xobject_t runs once on its own class, once on MyObj's.
    let base_inits = at("object.base_init");
    assert_eq!(base_inits.len(), 2);
    let class_init = at("MyObj.class_init");
    let iface_init = at("MyIface.iface_init");
    assert_eq!(class_init.len(), 1);
    assert_eq!(iface_init.len(), 1);
    assert!(base_inits.iter().all(|n| *n < class_init[0]));
    assert!(iface_init[0] > class_init[0]);
    assert!(at("MyObj.instance_init")[0] > iface_init[0]);

    let class = instance.class().unwrap();
    let vtable = registry.interface_peek(class, iface).unwrap();
    assert_eq!(vtable.iface_type(), iface);
    assert_eq!(vtable.instance_type(), my_obj);
    registry.free_instance(instance).unwrap();
}

#[test]
fn test_duplicate_name_leaves_registry_unchanged() {
    let registry = setup_registry(TypeInfo::new(64, 16));
    let other = registry
        .register_static(TypeId::OBJECT, "OtherParent", TypeInfo::new(64, 16), TypeFlags::NONE)
        .unwrap();
    let my_obj = registry
        .register_static(TypeId::OBJECT, "MyObj", TypeInfo::new(64, 32), TypeFlags::NONE)
        .unwrap();
    let serial = registry.registration_serial();

    let err = registry
        .register_static(other, "MyObj", TypeInfo::new(64, 32), TypeFlags::NONE)
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
    assert_eq!(registry.from_name("MyObj"), Some(my_obj));
    assert_eq!(registry.parent(my_obj), Some(TypeId::OBJECT));
    assert_eq!(registry.registration_serial(), serial);
    assert!(registry.children(other).is_empty());
}

#[test]
fn test_final_parent_rejects_children() {
    let registry = setup_registry(TypeInfo::new(64, 16));
    let my_obj = registry
        .register_static(TypeId::OBJECT, "MyObj", TypeInfo::new(64, 32), TypeFlags::NONE)
        .unwrap();
    registry.add_flags(my_obj, TypeFlags::FINAL).unwrap();
    assert!(registry.is_final(my_obj));

    let err = registry
        .register_static(my_obj, "MyChild", TypeInfo::new(64, 32), TypeFlags::NONE)
        .unwrap_err();
    assert!(err.to_string().contains("final parent"), "{}", err);
    assert_eq!(err.code(), ErrorCode::NotSupported);
    assert!(registry.from_name("MyChild").is_none());
}

#[test]
fn test_hierarchy_properties() {
    let registry = setup_registry(TypeInfo::new(64, 16));
    let mut types = vec![TypeId::OBJECT];
    let mut serial = registry.registration_serial();
    for i in 0..24 {
        let parent = types[fastrand::usize(..types.len())];
        let child = registry
            .register_static(
                parent,
                &format!("Node{}", i),
                TypeInfo::new(64 + i, 16 + i),
                TypeFlags::NONE,
            )
            .unwrap();
        let next = registry.registration_serial();
        assert!(next > serial, "serial must grow on registration");
        serial = next;

        assert!(registry.is_a(child, parent));
        assert!(!registry.is_a(parent, child));
        assert_eq!(registry.depth(child), registry.depth(parent) + 1);
        assert!(registry.children(parent).contains(&child));
        assert!(registry.next_base(child, TypeId::OBJECT).is_some());
        types.push(child);
    }

    for &t in &types {
        let class = registry.class_ref(t).unwrap();
        assert_eq!(registry.class_peek(t), Some(class));
        if let Some(parent) = registry.parent(t) {
            let parent_class = registry.class_peek(parent).expect("parent class exists");
            assert_eq!(registry.class_peek_parent(class), Some(parent_class));
        }
        registry.class_unref(class);
    }
}

#[test]
fn test_abstract_and_non_instantiatable() {
    let registry = setup_registry(TypeInfo::new(64, 16));
    let shape = registry
        .register_static(TypeId::OBJECT, "Shape", TypeInfo::new(64, 16), TypeFlags::ABSTRACT)
        .unwrap();
    let err = registry.create_instance(shape).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotSupported);

    let iface = registry
        .register_static(TypeId::INTERFACE, "Drawable", TypeInfo::new(32, 0), TypeFlags::NONE)
        .unwrap();
    assert!(registry.create_instance(iface).is_err());
    assert!(registry.class_ref(iface).is_err());

    // Abstract types still have classes.
    let class = registry.class_ref(shape).unwrap();
    registry.class_unref(class);
}

#[test]
fn test_query_reports_sizes() {
    let registry = setup_registry(TypeInfo::new(64, 16));
    let t = registry
        .register_static(TypeId::OBJECT, "Queried", TypeInfo::new(80, 48), TypeFlags::NONE)
        .unwrap();
    let query = registry.query(t).unwrap();
    assert_eq!(query.type_id, t);
    assert_eq!(&*query.type_name, "Queried");
    assert_eq!(query.class_size, 80);
    assert_eq!(query.instance_size, 48);
    assert_eq!(query.n_preallocs, 0);

    let pooled = registry
        .register_static(
            TypeId::OBJECT,
            "Pooled",
            TypeInfo::new(64, 16).with_n_preallocs(1 << 20),
            TypeFlags::NONE,
        )
        .unwrap();
    assert_eq!(registry.query(pooled).unwrap().n_preallocs, xtype::config::MAX_PREALLOCS);

    let quark = registry.qname(t).unwrap();
    assert_eq!(registry.quark_to_str(quark).as_deref(), Some("Queried"));
}
