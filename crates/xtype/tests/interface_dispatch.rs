// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test code readability over pedantic
#![allow(clippy::cast_possible_truncation)] // Test parameters
#![allow(clippy::missing_panics_doc)] // Tests panic on failure

//! Interface dispatch tests
//!
//! Vtable lookup over randomly built hierarchies, late interface addition,
//! default vtables and plugin-provided interfaces.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use xtype::{
    FundamentalFlags, FundamentalInfo, InterfaceInfo, ModuleLoader, RegistryConfig, TypeFlags,
    TypeId, TypeInfo, TypeModule, TypeRegistry, VTableRef,
};

/// Interface vtable used by these tests: the header followed by one slot.
#[repr(C)]
struct TagVTable {
    header: xtype::InterfaceHeader,
    tag: usize,
}

fn setup_registry() -> TypeRegistry {
    let _ = env_logger::builder().is_test(true).try_init();
    let registry = TypeRegistry::new(RegistryConfig::default());
    registry
        .register_fundamental(
            TypeId::OBJECT,
            "xobject_t",
            TypeInfo::new(64, 16),
            FundamentalInfo::new(
                FundamentalFlags::CLASSED
                    | FundamentalFlags::INSTANTIATABLE
                    | FundamentalFlags::DERIVABLE
                    | FundamentalFlags::DEEP_DERIVABLE,
            ),
            TypeFlags::NONE,
        )
        .unwrap();
    registry
}

fn register_iface(registry: &TypeRegistry, name: &str) -> TypeId {
    registry
        .register_static(
            TypeId::INTERFACE,
            name,
            TypeInfo::new(std::mem::size_of::<TagVTable>(), 0),
            TypeFlags::NONE,
        )
        .unwrap()
}

/// Interface info that stamps `tag` into the vtable.
fn tagging(tag: usize) -> InterfaceInfo {
    InterfaceInfo::new(move |_, vtable: VTableRef, _| {
        // SAFETY: the interface was registered with the size of `TagVTable`
        // and the vtable is exclusively ours during init.
        unsafe { vtable.cast_mut::<TagVTable>().tag = tag };
    })
}

fn tag_of(vtable: VTableRef) -> usize {
    // SAFETY: see `tagging`.
    unsafe { vtable.cast::<TagVTable>().tag }
}

#[test]
fn test_random_hierarchy_dispatch() {
    let registry = setup_registry();
    let ifaces: Vec<TypeId> = (0..8)
        .map(|i| register_iface(&registry, &format!("RandIface{}", i)))
        .collect();

    let mut types = vec![TypeId::OBJECT];
    // type -> iface -> (declaring type, tag)
    let mut expected: HashMap<TypeId, HashMap<TypeId, (TypeId, usize)>> = HashMap::new();
    expected.insert(TypeId::OBJECT, HashMap::new());

    for i in 0..40 {
        let parent = types[fastrand::usize(..types.len())];
        let t = registry
            .register_static(parent, &format!("RandType{}", i), TypeInfo::new(64, 16), TypeFlags::NONE)
            .unwrap();
        let mut own = expected[&parent].clone();
        for (k, &iface) in ifaces.iter().enumerate() {
            if own.contains_key(&iface) || !fastrand::bool() {
                continue;
            }
            let tag = i * 100 + k;
            registry.add_interface_static(t, iface, tagging(tag)).unwrap();
            own.insert(iface, (t, tag));
        }
        expected.insert(t, own);
        types.push(t);
    }

    for &t in &types[1..] {
        let class = registry.class_ref(t).unwrap();
        for &iface in &ifaces {
            let found = registry.interface_peek(class, iface);
            match expected[&t].get(&iface) {
                Some(&(declaring, tag)) => {
                    let vtable = found.unwrap_or_else(|| panic!("missing vtable on {:?}", t));
                    assert_eq!(vtable.iface_type(), iface);
                    assert_eq!(vtable.instance_type(), declaring);
                    assert_eq!(tag_of(vtable), tag);
                    assert!(registry.is_a(t, iface));
                }
                None => {
                    assert!(found.is_none());
                    assert!(!registry.is_a(t, iface));
                }
            }
        }
        let mut listed = registry.interfaces(t);
        listed.sort();
        let mut wanted: Vec<TypeId> = expected[&t].keys().copied().collect();
        wanted.sort();
        assert_eq!(listed, wanted);
    }
}

#[test]
fn test_vtable_stable_while_class_held() {
    let registry = setup_registry();
    let iface = register_iface(&registry, "StableIface");
    let t = registry
        .register_static(TypeId::OBJECT, "StableType", TypeInfo::new(64, 16), TypeFlags::NONE)
        .unwrap();
    registry.add_interface_static(t, iface, tagging(7)).unwrap();

    let class = registry.class_ref(t).unwrap();
    let vtable = registry.interface_peek(class, iface).unwrap();
    for _ in 0..16 {
        let other = registry.class_ref(t).unwrap();
        assert_eq!(registry.interface_peek(other, iface), Some(vtable));
        registry.class_unref(other);
    }
    // Unrelated registrations do not move existing vtables.
    for i in 0..8 {
        let extra = register_iface(&registry, &format!("ExtraIface{}", i));
        let u = registry
            .register_static(TypeId::OBJECT, &format!("ExtraType{}", i), TypeInfo::new(64, 16), TypeFlags::NONE)
            .unwrap();
        registry.add_interface_static(u, extra, InterfaceInfo::default()).unwrap();
        registry.add_interface_static(u, iface, InterfaceInfo::default()).unwrap();
    }
    assert_eq!(registry.interface_peek(class, iface), Some(vtable));
    assert_eq!(tag_of(vtable), 7);
    registry.class_unref(class);
}

#[test]
fn test_late_interface_initialized_once() {
    let registry = setup_registry();
    let iface = register_iface(&registry, "LateIface");
    let t = registry
        .register_static(TypeId::OBJECT, "LateType", TypeInfo::new(64, 16), TypeFlags::NONE)
        .unwrap();
    let class = registry.class_ref(t).unwrap();
    assert!(registry.interface_peek(class, iface).is_none());

    let runs = Arc::new(AtomicUsize::new(0));
    let visible_during_init = Arc::new(AtomicUsize::new(0));
    let (r, v) = (Arc::clone(&runs), Arc::clone(&visible_during_init));
    let info = InterfaceInfo::new(move |reg, vtable, _| {
        r.fetch_add(1, Ordering::SeqCst);
        let class = reg.class_peek(vtable.instance_type()).unwrap();
        if reg.interface_peek(class, vtable.iface_type()).is_some() {
            v.fetch_add(1, Ordering::SeqCst);
        }
    });
    registry.add_interface_static(t, iface, info).unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(visible_during_init.load(Ordering::SeqCst), 0);
    let vtable = registry.interface_peek(class, iface).unwrap();
    assert_eq!(vtable.instance_type(), t);
    assert_eq!(registry.interface_peek(class, iface), Some(vtable));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    registry.class_unref(class);
}

#[test]
fn test_default_vtable_seeds_implementations() {
    let registry = setup_registry();
    let iface = registry
        .register_static(
            TypeId::INTERFACE,
            "SeededIface",
            TypeInfo::new(std::mem::size_of::<TagVTable>(), 0).with_class_init(|_, vtable, _| {
                // SAFETY: the default vtable has the size of `TagVTable`.
                unsafe { vtable.cast_mut::<TagVTable>().tag = 99 };
            }),
            TypeFlags::NONE,
        )
        .unwrap();
    let t = registry
        .register_static(TypeId::OBJECT, "SeededType", TypeInfo::new(64, 16), TypeFlags::NONE)
        .unwrap();
    registry.add_interface_static(t, iface, InterfaceInfo::default()).unwrap();

    assert!(registry.default_interface_peek(iface).is_none());
    let dflt = registry.default_interface_ref(iface).unwrap();
    // SAFETY: as above.
    assert_eq!(unsafe { dflt.as_class().cast::<TagVTable>().tag }, 99);
    assert_eq!(registry.default_interface_peek(iface), Some(dflt));
    assert_eq!(dflt.iface_type(), iface);

    let class = registry.class_ref(t).unwrap();
    let vtable = registry.interface_peek(class, iface).unwrap();
    assert_ne!(vtable, dflt);
    assert_eq!(tag_of(vtable), 99);
    registry.class_unref(class);
    registry.default_interface_unref(dflt);
}

#[test]
fn test_instance_is_a_interface_via_prerequisite() {
    let registry = setup_registry();
    let base = registry
        .register_static(TypeId::OBJECT, "PrereqBase", TypeInfo::new(64, 16), TypeFlags::NONE)
        .unwrap();
    let iface = register_iface(&registry, "PrereqIface");
    registry.interface_add_prerequisite(iface, base).unwrap();
    assert!(registry.is_a(iface, base));
    assert!(registry.is_a(iface, TypeId::OBJECT));

    let leaf = registry
        .register_static(base, "PrereqLeaf", TypeInfo::new(64, 16), TypeFlags::NONE)
        .unwrap();
    registry.add_interface_static(leaf, iface, tagging(3)).unwrap();
    let instance = registry.create_instance(leaf).unwrap();
    assert_eq!(registry.check_instance_cast(instance, iface), Some(instance));
    registry.free_instance(instance).unwrap();
}

// ============================================================================
// Plugin-provided types
// ============================================================================

struct ShapesLoader {
    loads: AtomicUsize,
    unloads: AtomicUsize,
    iface: TypeId,
}

impl ModuleLoader for ShapesLoader {
    fn load(&self, registry: &TypeRegistry, module: &TypeModule) -> bool {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let Ok(circle) = module.register_type(
            registry,
            TypeId::OBJECT,
            "PluginCircle",
            TypeInfo::new(64, 24),
            TypeFlags::NONE,
        ) else {
            return false;
        };
        module
            .add_interface(registry, circle, self.iface, tagging(42))
            .is_ok()
    }

    fn unload(&self, _registry: &TypeRegistry, _module: &TypeModule) {
        self.unloads.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_module_types_load_on_demand() {
    let registry = setup_registry();
    let iface = register_iface(&registry, "PluginIface");
    let loader = Arc::new(ShapesLoader {
        loads: AtomicUsize::new(0),
        unloads: AtomicUsize::new(0),
        iface,
    });

    struct Shared(Arc<ShapesLoader>);
    impl ModuleLoader for Shared {
        fn load(&self, registry: &TypeRegistry, module: &TypeModule) -> bool {
            self.0.load(registry, module)
        }
        fn unload(&self, registry: &TypeRegistry, module: &TypeModule) {
            self.0.unload(registry, module);
        }
    }

    let module = TypeModule::with_name("shapes", Shared(Arc::clone(&loader)));
    assert!(module.use_module(&registry));
    let circle = registry.from_name("PluginCircle").unwrap();
    assert!(registry.plugin(circle).is_some());
    assert_eq!(module.types(), vec![circle]);
    module.unuse_module(&registry);
    assert_eq!(loader.unloads.load(Ordering::SeqCst), 1);

    // The class pulls the module back in.
    let instance = registry.create_instance(circle).unwrap();
    assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
    let class = instance.class().unwrap();
    let vtable = registry.interface_peek(class, iface).unwrap();
    assert_eq!(tag_of(vtable), 42);
    assert!(registry.interface_plugin(circle, iface).is_some());
    registry.free_instance(instance).unwrap();
    assert!(module.use_count() >= 1);
}
