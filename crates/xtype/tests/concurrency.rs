// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test code readability over pedantic
#![allow(clippy::missing_panics_doc)] // Tests panic on failure

//! Multi-threaded registry tests
//!
//! Racing class initialization, concurrent registration and lock-free
//! dispatch while interfaces are being added.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use xtype::{
    FundamentalFlags, FundamentalInfo, InterfaceInfo, RegistryConfig, TypeFlags, TypeId, TypeInfo,
    TypeRegistry,
};

const THREADS: usize = 8;

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

#[test]
fn test_racing_class_ref_initializes_once() {
    let registry = setup_registry();
    let inits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&inits);
    let t = registry
        .register_static(
            TypeId::OBJECT,
            "Raced",
            TypeInfo::new(64, 16).with_class_init(move |_, _, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(5));
            }),
            TypeFlags::NONE,
        )
        .unwrap();

    let barrier = Barrier::new(THREADS);
    let classes: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    registry.class_ref(t).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(inits.load(Ordering::SeqCst), 1);
    assert!(classes.windows(2).all(|w| w[0] == w[1]));
    for class in classes {
        registry.class_unref(class);
    }
}

#[test]
fn test_concurrent_registration_unique_ids() {
    let registry = setup_registry();
    let serial_before = registry.registration_serial();
    let ids: Vec<TypeId> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|n| {
                let registry = &registry;
                s.spawn(move || {
                    (0..16)
                        .map(|i| {
                            registry
                                .register_static(
                                    TypeId::OBJECT,
                                    &format!("Conc{}_{}", n, i),
                                    TypeInfo::new(64, 16),
                                    TypeFlags::NONE,
                                )
                                .unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect()
    });

    let mut sorted = ids.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), THREADS * 16);
    assert_eq!(registry.children(TypeId::OBJECT).len(), THREADS * 16);
    assert!(registry.registration_serial() >= serial_before + (THREADS * 16) as u32);

    // Same name from every thread: exactly one wins.
    let winners = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|| {
                    registry
                        .register_static(TypeId::OBJECT, "Contested", TypeInfo::new(64, 16), TypeFlags::NONE)
                        .is_ok()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count()
    });
    assert_eq!(winners, 1);
}

/// Releases the readers even when the writer panics.
struct StopOnDrop<'a>(&'a AtomicBool);

impl Drop for StopOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

#[test]
fn test_dispatch_while_adding_interfaces() {
    let registry = setup_registry();
    let stable_iface = registry
        .register_static(TypeId::INTERFACE, "StableDispatch", TypeInfo::new(32, 0), TypeFlags::NONE)
        .unwrap();
    let t = registry
        .register_static(TypeId::OBJECT, "DispatchTarget", TypeInfo::new(64, 16), TypeFlags::NONE)
        .unwrap();
    registry
        .add_interface_static(t, stable_iface, InterfaceInfo::default())
        .unwrap();
    let class = registry.class_ref(t).unwrap();
    let expected = registry.interface_peek(class, stable_iface).unwrap();

    let done = AtomicBool::new(false);
    thread::scope(|s| {
        for _ in 0..THREADS / 2 {
            s.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    assert_eq!(registry.interface_peek(class, stable_iface), Some(expected));
                }
            });
        }
        s.spawn(|| {
            let _stop = StopOnDrop(&done);
            // Every new interface reshuffles offset tables of `t`.
            for i in 0..32 {
                let iface = registry
                    .register_static(
                        TypeId::INTERFACE,
                        &format!("Churn{}", i),
                        TypeInfo::new(32, 0),
                        TypeFlags::NONE,
                    )
                    .unwrap();
                registry.add_interface_static(t, iface, InterfaceInfo::default()).unwrap();
                assert!(registry.interface_peek(class, iface).is_some());
            }
        });
    });

    assert_eq!(registry.interfaces(t).len(), 33);
    registry.class_unref(class);
}

#[test]
fn test_instances_across_threads() {
    let registry = setup_registry();
    let t = registry
        .register_static(TypeId::OBJECT, "Shared", TypeInfo::new(64, 32), TypeFlags::NONE)
        .unwrap();
    let created = AtomicUsize::new(0);
    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                for _ in 0..64 {
                    let instance = registry.create_instance(t).unwrap();
                    assert_eq!(instance.class().map(|c| c.type_id()), Some(t));
                    registry.free_instance(instance).unwrap();
                    created.fetch_add(1, Ordering::Relaxed);
                }
            });
        }
    });
    assert_eq!(created.load(Ordering::Relaxed), THREADS * 64);
}
