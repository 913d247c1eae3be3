// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dispatch Benchmark
//!
//! Measures the hot paths of the registry:
//! - `interface_peek()` through the offset table, shallow and deep hierarchies
//! - `is_a()` against ancestors and interfaces
//! - `class_ref()` on an initialized class
//! - instance creation and release

#![allow(clippy::uninlined_format_args)]
#![allow(clippy::cast_possible_truncation)]

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box as bb;
use xtype::{
    FundamentalFlags, FundamentalInfo, InterfaceInfo, RegistryConfig, TypeFlags, TypeId, TypeInfo,
    TypeRegistry,
};

/// Registry with a linear chain of `depth` types below `xobject_t`, each
/// implementing one interface. Returns the leaf and the interfaces.
fn build_chain(depth: usize) -> (TypeRegistry, TypeId, Vec<TypeId>) {
    let registry = TypeRegistry::new(RegistryConfig::default());
    let mut parent = registry
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
        .expect("register xobject_t");
    let mut ifaces = Vec::with_capacity(depth);
    for level in 0..depth {
        let t = registry
            .register_static(parent, &format!("Level{}", level), TypeInfo::new(64, 16), TypeFlags::NONE)
            .expect("register level");
        let iface = registry
            .register_static(
                TypeId::INTERFACE,
                &format!("LevelIface{}", level),
                TypeInfo::new(32, 0),
                TypeFlags::NONE,
            )
            .expect("register interface");
        registry
            .add_interface_static(t, iface, InterfaceInfo::default())
            .expect("add interface");
        ifaces.push(iface);
        parent = t;
    }
    (registry, parent, ifaces)
}

fn bench_interface_peek(c: &mut Criterion) {
    let mut group = c.benchmark_group("interface_peek");
    for depth in [1usize, 8, 32] {
        let (registry, leaf, ifaces) = build_chain(depth);
        let class = registry.class_ref(leaf).expect("class_ref");
        group.bench_with_input(BenchmarkId::new("first_iface", depth), &depth, |b, _| {
            b.iter(|| bb(registry.interface_peek(bb(class), bb(ifaces[0]))));
        });
        group.bench_with_input(BenchmarkId::new("last_iface", depth), &depth, |b, _| {
            b.iter(|| bb(registry.interface_peek(bb(class), bb(ifaces[depth - 1]))));
        });
        registry.class_unref(class);
    }
    group.finish();
}

fn bench_is_a(c: &mut Criterion) {
    let mut group = c.benchmark_group("is_a");
    let (registry, leaf, ifaces) = build_chain(16);
    group.bench_function("ancestor", |b| {
        b.iter(|| bb(registry.is_a(bb(leaf), bb(TypeId::OBJECT))));
    });
    group.bench_function("interface", |b| {
        b.iter(|| bb(registry.is_a(bb(leaf), bb(ifaces[3]))));
    });
    group.bench_function("unrelated", |b| {
        b.iter(|| bb(registry.is_a(bb(TypeId::OBJECT), bb(leaf))));
    });
    group.finish();
}

fn bench_class_and_instance(c: &mut Criterion) {
    let mut group = c.benchmark_group("lifecycle");
    let (registry, leaf, _) = build_chain(4);
    let held = registry.class_ref(leaf).expect("class_ref");

    group.bench_function("class_ref_unref", |b| {
        b.iter(|| {
            let class = registry.class_ref(bb(leaf)).expect("class_ref");
            registry.class_unref(class);
        });
    });
    group.bench_function("create_free_instance", |b| {
        b.iter(|| {
            let instance = registry.create_instance(bb(leaf)).expect("create_instance");
            registry.free_instance(instance).expect("free_instance");
        });
    });
    registry.class_unref(held);
    group.finish();
}

criterion_group!(benches, bench_interface_peek, bench_is_a, bench_class_and_instance);
criterion_main!(benches);
