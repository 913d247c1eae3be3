// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # Type Registry
//!
//! Stores type nodes, drives class initialization and answers dispatch
//! queries.
//!
//! ## Locking
//!
//! ```text
//! init_lock (ReentrantMutex)  -->  graph (RwLock<Graph>)
//! ```
//!
//! - `graph` guards every mutable node record (children, type data,
//!   prerequisites, holders, qdata).
//! - `init_lock` serializes class and vtable initialization. It is always
//!   taken before the graph write lock and may be re-entered by init hooks.
//! - User hooks and plugin calls run with the graph lock released.
//! - Node lookup (`nodes`), name lookup (`names`), interface entries and
//!   offset tables are lock-free snapshots.
//!
//! ## Example
//!
//! ```
//! use xtype::{FundamentalFlags, FundamentalInfo, TypeFlags, TypeId, TypeInfo, TypeRegistry};
//!
//! let registry = TypeRegistry::new(Default::default());
//! let flags = FundamentalFlags::CLASSED
//!     | FundamentalFlags::INSTANTIATABLE
//!     | FundamentalFlags::DERIVABLE
//!     | FundamentalFlags::DEEP_DERIVABLE;
//! let base = registry.register_fundamental(
//!     TypeId::OBJECT,
//!     "Base",
//!     TypeInfo::new(64, 16),
//!     FundamentalInfo::new(flags),
//!     TypeFlags::NONE,
//! )?;
//! let child = registry.register_static(base, "Child", TypeInfo::new(64, 32), TypeFlags::NONE)?;
//! assert!(registry.is_a(child, base));
//! let class = registry.class_ref(child)?;
//! assert_eq!(class.type_id(), child);
//! # Ok::<(), xtype::Error>(())
//! ```

mod class;
mod iface;
mod instance;
mod register;

use crate::config::RegistryConfig;
use crate::error::{critical, Error, Result};
use crate::flags::{FundamentalFlags, TypeFlags};
use crate::id::TypeId;
use crate::info::{
    BoxedFuncs, InterfaceCheckFn, TypeInfo, TypeQuery, ValueTable,
};
use crate::node::{ClassRecord, IfaceRecord, NodeState, TypeData, TypeNode};
use crate::plugin::TypePlugin;
use crate::quark::{Quark, QuarkTable};
use arc_swap::ArcSwap;
use dashmap::DashMap;
use parking_lot::{ReentrantMutex, RwLock, RwLockWriteGuard};
use std::any::Any;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub(crate) type GraphGuard<'a> = RwLockWriteGuard<'a, Graph>;

/// Identifier returned by [`TypeRegistry::add_interface_check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterfaceCheckId(u64);

// ============================================================================
// Graph
// ============================================================================

/// Mutable registry state, guarded by the graph lock.
pub(crate) struct Graph {
    states: Vec<NodeState>,
    next_fundamental: usize,
    iface_checks: Vec<(InterfaceCheckId, InterfaceCheckFn)>,
    next_check_id: u64,
}

impl Graph {
    fn new() -> Self {
        Self {
            states: Vec::new(),
            next_fundamental: TypeId::RESERVED_USER_FIRST,
            iface_checks: Vec::new(),
            next_check_id: 1,
        }
    }

    pub(crate) fn state(&self, node: &TypeNode) -> &NodeState {
        &self.states[node.slot]
    }

    pub(crate) fn state_mut(&mut self, node: &TypeNode) -> &mut NodeState {
        &mut self.states[node.slot]
    }

    pub(crate) fn data(&self, node: &TypeNode) -> Option<&TypeData> {
        self.state(node).data.as_ref()
    }

    pub(crate) fn data_mut(&mut self, node: &TypeNode) -> Option<&mut TypeData> {
        self.state_mut(node).data.as_mut()
    }

    pub(crate) fn class_record(&self, node: &TypeNode) -> Option<&ClassRecord> {
        self.data(node).and_then(TypeData::class)
    }

    pub(crate) fn class_record_mut(&mut self, node: &TypeNode) -> Option<&mut ClassRecord> {
        self.data_mut(node).and_then(TypeData::class_mut)
    }

    pub(crate) fn iface_record(&self, node: &TypeNode) -> Option<&IfaceRecord> {
        self.data(node).and_then(TypeData::iface)
    }

    pub(crate) fn iface_record_mut(&mut self, node: &TypeNode) -> Option<&mut IfaceRecord> {
        self.data_mut(node).and_then(TypeData::iface_mut)
    }
}

// ============================================================================
// Node table
// ============================================================================

/// Immutable snapshot of all nodes, replaced on registration.
#[derive(Clone, Default)]
struct NodeTable {
    fundamentals: Vec<Option<Arc<TypeNode>>>,
    derived: Vec<Arc<TypeNode>>,
}

impl NodeTable {
    fn get(&self, id: TypeId) -> Option<&Arc<TypeNode>> {
        match id.derived_index() {
            Some(index) => self.derived.get(index),
            None if id.is_fundamental_slot() => self
                .fundamentals
                .get(id.fundamental_index())
                .and_then(Option::as_ref),
            None => None,
        }
    }
}

// ============================================================================
// TypeRegistry
// ============================================================================

/// Dynamic type registry.
pub struct TypeRegistry {
    config: RegistryConfig,
    nodes: ArcSwap<NodeTable>,
    names: DashMap<Arc<str>, TypeId>,
    quarks: QuarkTable,
    graph: RwLock<Graph>,
    init_lock: ReentrantMutex<()>,
    serial: AtomicU32,
}

impl TypeRegistry {
    /// Create a registry holding the `NONE` and `INTERFACE` fundamentals.
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        log::debug!(
            "[xtype] creating registry (retain_dynamic_types={}, debug={:?})",
            config.retain_dynamic_types,
            config.debug
        );
        let registry = Self {
            config,
            nodes: ArcSwap::from_pointee(NodeTable::default()),
            names: DashMap::new(),
            quarks: QuarkTable::new(),
            graph: RwLock::new(Graph::new()),
            init_lock: ReentrantMutex::new(()),
            serial: AtomicU32::new(0),
        };
        registry.install_builtin_fundamentals();
        registry
    }

    fn install_builtin_fundamentals(&self) {
        let mut g = self.graph.write();
        let void = self.new_node(
            &mut g,
            None,
            TypeId::NONE,
            "void",
            None,
            FundamentalFlags::NONE,
            TypeFlags::NONE,
        );
        self.make_data(&mut g, &void, &TypeInfo::default(), None);
        let iface = self.new_node(
            &mut g,
            None,
            TypeId::INTERFACE,
            "xinterface_t",
            None,
            FundamentalFlags::DERIVABLE,
            TypeFlags::NONE,
        );
        self.make_data(&mut g, &iface, &TypeInfo::default(), None);
    }

    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Node access
    // ------------------------------------------------------------------------

    pub(crate) fn lookup_node(&self, id: TypeId) -> Option<Arc<TypeNode>> {
        self.nodes.load().get(id).cloned()
    }

    pub(crate) fn node_or_err(&self, id: TypeId) -> Result<Arc<TypeNode>> {
        self.lookup_node(id)
            .ok_or_else(|| critical(Error::UnknownType(id)))
    }

    /// Name for diagnostics, also valid for unknown ids.
    pub(crate) fn descriptive_name(&self, id: TypeId) -> String {
        match self.lookup_node(id) {
            Some(node) => node.name.to_string(),
            None if id.is_valid() => "<unknown>".to_string(),
            None => "<invalid>".to_string(),
        }
    }

    fn publish_node(&self, node: Arc<TypeNode>) {
        self.nodes.rcu(|current| {
            let mut table = NodeTable::clone(current);
            match node.id.derived_index() {
                Some(index) => {
                    debug_assert_eq!(index, table.derived.len());
                    table.derived.push(Arc::clone(&node));
                }
                None => {
                    let index = node.id.fundamental_index();
                    if table.fundamentals.len() <= index {
                        table.fundamentals.resize(index + 1, None);
                    }
                    table.fundamentals[index] = Some(Arc::clone(&node));
                }
            }
            table
        });
    }

    // ------------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------------

    /// Id of the type called `name`.
    pub fn from_name(&self, name: &str) -> Option<TypeId> {
        self.names.get(name).map(|entry| *entry.value())
    }

    pub fn name(&self, type_id: TypeId) -> Option<Arc<str>> {
        self.lookup_node(type_id).map(|node| Arc::clone(&node.name))
    }

    /// Interned name of a type.
    pub fn qname(&self, type_id: TypeId) -> Option<Quark> {
        self.lookup_node(type_id).map(|node| node.qname)
    }

    pub fn parent(&self, type_id: TypeId) -> Option<TypeId> {
        self.lookup_node(type_id).and_then(|node| node.parent())
    }

    /// Length of the ancestor chain including the type itself.
    pub fn depth(&self, type_id: TypeId) -> usize {
        self.lookup_node(type_id)
            .map_or(0, |node| node.n_supers() + 1)
    }

    pub fn fundamental(&self, type_id: TypeId) -> TypeId {
        self.lookup_node(type_id)
            .map_or(TypeId::INVALID, |node| node.fundamental())
    }

    pub fn children(&self, type_id: TypeId) -> Vec<TypeId> {
        let Some(node) = self.lookup_node(type_id) else {
            return Vec::new();
        };
        self.graph.read().state(&node).children.clone()
    }

    /// Interfaces the type conforms to, in entry order.
    pub fn interfaces(&self, type_id: TypeId) -> Vec<TypeId> {
        let Some(node) = self.lookup_node(type_id) else {
            return Vec::new();
        };
        if !node.is_classed {
            return Vec::new();
        }
        let guard = node.iface_entries.load();
        (*guard)
            .as_ref()
            .map(|e| e.entries.iter().map(|entry| entry.iface_type).collect())
            .unwrap_or_default()
    }

    /// Ancestor of `leaf` that is a direct child of `root`.
    pub fn next_base(&self, leaf: TypeId, root: TypeId) -> Option<TypeId> {
        let node = self.lookup_node(leaf)?;
        let base = self.lookup_node(root)?;
        if base.n_supers() < node.n_supers() && base.is_ancestor_of(&node) {
            return Some(node.supers[node.n_supers() - base.n_supers() - 1]);
        }
        None
    }

    /// Whether `type_id` is `target`, derives from it, implements it, or
    /// (for interfaces) has it as prerequisite.
    pub fn is_a(&self, type_id: TypeId, target: TypeId) -> bool {
        if type_id == target {
            return true;
        }
        match (self.lookup_node(type_id), self.lookup_node(target)) {
            (Some(node), Some(target)) => self.conforms_to(&node, &target, true, true),
            _ => false,
        }
    }

    pub(crate) fn conforms_to(
        &self,
        node: &TypeNode,
        target: &TypeNode,
        support_interfaces: bool,
        support_prerequisites: bool,
    ) -> bool {
        if target.is_ancestor_of(node) {
            return true;
        }
        let support_interfaces =
            support_interfaces && node.is_instantiatable && target.is_interface();
        let support_prerequisites = support_prerequisites && node.is_interface();
        if support_interfaces && node.lookup_entry(target.id).is_some() {
            return true;
        }
        if support_prerequisites {
            let g = self.graph.read();
            return g.state(node).prerequisites.binary_search(&target.id).is_ok();
        }
        false
    }

    /// Next fundamental id available for [`register_fundamental`](Self::register_fundamental),
    /// or `INVALID` once the range is exhausted.
    pub fn fundamental_next(&self) -> TypeId {
        let g = self.graph.read();
        let id = TypeId::make_fundamental(g.next_fundamental);
        if id.is_fundamental_slot() {
            id
        } else {
            TypeId::INVALID
        }
    }

    /// Counter bumped by every successful registration.
    pub fn registration_serial(&self) -> u32 {
        self.serial.load(Ordering::Acquire)
    }

    /// Plugin of a dynamic type.
    pub fn plugin(&self, type_id: TypeId) -> Option<Arc<dyn TypePlugin>> {
        self.lookup_node(type_id).and_then(|node| node.plugin.clone())
    }

    /// Sizes of a static classed type.
    pub fn query(&self, type_id: TypeId) -> Option<TypeQuery> {
        let node = self.lookup_node(type_id)?;
        if !node.is_classed || node.plugin.is_some() {
            return None;
        }
        let g = self.graph.read();
        let class = g.class_record(&node)?;
        let instance = class.instance.as_ref();
        Some(TypeQuery {
            type_id,
            type_name: Arc::clone(&node.name),
            class_size: class.class_size,
            instance_size: instance.map_or(0, |i| i.instance_size),
            n_preallocs: instance.map_or(0, |i| i.n_preallocs),
        })
    }

    /// Live instances of a type. Counted only with `DebugFlags::INSTANCE_COUNT`.
    pub fn instance_count(&self, type_id: TypeId) -> i64 {
        self.lookup_node(type_id)
            .map_or(0, |node| node.instance_count())
    }

    // ------------------------------------------------------------------------
    // Flags
    // ------------------------------------------------------------------------

    /// Add type flags after registration.
    pub fn add_flags(&self, type_id: TypeId, flags: TypeFlags) -> Result<()> {
        if flags.invalid_bits() != 0 {
            return Err(critical(Error::InvalidFlags(flags.bits())));
        }
        let node = self.node_or_err(type_id)?;
        let _g = self.graph.write();
        if node.class().is_some() {
            log::warn!(
                "[xtype] tried to set flags {:?} on type '{}' with an existing class",
                flags,
                node.name
            );
        }
        node.add_flags(flags);
        Ok(())
    }

    /// Whether a type carries all of `flags`.
    pub fn test_flags(&self, type_id: TypeId, flags: TypeFlags) -> bool {
        self.lookup_node(type_id)
            .is_some_and(|node| node.flags().contains(flags))
    }

    /// Whether a type's fundamental carries all of `flags`.
    pub fn test_fundamental_flags(&self, type_id: TypeId, flags: FundamentalFlags) -> bool {
        self.lookup_node(type_id)
            .is_some_and(|node| node.fundamental_flags.contains(flags))
    }

    pub fn is_abstract(&self, type_id: TypeId) -> bool {
        self.test_flags(type_id, TypeFlags::ABSTRACT)
    }

    pub fn is_final(&self, type_id: TypeId) -> bool {
        self.test_flags(type_id, TypeFlags::FINAL)
    }

    pub fn is_classed(&self, type_id: TypeId) -> bool {
        self.lookup_node(type_id).is_some_and(|node| node.is_classed)
    }

    pub fn is_instantiatable(&self, type_id: TypeId) -> bool {
        self.lookup_node(type_id)
            .is_some_and(|node| node.is_instantiatable)
    }

    pub fn is_interface(&self, type_id: TypeId) -> bool {
        self.lookup_node(type_id)
            .is_some_and(|node| node.is_interface())
    }

    // ------------------------------------------------------------------------
    // Quarks and qdata
    // ------------------------------------------------------------------------

    pub fn quark_from_str(&self, s: &str) -> Quark {
        self.quarks.intern(s).0
    }

    pub fn quark_try_str(&self, s: &str) -> Option<Quark> {
        self.quarks.try_get(s)
    }

    pub fn quark_to_str(&self, quark: Quark) -> Option<Arc<str>> {
        self.quarks.to_str(quark)
    }

    /// Attach metadata to a type. Replaces any previous value for `key`.
    pub fn set_qdata(
        &self,
        type_id: TypeId,
        key: Quark,
        value: Arc<dyn Any + Send + Sync>,
    ) -> Result<()> {
        let node = self.node_or_err(type_id)?;
        let mut g = self.graph.write();
        let qdata = &mut g.state_mut(&node).qdata;
        match qdata.binary_search_by_key(&key, |(k, _)| *k) {
            Ok(pos) => qdata[pos].1 = value,
            Err(pos) => qdata.insert(pos, (key, value)),
        }
        Ok(())
    }

    pub fn get_qdata(&self, type_id: TypeId, key: Quark) -> Option<Arc<dyn Any + Send + Sync>> {
        let node = self.lookup_node(type_id)?;
        let g = self.graph.read();
        let qdata = &g.state(&node).qdata;
        qdata
            .binary_search_by_key(&key, |(k, _)| *k)
            .ok()
            .map(|pos| Arc::clone(&qdata[pos].1))
    }

    // ------------------------------------------------------------------------
    // Value tables
    // ------------------------------------------------------------------------

    /// Value table of a type, if its data is loaded.
    pub fn value_table_peek(&self, type_id: TypeId) -> Option<Arc<ValueTable>> {
        let node = self.lookup_node(type_id)?;
        let g = self.graph.read();
        if node.ref_count() == 0 {
            if node.plugin.is_none() {
                log::warn!(
                    "[xtype] value_table_peek() called for invalid type '{}'",
                    node.name
                );
            }
            return None;
        }
        g.data(&node).and_then(|d| d.value_table.clone())
    }

    /// Whether values of the type can be created.
    pub fn check_is_value_type(&self, type_id: TypeId) -> bool {
        let Some(node) = self.lookup_node(type_id) else {
            return false;
        };
        if node.flags().contains(TypeFlags::VALUE_ABSTRACT) {
            return false;
        }
        if node.is_interface() {
            return match self.interface_instantiatable_prerequisite(type_id) {
                Some(prereq) => self.check_is_value_type(prereq),
                None => false,
            };
        }
        let g = self.graph.read();
        g.data(&node)
            .and_then(|d| d.value_table.as_ref())
            .is_some_and(|t| t.value_init.is_some())
    }

    // ------------------------------------------------------------------------
    // Boxed payloads
    // ------------------------------------------------------------------------

    /// Install copy/free hooks on a type derived from `BOXED`.
    pub fn boxed_init(&self, type_id: TypeId, funcs: BoxedFuncs) -> Result<()> {
        let node = self.node_or_err(type_id)?;
        if !node.is_boxed() {
            return Err(critical(Error::InvalidTypeInfo(format!(
                "type '{}' is not boxed",
                node.name
            ))));
        }
        let mut g = self.graph.write();
        match g.data_mut(&node) {
            Some(data) => {
                data.boxed = Some(funcs);
                Ok(())
            }
            None => Err(critical(Error::InvalidState(format!(
                "boxed type '{}' has no data",
                node.name
            )))),
        }
    }

    pub fn boxed_copy(
        &self,
        type_id: TypeId,
        value: &(dyn Any + Send + Sync),
    ) -> Option<Box<dyn Any + Send + Sync>> {
        let funcs = self.boxed_funcs(type_id)?;
        Some((funcs.copy)(value))
    }

    pub fn boxed_free(&self, type_id: TypeId, value: Box<dyn Any + Send + Sync>) {
        match self.boxed_funcs(type_id) {
            Some(funcs) => (funcs.free)(value),
            None => log::warn!(
                "[xtype] cannot free boxed value of type '{}' without free hook",
                self.descriptive_name(type_id)
            ),
        }
    }

    fn boxed_funcs(&self, type_id: TypeId) -> Option<BoxedFuncs> {
        let node = self.lookup_node(type_id)?;
        let g = self.graph.read();
        g.data(&node).and_then(|d| d.boxed.clone())
    }

    // ------------------------------------------------------------------------
    // Internal helpers
    // ------------------------------------------------------------------------

    fn bump_serial(&self) {
        self.serial.fetch_add(1, Ordering::AcqRel);
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = self.nodes.load();
        f.debug_struct("TypeRegistry")
            .field("fundamentals", &table.fundamentals.iter().flatten().count())
            .field("derived", &table.derived.len())
            .field("serial", &self.registration_serial())
            .finish_non_exhaustive()
    }
}
