// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type nodes.
//!
//! A [`TypeNode`] is created once per registered type and never freed. Its
//! immutable identity (name, ancestor chain, plugin) is readable without
//! locks; mutable bookkeeping lives in [`NodeState`] inside the registry
//! graph and is only touched under the graph lock. Interface entries and
//! offset tables are published copy-on-write through `arc-swap` so that
//! dispatch never locks.

use crate::flags::{FundamentalFlags, TypeFlags};
use crate::id::TypeId;
use crate::info::{
    BaseFinalizeFn, BaseInitFn, BoxedFuncs, ClassFinalizeFn, ClassInitFn, HookData,
    InstanceInitFn, InterfaceInfo, ValueTable,
};
use crate::memory::{ClassHeader, ClassRef, RawBlock, VTableRef};
use crate::plugin::TypePlugin;
use crate::quark::Quark;
use arc_swap::ArcSwapOption;
use std::any::Any;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicI64, AtomicPtr, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

/// Progress of class or vtable initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum InitState {
    Uninitialized = 0,
    BaseClassInit = 1,
    BaseIfaceInit = 2,
    ClassInit = 3,
    IfaceInit = 4,
    Initialized = 5,
}

impl InitState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => InitState::BaseClassInit,
            2 => InitState::BaseIfaceInit,
            3 => InitState::ClassInit,
            4 => InitState::IfaceInit,
            5 => InitState::Initialized,
            _ => InitState::Uninitialized,
        }
    }
}

// ============================================================================
// Interface entries
// ============================================================================

/// One implemented interface of a class.
#[derive(Debug, Clone, Copy)]
pub(crate) struct IfaceEntry {
    pub(crate) iface_type: TypeId,
    pub(crate) vtable: Option<VTableRef>,
    pub(crate) init_state: InitState,
    pub(crate) from_parent: bool,
}

/// Interface vector of a class plus its offset index.
#[derive(Debug, Clone, Default)]
pub(crate) struct IfaceEntries {
    pub(crate) offset_index: usize,
    pub(crate) entries: Vec<IfaceEntry>,
}

impl IfaceEntries {
    pub(crate) fn find(&self, iface_type: TypeId) -> Option<(usize, &IfaceEntry)> {
        self.entries
            .iter()
            .enumerate()
            .find(|(_, e)| e.iface_type == iface_type)
    }
}

// ============================================================================
// TypeNode
// ============================================================================

pub(crate) struct TypeNode {
    pub(crate) id: TypeId,
    /// Index of this node's [`NodeState`] in the graph.
    pub(crate) slot: usize,
    pub(crate) name: Arc<str>,
    pub(crate) qname: Quark,
    /// `supers[0]` is the node itself, the last element its fundamental.
    pub(crate) supers: Box<[TypeId]>,
    pub(crate) plugin: Option<Arc<dyn TypePlugin>>,
    pub(crate) is_classed: bool,
    pub(crate) is_instantiatable: bool,
    pub(crate) fundamental_flags: FundamentalFlags,
    flags: AtomicU32,
    ref_count: AtomicU32,
    init_state: AtomicU8,
    class: AtomicPtr<ClassHeader>,
    /// Interface vector of classed types.
    pub(crate) iface_entries: ArcSwapOption<IfaceEntries>,
    /// Per-interface offset table, `offsets[k] = slot + 1` or 0 when free.
    pub(crate) offsets: ArcSwapOption<Vec<u16>>,
    instance_count: AtomicI64,
}

impl TypeNode {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: TypeId,
        slot: usize,
        name: Arc<str>,
        qname: Quark,
        supers: Box<[TypeId]>,
        plugin: Option<Arc<dyn TypePlugin>>,
        fundamental_flags: FundamentalFlags,
        flags: TypeFlags,
    ) -> Self {
        Self {
            id,
            slot,
            name,
            qname,
            supers,
            plugin,
            is_classed: fundamental_flags.contains(FundamentalFlags::CLASSED),
            is_instantiatable: fundamental_flags.contains(FundamentalFlags::INSTANTIATABLE),
            fundamental_flags,
            flags: AtomicU32::new(flags.bits()),
            ref_count: AtomicU32::new(0),
            init_state: AtomicU8::new(InitState::Uninitialized as u8),
            class: AtomicPtr::new(std::ptr::null_mut()),
            iface_entries: ArcSwapOption::empty(),
            offsets: ArcSwapOption::empty(),
            instance_count: AtomicI64::new(0),
        }
    }

    #[inline]
    pub(crate) fn n_supers(&self) -> usize {
        self.supers.len() - 1
    }

    #[inline]
    pub(crate) fn parent(&self) -> Option<TypeId> {
        self.supers.get(1).copied()
    }

    #[inline]
    pub(crate) fn fundamental(&self) -> TypeId {
        self.supers[self.supers.len() - 1]
    }

    #[inline]
    pub(crate) fn is_interface(&self) -> bool {
        self.fundamental() == TypeId::INTERFACE
    }

    #[inline]
    pub(crate) fn is_boxed(&self) -> bool {
        self.fundamental() == TypeId::BOXED
    }

    /// Whether `self` appears in the ancestor chain of `node`.
    #[inline]
    pub(crate) fn is_ancestor_of(&self, node: &TypeNode) -> bool {
        let n = self.n_supers();
        node.n_supers() >= n && node.supers[node.n_supers() - n] == self.id
    }

    // ------------------------------------------------------------------------
    // Flags
    // ------------------------------------------------------------------------

    pub(crate) fn flags(&self) -> TypeFlags {
        TypeFlags::from_bits(self.flags.load(Ordering::Acquire))
    }

    pub(crate) fn add_flags(&self, flags: TypeFlags) {
        self.flags.fetch_or(flags.bits(), Ordering::AcqRel);
    }

    pub(crate) fn is_final(&self) -> bool {
        self.flags().contains(TypeFlags::FINAL)
    }

    pub(crate) fn is_abstract(&self) -> bool {
        self.flags().contains(TypeFlags::ABSTRACT)
    }

    pub(crate) fn is_deep_derivable(&self) -> bool {
        self.fundamental_flags.contains(FundamentalFlags::DEEP_DERIVABLE)
    }

    // ------------------------------------------------------------------------
    // Reference count
    // ------------------------------------------------------------------------

    pub(crate) fn ref_count(&self) -> u32 {
        self.ref_count.load(Ordering::Acquire)
    }

    /// Take a reference if the node already holds one.
    pub(crate) fn try_ref(&self) -> bool {
        let mut current = self.ref_count.load(Ordering::Acquire);
        while current > 0 {
            match self.ref_count.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
        false
    }

    pub(crate) fn inc_ref(&self) {
        self.ref_count.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn set_ref_count(&self, value: u32) {
        self.ref_count.store(value, Ordering::Release);
    }

    /// Drop a reference unless it is the last one. Returns `false` when the
    /// caller holds the last reference.
    pub(crate) fn try_unref(&self) -> bool {
        let mut current = self.ref_count.load(Ordering::Acquire);
        while current > 1 {
            match self.ref_count.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
        false
    }

    pub(crate) fn dec_ref(&self) -> u32 {
        self.ref_count.fetch_sub(1, Ordering::AcqRel) - 1
    }

    // ------------------------------------------------------------------------
    // Class pointer and init state
    // ------------------------------------------------------------------------

    pub(crate) fn init_state(&self) -> InitState {
        InitState::from_u8(self.init_state.load(Ordering::Acquire))
    }

    pub(crate) fn set_init_state(&self, state: InitState) {
        self.init_state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn class(&self) -> Option<ClassRef> {
        NonNull::new(self.class.load(Ordering::Acquire))
            // SAFETY: the pointer was stored by `set_class` from a class block.
            .map(|ptr| unsafe { ClassRef::from_raw(ptr.cast()) })
    }

    pub(crate) fn set_class(&self, class: Option<ClassRef>) {
        let ptr = class.map_or(std::ptr::null_mut(), |c| c.as_ptr().cast());
        self.class.store(ptr, Ordering::Release);
    }

    // ------------------------------------------------------------------------
    // Interface entries
    // ------------------------------------------------------------------------

    pub(crate) fn lookup_entry(&self, iface_type: TypeId) -> Option<IfaceEntry> {
        let guard = self.iface_entries.load();
        (*guard)
            .as_ref()
            .and_then(|e| e.find(iface_type).map(|(_, entry)| *entry))
    }

    /// Rewrite one entry and publish the new vector.
    pub(crate) fn update_entry(&self, iface_type: TypeId, f: impl Fn(&mut IfaceEntry)) {
        self.iface_entries.rcu(|current| {
            let mut copy = current.as_deref().cloned().unwrap_or_default();
            if let Some(entry) = copy.entries.iter_mut().find(|e| e.iface_type == iface_type) {
                f(entry);
            }
            Some(Arc::new(copy))
        });
    }

    /// Offset table probe: `Some(slot)` when `offsets[offset]` is in use.
    pub(crate) fn offset_slot(&self, offset: usize) -> Option<usize> {
        let guard = self.offsets.load();
        (*guard)
            .as_ref()
            .and_then(|o| o.get(offset).copied())
            .filter(|v| *v != 0)
            .map(|v| usize::from(v) - 1)
    }

    pub(crate) fn has_available_offset(&self, offset: usize, for_index: usize) -> bool {
        let guard = self.offsets.load();
        match &*guard {
            None => true,
            Some(offsets) => match offsets.get(offset) {
                None => true,
                Some(v) => *v == 0 || usize::from(*v) == for_index + 1,
            },
        }
    }

    pub(crate) fn set_offset(&self, offset: usize, index: usize) {
        let value = (index + 1) as u16;
        {
            let guard = self.offsets.load();
            if let Some(offsets) = &*guard {
                if offsets.get(offset) == Some(&value) {
                    return;
                }
            }
        }
        self.offsets.rcu(|current| {
            let mut table = current.as_deref().cloned().unwrap_or_default();
            if table.len() <= offset {
                table.resize(offset + 1, 0);
            }
            table[offset] = value;
            Some(Arc::new(table))
        });
    }

    // ------------------------------------------------------------------------
    // Instance accounting
    // ------------------------------------------------------------------------

    pub(crate) fn instance_count(&self) -> i64 {
        self.instance_count.load(Ordering::Relaxed)
    }

    pub(crate) fn add_instances(&self, delta: i64) {
        self.instance_count.fetch_add(delta, Ordering::Relaxed);
    }
}

// ============================================================================
// Mutable payloads
// ============================================================================

pub(crate) struct InstanceRecord {
    pub(crate) instance_size: usize,
    pub(crate) private_size: usize,
    pub(crate) n_preallocs: usize,
    pub(crate) instance_init: Option<InstanceInitFn>,
}

pub(crate) struct ClassRecord {
    pub(crate) class_size: usize,
    pub(crate) class_private_size: usize,
    pub(crate) base_init: Option<BaseInitFn>,
    pub(crate) base_finalize: Option<BaseFinalizeFn>,
    pub(crate) class_init: Option<ClassInitFn>,
    pub(crate) class_finalize: Option<ClassFinalizeFn>,
    pub(crate) class_data: Option<HookData>,
    pub(crate) class: Option<RawBlock>,
    pub(crate) instance: Option<InstanceRecord>,
}

pub(crate) struct IfaceRecord {
    pub(crate) vtable_size: usize,
    pub(crate) vtable_base_init: Option<BaseInitFn>,
    pub(crate) vtable_base_finalize: Option<BaseFinalizeFn>,
    pub(crate) dflt_init: Option<ClassInitFn>,
    pub(crate) dflt_finalize: Option<ClassFinalizeFn>,
    pub(crate) dflt_data: Option<HookData>,
    pub(crate) dflt_vtable: Option<RawBlock>,
}

pub(crate) enum DataKind {
    Common,
    Iface(IfaceRecord),
    Class(ClassRecord),
}

/// Payload present while a node is referenced.
pub(crate) struct TypeData {
    pub(crate) value_table: Option<Arc<ValueTable>>,
    pub(crate) boxed: Option<BoxedFuncs>,
    pub(crate) kind: DataKind,
}

impl TypeData {
    pub(crate) fn class(&self) -> Option<&ClassRecord> {
        match &self.kind {
            DataKind::Class(c) => Some(c),
            _ => None,
        }
    }

    pub(crate) fn class_mut(&mut self) -> Option<&mut ClassRecord> {
        match &mut self.kind {
            DataKind::Class(c) => Some(c),
            _ => None,
        }
    }

    pub(crate) fn iface(&self) -> Option<&IfaceRecord> {
        match &self.kind {
            DataKind::Iface(i) => Some(i),
            _ => None,
        }
    }

    pub(crate) fn iface_mut(&mut self) -> Option<&mut IfaceRecord> {
        match &mut self.kind {
            DataKind::Iface(i) => Some(i),
            _ => None,
        }
    }

    pub(crate) fn instance(&self) -> Option<&InstanceRecord> {
        self.class().and_then(|c| c.instance.as_ref())
    }
}

/// Implementor record of an interface.
pub(crate) struct IfaceHolder {
    pub(crate) instance_type: TypeId,
    /// `None` while a dynamic holder has not been completed.
    pub(crate) info: Option<InterfaceInfo>,
    pub(crate) plugin: Option<Arc<dyn TypePlugin>>,
}

/// Graph-locked bookkeeping of one node.
#[derive(Default)]
pub(crate) struct NodeState {
    pub(crate) children: Vec<TypeId>,
    pub(crate) data: Option<TypeData>,
    /// Sorted ascending.
    pub(crate) prerequisites: Vec<TypeId>,
    pub(crate) dependants: Vec<TypeId>,
    pub(crate) holders: Vec<IfaceHolder>,
    pub(crate) qdata: Vec<(Quark, Arc<dyn Any + Send + Sync>)>,
    /// Interface vtables owned by this class, keyed by interface.
    pub(crate) vtables: Vec<(TypeId, RawBlock)>,
}

impl NodeState {
    pub(crate) fn holder(&self, instance_type: TypeId) -> Option<&IfaceHolder> {
        self.holders.iter().find(|h| h.instance_type == instance_type)
    }

    pub(crate) fn holder_mut(&mut self, instance_type: TypeId) -> Option<&mut IfaceHolder> {
        self.holders
            .iter_mut()
            .find(|h| h.instance_type == instance_type)
    }

    pub(crate) fn take_vtable(&mut self, iface_type: TypeId) -> Option<RawBlock> {
        let pos = self.vtables.iter().position(|(t, _)| *t == iface_type)?;
        Some(self.vtables.swap_remove(pos).1)
    }
}
