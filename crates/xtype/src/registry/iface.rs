// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Interface implementations, prerequisites and O(1) vtable lookup.
//!
//! Every instantiatable class owns a copy-on-write vector of interface
//! entries and an `offset_index`. Every interface owns an offset table
//! mapping offset indexes to entry slots, so that
//! `iface.offsets[class.offset_index]` is the slot of the interface in the
//! class's vector. Offsets are shared between classes whose vectors agree
//! on the slots; a conflicting class moves to the lowest free offset.

use super::{GraphGuard, InterfaceCheckId, TypeRegistry};
use crate::config::MAX_N_INTERFACES;
use crate::error::{critical, Error, Result};
use crate::id::TypeId;
use crate::info::{InterfaceCheckFn, InterfaceInfo};
use crate::memory::{ClassRef, InterfaceHeader, RawBlock, VTableRef};
use crate::node::{IfaceEntries, IfaceEntry, IfaceHolder, InitState, TypeNode};
use crate::plugin::TypePlugin;
use parking_lot::RwLockWriteGuard;
use std::mem::size_of;
use std::sync::Arc;

/// Outcome of setting up the vtable of one class for one interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum VTableSetup {
    /// The class has its own holder and now owns a fresh vtable.
    Own,
    /// No holder on this class, the parent's vtable applies.
    Inherit,
    /// Holder information could not be obtained.
    Failed,
}

impl TypeRegistry {
    // ========================================================================
    // Adding interfaces
    // ========================================================================

    /// Declare that `instance_type` implements `iface_type` with `info`.
    ///
    /// Allowed after the class was initialized, in which case the vtable is
    /// built and initialized immediately.
    pub fn add_interface_static(
        &self,
        instance_type: TypeId,
        iface_type: TypeId,
        info: InterfaceInfo,
    ) -> Result<()> {
        let node = self.node_or_err(instance_type)?;
        let iface = self.node_or_err(iface_type)?;
        check_interface_info(&iface.name, &node.name, &info)?;

        let _init = self.init_lock.lock();
        let mut g = self.graph.write();
        self.check_add_interface(&g, &node, &iface)?;
        self.add_implementation(&mut g, &node, &iface, Some(info), None);
        log::debug!(
            "[xtype] added interface '{}' to '{}'",
            iface.name,
            node.name
        );
        Ok(())
    }

    /// Declare that `instance_type` implements `iface_type`, with the
    /// interface information supplied by `plugin` when first needed.
    pub fn add_interface_dynamic(
        &self,
        instance_type: TypeId,
        iface_type: TypeId,
        plugin: Arc<dyn TypePlugin>,
    ) -> Result<()> {
        let node = self.node_or_err(instance_type)?;
        let iface = self.node_or_err(iface_type)?;

        let _init = self.init_lock.lock();
        let mut g = self.graph.write();
        self.check_add_interface(&g, &node, &iface)?;
        self.add_implementation(&mut g, &node, &iface, None, Some(plugin));
        log::debug!(
            "[xtype] added dynamic interface '{}' to '{}'",
            iface.name,
            node.name
        );
        Ok(())
    }

    fn check_add_interface(
        &self,
        g: &super::Graph,
        node: &Arc<TypeNode>,
        iface: &Arc<TypeNode>,
    ) -> Result<()> {
        if !node.is_instantiatable {
            return Err(critical(Error::NotInstantiatable(node.name.to_string())));
        }
        if !iface.is_interface() || iface.n_supers() == 0 {
            return Err(critical(Error::NotAnInterface(iface.name.to_string())));
        }

        // An entry inherited from the parent whose vtable is not built yet
        // may be overridden with a holder of our own.
        if let Some(entry) = node.lookup_entry(iface.id) {
            if entry.vtable.is_none() && g.state(iface).holder(node.id).is_none() {
                return Ok(());
            }
        }

        if let Some(conforming) = self.find_conforming_child(g, node, iface.id) {
            return Err(critical(Error::InterfaceConflict(format!(
                "cannot add interface type '{}' to type '{}', since type '{}' already conforms to interface",
                iface.name, node.name, conforming.name
            ))));
        }

        let entries = node.iface_entries.load_full();
        if entries.as_ref().map_or(0, |e| e.entries.len()) >= MAX_N_INTERFACES {
            return Err(critical(Error::InterfaceConflict(format!(
                "type '{}' implements too many interfaces",
                node.name
            ))));
        }

        for prereq in &g.state(iface).prerequisites {
            let conforms = self
                .lookup_node(*prereq)
                .is_some_and(|p| self.conforms_to(node, &p, true, false));
            if !conforms {
                return Err(critical(Error::Prerequisite(format!(
                    "cannot add interface type '{}' to type '{}' which does not conform to prerequisite '{}'",
                    iface.name,
                    node.name,
                    self.descriptive_name(*prereq)
                ))));
            }
        }
        Ok(())
    }

    /// `node` or its first descendant that already has an entry for `iface`.
    fn find_conforming_child(
        &self,
        g: &super::Graph,
        node: &Arc<TypeNode>,
        iface: TypeId,
    ) -> Option<Arc<TypeNode>> {
        if node.lookup_entry(iface).is_some() {
            return Some(Arc::clone(node));
        }
        g.state(node)
            .children
            .iter()
            .filter_map(|c| self.lookup_node(*c))
            .find_map(|child| self.find_conforming_child(g, &child, iface))
    }

    fn add_implementation(
        &self,
        g: &mut GraphGuard<'_>,
        node: &Arc<TypeNode>,
        iface: &Arc<TypeNode>,
        info: Option<InterfaceInfo>,
        plugin: Option<Arc<dyn TypePlugin>>,
    ) {
        g.state_mut(iface).holders.push(IfaceHolder {
            instance_type: node.id,
            info,
            plugin,
        });
        self.add_iface_entry(g, node, iface, None);
        node.update_entry(iface.id, |e| e.from_parent = false);

        let state = node.init_state();
        if state >= InitState::BaseIfaceInit {
            self.vtable_base_init(g, iface, node);
        }
        if state >= InitState::IfaceInit {
            self.iface_init(g, iface, node);
        }

        let entry = node.lookup_entry(iface.id);
        let children = g.state(node).children.clone();
        for child in children.iter().filter_map(|c| self.lookup_node(*c)) {
            self.add_iface_entry(g, &child, iface, entry);
        }
    }

    /// Append an entry for `iface` to `node` and keep offsets consistent.
    /// With `parent_entry` the entry is inherited and propagates further
    /// down the hierarchy.
    fn add_iface_entry(
        &self,
        g: &super::Graph,
        node: &Arc<TypeNode>,
        iface: &Arc<TypeNode>,
        parent_entry: Option<IfaceEntry>,
    ) {
        let current = node.iface_entries.load_full();
        if current.as_ref().is_some_and(|e| e.find(iface.id).is_some()) {
            // Either an override of an inherited entry, or the interface was
            // added to an ancestor after this type already had it.
            return;
        }
        let mut entries: IfaceEntries = current.as_deref().cloned().unwrap_or_default();
        let index = entries.entries.len();
        let mut entry = IfaceEntry {
            iface_type: iface.id,
            vtable: None,
            init_state: InitState::Uninitialized,
            from_parent: parent_entry.is_some(),
        };
        if let Some(parent_entry) = parent_entry {
            if node.init_state() >= InitState::BaseIfaceInit && parent_entry.vtable.is_some() {
                entry.vtable = parent_entry.vtable;
                entry.init_state = InitState::Initialized;
            }
        }
        entries.entries.push(entry);

        if iface.has_available_offset(entries.offset_index, index) {
            iface.set_offset(entries.offset_index, index);
        } else {
            entries.offset_index = self.find_free_offset(&entries);
            for (slot, e) in entries.entries.iter().enumerate() {
                if let Some(n) = self.lookup_node(e.iface_type) {
                    n.set_offset(entries.offset_index, slot);
                }
            }
            log::trace!(
                "[xtype] '{}' moved to interface offset {}",
                node.name,
                entries.offset_index
            );
        }
        node.iface_entries.store(Some(Arc::new(entries)));

        if parent_entry.is_some() {
            let entry = node.lookup_entry(iface.id);
            for child in g.state(node).children.iter().filter_map(|c| self.lookup_node(*c)) {
                self.add_iface_entry(g, &child, iface, entry);
            }
        }
    }

    /// Lowest offset at which every interface of `entries` is free or
    /// already points at its slot.
    fn find_free_offset(&self, entries: &IfaceEntries) -> usize {
        let ifaces: Vec<Option<Arc<TypeNode>>> = entries
            .entries
            .iter()
            .map(|e| self.lookup_node(e.iface_type))
            .collect();
        let mut offset = 0;
        loop {
            let free = ifaces.iter().enumerate().all(|(slot, iface)| {
                iface
                    .as_ref()
                    .map_or(true, |n| n.has_available_offset(offset, slot))
            });
            if free {
                return offset;
            }
            offset += 1;
        }
    }

    // ========================================================================
    // Holders and vtables
    // ========================================================================

    /// Make sure the holder of `instance_type` on `iface` carries its
    /// information. `Ok(false)` when there is no such holder.
    fn retrieve_holder_info(
        &self,
        g: &mut GraphGuard<'_>,
        iface: &Arc<TypeNode>,
        instance_type: TypeId,
    ) -> Result<bool> {
        let plugin = match g.state(iface).holder(instance_type) {
            None => return Ok(false),
            Some(holder) if holder.info.is_some() => return Ok(true),
            Some(holder) => holder.plugin.clone(),
        };
        let Some(plugin) = plugin else {
            return Err(critical(Error::InvalidState(format!(
                "holder of '{}' on '{}' has neither info nor plugin",
                self.descriptive_name(instance_type),
                iface.name
            ))));
        };

        self.data_ref_locked(g, iface)?;
        let completed = RwLockWriteGuard::unlocked(g, || {
            plugin.use_plugin(self)?;
            plugin
                .complete_interface_info(self, instance_type, iface.id)
                .map_err(|err| {
                    plugin.unuse_plugin(self);
                    err
                })
        });

        let already_set = g
            .state(iface)
            .holder(instance_type)
            .is_some_and(|h| h.info.is_some());
        let checked = match completed {
            Err(err) => Err((err, false)),
            Ok(_) if already_set => Err((
                critical(Error::InvalidState(format!(
                    "recursive plugin call while completing '{}'",
                    iface.name
                ))),
                true,
            )),
            Ok(info) => check_interface_info(
                &iface.name,
                &self.descriptive_name(instance_type),
                &info,
            )
            .map(|()| info)
            .map_err(|err| (err, true)),
        };

        match checked {
            Ok(info) => {
                if let Some(holder) = g.state_mut(iface).holder_mut(instance_type) {
                    holder.info = Some(info);
                }
                Ok(true)
            }
            Err((err, used)) => {
                log::warn!(
                    "[xtype] failed to complete interface '{}' for '{}': {}",
                    iface.name,
                    self.descriptive_name(instance_type),
                    err
                );
                RwLockWriteGuard::unlocked(g, || {
                    if used {
                        plugin.unuse_plugin(self);
                    }
                    self.data_unref(iface);
                });
                Err(Error::PluginFailed(iface.name.to_string()))
            }
        }
    }

    /// Drop the information of a dynamic holder and release its plugin.
    pub(super) fn blow_holder_info(
        &self,
        g: &mut GraphGuard<'_>,
        iface: &Arc<TypeNode>,
        instance_type: TypeId,
    ) {
        let plugin = match g.state_mut(iface).holder_mut(instance_type) {
            Some(holder) if holder.info.is_some() && holder.plugin.is_some() => {
                holder.info = None;
                holder.plugin.clone()
            }
            _ => return,
        };
        RwLockWriteGuard::unlocked(g, || {
            if let Some(plugin) = plugin {
                plugin.unuse_plugin(self);
            }
            self.data_unref(iface);
        });
    }

    /// Build the default vtable of an interface if missing.
    pub(super) fn ensure_dflt_vtable(
        &self,
        g: &mut GraphGuard<'_>,
        iface: &Arc<TypeNode>,
    ) -> Result<()> {
        let Some(record) = g.iface_record(iface) else {
            return Err(critical(Error::InvalidState(format!(
                "interface '{}' is not loaded",
                iface.name
            ))));
        };
        if record.dflt_vtable.is_some() {
            return Ok(());
        }
        let size = record.vtable_size.max(size_of::<InterfaceHeader>());
        let base_init = record.vtable_base_init.clone();
        let dflt_init = record.dflt_init.clone();
        let dflt_data = record.dflt_data.clone();

        let block = RawBlock::zeroed(size)?;
        // SAFETY: the block is at least one interface header long.
        let vtable = unsafe { VTableRef::from_raw(block.as_non_null()) };
        // SAFETY: freshly allocated, no other reference exists.
        unsafe {
            let header = vtable.header_mut();
            (*header).g_type = iface.id;
            (*header).g_instance_type = TypeId::INVALID;
        }
        if let Some(record) = g.iface_record_mut(iface) {
            record.dflt_vtable = Some(block);
        }
        if base_init.is_some() || dflt_init.is_some() {
            RwLockWriteGuard::unlocked(g, || {
                if let Some(f) = &base_init {
                    f(self, vtable.as_class());
                }
                if let Some(f) = &dflt_init {
                    f(self, vtable.as_class(), dflt_data.as_ref());
                }
            });
        }
        Ok(())
    }

    /// Allocate and base-initialize the vtable of `node` for `iface`.
    pub(super) fn vtable_base_init(
        &self,
        g: &mut GraphGuard<'_>,
        iface: &Arc<TypeNode>,
        node: &Arc<TypeNode>,
    ) -> VTableSetup {
        match self.retrieve_holder_info(g, iface, node.id) {
            Ok(false) => return VTableSetup::Inherit,
            Ok(true) => {}
            Err(err) => {
                log::error!(
                    "[xtype] no vtable for interface '{}' on '{}': {}",
                    iface.name,
                    node.name,
                    err
                );
                return VTableSetup::Failed;
            }
        }
        if let Err(err) = self.ensure_dflt_vtable(g, iface) {
            log::error!("[xtype] {}", err);
            return VTableSetup::Failed;
        }
        let Some(record) = g.iface_record(iface) else {
            return VTableSetup::Failed;
        };
        let size = record.vtable_size.max(size_of::<InterfaceHeader>());
        let base_init = record.vtable_base_init.clone();
        let source = node
            .parent()
            .and_then(|p| self.lookup_node(p))
            .and_then(|p| p.lookup_entry(iface.id))
            .and_then(|e| e.vtable)
            .map(|v| v.as_ptr().cast_const())
            .or_else(|| {
                record
                    .dflt_vtable
                    .as_ref()
                    .map(|b| b.as_non_null().as_ptr().cast_const())
            });

        let mut block = match RawBlock::zeroed(size) {
            Ok(block) => block,
            Err(err) => {
                log::error!("[xtype] {}", err);
                return VTableSetup::Failed;
            }
        };
        if let Some(source) = source {
            // SAFETY: parent and default vtables of this interface are `size`
            // bytes long and alive while their owners hold data references.
            unsafe { block.copy_from(source, size) };
        }
        // SAFETY: the block starts with an interface header.
        let vtable = unsafe { VTableRef::from_raw(block.as_non_null()) };
        // SAFETY: the block is not shared yet.
        unsafe {
            let header = vtable.header_mut();
            (*header).g_type = iface.id;
            (*header).g_instance_type = node.id;
        }
        g.state_mut(node).vtables.push((iface.id, block));
        node.update_entry(iface.id, |e| {
            e.vtable = Some(vtable);
            e.init_state = InitState::IfaceInit;
        });
        if let Some(f) = base_init {
            RwLockWriteGuard::unlocked(g, || f(self, vtable.as_class()));
        }
        VTableSetup::Own
    }

    /// Run the holder's `interface_init` and the interface checks, then
    /// publish the entry as initialized.
    pub(super) fn iface_init(
        &self,
        g: &mut GraphGuard<'_>,
        iface: &Arc<TypeNode>,
        node: &Arc<TypeNode>,
    ) {
        let Some(vtable) = node
            .lookup_entry(iface.id)
            .filter(|e| e.init_state == InitState::IfaceInit)
            .and_then(|e| e.vtable)
        else {
            return;
        };
        let info = g.state(iface).holder(node.id).and_then(|h| h.info.clone());
        let checks: Vec<InterfaceCheckFn> =
            g.iface_checks.iter().map(|(_, f)| Arc::clone(f)).collect();
        RwLockWriteGuard::unlocked(g, || {
            if let Some(info) = &info {
                if let Some(f) = &info.interface_init {
                    f(self, vtable, info.interface_data.as_ref());
                }
            }
            for check in &checks {
                check(self, vtable);
            }
        });
        node.update_entry(iface.id, |e| {
            if e.vtable == Some(vtable) {
                e.init_state = InitState::Initialized;
            }
        });
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Vtable of `iface_type` implemented by `class`, once initialized.
    pub fn interface_peek(&self, class: ClassRef, iface_type: TypeId) -> Option<VTableRef> {
        let node = self.lookup_node(class.type_id());
        match (node, self.lookup_node(iface_type)) {
            (Some(node), Some(iface)) if node.is_instantiatable => lookup_vtable(&node, &iface),
            _ => {
                log::warn!("[xtype] invalid class pointer {:p}", class.as_ptr());
                None
            }
        }
    }

    /// Vtable of the same interface on the parent of the vtable's class.
    pub fn interface_peek_parent(&self, vtable: VTableRef) -> Option<VTableRef> {
        let iface = self.lookup_node(vtable.iface_type())?;
        let node = self.lookup_node(vtable.instance_type())?;
        let pnode = self.lookup_node(node.parent()?)?;
        if !pnode.is_instantiatable {
            log::warn!("[xtype] invalid interface pointer {:p}", vtable.as_ptr());
            return None;
        }
        lookup_vtable(&pnode, &iface)
    }

    /// Plugin that supplies `iface_type` for `instance_type`, if dynamic.
    pub fn interface_plugin(
        &self,
        instance_type: TypeId,
        iface_type: TypeId,
    ) -> Option<Arc<dyn TypePlugin>> {
        if let (Some(_), Some(iface)) = (
            self.lookup_node(instance_type),
            self.lookup_node(iface_type),
        ) {
            let g = self.graph.read();
            if let Some(holder) = g.state(&iface).holder(instance_type) {
                return holder.plugin.clone();
            }
        }
        log::warn!(
            "[xtype] attempt to look up plugin for invalid instance/interface type pair '{}'/'{}'",
            self.descriptive_name(instance_type),
            self.descriptive_name(iface_type)
        );
        None
    }

    // ========================================================================
    // Prerequisites
    // ========================================================================

    /// Require every implementor of `iface_type` to also be `prereq_type`.
    pub fn interface_add_prerequisite(&self, iface_type: TypeId, prereq_type: TypeId) -> Result<()> {
        let iface = self.node_or_err(iface_type)?;
        let prereq = self.node_or_err(prereq_type)?;
        if !iface.is_interface() || iface.n_supers() == 0 {
            return Err(critical(Error::NotAnInterface(iface.name.to_string())));
        }
        if self.is_a(iface_type, prereq_type) || self.is_a(prereq_type, iface_type) {
            return Err(critical(Error::Prerequisite(format!(
                "'{}' and '{}' are already related",
                iface.name, prereq.name
            ))));
        }

        let mut g = self.graph.write();
        if let Some(holder) = g.state(&iface).holders.first() {
            return Err(critical(Error::Prerequisite(format!(
                "unable to add prerequisite '{}' to interface '{}' which is already in use for '{}'",
                prereq.name,
                iface.name,
                self.descriptive_name(holder.instance_type)
            ))));
        }

        if prereq.is_instantiatable {
            let existing = g
                .state(&iface)
                .prerequisites
                .iter()
                .filter_map(|p| self.lookup_node(*p))
                .find(|p| p.is_instantiatable);
            if let Some(existing) = existing {
                return Err(critical(Error::Prerequisite(format!(
                    "adding prerequisite '{}' to interface '{}' conflicts with existing prerequisite '{}'",
                    prereq.name, iface.name, existing.name
                ))));
            }
            for ancestor in prereq.supers.iter().filter_map(|t| self.lookup_node(*t)) {
                self.add_prerequisite_locked(&mut g, &iface, &ancestor);
            }
        } else if prereq.is_interface() {
            let inherited = g.state(&prereq).prerequisites.clone();
            for p in inherited.iter().filter_map(|t| self.lookup_node(*t)) {
                self.add_prerequisite_locked(&mut g, &iface, &p);
            }
            self.add_prerequisite_locked(&mut g, &iface, &prereq);
        } else {
            return Err(critical(Error::Prerequisite(format!(
                "prerequisite '{}' for interface '{}' is neither instantiatable nor interface",
                prereq.name, iface.name
            ))));
        }
        log::debug!(
            "[xtype] interface '{}' now requires '{}'",
            iface.name,
            prereq.name
        );
        Ok(())
    }

    fn add_prerequisite_locked(
        &self,
        g: &mut super::Graph,
        iface: &Arc<TypeNode>,
        prereq: &Arc<TypeNode>,
    ) {
        let state = g.state_mut(iface);
        match state.prerequisites.binary_search(&prereq.id) {
            Ok(_) => return,
            Err(pos) => state.prerequisites.insert(pos, prereq.id),
        }
        if prereq.is_interface() {
            g.state_mut(prereq).dependants.push(iface.id);
        }
        let dependants = g.state(iface).dependants.clone();
        for dependant in dependants.iter().filter_map(|d| self.lookup_node(*d)) {
            self.add_prerequisite_locked(g, &dependant, prereq);
        }
    }

    /// Prerequisites of an interface: interfaces first, then the most
    /// derived instantiatable prerequisite.
    pub fn interface_prerequisites(&self, iface_type: TypeId) -> Vec<TypeId> {
        let Some(iface) = self.lookup_node(iface_type).filter(|n| n.is_interface()) else {
            return Vec::new();
        };
        let g = self.graph.read();
        let mut types = Vec::new();
        let mut instantiatable: Option<Arc<TypeNode>> = None;
        for node in g.state(&iface).prerequisites.iter().filter_map(|p| self.lookup_node(*p)) {
            if node.is_instantiatable {
                if instantiatable.as_ref().map_or(true, |i| i.is_ancestor_of(&node)) {
                    instantiatable = Some(node);
                }
            } else {
                types.push(node.id);
            }
        }
        types.extend(instantiatable.map(|n| n.id));
        types
    }

    /// Most derived instantiatable prerequisite of an interface.
    pub fn interface_instantiatable_prerequisite(&self, iface_type: TypeId) -> Option<TypeId> {
        let iface = self.lookup_node(iface_type).filter(|n| n.is_interface())?;
        let g = self.graph.read();
        g.state(&iface)
            .prerequisites
            .iter()
            .filter_map(|p| self.lookup_node(*p))
            .filter(|n| n.is_instantiatable)
            .fold(None::<Arc<TypeNode>>, |best, node| match best {
                Some(best) if !best.is_ancestor_of(&node) => Some(best),
                _ => Some(node),
            })
            .map(|n| n.id)
    }

    // ========================================================================
    // Interface checks
    // ========================================================================

    /// Install a hook observing every vtable right after its `interface_init`.
    pub fn add_interface_check(
        &self,
        check: impl Fn(&TypeRegistry, VTableRef) + Send + Sync + 'static,
    ) -> InterfaceCheckId {
        let mut g = self.graph.write();
        let id = InterfaceCheckId(g.next_check_id);
        g.next_check_id += 1;
        g.iface_checks.push((id, Arc::new(check)));
        id
    }

    /// Remove a hook installed with [`add_interface_check`](Self::add_interface_check).
    pub fn remove_interface_check(&self, id: InterfaceCheckId) -> bool {
        let mut g = self.graph.write();
        match g.iface_checks.iter().position(|(i, _)| *i == id) {
            Some(pos) => {
                g.iface_checks.remove(pos);
                true
            }
            None => {
                log::warn!("[xtype] cannot remove unregistered interface check {:?}", id);
                false
            }
        }
    }
}

/// Lock-free lookup: probe the offset table, fall back to a scan when the
/// probe is stale.
pub(crate) fn lookup_vtable(node: &TypeNode, iface: &TypeNode) -> Option<VTableRef> {
    let guard = node.iface_entries.load();
    let entries = (*guard).as_ref()?;
    let probed = iface
        .offset_slot(entries.offset_index)
        .and_then(|slot| entries.entries.get(slot))
        .filter(|e| e.iface_type == iface.id);
    let entry = match probed {
        Some(entry) => entry,
        None => entries.find(iface.id)?.1,
    };
    if entry.init_state == InitState::Initialized {
        entry.vtable
    } else {
        None
    }
}

fn check_interface_info(iface_name: &str, type_name: &str, info: &InterfaceInfo) -> Result<()> {
    if (info.interface_finalize.is_some() || info.interface_data.is_some())
        && info.interface_init.is_none()
    {
        return Err(critical(Error::InvalidInterfaceInfo(format!(
            "interface type '{}' for type '{}' comes without initializer",
            iface_name, type_name
        ))));
    }
    Ok(())
}
