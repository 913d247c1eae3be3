// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type data lifetime and class initialization.
//!
//! Class state machine:
//!
//! ```text
//! Uninitialized -> BaseClassInit -> BaseIfaceInit -> ClassInit -> IfaceInit -> Initialized
//! ```
//!
//! Dynamic types load their data through the plugin on the first reference
//! and release it on the last one, unless the registry retains them.

use super::iface::VTableSetup;
use super::register::{check_type_info, check_value_table};
use super::{GraphGuard, TypeRegistry};
use crate::config::align_struct;
use crate::error::{critical, Error, Result};
use crate::id::TypeId;
use crate::info::BaseFinalizeFn;
use crate::memory::{ClassRef, RawBlock, VTableRef};
use crate::node::{InitState, TypeData, TypeNode};
use parking_lot::RwLockWriteGuard;
use std::sync::Arc;

impl TypeRegistry {
    // ========================================================================
    // Type data references
    // ========================================================================

    /// Take a data reference, loading dynamic types through their plugin.
    ///
    /// The caller holds `init_lock` and the graph write lock. The lock is
    /// released around plugin calls.
    pub(crate) fn data_ref_locked(
        &self,
        g: &mut GraphGuard<'_>,
        node: &Arc<TypeNode>,
    ) -> Result<()> {
        if g.data(node).is_some() {
            node.inc_ref();
            return Ok(());
        }
        let Some(plugin) = node.plugin.clone() else {
            return Err(critical(Error::InvalidState(format!(
                "type '{}' has no data",
                node.name
            ))));
        };

        let pnode = node.parent().and_then(|p| self.lookup_node(p));
        if let Some(pnode) = &pnode {
            self.data_ref_locked(g, pnode)?;
        }

        let loaded = RwLockWriteGuard::unlocked(g, || {
            plugin.use_plugin(self)?;
            plugin.complete_type_info(self, node.id).map_err(|err| {
                plugin.unuse_plugin(self);
                err
            })
        });

        // `Err((err, true))` still holds the plugin reference.
        let checked = match loaded {
            Err(err) => Err((err, false)),
            Ok(_) if g.data(node).is_some() => Err((
                critical(Error::InvalidState(format!(
                    "recursive plugin call while loading '{}'",
                    node.name
                ))),
                true,
            )),
            Ok(info) => check_type_info(
                &**g,
                pnode.as_ref(),
                node.is_interface(),
                node.fundamental_flags,
                &node.name,
                &info,
            )
            .map(|()| info)
            .map_err(|err| (err, true)),
        };

        match checked {
            Ok(info) => {
                let value_table = check_value_table(&node.name, info.value_table.as_ref());
                self.make_data(g, node, &info, value_table);
                log::debug!("[xtype] loaded dynamic type '{}'", node.name);
                Ok(())
            }
            Err((err, used)) => {
                log::warn!("[xtype] failed to load dynamic type '{}': {}", node.name, err);
                RwLockWriteGuard::unlocked(g, || {
                    if used {
                        plugin.unuse_plugin(self);
                    }
                    if let Some(pnode) = &pnode {
                        self.data_unref(pnode);
                    }
                });
                Err(Error::PluginFailed(node.name.to_string()))
            }
        }
    }

    /// Drop a data reference. The last reference of a dynamic type unloads
    /// it unless [`RegistryConfig::retain_dynamic_types`](crate::RegistryConfig) is set.
    pub(crate) fn data_unref(&self, node: &Arc<TypeNode>) {
        if node.try_unref() {
            return;
        }
        if node.ref_count() == 0 {
            log::error!(
                "[xtype] cannot unreference type '{}' without references",
                node.name
            );
            return;
        }
        if node.plugin.is_none() {
            log::warn!("[xtype] static type '{}' unreferenced too often", node.name);
            return;
        }
        if self.config.retain_dynamic_types {
            log::trace!("[xtype] retaining dynamic type '{}'", node.name);
            return;
        }
        let _init = self.init_lock.lock();
        let mut g = self.graph.write();
        self.last_unref(&mut g, node);
    }

    fn last_unref(&self, g: &mut GraphGuard<'_>, node: &Arc<TypeNode>) {
        if node.try_unref() {
            return;
        }
        if g.data(node).is_none() || node.ref_count() == 0 {
            log::warn!(
                "[xtype] cannot drop last reference to unreferenced type '{}'",
                node.name
            );
            return;
        }
        node.dec_ref();

        if node.is_classed && node.class().is_some() {
            self.finalize_class_ifaces(g, node);
            node.set_init_state(InitState::Uninitialized);
            node.set_class(None);
            let ancestors: Vec<BaseFinalizeFn> = node.supers[1..]
                .iter()
                .filter_map(|t| self.lookup_node(*t))
                .filter_map(|n| g.class_record(&n).and_then(|c| c.base_finalize.clone()))
                .collect();
            let data = g.state_mut(node).data.take();
            RwLockWriteGuard::unlocked(g, || {
                finalize_class(self, data.as_ref(), &ancestors);
                drop(data);
            });
        } else if g.iface_record(node).is_some_and(|i| i.dflt_vtable.is_some()) {
            let data = g.state_mut(node).data.take();
            RwLockWriteGuard::unlocked(g, || {
                if let Some(iface) = data.as_ref().and_then(TypeData::iface) {
                    if let Some(block) = &iface.dflt_vtable {
                        // SAFETY: the default vtable block starts with an
                        // interface header and is alive until `data` drops.
                        let vtable = unsafe { VTableRef::from_raw(block.as_non_null()) };
                        if let Some(f) = &iface.dflt_finalize {
                            f(self, vtable.as_class(), iface.dflt_data.as_ref());
                        }
                        if let Some(f) = &iface.vtable_base_finalize {
                            f(self, vtable.as_class());
                        }
                    }
                }
                drop(data);
            });
        } else {
            g.state_mut(node).data = None;
        }
        log::debug!("[xtype] unloaded dynamic type '{}'", node.name);

        let plugin = node.plugin.clone();
        let pnode = node.parent().and_then(|p| self.lookup_node(p));
        RwLockWriteGuard::unlocked(g, || {
            if let Some(plugin) = plugin {
                plugin.unuse_plugin(self);
            }
            if let Some(pnode) = pnode {
                self.data_unref(&pnode);
            }
        });
    }

    /// Finalize and free interface vtables owned by a class being unloaded.
    fn finalize_class_ifaces(&self, g: &mut GraphGuard<'_>, node: &Arc<TypeNode>) {
        loop {
            let next = {
                let guard = node.iface_entries.load();
                (*guard).as_ref().and_then(|entries| {
                    entries
                        .entries
                        .iter()
                        .find(|e| e.vtable.is_some())
                        .map(|e| e.iface_type)
                })
            };
            let Some(iface_type) = next else {
                break;
            };
            node.update_entry(iface_type, |e| {
                e.vtable = None;
                e.init_state = InitState::Uninitialized;
            });
            let Some(block) = g.state_mut(node).take_vtable(iface_type) else {
                // Inherited vtable, owned by the parent.
                continue;
            };
            let Some(iface) = self.lookup_node(iface_type) else {
                continue;
            };
            let hooks = g
                .state(&iface)
                .holder(node.id)
                .and_then(|h| h.info.clone());
            let base_finalize = g
                .iface_record(&iface)
                .and_then(|i| i.vtable_base_finalize.clone());
            RwLockWriteGuard::unlocked(g, || {
                // SAFETY: the block was allocated as this class's vtable and
                // is still owned by `block`.
                let vtable = unsafe { VTableRef::from_raw(block.as_non_null()) };
                if let Some(info) = &hooks {
                    if let Some(f) = &info.interface_finalize {
                        f(self, vtable, info.interface_data.as_ref());
                    }
                }
                if let Some(f) = &base_finalize {
                    f(self, vtable.as_class());
                }
                drop(block);
            });
            self.blow_holder_info(g, &iface, node.id);
        }
    }

    // ========================================================================
    // Class initialization
    // ========================================================================

    /// Build the class of `node`. Caller holds `init_lock`, the graph write
    /// lock, a data reference on `node` and a class reference on its parent.
    fn class_init(&self, g: &mut GraphGuard<'_>, node: &Arc<TypeNode>) -> Result<()> {
        let pnode = node.parent().and_then(|p| self.lookup_node(p));
        let (class_size, class_private_size) = g
            .class_record(node)
            .map(|c| (c.class_size, c.class_private_size))
            .ok_or_else(|| critical(Error::NotClassed(node.name.to_string())))?;
        let total = if class_private_size != 0 {
            align_struct(class_size) + class_private_size
        } else {
            class_size
        };
        let mut block = RawBlock::zeroed(total)?;

        if let Some(pnode) = &pnode {
            if let (Some(pclass), Some(precord)) = (pnode.class(), g.class_record(pnode)) {
                let psize = precord.class_size;
                let ppriv = precord.class_private_size;
                let pinstance_private = precord.instance.as_ref().map(|i| i.private_size);
                // SAFETY: the parent class block holds `align(psize) + ppriv`
                // bytes and is kept alive by the caller's class reference.
                unsafe {
                    block.copy_from(pclass.as_ptr(), psize);
                    if ppriv != 0 {
                        block.copy_at(
                            align_struct(class_size),
                            pclass.as_ptr().add(align_struct(psize)),
                            ppriv,
                        );
                    }
                }
                if let (Some(private_size), Some(instance)) = (
                    pinstance_private,
                    g.class_record_mut(node).and_then(|c| c.instance.as_mut()),
                ) {
                    instance.private_size = private_size;
                }
            }
        }

        // SAFETY: the block starts with a class header and outlives every
        // handle until the class is finalized.
        let class = unsafe { ClassRef::from_raw(block.as_non_null()) };
        // SAFETY: freshly allocated, no other reference exists.
        unsafe { (*class.header_mut()).g_type = node.id };
        if let Some(record) = g.class_record_mut(node) {
            record.class = Some(block);
        }
        node.set_class(Some(class));
        node.set_init_state(InitState::BaseClassInit);
        log::trace!("[xtype] initializing class '{}'", node.name);

        let base_inits: Vec<_> = node
            .supers
            .iter()
            .rev()
            .filter_map(|t| self.lookup_node(*t))
            .filter_map(|n| g.class_record(&n).and_then(|c| c.base_init.clone()))
            .collect();
        RwLockWriteGuard::unlocked(g, || {
            for f in &base_inits {
                f(self, class);
            }
        });

        node.set_init_state(InitState::BaseIfaceInit);
        let mut i = 0;
        loop {
            let entry = {
                let guard = node.iface_entries.load();
                (*guard).as_ref().and_then(|e| e.entries.get(i).copied())
            };
            let Some(entry) = entry else {
                break;
            };
            i += 1;
            if entry.init_state == InitState::IfaceInit {
                continue;
            }
            let Some(iface) = self.lookup_node(entry.iface_type) else {
                continue;
            };
            if self.vtable_base_init(g, &iface, node) == VTableSetup::Inherit {
                let inherited = pnode
                    .as_ref()
                    .and_then(|p| p.lookup_entry(entry.iface_type))
                    .and_then(|e| e.vtable);
                match inherited {
                    Some(vtable) => node.update_entry(entry.iface_type, |e| {
                        e.vtable = Some(vtable);
                        e.init_state = InitState::Initialized;
                    }),
                    None => log::error!(
                        "[xtype] class '{}' inherits interface '{}' without a parent vtable",
                        node.name,
                        iface.name
                    ),
                }
            }
        }

        node.set_init_state(InitState::ClassInit);
        let (class_init, class_data) = g
            .class_record(node)
            .map(|c| (c.class_init.clone(), c.class_data.clone()))
            .unwrap_or((None, None));
        if let Some(f) = class_init {
            RwLockWriteGuard::unlocked(g, || f(self, class, class_data.as_ref()));
        }

        node.set_init_state(InitState::IfaceInit);
        let mut i = 0;
        loop {
            let entry = {
                let guard = node.iface_entries.load();
                (*guard).as_ref().and_then(|e| e.entries.get(i).copied())
            };
            let Some(entry) = entry else {
                break;
            };
            i += 1;
            if entry.init_state != InitState::IfaceInit {
                continue;
            }
            if let Some(iface) = self.lookup_node(entry.iface_type) {
                self.iface_init(g, &iface, node);
            }
        }

        node.set_init_state(InitState::Initialized);
        log::debug!("[xtype] class '{}' initialized", node.name);
        Ok(())
    }

    // ========================================================================
    // Class API
    // ========================================================================

    /// Reference the class of a classed type, creating it on first use.
    pub fn class_ref(&self, type_id: TypeId) -> Result<ClassRef> {
        let node = self.node_or_err(type_id)?;
        if !node.is_classed {
            return Err(critical(Error::NotClassed(node.name.to_string())));
        }
        let held = node.try_ref();
        if held && node.init_state() == InitState::Initialized {
            if let Some(class) = node.class() {
                return Ok(class);
            }
        }

        let _init = self.init_lock.lock();
        let pnode = node.parent().and_then(|p| self.lookup_node(p));
        if let Some(pnode) = &pnode {
            if let Err(err) = self.class_ref(pnode.id) {
                if held {
                    self.data_unref(&node);
                }
                return Err(err);
            }
        }

        let mut g = self.graph.write();
        let mut outcome = if held {
            Ok(())
        } else {
            self.data_ref_locked(&mut g, &node)
        };
        let referenced = outcome.is_ok();
        if referenced && node.class().is_none() {
            outcome = self.class_init(&mut g, &node);
        }
        let class = node.class();
        drop(g);

        if let Some(pnode) = &pnode {
            self.data_unref(pnode);
        }
        match (outcome, class) {
            (Ok(()), Some(class)) => Ok(class),
            (Ok(()), None) => {
                self.data_unref(&node);
                Err(critical(Error::InvalidState(format!(
                    "class of '{}' missing after initialization",
                    node.name
                ))))
            }
            (Err(err), _) => {
                if referenced {
                    self.data_unref(&node);
                }
                Err(err)
            }
        }
    }

    /// Release a reference taken with [`class_ref`](Self::class_ref).
    pub fn class_unref(&self, class: ClassRef) {
        match self.lookup_node(class.type_id()) {
            Some(node) if node.is_classed && node.ref_count() > 0 => self.data_unref(&node),
            _ => log::warn!(
                "[xtype] cannot unreference class of invalid (unclassed) type '{}'",
                self.descriptive_name(class.type_id())
            ),
        }
    }

    /// Initialized class of a type without taking a reference.
    pub fn class_peek(&self, type_id: TypeId) -> Option<ClassRef> {
        let node = self.lookup_node(type_id)?;
        if node.is_classed
            && node.ref_count() > 0
            && node.init_state() == InitState::Initialized
        {
            node.class()
        } else {
            None
        }
    }

    /// Like [`class_peek`](Self::class_peek) but only for static types.
    pub fn class_peek_static(&self, type_id: TypeId) -> Option<ClassRef> {
        let node = self.lookup_node(type_id)?;
        if node.plugin.is_some() {
            return None;
        }
        self.class_peek(type_id)
    }

    /// Class of the parent type of `class`.
    pub fn class_peek_parent(&self, class: ClassRef) -> Option<ClassRef> {
        let node = self.lookup_node(class.type_id())?;
        if !node.is_classed {
            return None;
        }
        let pnode = self.lookup_node(node.parent()?)?;
        pnode.class()
    }

    // ========================================================================
    // Default interface vtables
    // ========================================================================

    /// Reference the default vtable of an interface, creating it on first use.
    pub fn default_interface_ref(&self, iface_type: TypeId) -> Result<VTableRef> {
        let node = self.node_or_err(iface_type)?;
        if !node.is_interface() || node.n_supers() == 0 {
            return Err(critical(Error::NotAnInterface(node.name.to_string())));
        }
        let _init = self.init_lock.lock();
        let mut g = self.graph.write();
        if g.data(&node).is_some() && node.ref_count() == 0 {
            return Err(critical(Error::InvalidState(format!(
                "cannot retrieve default vtable for unreferenced interface '{}'",
                node.name
            ))));
        }
        self.data_ref_locked(&mut g, &node)?;
        if let Err(err) = self.ensure_dflt_vtable(&mut g, &node) {
            drop(g);
            self.data_unref(&node);
            return Err(err);
        }
        g.iface_record(&node)
            .and_then(|i| i.dflt_vtable.as_ref())
            // SAFETY: the default vtable block starts with an interface header.
            .map(|block| unsafe { VTableRef::from_raw(block.as_non_null()) })
            .ok_or_else(|| {
                critical(Error::InvalidState(format!(
                    "interface '{}' has no default vtable",
                    node.name
                )))
            })
    }

    /// Default vtable of an interface if it exists, without a reference.
    pub fn default_interface_peek(&self, iface_type: TypeId) -> Option<VTableRef> {
        let node = self.lookup_node(iface_type)?;
        if !node.is_interface() || node.ref_count() == 0 {
            return None;
        }
        let g = self.graph.read();
        g.iface_record(&node)
            .and_then(|i| i.dflt_vtable.as_ref())
            // SAFETY: the default vtable block starts with an interface header.
            .map(|block| unsafe { VTableRef::from_raw(block.as_non_null()) })
    }

    /// Release a reference taken with
    /// [`default_interface_ref`](Self::default_interface_ref).
    pub fn default_interface_unref(&self, vtable: VTableRef) {
        match self.lookup_node(vtable.iface_type()) {
            Some(node) if node.is_interface() => self.data_unref(&node),
            _ => log::warn!(
                "[xtype] cannot unreference invalid interface default vtable for '{}'",
                self.descriptive_name(vtable.iface_type())
            ),
        }
    }
}

/// Run class finalizers leaf first, then base finalizers up the chain.
fn finalize_class(registry: &TypeRegistry, data: Option<&TypeData>, ancestors: &[BaseFinalizeFn]) {
    let Some(record) = data.and_then(TypeData::class) else {
        return;
    };
    let Some(block) = &record.class else {
        return;
    };
    // SAFETY: the class block is owned by `data` and alive for this call.
    let class = unsafe { ClassRef::from_raw(block.as_non_null()) };
    if let Some(f) = &record.class_finalize {
        f(registry, class, record.class_data.as_ref());
    }
    if let Some(f) = &record.base_finalize {
        f(registry, class);
    }
    for f in ancestors {
        f(registry, class);
    }
}
