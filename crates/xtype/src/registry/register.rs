// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type registration and type-info validation.

use super::{Graph, TypeRegistry};
use crate::config::{MAX_N_SUPERS, MAX_PREALLOCS};
use crate::error::{critical, Error, Result};
use crate::flags::{FundamentalFlags, TypeFlags};
use crate::id::TypeId;
use crate::info::{FundamentalInfo, TypeInfo, ValueTable};
use crate::memory::{ClassHeader, InstanceHeader, InterfaceHeader};
use crate::node::{
    ClassRecord, DataKind, IfaceRecord, InitState, InstanceRecord, NodeState, TypeData, TypeNode,
};
use crate::plugin::TypePlugin;
use parking_lot::RwLockWriteGuard;
use std::mem::size_of;
use std::sync::Arc;

/// Longest accepted collect/lcopy signature.
const MAX_COLLECT_FORMAT: usize = 8;

impl TypeRegistry {
    // ========================================================================
    // Public registration API
    // ========================================================================

    /// Register a fundamental type at a fixed id.
    pub fn register_fundamental(
        &self,
        type_id: TypeId,
        name: &str,
        info: TypeInfo,
        finfo: FundamentalInfo,
        flags: TypeFlags,
    ) -> Result<TypeId> {
        self.check_type_name(name)?;
        check_flags(flags)?;
        if !type_id.is_fundamental_slot() {
            return Err(critical(Error::InvalidFundamentalId(type_id)));
        }
        let fflags = finfo.flags & FundamentalFlags::MASK;
        if fflags.contains(FundamentalFlags::INSTANTIATABLE)
            && !fflags.contains(FundamentalFlags::CLASSED)
        {
            return Err(critical(Error::InvalidTypeInfo(format!(
                "cannot register instantiatable fundamental type '{}' as non-classed",
                name
            ))));
        }

        let mut g = self.graph.write();
        if self.lookup_node(type_id).is_some() {
            log::error!(
                "[xtype] cannot register existing fundamental type '{}' (as '{}')",
                self.descriptive_name(type_id),
                name
            );
            return Err(Error::InvalidFundamentalId(type_id));
        }
        self.check_name_free(name)?;
        check_type_info(
            &g,
            None,
            type_id == TypeId::INTERFACE,
            fflags,
            name,
            &info,
        )?;
        let value_table = check_value_table(name, info.value_table.as_ref());
        let node = self.new_node(&mut g, None, type_id, name, None, fflags, flags);
        self.make_data(&mut g, &node, &info, value_table);
        log::debug!("[xtype] registered fundamental '{}' as {:?}", name, type_id);
        Ok(type_id)
    }

    /// Register a static type derived from `parent`.
    pub fn register_static(
        &self,
        parent: TypeId,
        name: &str,
        info: TypeInfo,
        flags: TypeFlags,
    ) -> Result<TypeId> {
        self.check_type_name(name)?;
        check_flags(flags)?;
        let pnode = self.check_derivation(parent, name)?;
        if info.class_finalize.is_some() {
            return Err(critical(Error::InvalidTypeInfo(format!(
                "class finalizer specified for static type '{}'",
                name
            ))));
        }

        let _init = self.init_lock.lock();
        let mut g = self.graph.write();
        self.data_ref_locked(&mut g, &pnode)?;
        let checked = self.check_name_free(name).and_then(|()| {
            check_type_info(
                &g,
                Some(&pnode),
                pnode.is_interface(),
                pnode.fundamental_flags,
                name,
                &info,
            )
        });
        if let Err(err) = checked {
            RwLockWriteGuard::unlocked(&mut g, || self.data_unref(&pnode));
            return Err(err);
        }
        let value_table = check_value_table(name, info.value_table.as_ref());
        let node = self.new_node(
            &mut g,
            Some(&pnode),
            TypeId::INVALID,
            name,
            None,
            pnode.fundamental_flags,
            flags,
        );
        self.make_data(&mut g, &node, &info, value_table);
        log::debug!(
            "[xtype] registered static '{}' ({:?}) under '{}'",
            name,
            node.id,
            pnode.name
        );
        Ok(node.id)
    }

    /// Register a type whose information is supplied by `plugin` on first use.
    pub fn register_dynamic(
        &self,
        parent: TypeId,
        name: &str,
        plugin: Arc<dyn TypePlugin>,
        flags: TypeFlags,
    ) -> Result<TypeId> {
        self.check_type_name(name)?;
        check_flags(flags)?;
        let pnode = self.check_derivation(parent, name)?;

        let mut g = self.graph.write();
        self.check_name_free(name)?;
        let node = self.new_node(
            &mut g,
            Some(&pnode),
            TypeId::INVALID,
            name,
            Some(plugin),
            pnode.fundamental_flags,
            flags,
        );
        log::debug!(
            "[xtype] registered dynamic '{}' ({:?}) under '{}'",
            name,
            node.id,
            pnode.name
        );
        Ok(node.id)
    }

    // ========================================================================
    // Validation
    // ========================================================================

    pub(crate) fn check_type_name(&self, name: &str) -> Result<()> {
        let bytes = name.as_bytes();
        if bytes.len() < 3 {
            log::error!("[xtype] type name '{}' is too short", name);
            return Err(Error::InvalidName(name.to_string()));
        }
        let first_ok = bytes[0].is_ascii_alphabetic() || bytes[0] == b'_';
        let rest_ok = bytes[1..]
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'+'));
        if !(first_ok && rest_ok) {
            log::error!("[xtype] type name '{}' contains invalid characters", name);
            return Err(Error::InvalidName(name.to_string()));
        }
        self.check_name_free(name)
    }

    fn check_name_free(&self, name: &str) -> Result<()> {
        if self.names.contains_key(name) {
            return Err(critical(Error::DuplicateName(name.to_string())));
        }
        Ok(())
    }

    fn check_derivation(&self, parent: TypeId, name: &str) -> Result<Arc<TypeNode>> {
        let Some(pnode) = self.lookup_node(parent) else {
            log::error!(
                "[xtype] cannot derive type '{}' from invalid parent type '{}'",
                name,
                self.descriptive_name(parent)
            );
            return Err(Error::InvalidParent(parent));
        };
        if pnode.is_final() {
            return Err(critical(Error::FinalParent {
                name: name.to_string(),
                parent: pnode.name.to_string(),
            }));
        }
        if !pnode.fundamental_flags.contains(FundamentalFlags::DERIVABLE) {
            return Err(critical(Error::NotDerivable {
                name: name.to_string(),
                parent: pnode.name.to_string(),
            }));
        }
        if parent != pnode.fundamental() && !pnode.is_deep_derivable() {
            return Err(critical(Error::NotDeepDerivable {
                name: name.to_string(),
                parent: pnode.name.to_string(),
            }));
        }
        if pnode.n_supers() + 1 > MAX_N_SUPERS {
            return Err(critical(Error::TooDeep(name.to_string())));
        }
        Ok(pnode)
    }

    // ========================================================================
    // Node creation
    // ========================================================================

    /// Create and publish a node. `fundamental_id` is used when `parent` is
    /// `None`; derived ids are allocated from the node table.
    pub(super) fn new_node(
        &self,
        g: &mut Graph,
        parent: Option<&Arc<TypeNode>>,
        fundamental_id: TypeId,
        name: &str,
        plugin: Option<Arc<dyn TypePlugin>>,
        fundamental_flags: FundamentalFlags,
        flags: TypeFlags,
    ) -> Arc<TypeNode> {
        let slot = g.states.len();
        let (id, supers) = match parent {
            None => (fundamental_id, vec![fundamental_id]),
            Some(pnode) => {
                let id = TypeId::derived(self.nodes.load().derived.len());
                let mut supers = Vec::with_capacity(pnode.supers.len() + 1);
                supers.push(id);
                supers.extend_from_slice(&pnode.supers);
                (id, supers)
            }
        };
        let (qname, interned) = self.quarks.intern(name);
        let node = Arc::new(TypeNode::new(
            id,
            slot,
            Arc::clone(&interned),
            qname,
            supers.into_boxed_slice(),
            plugin,
            fundamental_flags & FundamentalFlags::MASK,
            flags,
        ));
        g.states.push(NodeState::default());

        match parent {
            Some(pnode) => {
                if !node.is_interface() {
                    // Inherited entries start without vtables; class init
                    // fills them from the parent.
                    let guard = pnode.iface_entries.load();
                    if let Some(parent_entries) = &*guard {
                        let mut entries = (**parent_entries).clone();
                        for entry in &mut entries.entries {
                            entry.vtable = None;
                            entry.init_state = InitState::Uninitialized;
                            entry.from_parent = true;
                        }
                        node.iface_entries.store(Some(Arc::new(entries)));
                    }
                }
                g.state_mut(pnode).children.push(id);
            }
            None => {
                if id.fundamental_index() == g.next_fundamental {
                    g.next_fundamental += 1;
                }
            }
        }

        self.names.insert(interned, id);
        self.publish_node(Arc::clone(&node));
        self.bump_serial();
        node
    }

    /// Install type data built from `info` and take the first reference.
    pub(crate) fn make_data(
        &self,
        g: &mut Graph,
        node: &Arc<TypeNode>,
        info: &TypeInfo,
        value_table: Option<Arc<ValueTable>>,
    ) {
        let pnode = node.parent().and_then(|p| self.lookup_node(p));
        let value_table = value_table.or_else(|| {
            pnode
                .as_ref()
                .and_then(|p| g.data(p).and_then(|d| d.value_table.clone()))
        });
        let parent_class = pnode.as_ref().and_then(|p| g.class_record(p));

        let kind = if node.is_classed {
            let instance = node.is_instantiatable.then(|| InstanceRecord {
                instance_size: info.instance_size,
                private_size: parent_class
                    .and_then(|c| c.instance.as_ref())
                    .map_or(0, |i| i.private_size),
                n_preallocs: info.n_preallocs.min(MAX_PREALLOCS),
                instance_init: info.instance_init.clone(),
            });
            DataKind::Class(ClassRecord {
                class_size: info.class_size,
                class_private_size: parent_class.map_or(0, |c| c.class_private_size),
                base_init: info.base_init.clone(),
                base_finalize: info.base_finalize.clone(),
                class_init: info.class_init.clone(),
                class_finalize: info.class_finalize.clone(),
                class_data: info.class_data.clone(),
                class: None,
                instance,
            })
        } else if node.is_interface() {
            DataKind::Iface(IfaceRecord {
                vtable_size: info.class_size,
                vtable_base_init: info.base_init.clone(),
                vtable_base_finalize: info.base_finalize.clone(),
                dflt_init: info.class_init.clone(),
                dflt_finalize: info.class_finalize.clone(),
                dflt_data: info.class_data.clone(),
                dflt_vtable: None,
            })
        } else {
            DataKind::Common
        };

        g.state_mut(node).data = Some(TypeData {
            value_table,
            boxed: None,
            kind,
        });
        node.set_ref_count(1);
    }
}

// ============================================================================
// Free validation helpers
// ============================================================================

fn check_flags(flags: TypeFlags) -> Result<()> {
    if flags.invalid_bits() != 0 {
        return Err(critical(Error::InvalidFlags(flags.bits())));
    }
    Ok(())
}

/// Validate `info` against the capabilities of the fundamental and the
/// parent's loaded sizes.
pub(super) fn check_type_info(
    g: &Graph,
    pnode: Option<&Arc<TypeNode>>,
    is_interface: bool,
    fflags: FundamentalFlags,
    name: &str,
    info: &TypeInfo,
) -> Result<()> {
    let invalid = |msg: String| Err(critical(Error::InvalidTypeInfo(msg)));
    let parent_name = pnode.map(|p| Arc::clone(&p.name));

    if !fflags.contains(FundamentalFlags::INSTANTIATABLE)
        && (info.instance_size != 0 || info.n_preallocs != 0 || info.instance_init.is_some())
    {
        return invalid(match &parent_name {
            Some(parent) => format!(
                "cannot instantiate '{}', derived from non-instantiatable parent type '{}'",
                name, parent
            ),
            None => format!("cannot instantiate '{}' as non-instantiatable fundamental", name),
        });
    }

    let has_class_members = info.class_init.is_some()
        || info.class_finalize.is_some()
        || info.class_data.is_some()
        || info.class_size != 0
        || info.base_init.is_some()
        || info.base_finalize.is_some();
    if !(fflags.contains(FundamentalFlags::CLASSED) || is_interface) && has_class_members {
        return invalid(match &parent_name {
            Some(parent) => format!(
                "cannot create class for '{}', derived from non-classed parent type '{}'",
                name, parent
            ),
            None => format!("cannot create class for '{}' as non-classed fundamental", name),
        });
    }

    // The INTERFACE fundamental itself carries no vtable.
    if is_interface && pnode.is_some() && info.class_size < size_of::<InterfaceHeader>() {
        return invalid(format!(
            "specified interface size for type '{}' is smaller than the interface header size",
            name
        ));
    }

    let parent_class = pnode.and_then(|p| g.class_record(p));

    if fflags.contains(FundamentalFlags::CLASSED) {
        if info.class_size < size_of::<ClassHeader>() {
            return invalid(format!(
                "specified class size for type '{}' is smaller than the class header size",
                name
            ));
        }
        if let (Some(parent), Some(pclass)) = (&parent_name, parent_class) {
            if info.class_size < pclass.class_size {
                return invalid(format!(
                    "specified class size for type '{}' is smaller than the parent type's '{}' class size",
                    name, parent
                ));
            }
        }
    }

    if fflags.contains(FundamentalFlags::INSTANTIATABLE) {
        if info.instance_size < size_of::<InstanceHeader>() {
            return invalid(format!(
                "specified instance size for type '{}' is smaller than the instance header size",
                name
            ));
        }
        let parent_instance = parent_class.and_then(|c| c.instance.as_ref());
        if let (Some(parent), Some(pinstance)) = (&parent_name, parent_instance) {
            if info.instance_size < pinstance.instance_size {
                return invalid(format!(
                    "specified instance size for type '{}' is smaller than the parent type's '{}' instance size",
                    name, parent
                ));
            }
        }
    }
    Ok(())
}

/// Accept a value table or drop it with a warning. Invalid tables do not
/// fail the registration.
pub(super) fn check_value_table(
    name: &str,
    table: Option<&Arc<ValueTable>>,
) -> Option<Arc<ValueTable>> {
    let table = table?;
    if table.value_init.is_none() {
        if table.value_free.is_some()
            || table.value_copy.is_some()
            || !table.collect_format.is_empty()
            || !table.lcopy_format.is_empty()
        {
            log::warn!("[xtype] cannot handle uninitializable values of type '{}'", name);
        }
        return None;
    }
    if table.value_copy.is_none() {
        log::warn!("[xtype] missing 'value_copy()' for type '{}'", name);
        return None;
    }
    for (what, format) in [
        ("collect_format", &table.collect_format),
        ("lcopy_format", &table.lcopy_format),
    ] {
        if !check_collect_format(format) {
            log::warn!(
                "[xtype] the '{}' format string for type '{}' is too long or invalid",
                what,
                name
            );
            return None;
        }
    }
    Some(Arc::clone(table))
}

fn check_collect_format(format: &str) -> bool {
    format.len() <= MAX_COLLECT_FORMAT && format.bytes().all(|c| matches!(c, b'i' | b'l' | b'p' | b'd'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::ValueData;

    #[test]
    fn test_collect_format() {
        assert!(check_collect_format(""));
        assert!(check_collect_format("ilpd"));
        assert!(!check_collect_format("x"));
        assert!(!check_collect_format("iiiiiiiii"));
    }

    #[test]
    fn test_value_table_requires_copy() {
        let table = Arc::new(ValueTable {
            value_init: Some(Arc::new(|_: &mut ValueData| {})),
            ..ValueTable::default()
        });
        assert!(check_value_table("T", Some(&table)).is_none());

        let table = Arc::new(ValueTable {
            value_init: Some(Arc::new(|_: &mut ValueData| {})),
            value_copy: Some(Arc::new(|src: &ValueData, dst: &mut ValueData| *dst = *src)),
            collect_format: "p".into(),
            ..ValueTable::default()
        });
        assert!(check_value_table("T", Some(&table)).is_some());
    }
}
