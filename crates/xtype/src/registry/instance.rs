// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Instances, private data and checked casts.
//!
//! Instance memory layout, low to high address:
//!
//! ```text
//! [ private areas (private_size) | public instance (instance_size) ]
//!                                ^ InstanceRef
//! ```
//!
//! Private areas of subclasses are prepended, so the private data of a
//! given type sits at a constant negative offset from the handle.

use super::TypeRegistry;
use crate::config::{align_struct, DebugFlags, MAX_PRIVATE_SIZE};
use crate::error::{critical, Error, Result};
use crate::id::TypeId;
use crate::info::InstanceInitFn;
use crate::memory::{self, ClassRef, InstanceRef};
use crate::node::{InitState, TypeNode};
use std::ptr::NonNull;
use std::sync::Arc;

impl TypeRegistry {
    // ========================================================================
    // Allocation
    // ========================================================================

    /// Allocate and initialize an instance of an instantiatable, non-abstract
    /// type. Holds a class reference until [`free_instance`](Self::free_instance).
    pub fn create_instance(&self, type_id: TypeId) -> Result<InstanceRef> {
        let node = self.node_or_err(type_id)?;
        if !node.is_instantiatable {
            return Err(critical(Error::NotInstantiatable(node.name.to_string())));
        }
        if node.is_abstract() {
            return Err(critical(Error::AbstractType(node.name.to_string())));
        }
        let class = self.class_ref(type_id)?;

        let layout = {
            let g = self.graph.read();
            g.data(&node).and_then(|d| d.instance()).map(|leaf| {
                let mut inits: Vec<(Option<ClassRef>, InstanceInitFn)> = node.supers[1..]
                    .iter()
                    .rev()
                    .filter_map(|t| self.lookup_node(*t))
                    .filter_map(|a| {
                        let init = g.data(&a)?.instance()?.instance_init.clone()?;
                        Some((a.class(), init))
                    })
                    .collect();
                if let Some(init) = &leaf.instance_init {
                    inits.push((Some(class), Arc::clone(init)));
                }
                (leaf.private_size, leaf.instance_size, inits)
            })
        };
        let Some((private_size, instance_size, inits)) = layout else {
            self.class_unref(class);
            return Err(critical(Error::InvalidState(format!(
                "type '{}' lost its instance data",
                node.name
            ))));
        };

        let base = match memory::alloc_instance(private_size + instance_size) {
            Ok(base) => base,
            Err(err) => {
                self.class_unref(class);
                return Err(err);
            }
        };
        // SAFETY: the allocation holds `private_size + instance_size` bytes
        // and `instance_size` is at least one instance header.
        let instance = unsafe { InstanceRef::from_raw(NonNull::new_unchecked(base.as_ptr().add(private_size))) };

        for (ancestor_class, init) in &inits {
            // SAFETY: the instance is not shared until returned.
            unsafe { (*instance.header_mut()).g_class = *ancestor_class };
            init(self, instance, class);
        }
        // SAFETY: as above.
        unsafe { (*instance.header_mut()).g_class = Some(class) };

        if self.config.debug.contains(DebugFlags::INSTANCE_COUNT) {
            node.add_instances(1);
        }
        log::trace!("[xtype] created instance of '{}' at {:p}", node.name, instance.as_ptr());
        Ok(instance)
    }

    /// Release an instance created with [`create_instance`](Self::create_instance).
    pub fn free_instance(&self, instance: InstanceRef) -> Result<()> {
        let Some(class) = instance.class() else {
            return Err(critical(Error::InvalidClass));
        };
        let node = self
            .lookup_node(class.type_id())
            .filter(|n| n.is_instantiatable && n.class() == Some(class));
        let Some(node) = node else {
            log::warn!(
                "[xtype] cannot free instance of invalid (non-instantiatable) type '{}'",
                self.descriptive_name(class.type_id())
            );
            return Err(Error::InvalidClass);
        };
        if node.is_abstract() {
            return Err(critical(Error::AbstractType(node.name.to_string())));
        }
        let sizes = {
            let g = self.graph.read();
            g.data(&node)
                .and_then(|d| d.instance())
                .map(|i| (i.private_size, i.instance_size))
        };
        let Some((private_size, instance_size)) = sizes else {
            return Err(critical(Error::InvalidClass));
        };

        // SAFETY: the instance was allocated by `create_instance` with the
        // same sizes; private sizes are frozen once the class is initialized.
        unsafe {
            (*instance.header_mut()).g_class = None;
            let base = NonNull::new_unchecked(instance.as_ptr().sub(private_size));
            memory::free_instance(base, private_size + instance_size);
        }
        if self.config.debug.contains(DebugFlags::INSTANCE_COUNT) {
            node.add_instances(-1);
        }
        self.class_unref(class);
        Ok(())
    }

    // ========================================================================
    // Instance private data
    // ========================================================================

    /// Reserve `size` bytes of instance-private data for the class being
    /// initialized. Returns the offset to pass to
    /// [`instance_private`](Self::instance_private).
    pub fn add_instance_private(&self, class: ClassRef, size: usize) -> Result<isize> {
        if size == 0 || size > MAX_PRIVATE_SIZE {
            return Err(critical(Error::InvalidPrivate(format!(
                "can't add private data of size {}",
                size
            ))));
        }
        let node = self
            .lookup_node(class.type_id())
            .filter(|n| n.is_classed && n.is_instantiatable && n.class() == Some(class))
            .ok_or_else(|| {
                critical(Error::InvalidPrivate(format!(
                    "cannot add private field to invalid (non-instantiatable) type '{}'",
                    self.descriptive_name(class.type_id())
                )))
            })?;
        if node.init_state() == InitState::Initialized {
            return Err(critical(Error::InvalidPrivate(format!(
                "cannot add private field to initialized class '{}'",
                node.name
            ))));
        }

        let mut g = self.graph.write();
        let parent_private = node
            .parent()
            .and_then(|p| self.lookup_node(p))
            .and_then(|p| g.data(&p).and_then(|d| d.instance()).map(|i| i.private_size))
            .unwrap_or(0);
        let Some(instance) = g.class_record_mut(&node).and_then(|c| c.instance.as_mut()) else {
            return Err(critical(Error::InvalidClass));
        };
        if instance.private_size != parent_private {
            return Err(critical(Error::InvalidPrivate(format!(
                "add_instance_private() called multiple times for '{}'",
                node.name
            ))));
        }
        let private_size = align_struct(instance.private_size + size);
        if private_size > MAX_PRIVATE_SIZE {
            return Err(critical(Error::InvalidPrivate(format!(
                "private data of '{}' exceeds {} bytes",
                node.name, MAX_PRIVATE_SIZE
            ))));
        }
        instance.private_size = private_size;
        Ok(-(private_size as isize))
    }

    /// Private area at `offset` as returned by
    /// [`add_instance_private`](Self::add_instance_private).
    ///
    /// `None` when `offset` does not fall inside the private areas of the
    /// instance's class.
    pub fn instance_private(&self, instance: InstanceRef, offset: isize) -> Option<NonNull<u8>> {
        let Some(class) = instance.class() else {
            critical(Error::InvalidClass);
            return None;
        };
        let private_size = self
            .lookup_node(class.type_id())
            .and_then(|n| self.private_size_of(&n))
            .unwrap_or(0);
        if offset >= 0 || offset.unsigned_abs() > private_size {
            critical(Error::InvalidPrivate(format!(
                "private offset {} out of range for '{}' ({} private bytes)",
                offset,
                self.descriptive_name(class.type_id()),
                private_size
            )));
            return None;
        }
        // SAFETY: `-private_size <= offset < 0` and the instance allocation
        // starts `private_size` bytes before the instance handle.
        Some(unsafe { instance.private_ptr(offset) })
    }

    /// Private area registered by `private_type` inside `instance`.
    pub fn instance_get_private(
        &self,
        instance: InstanceRef,
        private_type: TypeId,
    ) -> Option<NonNull<u8>> {
        let class = instance.class()?;
        let private_node = self.lookup_node(private_type).filter(|n| n.is_instantiatable);
        let instance_node = self.lookup_node(class.type_id());
        let (Some(private_node), Some(instance_node)) = (private_node, instance_node) else {
            log::warn!(
                "[xtype] instance of invalid non-instantiatable type '{}'",
                self.descriptive_name(class.type_id())
            );
            return None;
        };
        if !private_node.is_ancestor_of(&instance_node) {
            log::warn!(
                "[xtype] '{}' is not an ancestor of '{}'",
                private_node.name,
                instance_node.name
            );
            return None;
        }
        let private_size = self.private_size_of(&private_node)?;
        // SAFETY: `private_node` is an ancestor of the instance's class, so its
        // private areas are a prefix of the instance's private areas.
        Some(unsafe { instance.private_ptr(-(private_size as isize)) })
    }

    /// Offset of the instance-private data registered by the class's type.
    pub fn class_instance_private_offset(&self, class: ClassRef) -> Result<isize> {
        let node = self
            .lookup_node(class.type_id())
            .filter(|n| n.is_instantiatable)
            .ok_or_else(|| critical(Error::InvalidClass))?;
        let own = self.private_size_of(&node).unwrap_or(0);
        let parent = node
            .parent()
            .and_then(|p| self.lookup_node(p))
            .and_then(|p| self.private_size_of(&p))
            .unwrap_or(0);
        if own == parent {
            return Err(critical(Error::InvalidPrivate(format!(
                "class '{}' has no private data",
                node.name
            ))));
        }
        Ok(-(own as isize))
    }

    fn private_size_of(&self, node: &TypeNode) -> Option<usize> {
        let g = self.graph.read();
        g.data(node)
            .and_then(|d| d.instance())
            .map(|i| i.private_size)
    }

    // ========================================================================
    // Class private data
    // ========================================================================

    /// Reserve `size` bytes of class-private data, before the class exists.
    pub fn add_class_private(&self, type_id: TypeId, size: usize) -> Result<()> {
        if size == 0 {
            return Err(critical(Error::InvalidPrivate(
                "class private size must be positive".to_string(),
            )));
        }
        let node = self.node_or_err(type_id)?;
        let mut g = self.graph.write();
        if !node.is_classed || g.class_record(&node).is_none() {
            return Err(critical(Error::InvalidPrivate(format!(
                "cannot add class private field to invalid type '{}'",
                node.name
            ))));
        }
        if node.class().is_some() {
            return Err(critical(Error::InvalidPrivate(format!(
                "cannot add class private field to already initialized class '{}'",
                node.name
            ))));
        }
        let parent_private = node
            .parent()
            .and_then(|p| self.lookup_node(p))
            .and_then(|p| g.class_record(&p).map(|c| c.class_private_size))
            .unwrap_or(0);
        let Some(record) = g.class_record_mut(&node) else {
            return Err(critical(Error::InvalidClass));
        };
        if record.class_private_size != parent_private {
            return Err(critical(Error::InvalidPrivate(format!(
                "add_class_private() called multiple times for '{}'",
                node.name
            ))));
        }
        let offset = align_struct(record.class_private_size);
        record.class_private_size = offset + size;
        Ok(())
    }

    /// Class-private area registered by `private_type` inside `class`.
    pub fn class_private(&self, class: ClassRef, private_type: TypeId) -> Option<NonNull<u8>> {
        let class_node = self.lookup_node(class.type_id()).filter(|n| n.is_classed);
        let Some(class_node) = class_node else {
            log::warn!(
                "[xtype] class of invalid type '{}'",
                self.descriptive_name(class.type_id())
            );
            return None;
        };
        let private_node = self
            .lookup_node(private_type)
            .filter(|n| n.is_ancestor_of(&class_node));
        let Some(private_node) = private_node else {
            log::warn!(
                "[xtype] attempt to retrieve private data for invalid type '{}'",
                self.descriptive_name(private_type)
            );
            return None;
        };

        let g = self.graph.read();
        let mut offset = align_struct(g.class_record(&class_node)?.class_size);
        let own = g.class_record(&private_node)?.class_private_size;
        let parent = private_node
            .parent()
            .and_then(|p| self.lookup_node(p))
            .and_then(|p| g.class_record(&p).map(|c| c.class_private_size))
            .unwrap_or(0);
        if own == parent {
            log::warn!(
                "[xtype] class_private() requires a prior call to add_class_private() for '{}'",
                private_node.name
            );
            return None;
        }
        offset += align_struct(parent);
        // SAFETY: the class block holds `align(class_size) + class_private_size`
        // bytes and the private area of an ancestor lies inside it.
        Some(unsafe { NonNull::new_unchecked(class.as_ptr().add(offset)) })
    }

    // ========================================================================
    // Checked casts
    // ========================================================================

    /// Whether `instance` is a live instance of an instantiatable type.
    pub fn check_instance(&self, instance: Option<InstanceRef>) -> bool {
        let Some(instance) = instance else {
            log::warn!("[xtype] instance is NULL");
            return false;
        };
        let Some(class) = instance.class() else {
            log::warn!("[xtype] instance {:p} has no class", instance.as_ptr());
            return false;
        };
        let valid = self
            .lookup_node(class.type_id())
            .is_some_and(|n| n.is_instantiatable);
        if !valid {
            log::warn!(
                "[xtype] instance of invalid non-instantiatable type '{}'",
                self.descriptive_name(class.type_id())
            );
        }
        valid
    }

    /// `instance` viewed as `target`, or `None` with a warning when the
    /// cast is invalid.
    pub fn check_instance_cast(&self, instance: InstanceRef, target: TypeId) -> Option<InstanceRef> {
        let Some(class) = instance.class() else {
            log::warn!(
                "[xtype] invalid unclassed pointer in cast to '{}'",
                self.descriptive_name(target)
            );
            return None;
        };
        let node = self.lookup_node(class.type_id()).filter(|n| n.is_instantiatable);
        let Some(node) = node else {
            log::warn!(
                "[xtype] invalid uninstantiatable type '{}' in cast to '{}'",
                self.descriptive_name(class.type_id()),
                self.descriptive_name(target)
            );
            return None;
        };
        let ok = self
            .lookup_node(target)
            .is_some_and(|t| self.conforms_to(&node, &t, true, false));
        if ok {
            Some(instance)
        } else {
            log::warn!(
                "[xtype] invalid cast from '{}' to '{}'",
                node.name,
                self.descriptive_name(target)
            );
            None
        }
    }

    /// Whether the instance's class is `target`, derives from it or
    /// implements it.
    pub fn check_instance_is_a(&self, instance: InstanceRef, target: TypeId) -> bool {
        let Some(class) = instance.class() else {
            return false;
        };
        let Some(target_node) = self.lookup_node(target) else {
            return false;
        };
        if target_node.is_final() {
            return class.type_id() == target;
        }
        self.lookup_node(class.type_id())
            .is_some_and(|n| n.is_instantiatable && self.conforms_to(&n, &target_node, true, false))
    }

    /// Whether the instance's type has `fundamental` as its fundamental type.
    pub fn check_instance_is_fundamentally_a(&self, instance: InstanceRef, fundamental: TypeId) -> bool {
        instance
            .class()
            .and_then(|c| self.lookup_node(c.type_id()))
            .is_some_and(|n| n.fundamental() == fundamental)
    }

    /// `class` viewed as the class of `target`, or `None` with a warning.
    pub fn check_class_cast(&self, class: ClassRef, target: TypeId) -> Option<ClassRef> {
        let node = self.lookup_node(class.type_id()).filter(|n| n.is_classed);
        let Some(node) = node else {
            log::warn!(
                "[xtype] invalid unclassed type '{}' in class cast to '{}'",
                self.descriptive_name(class.type_id()),
                self.descriptive_name(target)
            );
            return None;
        };
        if self.check_class_is_a(class, target) {
            Some(class)
        } else {
            log::warn!(
                "[xtype] invalid class cast from '{}' to '{}'",
                node.name,
                self.descriptive_name(target)
            );
            None
        }
    }

    /// Whether `class` belongs to `target` or one of its descendants.
    pub fn check_class_is_a(&self, class: ClassRef, target: TypeId) -> bool {
        match (self.lookup_node(class.type_id()), self.lookup_node(target)) {
            (Some(node), Some(target)) if node.is_classed => {
                self.conforms_to(&node, &target, false, false)
            }
            _ => false,
        }
    }

    /// Type name of an instance for diagnostics.
    pub fn name_from_instance(&self, instance: Option<InstanceRef>) -> String {
        match instance {
            None => "<NULL-instance>".to_string(),
            Some(instance) => self.name_from_class(instance.class()),
        }
    }

    /// Type name of a class for diagnostics.
    pub fn name_from_class(&self, class: Option<ClassRef>) -> String {
        match class {
            None => "<NULL-class>".to_string(),
            Some(class) => self
                .name(class.type_id())
                .map_or_else(|| "<invalid>".to_string(), |n| n.to_string()),
        }
    }
}
