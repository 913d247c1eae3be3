// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Descriptions supplied when registering types and interfaces.
//!
//! Hooks are shared closures so that dynamic plugins can hand the same
//! description out repeatedly. Every hook receives the registry it runs in,
//! which lets init code reference other classes re-entrantly.

use crate::flags::FundamentalFlags;
use crate::id::TypeId;
use crate::memory::{ClassRef, InstanceRef, VTableRef};
use crate::registry::TypeRegistry;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Opaque user data attached to class and interface hooks.
pub type HookData = Arc<dyn Any + Send + Sync>;

/// Runs on a class (or vtable) for every ancestor that declares it.
pub type BaseInitFn = Arc<dyn Fn(&TypeRegistry, ClassRef) + Send + Sync>;
/// Undoes [`BaseInitFn`].
pub type BaseFinalizeFn = Arc<dyn Fn(&TypeRegistry, ClassRef) + Send + Sync>;
/// Initializes the class of the declaring type.
pub type ClassInitFn = Arc<dyn Fn(&TypeRegistry, ClassRef, Option<&HookData>) + Send + Sync>;
/// Undoes [`ClassInitFn`].
pub type ClassFinalizeFn = Arc<dyn Fn(&TypeRegistry, ClassRef, Option<&HookData>) + Send + Sync>;
/// Initializes the part of an instance owned by the declaring type. The
/// class handle is the class being instantiated; while the hook runs the
/// instance reports the declaring type's class.
pub type InstanceInitFn = Arc<dyn Fn(&TypeRegistry, InstanceRef, ClassRef) + Send + Sync>;
/// Fills an interface vtable for one implementing class.
pub type InterfaceInitFn = Arc<dyn Fn(&TypeRegistry, VTableRef, Option<&HookData>) + Send + Sync>;
/// Undoes [`InterfaceInitFn`].
pub type InterfaceFinalizeFn =
    Arc<dyn Fn(&TypeRegistry, VTableRef, Option<&HookData>) + Send + Sync>;
/// Observes every interface vtable after it was initialized.
pub type InterfaceCheckFn = Arc<dyn Fn(&TypeRegistry, VTableRef) + Send + Sync>;

/// Raw storage of a value slot.
pub type ValueData = [usize; 2];

/// Copies a boxed payload.
pub type BoxedCopyFn = Arc<dyn Fn(&(dyn Any + Send + Sync)) -> Box<dyn Any + Send + Sync> + Send + Sync>;
/// Releases a boxed payload.
pub type BoxedFreeFn = Arc<dyn Fn(Box<dyn Any + Send + Sync>) + Send + Sync>;

// ============================================================================
// TypeInfo
// ============================================================================

/// Sizes and hooks of a classed, instantiatable or interface type.
///
/// For interfaces `class_size` is the vtable size, `base_init` and
/// `base_finalize` run on every vtable, and `class_init`/`class_finalize`
/// run on the default vtable only.
#[derive(Clone, Default)]
pub struct TypeInfo {
    pub class_size: usize,
    pub base_init: Option<BaseInitFn>,
    pub base_finalize: Option<BaseFinalizeFn>,
    pub class_init: Option<ClassInitFn>,
    pub class_finalize: Option<ClassFinalizeFn>,
    pub class_data: Option<HookData>,
    pub instance_size: usize,
    pub n_preallocs: usize,
    pub instance_init: Option<InstanceInitFn>,
    pub value_table: Option<Arc<ValueTable>>,
}

impl TypeInfo {
    /// Info of a classed type with the given sizes.
    #[must_use]
    pub fn new(class_size: usize, instance_size: usize) -> Self {
        Self {
            class_size,
            instance_size,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_base_init(
        mut self,
        f: impl Fn(&TypeRegistry, ClassRef) + Send + Sync + 'static,
    ) -> Self {
        self.base_init = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn with_base_finalize(
        mut self,
        f: impl Fn(&TypeRegistry, ClassRef) + Send + Sync + 'static,
    ) -> Self {
        self.base_finalize = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn with_class_init(
        mut self,
        f: impl Fn(&TypeRegistry, ClassRef, Option<&HookData>) + Send + Sync + 'static,
    ) -> Self {
        self.class_init = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn with_class_finalize(
        mut self,
        f: impl Fn(&TypeRegistry, ClassRef, Option<&HookData>) + Send + Sync + 'static,
    ) -> Self {
        self.class_finalize = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn with_class_data(mut self, data: HookData) -> Self {
        self.class_data = Some(data);
        self
    }

    #[must_use]
    pub fn with_instance_init(
        mut self,
        f: impl Fn(&TypeRegistry, InstanceRef, ClassRef) + Send + Sync + 'static,
    ) -> Self {
        self.instance_init = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn with_n_preallocs(mut self, n: usize) -> Self {
        self.n_preallocs = n;
        self
    }

    #[must_use]
    pub fn with_value_table(mut self, table: ValueTable) -> Self {
        self.value_table = Some(Arc::new(table));
        self
    }
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeInfo")
            .field("class_size", &self.class_size)
            .field("instance_size", &self.instance_size)
            .field("n_preallocs", &self.n_preallocs)
            .field("base_init", &self.base_init.is_some())
            .field("class_init", &self.class_init.is_some())
            .field("instance_init", &self.instance_init.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// InterfaceInfo
// ============================================================================

/// Hooks binding an interface to one implementing class.
#[derive(Clone, Default)]
pub struct InterfaceInfo {
    pub interface_init: Option<InterfaceInitFn>,
    pub interface_finalize: Option<InterfaceFinalizeFn>,
    pub interface_data: Option<HookData>,
}

impl InterfaceInfo {
    #[must_use]
    pub fn new(f: impl Fn(&TypeRegistry, VTableRef, Option<&HookData>) + Send + Sync + 'static) -> Self {
        Self {
            interface_init: Some(Arc::new(f)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_finalize(
        mut self,
        f: impl Fn(&TypeRegistry, VTableRef, Option<&HookData>) + Send + Sync + 'static,
    ) -> Self {
        self.interface_finalize = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: HookData) -> Self {
        self.interface_data = Some(data);
        self
    }
}

impl fmt::Debug for InterfaceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceInfo")
            .field("interface_init", &self.interface_init.is_some())
            .field("interface_finalize", &self.interface_finalize.is_some())
            .finish_non_exhaustive()
    }
}

/// Capabilities of a fundamental type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FundamentalInfo {
    pub flags: FundamentalFlags,
}

impl FundamentalInfo {
    #[must_use]
    pub const fn new(flags: FundamentalFlags) -> Self {
        Self { flags }
    }
}

// ============================================================================
// ValueTable
// ============================================================================

/// Value slot hooks of a type.
#[derive(Clone, Default)]
pub struct ValueTable {
    pub value_init: Option<Arc<dyn Fn(&mut ValueData) + Send + Sync>>,
    pub value_free: Option<Arc<dyn Fn(&mut ValueData) + Send + Sync>>,
    pub value_copy: Option<Arc<dyn Fn(&ValueData, &mut ValueData) + Send + Sync>>,
    /// Collect signature, characters from `ilpd`.
    pub collect_format: String,
    /// Lcopy signature, characters from `ilpd`.
    pub lcopy_format: String,
}

impl fmt::Debug for ValueTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueTable")
            .field("value_init", &self.value_init.is_some())
            .field("value_copy", &self.value_copy.is_some())
            .field("collect_format", &self.collect_format)
            .field("lcopy_format", &self.lcopy_format)
            .finish_non_exhaustive()
    }
}

/// Copy and free hooks of a boxed type.
#[derive(Clone)]
pub struct BoxedFuncs {
    pub copy: BoxedCopyFn,
    pub free: BoxedFreeFn,
}

/// Summary returned by `TypeRegistry::query`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeQuery {
    pub type_id: TypeId,
    pub type_name: Arc<str>,
    pub class_size: usize,
    pub instance_size: usize,
    /// Preallocation hint, capped at `MAX_PREALLOCS`.
    pub n_preallocs: usize,
}
