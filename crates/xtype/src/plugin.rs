// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Loader interface for dynamic types.

use crate::error::Result;
use crate::id::TypeId;
use crate::info::{InterfaceInfo, TypeInfo};
use crate::registry::TypeRegistry;
use std::sync::Arc;

/// Supplies type and interface information on demand.
///
/// The registry calls `use_plugin` before asking for information and
/// `unuse_plugin` once the information is released. All calls happen with
/// the registry's graph lock released, so implementations may call back
/// into the registry.
pub trait TypePlugin: Send + Sync {
    /// Make the plugin's types available (load code, register types).
    fn use_plugin(&self, registry: &TypeRegistry) -> Result<()>;

    /// Release what `use_plugin` acquired.
    fn unuse_plugin(&self, registry: &TypeRegistry);

    /// Information for a type registered with this plugin.
    fn complete_type_info(&self, registry: &TypeRegistry, type_id: TypeId) -> Result<TypeInfo>;

    /// Information for an interface added with this plugin.
    fn complete_interface_info(
        &self,
        registry: &TypeRegistry,
        instance_type: TypeId,
        iface_type: TypeId,
    ) -> Result<InterfaceInfo>;
}

/// Identity comparison of two plugin handles.
pub(crate) fn same_plugin(a: &Arc<dyn TypePlugin>, b: &Arc<dyn TypePlugin>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a).cast::<()>(),
        Arc::as_ptr(b).cast::<()>(),
    )
}
