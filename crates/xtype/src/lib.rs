// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # xtype - Dynamic Type Registry
//!
//! Runtime type system with single inheritance, interfaces, lazily built
//! classes, instance-private data and plugin-backed (dynamic) types.
//!
//! ## Quick Start
//!
//! ```rust
//! use xtype::{
//!     FundamentalFlags, FundamentalInfo, InterfaceInfo, TypeFlags, TypeId, TypeInfo,
//!     TypeRegistry,
//! };
//!
//! let registry = TypeRegistry::new(Default::default());
//! let object = registry.register_fundamental(
//!     TypeId::OBJECT,
//!     "xobject_t",
//!     TypeInfo::new(64, 16),
//!     FundamentalInfo::new(FundamentalFlags::CLASSED
//!         | FundamentalFlags::INSTANTIATABLE
//!         | FundamentalFlags::DERIVABLE
//!         | FundamentalFlags::DEEP_DERIVABLE),
//!     TypeFlags::NONE,
//! )?;
//! let my_obj = registry.register_static(object, "MyObj", TypeInfo::new(64, 32), TypeFlags::NONE)?;
//! let iface = registry.register_static(TypeId::INTERFACE, "MyIface", TypeInfo::new(32, 0), TypeFlags::NONE)?;
//! registry.add_interface_static(my_obj, iface, InterfaceInfo::default())?;
//!
//! let instance = registry.create_instance(my_obj)?;
//! let class = instance.class().unwrap();
//! let vtable = registry.interface_peek(class, iface).unwrap();
//! assert_eq!(vtable.instance_type(), my_obj);
//! registry.free_instance(instance)?;
//! # Ok::<(), xtype::Error>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------+
//! |  TypeRegistry (public API)                                    |
//! +---------------------------------------------------------------+
//! |  register | class state machine | interfaces | instances      |
//! +---------------------------------------------------------------+
//! |  TypeNode (immortal)  |  NodeState (graph lock)  |  TypePlugin |
//! +---------------------------------------------------------------+
//! |  arc-swap snapshots   |  parking_lot locks   |  dashmap index  |
//! +---------------------------------------------------------------+
//! ```
//!
//! ## Modules Overview
//!
//! - [`registry`] - node store, initialization engine and dispatch
//! - [`module`] - [`TypeModule`], a ready-made plugin host
//! - [`memory`] - class, vtable and instance handles
//! - [`config`] - constants and [`RegistryConfig`]

/// Tunables, limits and debug flags.
pub mod config;
/// Error type and boundary codes.
pub mod error;
/// Fundamental and type flags.
pub mod flags;
/// Type identifiers.
pub mod id;
/// Registration records and hook signatures.
pub mod info;
/// Raw class, vtable and instance memory.
pub mod memory;
/// Plugin host for groups of dynamic types.
pub mod module;
mod node;
/// Loader interface for dynamic types.
pub mod plugin;
/// Interned strings.
pub mod quark;
/// The type registry.
pub mod registry;

pub use config::{DebugFlags, RegistryConfig};
pub use error::{Error, ErrorCode, Result};
pub use flags::{FundamentalFlags, TypeFlags};
pub use id::TypeId;
pub use info::{
    BoxedFuncs, FundamentalInfo, HookData, InterfaceInfo, TypeInfo, TypeQuery, ValueData,
    ValueTable,
};
pub use memory::{ClassHeader, ClassRef, InstanceHeader, InstanceRef, InterfaceHeader, VTableRef};
pub use module::{ModuleLoader, TypeModule};
pub use node::InitState;
pub use plugin::TypePlugin;
pub use quark::Quark;
pub use registry::{InterfaceCheckId, TypeRegistry};

use parking_lot::RwLock;
use std::sync::Arc;

static GLOBAL_REGISTRY: RwLock<Option<Arc<TypeRegistry>>> = parking_lot::const_rwlock(None);

/// Initialize the process-wide registry. Later calls return the existing
/// registry and ignore `config`.
pub fn init(config: RegistryConfig) -> Arc<TypeRegistry> {
    if let Some(registry) = GLOBAL_REGISTRY.read().as_ref() {
        return Arc::clone(registry);
    }
    let mut slot = GLOBAL_REGISTRY.write();
    match slot.as_ref() {
        Some(registry) => Arc::clone(registry),
        None => {
            log::debug!("[xtype] initializing global registry");
            let registry = Arc::new(TypeRegistry::new(config));
            *slot = Some(Arc::clone(&registry));
            registry
        }
    }
}

/// Process-wide registry, initialized with defaults (and `XTYPE_DEBUG`) on
/// first use.
pub fn global() -> Arc<TypeRegistry> {
    if let Some(registry) = GLOBAL_REGISTRY.read().as_ref() {
        return Arc::clone(registry);
    }
    init(RegistryConfig::default())
}

/// Drop the process-wide registry. Handles obtained from it stay valid
/// while their `Arc<TypeRegistry>` is alive.
#[doc(hidden)]
pub fn teardown() {
    if GLOBAL_REGISTRY.write().take().is_some() {
        log::debug!("[xtype] global registry torn down");
    }
}

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
