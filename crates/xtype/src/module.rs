// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Loadable module hosting dynamic types.
//!
//! A [`TypeModule`] is a ready-made [`TypePlugin`]. Its [`ModuleLoader`]
//! registers types and interfaces through the module every time it is
//! loaded; the module remembers the infos and hands them to the registry
//! on demand.
//!
//! ```text
//! registry            TypeModule               ModuleLoader
//!    |  use_plugin ------> use_count 0 -> 1 ------> load()
//!    |                                     <------- register_type()/add_interface()
//!    |  complete_type_info -> stored TypeInfo
//!    |  unuse_plugin ----> use_count 1 -> 0 ------> unload()
//! ```

use crate::error::{Error, Result};
use crate::flags::TypeFlags;
use crate::id::TypeId;
use crate::info::{InterfaceInfo, TypeInfo};
use crate::plugin::{same_plugin, TypePlugin};
use crate::registry::TypeRegistry;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// Code behind a [`TypeModule`].
pub trait ModuleLoader: Send + Sync {
    /// Load the module and register its types. Returns `false` on failure.
    fn load(&self, registry: &TypeRegistry, module: &TypeModule) -> bool;

    /// Release what `load` acquired.
    fn unload(&self, registry: &TypeRegistry, module: &TypeModule);
}

struct ModuleTypeInfo {
    loaded: bool,
    type_id: TypeId,
    parent: TypeId,
    info: TypeInfo,
}

struct ModuleIfaceInfo {
    loaded: bool,
    instance_type: TypeId,
    iface_type: TypeId,
    info: InterfaceInfo,
}

#[derive(Default)]
struct ModuleState {
    use_count: u32,
    type_infos: Vec<ModuleTypeInfo>,
    iface_infos: Vec<ModuleIfaceInfo>,
}

/// Plugin that loads a group of dynamic types on first use.
pub struct TypeModule {
    name: Mutex<Option<String>>,
    loader: Box<dyn ModuleLoader>,
    this: Weak<TypeModule>,
    state: Mutex<ModuleState>,
}

impl TypeModule {
    pub fn new(loader: impl ModuleLoader + 'static) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            name: Mutex::new(None),
            loader: Box::new(loader),
            this: this.clone(),
            state: Mutex::new(ModuleState::default()),
        })
    }

    pub fn with_name(name: &str, loader: impl ModuleLoader + 'static) -> Arc<Self> {
        let module = Self::new(loader);
        module.set_name(name);
        module
    }

    pub fn set_name(&self, name: &str) {
        *self.name.lock() = Some(name.to_string());
    }

    pub fn name(&self) -> Option<String> {
        self.name.lock().clone()
    }

    fn display_name(&self) -> String {
        self.name().unwrap_or_else(|| "(unknown)".to_string())
    }

    /// The module as a registry plugin handle.
    fn as_plugin(&self) -> Result<Arc<dyn TypePlugin>> {
        match self.this.upgrade() {
            Some(module) => Ok(module),
            None => Err(Error::PluginFailed(format!(
                "module '{}' is being dropped",
                self.display_name()
            ))),
        }
    }

    pub fn use_count(&self) -> u32 {
        self.state.lock().use_count
    }

    // ------------------------------------------------------------------------
    // Use count
    // ------------------------------------------------------------------------

    /// Take a use of the module, loading it on the first one.
    ///
    /// Every type registered by a previous load must be registered again,
    /// otherwise the load is undone and `false` is returned.
    pub fn use_module(&self, registry: &TypeRegistry) -> bool {
        {
            let mut state = self.state.lock();
            state.use_count += 1;
            if state.use_count > 1 {
                return true;
            }
        }

        log::debug!("[xtype::module] loading '{}'", self.display_name());
        if !self.loader.load(registry, self) {
            self.state.lock().use_count -= 1;
            log::warn!("[xtype::module] failed to load '{}'", self.display_name());
            return false;
        }

        let missing = {
            let state = self.state.lock();
            state.type_infos.iter().find(|t| !t.loaded).map(|t| t.type_id)
        };
        if let Some(type_id) = missing {
            log::warn!(
                "[xtype::module] plugin '{}' failed to register type '{}'",
                self.display_name(),
                registry.descriptive_name(type_id)
            );
            self.state.lock().use_count -= 1;
            return false;
        }
        true
    }

    /// Drop a use of the module, unloading it on the last one.
    pub fn unuse_module(&self, registry: &TypeRegistry) {
        {
            let mut state = self.state.lock();
            if state.use_count == 0 {
                log::warn!(
                    "[xtype::module] unuse of '{}' without matching use",
                    self.display_name()
                );
                return;
            }
            state.use_count -= 1;
            if state.use_count > 0 {
                return;
            }
        }

        log::debug!("[xtype::module] unloading '{}'", self.display_name());
        self.loader.unload(registry, self);
        let mut state = self.state.lock();
        for info in &mut state.type_infos {
            info.loaded = false;
        }
        for info in &mut state.iface_infos {
            info.loaded = false;
        }
    }

    // ------------------------------------------------------------------------
    // Registration, called from ModuleLoader::load
    // ------------------------------------------------------------------------

    /// Register (or re-register after a reload) a type owned by the module.
    pub fn register_type(
        &self,
        registry: &TypeRegistry,
        parent: TypeId,
        name: &str,
        info: TypeInfo,
        flags: TypeFlags,
    ) -> Result<TypeId> {
        let plugin = self.as_plugin()?;

        if let Some(existing) = registry.from_name(name) {
            let owned = registry
                .plugin(existing)
                .is_some_and(|old| same_plugin(&old, &plugin));
            if !owned {
                log::warn!("[xtype::module] two different plugins tried to register '{}'", name);
                return Err(Error::PluginFailed(format!(
                    "two different plugins tried to register '{}'",
                    name
                )));
            }

            let mut state = self.state.lock();
            let Some(entry) = state.type_infos.iter_mut().find(|t| t.type_id == existing) else {
                return Err(Error::InvalidState(format!(
                    "module '{}' lost its record of '{}'",
                    self.display_name(),
                    name
                )));
            };
            if entry.parent != parent {
                log::warn!(
                    "[xtype::module] type '{}' recreated with different parent type (was '{}', now '{}')",
                    name,
                    registry.descriptive_name(entry.parent),
                    registry.descriptive_name(parent)
                );
                return Err(Error::PluginFailed(format!(
                    "type '{}' recreated with different parent type",
                    name
                )));
            }
            entry.loaded = true;
            entry.info = info;
            return Ok(existing);
        }

        let type_id = registry.register_dynamic(parent, name, plugin, flags)?;
        self.state.lock().type_infos.push(ModuleTypeInfo {
            loaded: true,
            type_id,
            parent,
            info,
        });
        Ok(type_id)
    }

    /// Declare that a module type implements an interface.
    pub fn add_interface(
        &self,
        registry: &TypeRegistry,
        instance_type: TypeId,
        iface_type: TypeId,
        info: InterfaceInfo,
    ) -> Result<()> {
        let plugin = self.as_plugin()?;

        if registry.is_a(instance_type, iface_type) {
            let owner = registry.interface_plugin(instance_type, iface_type);
            match owner {
                None => {
                    log::warn!(
                        "[xtype::module] interface '{}' for '{}' was previously registered statically or for a parent type",
                        registry.descriptive_name(iface_type),
                        registry.descriptive_name(instance_type)
                    );
                    return Err(Error::InterfaceConflict(format!(
                        "'{}' already implemented by '{}'",
                        registry.descriptive_name(iface_type),
                        registry.descriptive_name(instance_type)
                    )));
                }
                Some(old) if !same_plugin(&old, &plugin) => {
                    log::warn!(
                        "[xtype::module] two different plugins tried to register interface '{}' for '{}'",
                        registry.descriptive_name(iface_type),
                        registry.descriptive_name(instance_type)
                    );
                    return Err(Error::PluginFailed(format!(
                        "two different plugins tried to register interface '{}'",
                        registry.descriptive_name(iface_type)
                    )));
                }
                Some(_) => {}
            }

            let mut state = self.state.lock();
            let entry = state
                .iface_infos
                .iter_mut()
                .find(|i| i.instance_type == instance_type && i.iface_type == iface_type);
            return match entry {
                Some(entry) => {
                    entry.loaded = true;
                    entry.info = info;
                    Ok(())
                }
                None => Err(Error::InvalidState(format!(
                    "module '{}' lost its record of interface '{}'",
                    self.display_name(),
                    registry.descriptive_name(iface_type)
                ))),
            };
        }

        self.state.lock().iface_infos.push(ModuleIfaceInfo {
            loaded: true,
            instance_type,
            iface_type,
            info,
        });
        if let Err(err) = registry.add_interface_dynamic(instance_type, iface_type, plugin) {
            self.state
                .lock()
                .iface_infos
                .retain(|i| !(i.instance_type == instance_type && i.iface_type == iface_type));
            return Err(err);
        }
        Ok(())
    }

    /// Types registered by the module, in registration order.
    pub fn types(&self) -> Vec<TypeId> {
        self.state.lock().type_infos.iter().map(|t| t.type_id).collect()
    }
}

impl TypePlugin for TypeModule {
    fn use_plugin(&self, registry: &TypeRegistry) -> Result<()> {
        if self.use_module(registry) {
            Ok(())
        } else {
            Err(crate::error::critical(Error::PluginFailed(format!(
                "could not reload previously loaded plugin '{}'",
                self.display_name()
            ))))
        }
    }

    fn unuse_plugin(&self, registry: &TypeRegistry) {
        self.unuse_module(registry);
    }

    fn complete_type_info(&self, _registry: &TypeRegistry, type_id: TypeId) -> Result<TypeInfo> {
        let state = self.state.lock();
        state
            .type_infos
            .iter()
            .find(|t| t.type_id == type_id)
            .map(|t| t.info.clone())
            .ok_or_else(|| {
                Error::PluginFailed(format!(
                    "module '{}' has no info for type {}",
                    self.display_name(),
                    type_id
                ))
            })
    }

    fn complete_interface_info(
        &self,
        _registry: &TypeRegistry,
        instance_type: TypeId,
        iface_type: TypeId,
    ) -> Result<InterfaceInfo> {
        let state = self.state.lock();
        state
            .iface_infos
            .iter()
            .find(|i| i.instance_type == instance_type && i.iface_type == iface_type)
            .map(|i| i.info.clone())
            .ok_or_else(|| {
                Error::PluginFailed(format!(
                    "module '{}' has no interface info for {} on {}",
                    self.display_name(),
                    iface_type,
                    instance_type
                ))
            })
    }
}

impl std::fmt::Debug for TypeModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TypeModule")
            .field("name", &*self.name.lock())
            .field("use_count", &state.use_count)
            .field("types", &state.type_infos.len())
            .field("interfaces", &state.iface_infos.len())
            .finish()
    }
}
