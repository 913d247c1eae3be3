// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Registry configuration.
//!
//! # Architecture
//!
//! Layout limits are compile-time constants shared by every registry in the
//! process. Behavioral knobs live in [`RegistryConfig`], which is handed to
//! [`TypeRegistry::new`](crate::TypeRegistry::new) or [`crate::init`].
//!
//! # Example
//!
//! ```
//! use xtype::{RegistryConfig, TypeRegistry};
//!
//! // Allow dynamic types to be finalized when their last reference drops.
//! let cfg = RegistryConfig::default().with_retain_dynamic_types(false);
//! let registry = TypeRegistry::new(cfg);
//! assert!(!registry.config().retain_dynamic_types);
//! ```

use std::fmt;

// ============================================================================
// Layout constants
// ============================================================================

/// Number of low bits reserved below each fundamental id.
pub const FUNDAMENTAL_SHIFT: usize = 2;

/// Highest id that may name a fundamental type.
pub const FUNDAMENTAL_MAX: usize = 255 << FUNDAMENTAL_SHIFT;

/// Alignment applied to class, instance and private areas.
pub const STRUCT_ALIGNMENT: usize = 2 * std::mem::size_of::<usize>();

/// Maximum depth of an inheritance chain (ancestors excluding self).
pub const MAX_N_SUPERS: usize = 255;

/// Maximum number of interfaces a single class may carry.
pub const MAX_N_INTERFACES: usize = 255;

/// Maximum number of prerequisites of one interface.
pub const MAX_N_PREREQUISITES: usize = 511;

/// Upper bound applied to `TypeInfo::n_preallocs`.
pub const MAX_PREALLOCS: usize = 1024;

/// Upper bound of an instance-private area.
pub const MAX_PRIVATE_SIZE: usize = 0xffff;

/// Environment variable holding debug keys.
pub const DEBUG_ENV: &str = "XTYPE_DEBUG";

/// Round `size` up to [`STRUCT_ALIGNMENT`].
#[inline]
#[must_use]
pub const fn align_struct(size: usize) -> usize {
    (size + (STRUCT_ALIGNMENT - 1)) & !(STRUCT_ALIGNMENT - 1)
}

// ============================================================================
// Debug flags
// ============================================================================

/// Debug switches read from [`DEBUG_ENV`].
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct DebugFlags(u32);

impl DebugFlags {
    /// No debugging.
    pub const NONE: Self = Self(0);
    /// Log instance creation and destruction.
    pub const OBJECTS: Self = Self(1 << 0);
    /// Track live instances per type.
    pub const INSTANCE_COUNT: Self = Self(1 << 1);
    /// Reserved for signal tracing in higher layers.
    pub const SIGNALS: Self = Self(1 << 2);
    /// Every flag.
    pub const ALL: Self = Self(0b111);

    const KEYS: [(&'static str, DebugFlags); 3] = [
        ("objects", Self::OBJECTS),
        ("instance-count", Self::INSTANCE_COUNT),
        ("signals", Self::SIGNALS),
    ];

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Parse a key list such as `"objects,instance-count"` or `"all"`.
    ///
    /// Keys may be separated by `,`, `:`, `;` or spaces. Unknown keys are
    /// logged and ignored.
    #[must_use]
    pub fn parse(keys: &str) -> Self {
        let mut flags = Self::NONE;
        for key in keys
            .split([',', ':', ';', ' '])
            .map(str::trim)
            .filter(|k| !k.is_empty())
        {
            if key.eq_ignore_ascii_case("all") {
                flags = Self::ALL;
                continue;
            }
            match Self::KEYS
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(key))
            {
                Some((_, flag)) => flags = flags.union(*flag),
                None => log::warn!("[xtype] unknown {} key '{}'", DEBUG_ENV, key),
            }
        }
        flags
    }

    /// Read flags from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        std::env::var(DEBUG_ENV)
            .map(|value| Self::parse(&value))
            .unwrap_or_default()
    }
}

impl std::ops::BitOr for DebugFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl fmt::Debug for DebugFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::KEYS
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| *name)
            .collect();
        write!(f, "DebugFlags({})", names.join("|"))
    }
}

// ============================================================================
// Registry configuration
// ============================================================================

/// Runtime configuration of a [`TypeRegistry`](crate::TypeRegistry).
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Keep the last reference of dynamic types forever instead of
    /// finalizing their classes and releasing the plugin.
    pub retain_dynamic_types: bool,
    /// Debug switches.
    pub debug: DebugFlags,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            retain_dynamic_types: true,
            debug: DebugFlags::from_env(),
        }
    }
}

impl RegistryConfig {
    #[must_use]
    pub fn with_retain_dynamic_types(mut self, retain: bool) -> Self {
        self.retain_dynamic_types = retain;
        self
    }

    #[must_use]
    pub fn with_debug(mut self, debug: DebugFlags) -> Self {
        self.debug = debug;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_struct() {
        assert_eq!(align_struct(0), 0);
        assert_eq!(align_struct(1), STRUCT_ALIGNMENT);
        assert_eq!(align_struct(STRUCT_ALIGNMENT), STRUCT_ALIGNMENT);
        assert_eq!(align_struct(STRUCT_ALIGNMENT + 1), 2 * STRUCT_ALIGNMENT);
    }

    #[test]
    fn test_debug_flags_parse() {
        let flags = DebugFlags::parse("objects, instance-count");
        assert!(flags.contains(DebugFlags::OBJECTS));
        assert!(flags.contains(DebugFlags::INSTANCE_COUNT));
        assert!(!flags.contains(DebugFlags::SIGNALS));

        assert_eq!(DebugFlags::parse("all"), DebugFlags::ALL);
        assert_eq!(DebugFlags::parse("bogus"), DebugFlags::NONE);
        assert_eq!(DebugFlags::parse(""), DebugFlags::NONE);
    }

    #[test]
    fn test_config_builder() {
        let cfg = RegistryConfig::default()
            .with_retain_dynamic_types(false)
            .with_debug(DebugFlags::INSTANCE_COUNT);
        assert!(!cfg.retain_dynamic_types);
        assert_eq!(cfg.debug, DebugFlags::INSTANCE_COUNT);
    }
}
