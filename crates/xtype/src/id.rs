// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type identifiers.
//!
//! Fundamental ids are multiples of `1 << FUNDAMENTAL_SHIFT` up to
//! [`FUNDAMENTAL_MAX`]. Derived ids are handed out monotonically above that
//! range, so an id never collides with a fundamental one and is never zero.

use crate::config::{FUNDAMENTAL_MAX, FUNDAMENTAL_SHIFT};
use std::fmt;

/// Opaque identifier of a registered type.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct TypeId(usize);

const fn fundamental(index: usize) -> TypeId {
    TypeId(index << FUNDAMENTAL_SHIFT)
}

impl TypeId {
    /// Never names a registered type.
    pub const INVALID: Self = Self(0);
    pub const NONE: Self = fundamental(1);
    pub const INTERFACE: Self = fundamental(2);
    pub const CHAR: Self = fundamental(3);
    pub const UCHAR: Self = fundamental(4);
    pub const BOOLEAN: Self = fundamental(5);
    pub const INT: Self = fundamental(6);
    pub const UINT: Self = fundamental(7);
    pub const LONG: Self = fundamental(8);
    pub const ULONG: Self = fundamental(9);
    pub const INT64: Self = fundamental(10);
    pub const UINT64: Self = fundamental(11);
    pub const ENUM: Self = fundamental(12);
    pub const FLAGS: Self = fundamental(13);
    pub const FLOAT: Self = fundamental(14);
    pub const DOUBLE: Self = fundamental(15);
    pub const STRING: Self = fundamental(16);
    pub const POINTER: Self = fundamental(17);
    pub const BOXED: Self = fundamental(18);
    pub const PARAM: Self = fundamental(19);
    pub const OBJECT: Self = fundamental(20);
    pub const VARIANT: Self = fundamental(21);

    /// First fundamental index reserved for the library itself.
    pub const RESERVED_LIB_FIRST: usize = 22;
    /// Last fundamental index reserved for the library itself.
    pub const RESERVED_LIB_LAST: usize = 31;
    /// First fundamental index reserved for external runtimes.
    pub const RESERVED_EXT_FIRST: usize = 32;
    /// Last fundamental index reserved for external runtimes.
    pub const RESERVED_EXT_LAST: usize = 48;
    /// First fundamental index available to applications.
    pub const RESERVED_USER_FIRST: usize = 49;

    /// Build a fundamental id from its index (`index << FUNDAMENTAL_SHIFT`).
    #[must_use]
    pub const fn make_fundamental(index: usize) -> Self {
        fundamental(index)
    }

    #[must_use]
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> usize {
        self.0
    }

    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// Whether the id lies in the fundamental range.
    #[must_use]
    pub const fn is_fundamental(self) -> bool {
        self.0 <= FUNDAMENTAL_MAX
    }

    /// Whether the id is a well-formed fundamental id (aligned, in range).
    #[must_use]
    pub const fn is_fundamental_slot(self) -> bool {
        self.0 > 0 && self.0 <= FUNDAMENTAL_MAX && self.0 & ((1 << FUNDAMENTAL_SHIFT) - 1) == 0
    }

    /// Index of a fundamental id.
    #[must_use]
    pub const fn fundamental_index(self) -> usize {
        self.0 >> FUNDAMENTAL_SHIFT
    }

    /// Id of the `index`-th derived type.
    pub(crate) const fn derived(index: usize) -> Self {
        Self(FUNDAMENTAL_MAX + 1 + index)
    }

    /// Position of a derived id in the derived table.
    pub(crate) const fn derived_index(self) -> Option<usize> {
        if self.0 > FUNDAMENTAL_MAX {
            Some(self.0 - FUNDAMENTAL_MAX - 1)
        } else {
            None
        }
    }
}

impl fmt::Debug for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_fundamental() {
            write!(f, "TypeId(fundamental {})", self.fundamental_index())
        } else {
            write!(f, "TypeId({})", self.0)
        }
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fundamental_ids() {
        assert_eq!(TypeId::NONE.raw(), 4);
        assert_eq!(TypeId::INTERFACE.raw(), 8);
        assert_eq!(TypeId::OBJECT.raw(), 80);
        assert_eq!(TypeId::OBJECT.fundamental_index(), 20);
        assert!(TypeId::OBJECT.is_fundamental_slot());
        assert!(!TypeId::from_raw(81).is_fundamental_slot());
        assert!(!TypeId::INVALID.is_fundamental_slot());
    }

    #[test]
    fn test_derived_ids_above_fundamental_range() {
        let first = TypeId::derived(0);
        assert!(!first.is_fundamental());
        assert_eq!(first.derived_index(), Some(0));
        assert_eq!(TypeId::derived(7).derived_index(), Some(7));
        assert_eq!(TypeId::OBJECT.derived_index(), None);
    }
}
