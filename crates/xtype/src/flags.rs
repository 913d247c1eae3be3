// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Capability bits of fundamental types and per-type flags.

use std::ops::{BitAnd, BitOr, BitOrAssign};

macro_rules! bit_ops {
    ($ty:ident) => {
        impl BitOr for $ty {
            type Output = $ty;

            fn bitor(self, rhs: $ty) -> $ty {
                $ty(self.0 | rhs.0)
            }
        }

        impl BitOrAssign for $ty {
            fn bitor_assign(&mut self, rhs: $ty) {
                self.0 |= rhs.0;
            }
        }

        impl BitAnd for $ty {
            type Output = $ty;

            fn bitand(self, rhs: $ty) -> $ty {
                $ty(self.0 & rhs.0)
            }
        }
    };
}

/// Capabilities fixed by a fundamental type and inherited by all of its
/// descendants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct FundamentalFlags(u32);

impl FundamentalFlags {
    /// No capabilities
    pub const NONE: FundamentalFlags = FundamentalFlags(0);

    /// Types carry a class structure
    pub const CLASSED: FundamentalFlags = FundamentalFlags(1 << 0);

    /// Types can be instantiated (implies classed)
    pub const INSTANTIATABLE: FundamentalFlags = FundamentalFlags(1 << 1);

    /// Types can be derived once
    pub const DERIVABLE: FundamentalFlags = FundamentalFlags(1 << 2);

    /// Types can be derived to arbitrary depth
    pub const DEEP_DERIVABLE: FundamentalFlags = FundamentalFlags(1 << 3);

    /// Every valid bit
    pub const MASK: FundamentalFlags = FundamentalFlags(0b1111);

    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        FundamentalFlags(bits)
    }

    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn contains(&self, other: FundamentalFlags) -> bool {
        (self.0 & other.0) == other.0
    }

    #[must_use]
    pub const fn intersects(&self, other: FundamentalFlags) -> bool {
        (self.0 & other.0) != 0
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

bit_ops!(FundamentalFlags);

/// Per-type flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct TypeFlags(u32);

impl TypeFlags {
    /// No flags
    pub const NONE: TypeFlags = TypeFlags(0);

    /// Instances cannot be created
    pub const ABSTRACT: TypeFlags = TypeFlags(1 << 4);

    /// Values cannot be created
    pub const VALUE_ABSTRACT: TypeFlags = TypeFlags(1 << 5);

    /// No child types may be derived
    pub const FINAL: TypeFlags = TypeFlags(1 << 6);

    /// Every valid bit
    pub const MASK: TypeFlags = TypeFlags((1 << 4) | (1 << 5) | (1 << 6));

    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        TypeFlags(bits)
    }

    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn contains(&self, other: TypeFlags) -> bool {
        (self.0 & other.0) == other.0
    }

    #[must_use]
    pub const fn intersects(&self, other: TypeFlags) -> bool {
        (self.0 & other.0) != 0
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Bits outside [`TypeFlags::MASK`].
    #[must_use]
    pub const fn invalid_bits(&self) -> u32 {
        self.0 & !Self::MASK.0
    }
}

bit_ops!(TypeFlags);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fundamental_flags_ops() {
        let flags = FundamentalFlags::CLASSED | FundamentalFlags::INSTANTIATABLE;
        assert!(flags.contains(FundamentalFlags::CLASSED));
        assert!(!flags.contains(FundamentalFlags::DERIVABLE));
        assert!(flags.intersects(FundamentalFlags::INSTANTIATABLE | FundamentalFlags::DERIVABLE));
        assert_eq!((flags & FundamentalFlags::CLASSED), FundamentalFlags::CLASSED);
    }

    #[test]
    fn test_type_flags_mask() {
        let flags = TypeFlags::ABSTRACT | TypeFlags::FINAL;
        assert_eq!(flags.invalid_bits(), 0);
        assert_eq!(TypeFlags::from_bits(1).invalid_bits(), 1);
        assert!(TypeFlags::NONE.is_empty());
    }
}
