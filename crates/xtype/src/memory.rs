// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Raw class, vtable and instance memory.
//!
//! Classes, interface vtables and instances are plain zeroed allocations
//! whose first bytes are a `#[repr(C)]` header. User structures embed the
//! header as their first field:
//!
//! ```
//! use xtype::ClassHeader;
//!
//! #[repr(C)]
//! struct ShapeClass {
//!     parent: ClassHeader,
//!     area: Option<fn(f64) -> f64>,
//! }
//! ```
//!
//! Handles ([`ClassRef`], [`VTableRef`], [`InstanceRef`]) are copyable
//! pointers into that memory. They stay valid while the registry keeps the
//! class alive (see `TypeRegistry::class_ref`) or until the instance is
//! freed.

use crate::config::STRUCT_ALIGNMENT;
use crate::error::{Error, Result};
use crate::id::TypeId;
use std::alloc::{self, Layout};
use std::ptr::NonNull;

// ============================================================================
// Headers
// ============================================================================

/// First field of every class structure.
#[repr(C)]
#[derive(Debug)]
pub struct ClassHeader {
    pub g_type: TypeId,
}

/// First field of every interface vtable.
#[repr(C)]
#[derive(Debug)]
pub struct InterfaceHeader {
    /// The interface type.
    pub g_type: TypeId,
    /// The implementing class, `INVALID` for a default vtable.
    pub g_instance_type: TypeId,
}

/// First field of every instance structure.
#[repr(C)]
#[derive(Debug)]
pub struct InstanceHeader {
    pub g_class: Option<ClassRef>,
}

// ============================================================================
// Handles
// ============================================================================

macro_rules! raw_handle {
    ($name:ident, $header:ty) => {
        impl $name {
            /// Wrap a raw pointer.
            ///
            /// # Safety
            ///
            /// `ptr` must point to memory starting with the matching header,
            /// owned by a registry, and valid for as long as the handle is used.
            #[must_use]
            pub unsafe fn from_raw(ptr: NonNull<u8>) -> Self {
                Self(ptr.cast())
            }

            #[must_use]
            pub fn as_ptr(self) -> *mut u8 {
                self.0.as_ptr().cast()
            }

            /// Reinterpret the memory as `T`.
            ///
            /// # Safety
            ///
            /// `T` must be `#[repr(C)]`, start with the header, and fit in
            /// the registered size. The returned reference must not outlive
            /// the class or instance.
            #[must_use]
            pub unsafe fn cast<'a, T>(self) -> &'a T {
                // SAFETY: upheld by the caller.
                unsafe { &*self.0.as_ptr().cast::<T>() }
            }

            /// Mutable variant of [`Self::cast`].
            ///
            /// # Safety
            ///
            /// Same as [`Self::cast`]; in addition no other reference to the
            /// memory may be live, which holds inside init hooks.
            #[must_use]
            #[allow(clippy::mut_from_ref)]
            pub unsafe fn cast_mut<'a, T>(self) -> &'a mut T {
                // SAFETY: upheld by the caller.
                unsafe { &mut *self.0.as_ptr().cast::<T>() }
            }

            pub(crate) fn header(self) -> &'static $header {
                // SAFETY: handles are only created over registry allocations
                // that start with the header and are zero-initialized.
                unsafe { &*self.0.as_ptr() }
            }

            pub(crate) fn header_mut(self) -> *mut $header {
                self.0.as_ptr()
            }
        }

        // SAFETY: the handle is a plain address. Synchronization of the
        // pointed-to memory is provided by the registry's init protocol.
        unsafe impl Send for $name {}
        // SAFETY: see above.
        unsafe impl Sync for $name {}
    };
}

/// Handle to an initialized class structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ClassRef(NonNull<ClassHeader>);

raw_handle!(ClassRef, ClassHeader);

impl ClassRef {
    /// Type the class belongs to.
    #[must_use]
    pub fn type_id(self) -> TypeId {
        self.header().g_type
    }
}

/// Handle to an interface vtable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct VTableRef(NonNull<InterfaceHeader>);

raw_handle!(VTableRef, InterfaceHeader);

impl VTableRef {
    /// Interface the vtable implements.
    #[must_use]
    pub fn iface_type(self) -> TypeId {
        self.header().g_type
    }

    /// Class the vtable belongs to, `INVALID` for default vtables.
    #[must_use]
    pub fn instance_type(self) -> TypeId {
        self.header().g_instance_type
    }

    /// View the vtable through the generic class handle used by base hooks.
    #[must_use]
    pub fn as_class(self) -> ClassRef {
        ClassRef(self.0.cast())
    }
}

impl From<ClassRef> for VTableRef {
    fn from(class: ClassRef) -> Self {
        VTableRef(class.0.cast())
    }
}

/// Handle to an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct InstanceRef(NonNull<InstanceHeader>);

raw_handle!(InstanceRef, InstanceHeader);

impl InstanceRef {
    /// Class currently attached to the instance.
    #[must_use]
    pub fn class(self) -> Option<ClassRef> {
        self.header().g_class
    }

    /// Address of a private area at the signed `offset`.
    ///
    /// # Safety
    ///
    /// `offset` must lie within the private areas allocated in front of
    /// this instance.
    #[must_use]
    pub(crate) unsafe fn private_ptr(self, offset: isize) -> NonNull<u8> {
        let base = self.as_ptr();
        // SAFETY: the caller keeps `offset` inside the instance allocation.
        let ptr = unsafe { base.offset(offset) };
        // SAFETY: a pointer into a live allocation is non-null.
        unsafe { NonNull::new_unchecked(ptr) }
    }
}

// ============================================================================
// Raw blocks
// ============================================================================

/// Zeroed heap allocation released on drop.
pub(crate) struct RawBlock {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl RawBlock {
    pub(crate) fn zeroed(size: usize) -> Result<Self> {
        let layout = layout_for(size)?;
        // SAFETY: `layout` has a non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw)
            .ok_or_else(|| Error::InvalidTypeInfo(format!("allocation of {} bytes failed", size)))?;
        Ok(Self { ptr, layout })
    }

    pub(crate) fn as_non_null(&self) -> NonNull<u8> {
        self.ptr
    }

    pub(crate) fn size(&self) -> usize {
        self.layout.size()
    }

    /// Copy `len` bytes from `src` to the start of the block.
    ///
    /// # Safety
    ///
    /// `src` must be valid for `len` reads and must not overlap the block.
    pub(crate) unsafe fn copy_from(&mut self, src: *const u8, len: usize) {
        let len = len.min(self.size());
        // SAFETY: upheld by the caller; `len` is clamped to the block size.
        unsafe { std::ptr::copy_nonoverlapping(src, self.ptr.as_ptr(), len) };
    }

    /// Copy `len` bytes from `src` into the block at `offset`.
    ///
    /// # Safety
    ///
    /// Same as [`Self::copy_from`].
    pub(crate) unsafe fn copy_at(&mut self, offset: usize, src: *const u8, len: usize) {
        if offset >= self.size() {
            return;
        }
        let len = len.min(self.size() - offset);
        // SAFETY: destination range checked above, source upheld by the caller.
        unsafe { std::ptr::copy_nonoverlapping(src, self.ptr.as_ptr().add(offset), len) };
    }
}

impl Drop for RawBlock {
    fn drop(&mut self) {
        // SAFETY: allocated in `zeroed` with the same layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

// SAFETY: the block is exclusively owned; access goes through the registry
// locks or through handles whose users follow the init protocol.
unsafe impl Send for RawBlock {}
// SAFETY: see above.
unsafe impl Sync for RawBlock {}

pub(crate) fn layout_for(size: usize) -> Result<Layout> {
    Layout::from_size_align(size.max(1), STRUCT_ALIGNMENT)
        .map_err(|_| Error::InvalidTypeInfo(format!("invalid allocation size {}", size)))
}

/// Allocate a zeroed instance block of `total` bytes.
pub(crate) fn alloc_instance(total: usize) -> Result<NonNull<u8>> {
    let layout = layout_for(total)?;
    // SAFETY: `layout` has a non-zero size.
    let raw = unsafe { alloc::alloc_zeroed(layout) };
    NonNull::new(raw)
        .ok_or_else(|| Error::InvalidTypeInfo(format!("allocation of {} bytes failed", total)))
}

/// Release a block obtained from [`alloc_instance`].
///
/// # Safety
///
/// `ptr` must come from `alloc_instance(total)` and not be freed twice.
pub(crate) unsafe fn free_instance(ptr: NonNull<u8>, total: usize) {
    if let Ok(layout) = layout_for(total) {
        // SAFETY: upheld by the caller.
        unsafe { alloc::dealloc(ptr.as_ptr(), layout) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_block_zeroed() {
        let block = RawBlock::zeroed(64).expect("alloc");
        assert_eq!(block.size(), 64);
        // SAFETY: block is 64 bytes long.
        let bytes = unsafe { std::slice::from_raw_parts(block.as_non_null().as_ptr(), 64) };
        assert!(bytes.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_raw_block_copy_clamped() {
        let src = [7u8; 32];
        let mut block = RawBlock::zeroed(16).expect("alloc");
        // SAFETY: src holds 32 bytes, copy is clamped to 16.
        unsafe { block.copy_from(src.as_ptr(), 32) };
        // SAFETY: block is 16 bytes long.
        let bytes = unsafe { std::slice::from_raw_parts(block.as_non_null().as_ptr(), 16) };
        assert!(bytes.iter().all(|b| *b == 7));
    }

    #[test]
    fn test_raw_block_alignment() {
        let block = RawBlock::zeroed(3).expect("alloc");
        assert_eq!(block.as_non_null().as_ptr() as usize % STRUCT_ALIGNMENT, 0);
    }
}
