// SPDX-FileCopyrightText: 2024 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{
    alloc::{self, Layout},
    ffi::c_void,
    ptr,
};

use platform::{Platform, MALLOC_ALIGNMENT};

/// A [`Platform`] backed by the Rust global allocator.
#[derive(Debug, Default)]
pub struct SystemPlatform;

impl Platform for SystemPlatform {
    fn malloc(&self, size: usize) -> *mut c_void {
        let Ok(layout) = Layout::from_size_align(size.max(1), MALLOC_ALIGNMENT) else {
            return ptr::null_mut();
        };
        // Safety: the layout is not zero-sized.
        unsafe { alloc::alloc(layout) as *mut c_void }
    }

    unsafe fn free(&self, ptr: *mut c_void, size: usize) {
        // Safety: malloc succeeded with this size, so the layout is valid.
        let layout = unsafe { Layout::from_size_align_unchecked(size.max(1), MALLOC_ALIGNMENT) };
        // Safety: the caller guarantees that ptr was returned by malloc with
        // this size, i.e. allocated with this layout.
        unsafe { alloc::dealloc(ptr as *mut u8, layout) };
    }
}

#[cfg(test)]
mod tests {
    use platform::{Platform, MALLOC_ALIGNMENT};

    use super::SystemPlatform;

    #[test]
    fn allocations_are_aligned() {
        let platform = SystemPlatform;
        let ptr = platform.malloc(100);
        assert!(!ptr.is_null());
        assert_eq!(0, ptr as usize % MALLOC_ALIGNMENT);
        // Safety: allocated just above with the same size.
        unsafe { platform.free(ptr, 100) };
    }

    #[test]
    fn impossible_allocations_fail() {
        assert!(SystemPlatform.malloc(usize::MAX).is_null());
    }
}
