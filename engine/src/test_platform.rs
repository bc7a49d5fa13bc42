// SPDX-FileCopyrightText: 2024 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use core::{cell::Cell, ffi::c_void, ptr};

use alloc::{boxed::Box, vec};
use platform::Platform;

#[derive(Clone, Copy)]
#[repr(C, align(64))]
struct VeryAlignedThing([u8; 64]);
const VERY_ALIGNED_THING: VeryAlignedThing = VeryAlignedThing([0; 64]);

/// A [`Platform`] for tests, backed by the global allocator. Counts the
/// allocations that haven't been freed yet, and can be told to fail
/// allocations to test out-of-memory paths.
#[derive(Default)]
pub struct TestPlatform {
    live_allocations: Cell<usize>,
    failures_left: Cell<usize>,
}

impl TestPlatform {
    pub fn new() -> TestPlatform {
        TestPlatform::default()
    }

    /// The amount of allocations which haven't been freed yet.
    pub fn live_allocations(&self) -> usize {
        self.live_allocations.get()
    }

    /// Makes the next `count` calls to [`Platform::malloc`] return null.
    pub fn fail_next_allocations(&self, count: usize) {
        self.failures_left.set(count);
    }
}

impl Platform for TestPlatform {
    fn malloc(&self, size: usize) -> *mut c_void {
        if self.failures_left.get() > 0 {
            self.failures_left.set(self.failures_left.get() - 1);
            return ptr::null_mut();
        }
        let count = size.div_ceil(size_of::<VeryAlignedThing>());
        let things: Box<[VeryAlignedThing]> = vec![VERY_ALIGNED_THING; count].into_boxed_slice();
        self.live_allocations.set(self.live_allocations.get() + 1);
        Box::leak(things).as_mut_ptr() as *mut c_void
    }

    unsafe fn free(&self, ptr: *mut c_void, size: usize) {
        let count = size.div_ceil(size_of::<VeryAlignedThing>());
        let slice_ptr = ptr::slice_from_raw_parts_mut(ptr as *mut VeryAlignedThing, count);
        // Safety: the caller guarantees that ptr was returned by malloc with
        // the same size, so it's a leaked boxed slice of exactly this length.
        drop(unsafe { Box::from_raw(slice_ptr) });
        self.live_allocations.set(self.live_allocations.get() - 1);
    }
}
