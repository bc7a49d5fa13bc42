// SPDX-FileCopyrightText: 2024 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! This crate revolves around the [`Platform`] trait, which can be
//! implemented to provide the engine with the few platform-dependent services
//! it needs, currently just big chunks of memory for the object pools.
//!
//! This is split off of the main engine crate so that the engine and the
//! platform implementation can be compiled independently, and so that the
//! engine stays `no_std`.

#![no_std]
#![warn(missing_docs)]

use core::ffi::c_void;

/// The alignment every pointer returned by [`Platform::malloc`] must have.
///
/// The engine places its own bookkeeping at the start of each allocation and
/// aligns anything stricter than this itself.
pub const MALLOC_ALIGNMENT: usize = 16;

/// A trait for using platform-dependent features from the engine without
/// depending on any platform implementation directly.
///
/// All the functions have a `&self` parameter, so that the methods can access
/// some (possibly internally mutable) state, but still keeping the platform
/// object as widely usable as possible. None of these functions are
/// (supposed to be) hot, and this trait is object safe, so using
/// &dyn [`Platform`] should be fine performance-wise.
pub trait Platform {
    /// Allocate the given amount of bytes, returning a null pointer on error.
    /// The returned pointer must be aligned to at least [`MALLOC_ALIGNMENT`].
    ///
    /// Not called often from the engine, memory is allocated in blocks of many
    /// objects at a time, so this can be slow and defensively implemented.
    fn malloc(&self, size: usize) -> *mut c_void;

    /// Free the memory allocated by [`Platform::malloc`].
    ///
    /// ### Safety
    ///
    /// - `ptr` must have been returned by [`Platform::malloc`] of this same
    ///   platform, with the given `size`.
    /// - Since the implementation is free to free the memory, the memory
    ///   pointed at by the given pointer shouldn't be accessed after calling
    ///   this.
    unsafe fn free(&self, ptr: *mut c_void, size: usize);
}
