// SPDX-FileCopyrightText: 2024 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

mod pool;
mod raw_pool;

use core::fmt::{self, Debug, Display};

pub use pool::{Pool, PoolHandle};
pub use raw_pool::{RawPool, SlotLayout, SlotLink};

/// Where a pool should try to put a new allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement<Tag> {
    /// Reuse the most recently freed slot, or grow the pool if there are none.
    Any,
    /// Prefer a free slot in the same block as the given item, searching
    /// forward from it and wrapping around within the block. Falls back to
    /// [`Placement::Any`] if the block is full or the tag isn't from this
    /// pool.
    Near(Tag),
}

/// Returned when a pool needed a new block and the platform could not provide
/// the memory for it. Contains the value that was supposed to be allocated,
/// so that it's not lost. The pool is left exactly as it was before the
/// allocation attempt.
pub struct OutOfMemory<T>(pub T);

impl<T> OutOfMemory<T> {
    /// Returns the value which could not be allocated.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Debug for OutOfMemory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OutOfMemory").finish_non_exhaustive()
    }
}

impl<T> Display for OutOfMemory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("the platform could not allocate a new pool block")
    }
}
