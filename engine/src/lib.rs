// SPDX-FileCopyrightText: 2024 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! The object core of a retained-mode scene engine: pooled allocation, the
//! class tree, storages, and the file format objects which read and write
//! scenes through them.

#![no_std]

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

pub mod allocators;
pub mod class_tree;
pub mod file_format;
pub mod formats;
pub mod storage;

#[cfg(test)]
mod test_platform;

use class_tree::{ClassTree, ClassTreeError};

/// Registers every class of the engine: the storages, then the file formats.
pub fn register_classes(tree: &mut ClassTree) -> Result<(), ClassTreeError> {
    storage::register_classes(tree)?;
    file_format::register_classes(tree)?;
    Ok(())
}

/// Unregisters the classes registered in [`register_classes`], in reverse.
pub fn unregister_classes(tree: &mut ClassTree) -> Result<(), ClassTreeError> {
    file_format::unregister_classes(tree)?;
    storage::unregister_classes(tree)?;
    Ok(())
}
