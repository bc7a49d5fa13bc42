// SPDX-FileCopyrightText: 2024 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Storage classes: byte containers that file formats read from and write
//! to through the [`Method::ReadData`], [`Method::WriteData`] and
//! [`Method::GetSize`] methods of their class.

#[cfg(feature = "std")]
mod file;
mod memory;

use core::fmt::{self, Display};

use crate::class_tree::{ClassTree, ClassTreeError, Method, MethodType, Object, ObjectType};

#[cfg(feature = "std")]
pub use file::{FileStorage, FILE_STORAGE_TYPE};
pub use memory::{MemoryStorage, MEMORY_STORAGE_TYPE};

/// The base class of all storages. Has no methods of its own.
pub const STORAGE_TYPE: ObjectType = ObjectType::from_fourcc(*b"strg");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// The position is past the end of the storage.
    OutOfBounds { position: u64, size: u64 },
    /// The underlying file operation failed.
    #[cfg(feature = "std")]
    Io(std::io::ErrorKind),
    /// The storage's instance data wasn't what its methods expected.
    InstanceMismatch,
}

impl Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::OutOfBounds { position, size } => {
                write!(f, "position {position} is past the end of the storage ({size} bytes)")
            }
            #[cfg(feature = "std")]
            StorageError::Io(kind) => write!(f, "storage i/o failed: {kind}"),
            StorageError::InstanceMismatch => write!(f, "unexpected storage instance data"),
        }
    }
}

impl core::error::Error for StorageError {}

#[cfg(feature = "std")]
impl From<std::io::Error> for StorageError {
    fn from(error: std::io::Error) -> Self {
        StorageError::Io(error.kind())
    }
}

/// Registers the storage base class and the built-in storages.
pub fn register_classes(tree: &mut ClassTree) -> Result<(), ClassTreeError> {
    tree.register_class(ObjectType::SHARED, STORAGE_TYPE, "Storage", &[])?;
    memory::register_class(tree)?;
    #[cfg(feature = "std")]
    file::register_class(tree)?;
    Ok(())
}

/// Unregisters the classes registered in [`register_classes`], in reverse.
pub fn unregister_classes(tree: &mut ClassTree) -> Result<(), ClassTreeError> {
    #[cfg(feature = "std")]
    tree.unregister_class(FILE_STORAGE_TYPE)?;
    tree.unregister_class(MEMORY_STORAGE_TYPE)?;
    tree.unregister_class(STORAGE_TYPE)?;
    Ok(())
}

/// Returns the size of the storage through its [`Method::GetSize`], or `None`
/// if its class doesn't have one.
pub fn size(storage: &Object) -> Option<Result<u64, StorageError>> {
    match storage.method(MethodType::GetSize)? {
        Method::GetSize(get_size) => Some(get_size(storage.instance_any())),
        _ => None,
    }
}
