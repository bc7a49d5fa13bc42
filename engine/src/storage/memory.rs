// SPDX-FileCopyrightText: 2024 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use core::any::Any;

use alloc::{boxed::Box, vec::Vec};

use crate::class_tree::{ClassTree, ClassTreeError, Method, Object, ObjectType, SharedObject};

use super::{StorageError, STORAGE_TYPE};

pub const MEMORY_STORAGE_TYPE: ObjectType = ObjectType::from_fourcc(*b"mems");

/// A growable in-memory storage.
///
/// Writes may extend the buffer, but not leave gaps: writing starting past
/// the current end is an error.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MemoryStorage {
    data: Vec<u8>,
}

impl MemoryStorage {
    pub fn new(data: Vec<u8>) -> MemoryStorage {
        MemoryStorage { data }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Creates a shared storage object around the data.
    pub fn new_shared(tree: &ClassTree, data: Vec<u8>) -> Result<SharedObject, ClassTreeError> {
        let storage = MemoryStorage::new(data);
        let object = tree.create_instance_with(MEMORY_STORAGE_TYPE, Box::new(storage))?;
        Ok(object.into_shared())
    }

    /// Returns the contents of the storage object, if it is a memory storage.
    pub fn contents(storage: &Object) -> Option<&[u8]> {
        storage.instance::<MemoryStorage>().map(MemoryStorage::data)
    }

    fn start_index(&self, position: u64) -> Result<usize, StorageError> {
        let size = self.data.len() as u64;
        match usize::try_from(position) {
            Ok(start) if position <= size => Ok(start),
            _ => Err(StorageError::OutOfBounds { position, size }),
        }
    }
}

pub(super) fn register_class(tree: &mut ClassTree) -> Result<(), ClassTreeError> {
    tree.register_class(
        STORAGE_TYPE,
        MEMORY_STORAGE_TYPE,
        "MemoryStorage",
        &[
            Method::NewObject(new_object),
            Method::ReadData(read_data),
            Method::WriteData(write_data),
            Method::GetSize(get_size),
        ],
    )
}

fn new_object() -> Box<dyn Any> {
    Box::new(MemoryStorage::default())
}

fn read_data(
    instance: &mut dyn Any,
    position: u64,
    buffer: &mut [u8],
) -> Result<usize, StorageError> {
    let storage = instance
        .downcast_mut::<MemoryStorage>()
        .ok_or(StorageError::InstanceMismatch)?;
    let start = storage.start_index(position)?;
    let available = &storage.data[start..];
    let count = buffer.len().min(available.len());
    buffer[..count].copy_from_slice(&available[..count]);
    Ok(count)
}

fn write_data(instance: &mut dyn Any, position: u64, buffer: &[u8]) -> Result<usize, StorageError> {
    let storage = instance
        .downcast_mut::<MemoryStorage>()
        .ok_or(StorageError::InstanceMismatch)?;
    let start = storage.start_index(position)?;
    let overwritten = buffer.len().min(storage.data.len() - start);
    storage.data[start..start + overwritten].copy_from_slice(&buffer[..overwritten]);
    storage.data.extend_from_slice(&buffer[overwritten..]);
    Ok(buffer.len())
}

fn get_size(instance: &dyn Any) -> Result<u64, StorageError> {
    let storage = instance
        .downcast_ref::<MemoryStorage>()
        .ok_or(StorageError::InstanceMismatch)?;
    Ok(storage.data.len() as u64)
}
