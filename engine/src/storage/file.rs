// SPDX-FileCopyrightText: 2024 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use core::any::Any;
use std::{
    fs::{File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::Path,
};

use alloc::boxed::Box;

use crate::class_tree::{ClassTree, ClassTreeError, Method, ObjectType, SharedObject};

use super::{StorageError, STORAGE_TYPE};

pub const FILE_STORAGE_TYPE: ObjectType = ObjectType::from_fourcc(*b"fils");

/// A storage backed by a file on disk.
#[derive(Debug)]
pub struct FileStorage {
    file: File,
}

impl FileStorage {
    /// Opens an existing file for reading.
    pub fn open(path: &Path) -> io::Result<FileStorage> {
        Ok(FileStorage {
            file: File::open(path)?,
        })
    }

    /// Creates a file for writing, truncating it if it exists.
    pub fn create(path: &Path) -> io::Result<FileStorage> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(FileStorage { file })
    }

    pub fn into_shared(self, tree: &ClassTree) -> Result<SharedObject, ClassTreeError> {
        let object = tree.create_instance_with(FILE_STORAGE_TYPE, Box::new(self))?;
        Ok(object.into_shared())
    }
}

pub(super) fn register_class(tree: &mut ClassTree) -> Result<(), ClassTreeError> {
    tree.register_class(
        STORAGE_TYPE,
        FILE_STORAGE_TYPE,
        "FileStorage",
        &[
            Method::ReadData(read_data),
            Method::WriteData(write_data),
            Method::GetSize(get_size),
        ],
    )
}

fn read_data(
    instance: &mut dyn Any,
    position: u64,
    buffer: &mut [u8],
) -> Result<usize, StorageError> {
    let storage = instance
        .downcast_mut::<FileStorage>()
        .ok_or(StorageError::InstanceMismatch)?;
    storage.file.seek(SeekFrom::Start(position))?;
    let mut count = 0;
    while count < buffer.len() {
        match storage.file.read(&mut buffer[count..]) {
            Ok(0) => break,
            Ok(n) => count += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(count)
}

fn write_data(instance: &mut dyn Any, position: u64, buffer: &[u8]) -> Result<usize, StorageError> {
    let storage = instance
        .downcast_mut::<FileStorage>()
        .ok_or(StorageError::InstanceMismatch)?;
    storage.file.seek(SeekFrom::Start(position))?;
    storage.file.write_all(buffer)?;
    Ok(buffer.len())
}

fn get_size(instance: &dyn Any) -> Result<u64, StorageError> {
    let storage = instance
        .downcast_ref::<FileStorage>()
        .ok_or(StorageError::InstanceMismatch)?;
    Ok(storage.file.metadata()?.len())
}

#[cfg(test)]
mod tests {
    use std::{fs, path::PathBuf, process};

    use super::{get_size, read_data, write_data, FileStorage};

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(std::format!("engine-file-storage-{}-{name}", process::id()))
    }

    #[test]
    fn written_data_reads_back() {
        let path = temp_path("roundtrip");
        let mut storage = FileStorage::create(&path).unwrap();
        assert_eq!(Ok(5), write_data(&mut storage, 0, b"hello"));
        assert_eq!(Ok(6), write_data(&mut storage, 5, b" world"));
        assert_eq!(Ok(11), get_size(&storage));

        let mut buffer = [0; 16];
        assert_eq!(Ok(5), read_data(&mut storage, 6, &mut buffer));
        assert_eq!(b"world", &buffer[..5]);
        drop(storage);

        assert_eq!(b"hello world", &fs::read(&path).unwrap()[..]);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn opened_files_are_read_only() {
        let path = temp_path("read-only");
        fs::write(&path, b"abc").unwrap();
        let mut storage = FileStorage::open(&path).unwrap();
        assert!(write_data(&mut storage, 0, b"x").is_err());
        assert_eq!(Ok(0), read_data(&mut storage, 3, &mut [0; 4]));
        drop(storage);
        fs::remove_file(&path).unwrap();
    }
}
