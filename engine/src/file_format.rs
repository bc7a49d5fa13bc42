// SPDX-FileCopyrightText: 2024 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! The abstract file format object.
//!
//! A [`FileFormat`] reads or writes a byte stream through the storage object
//! attached to it with [`FileFormat::init`], keeping track of the current
//! position. The concrete format classes are registered beneath
//! [`FILE_FORMAT_READER_TYPE`] and [`FILE_FORMAT_WRITER_TYPE`], and provide
//! their behavior through their method tables.

mod binary;
mod text;

use core::{
    any::Any,
    fmt::{self, Display},
};

use alloc::vec::Vec;
use tracing::debug;

use crate::{
    class_tree::{ClassTree, ClassTreeError, Method, MethodType, Object, ObjectType, SharedObject},
    formats::text_tokens,
    storage::{self, StorageError},
};

pub use text::{is_blank, ScanResult};

pub const FILE_FORMAT_TYPE: ObjectType = ObjectType::from_fourcc(*b"ffmt");
pub const FILE_FORMAT_READER_TYPE: ObjectType = ObjectType::from_fourcc(*b"ffrd");
pub const FILE_FORMAT_WRITER_TYPE: ObjectType = ObjectType::from_fourcc(*b"ffwr");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
    /// The format has no storage attached.
    NotAttached,
    /// The storage or format class doesn't provide a required method.
    CapabilityMissing(MethodType),
    /// The storage moved fewer bytes than a fixed-size transfer needed.
    ShortTransfer { requested: usize, transferred: usize },
    /// There was nothing left to read.
    EndOfStream,
    Storage(StorageError),
    Class(ClassTreeError),
    /// A format method refused the request, e.g. invalid configuration data.
    Rejected,
}

impl Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::NotAttached => write!(f, "no storage is attached to the file format"),
            FormatError::CapabilityMissing(method_type) => {
                write!(f, "the class does not implement {method_type:?}")
            }
            FormatError::ShortTransfer {
                requested,
                transferred,
            } => write!(f, "transferred {transferred} bytes out of {requested}"),
            FormatError::EndOfStream => write!(f, "reached the end of the stream"),
            FormatError::Storage(err) => write!(f, "storage error: {err}"),
            FormatError::Class(err) => write!(f, "class error: {err}"),
            FormatError::Rejected => write!(f, "the file format rejected the request"),
        }
    }
}

impl core::error::Error for FormatError {}

impl From<StorageError> for FormatError {
    fn from(error: StorageError) -> Self {
        FormatError::Storage(error)
    }
}

impl From<ClassTreeError> for FormatError {
    fn from(error: ClassTreeError) -> Self {
        FormatError::Class(error)
    }
}

/// The result of a pass over a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewStatus {
    Done,
    /// The format needs another pass.
    Retraverse,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigureOutcome {
    Accepted,
    Cancelled,
}

/// Where a token was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenInfo {
    /// 1-based.
    pub line: u32,
}

/// An instance of a file format class, reading from or writing to a storage.
pub struct FileFormat {
    object: Object,
    storage: Option<SharedObject>,
    current_storage_position: u64,
    /// The size of the storage when it was attached.
    logical_eof: u64,
    read_in_group: bool,
}

impl fmt::Debug for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileFormat")
            .field("class", &self.object.object_type())
            .field("attached", &self.storage.is_some())
            .field("current_storage_position", &self.current_storage_position)
            .field("logical_eof", &self.logical_eof)
            .field("read_in_group", &self.read_in_group)
            .finish()
    }
}

impl FileFormat {
    /// Creates an unattached format of the class, which must be a subclass
    /// of [`FILE_FORMAT_TYPE`].
    pub fn new_from_type(
        tree: &ClassTree,
        object_type: ObjectType,
    ) -> Result<FileFormat, FormatError> {
        let object = tree.create_instance(object_type)?;
        if !object.is_kind_of(FILE_FORMAT_TYPE) || object_type == FILE_FORMAT_TYPE {
            return Err(FormatError::Class(ClassTreeError::NotKindOf {
                object_type,
                expected: FILE_FORMAT_TYPE,
            }));
        }
        Ok(FileFormat {
            object,
            storage: None,
            current_storage_position: 0,
            logical_eof: 0,
            read_in_group: false,
        })
    }

    /// Attaches the storage, releasing the previously attached one, and
    /// resets the position to the start. `None` detaches the current storage.
    ///
    /// The size of the storage is cached as the logical end of the stream, so
    /// the storage's class must have a [`Method::GetSize`].
    pub fn init(&mut self, storage: Option<SharedObject>) -> Result<(), FormatError> {
        self.storage = storage;
        self.current_storage_position = 0;
        self.logical_eof = 0;

        if let Some(storage) = &self.storage {
            self.read_in_group = true;
            let storage = storage.borrow();
            let size = storage::size(&storage)
                .ok_or(FormatError::CapabilityMissing(MethodType::GetSize))??;
            self.logical_eof = size;
            debug!(
                format = %self.object.object_type(),
                storage = %storage.object_type(),
                size,
                "attached storage to file format",
            );
        }
        Ok(())
    }

    /// The attached storage, if any.
    pub fn storage(&self) -> Option<&SharedObject> {
        self.storage.as_ref()
    }

    /// The byte offset the next primitive reads from or writes to.
    pub fn position(&self) -> u64 {
        self.current_storage_position
    }

    /// Moves the position, e.g. to re-read a byte.
    pub fn set_position(&mut self, position: u64) {
        self.current_storage_position = position;
    }

    pub fn logical_eof(&self) -> u64 {
        self.logical_eof
    }

    pub fn read_in_group(&self) -> bool {
        self.read_in_group
    }

    pub fn set_read_in_group(&mut self, read_in_group: bool) {
        self.read_in_group = read_in_group;
    }

    /// The format's object, for class queries.
    pub fn object(&self) -> &Object {
        &self.object
    }

    /// The format class's own instance data.
    pub fn instance_data<T: Any>(&self) -> Result<&T, FormatError> {
        self.object
            .instance()
            .ok_or(FormatError::Class(ClassTreeError::InstanceMismatch))
    }

    /// The format class's own instance data.
    pub fn instance_data_mut<T: Any>(&mut self) -> Result<&mut T, FormatError> {
        self.object
            .instance_mut()
            .ok_or(FormatError::Class(ClassTreeError::InstanceMismatch))
    }

    /// The kind of the format: [`FILE_FORMAT_READER_TYPE`] or
    /// [`FILE_FORMAT_WRITER_TYPE`] for the built-in formats, or in general,
    /// the format's ancestor directly beneath [`FILE_FORMAT_TYPE`].
    pub fn object_type(&self) -> ObjectType {
        let class = self.object.class();
        class
            .child_of_ancestor(FILE_FORMAT_TYPE)
            .unwrap_or(class.object_type())
    }

    /// The type of the format's own class.
    pub fn class_type(&self) -> ObjectType {
        self.object.object_type()
    }

    pub fn has_modal_configure(&self) -> bool {
        self.object.method(MethodType::ModalConfigure).is_some()
    }

    pub fn modal_configure(&mut self) -> Result<ConfigureOutcome, FormatError> {
        match self.object.method(MethodType::ModalConfigure) {
            Some(Method::ModalConfigure(configure)) => configure(self),
            _ => Err(FormatError::CapabilityMissing(MethodType::ModalConfigure)),
        }
    }

    /// Appends the format's configuration data to the buffer.
    pub fn configuration_data(&self, buffer: &mut Vec<u8>) -> Result<(), FormatError> {
        match self.object.method(MethodType::GetConfigurationData) {
            Some(Method::GetConfigurationData(get)) => get(self, buffer),
            _ => Err(FormatError::CapabilityMissing(MethodType::GetConfigurationData)),
        }
    }

    /// Configures the format with data from [`FileFormat::configuration_data`].
    pub fn set_configuration_data(&mut self, data: &[u8]) -> Result<(), FormatError> {
        match self.object.method(MethodType::SetConfigurationData) {
            Some(Method::SetConfigurationData(set)) => set(self, data),
            _ => Err(FormatError::CapabilityMissing(MethodType::SetConfigurationData)),
        }
    }

    pub fn start_file(&mut self) -> Result<(), FormatError> {
        match self.object.method(MethodType::StartFile) {
            Some(Method::StartFile(start_file)) => start_file(self),
            _ => Ok(()),
        }
    }

    pub fn start_pass(&mut self) -> Result<(), FormatError> {
        match self.object.method(MethodType::StartPass) {
            Some(Method::StartPass(start_pass)) => start_pass(self),
            _ => Ok(()),
        }
    }

    pub fn end_pass(&mut self) -> Result<ViewStatus, FormatError> {
        match self.object.method(MethodType::EndPass) {
            Some(Method::EndPass(end_pass)) => end_pass(self),
            _ => Ok(ViewStatus::Done),
        }
    }

    /// Reads the next token into the buffer, replacing its contents. Returns
    /// `None` when the stream has no more tokens.
    pub fn read_token(&mut self, token: &mut Vec<u8>) -> Result<Option<TokenInfo>, FormatError> {
        match self.object.method(MethodType::ReadToken) {
            Some(Method::ReadToken(read_token)) => read_token(self, token),
            _ => Err(FormatError::CapabilityMissing(MethodType::ReadToken)),
        }
    }

    pub fn write_token(&mut self, token: &[u8], info: TokenInfo) -> Result<(), FormatError> {
        match self.object.method(MethodType::WriteToken) {
            Some(Method::WriteToken(write_token)) => write_token(self, token, info),
            _ => Err(FormatError::CapabilityMissing(MethodType::WriteToken)),
        }
    }

    /// Reads from the attached storage at `position` without moving the
    /// current position.
    fn storage_read(&self, position: u64, buffer: &mut [u8]) -> Result<usize, FormatError> {
        let storage = self.storage.as_ref().ok_or(FormatError::NotAttached)?;
        let mut storage = storage.borrow_mut();
        let Some(Method::ReadData(read_data)) = storage.method(MethodType::ReadData) else {
            return Err(FormatError::CapabilityMissing(MethodType::ReadData));
        };
        Ok(read_data(storage.instance_any_mut(), position, buffer)?)
    }

    /// Writes to the attached storage at `position` without moving the
    /// current position.
    fn storage_write(&self, position: u64, buffer: &[u8]) -> Result<usize, FormatError> {
        let storage = self.storage.as_ref().ok_or(FormatError::NotAttached)?;
        let mut storage = storage.borrow_mut();
        let Some(Method::WriteData(write_data)) = storage.method(MethodType::WriteData) else {
            return Err(FormatError::CapabilityMissing(MethodType::WriteData));
        };
        Ok(write_data(storage.instance_any_mut(), position, buffer)?)
    }
}

/// Returns the nickname of the format class, e.g. for listing the available
/// formats.
pub fn format_name_string(
    tree: &ClassTree,
    object_type: ObjectType,
) -> Result<&'static str, FormatError> {
    let class = tree
        .class_by_type(object_type)
        .ok_or(ClassTreeError::UnregisteredType(object_type))?;
    match class.method(MethodType::GetNickNameString) {
        Some(Method::GetNickNameString(nickname)) => Ok(nickname()),
        _ => Err(FormatError::CapabilityMissing(MethodType::GetNickNameString)),
    }
}

/// Registers the file format base classes, and the built-in readers and
/// writers beneath them.
pub fn register_classes(tree: &mut ClassTree) -> Result<(), ClassTreeError> {
    tree.register_class(ObjectType::SHARED, FILE_FORMAT_TYPE, "FileFormat", &[])?;

    tree.register_class(FILE_FORMAT_TYPE, FILE_FORMAT_READER_TYPE, "FileFormatReader", &[])?;
    text_tokens::register_reader(tree)?;

    tree.register_class(FILE_FORMAT_TYPE, FILE_FORMAT_WRITER_TYPE, "FileFormatWriter", &[])?;
    text_tokens::register_writer(tree)?;
    Ok(())
}

/// Unregisters the classes registered in [`register_classes`], in reverse.
pub fn unregister_classes(tree: &mut ClassTree) -> Result<(), ClassTreeError> {
    text_tokens::unregister_reader(tree)?;
    tree.unregister_class(FILE_FORMAT_READER_TYPE)?;
    text_tokens::unregister_writer(tree)?;
    tree.unregister_class(FILE_FORMAT_WRITER_TYPE)?;
    tree.unregister_class(FILE_FORMAT_TYPE)?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use core::any::Any;

    use alloc::{boxed::Box, rc::Rc, vec, vec::Vec};

    use crate::{
        class_tree::{ClassTree, ClassTreeError, Method, MethodType, ObjectType, SharedObject},
        formats::{TEXT_TOKEN_READER_TYPE, TEXT_TOKEN_WRITER_TYPE},
        storage::{self, MemoryStorage, StorageError, STORAGE_TYPE},
    };

    use super::{
        format_name_string, ConfigureOutcome, FileFormat, FormatError, TokenInfo, ViewStatus,
        FILE_FORMAT_READER_TYPE, FILE_FORMAT_TYPE, FILE_FORMAT_WRITER_TYPE,
    };

    /// A storage class which can only be read from and sized.
    pub const READ_ONLY_STORAGE: ObjectType = ObjectType::from_fourcc(*b"rost");
    /// A storage class with no methods at all.
    pub const OPAQUE_STORAGE: ObjectType = ObjectType::from_fourcc(*b"opst");
    /// A storage class which reads at most 3 bytes at a time.
    pub const TRICKLE_STORAGE: ObjectType = ObjectType::from_fourcc(*b"trst");

    const CONFIGURABLE_READER: ObjectType = ObjectType::from_fourcc(*b"cfrd");

    fn read_only_read(
        instance: &mut dyn Any,
        position: u64,
        buffer: &mut [u8],
    ) -> Result<usize, StorageError> {
        let data = instance.downcast_ref::<Vec<u8>>().ok_or(StorageError::InstanceMismatch)?;
        let start = (position as usize).min(data.len());
        let count = buffer.len().min(data.len() - start);
        buffer[..count].copy_from_slice(&data[start..start + count]);
        Ok(count)
    }

    fn trickle_read(
        instance: &mut dyn Any,
        position: u64,
        buffer: &mut [u8],
    ) -> Result<usize, StorageError> {
        let limit = buffer.len().min(3);
        read_only_read(instance, position, &mut buffer[..limit])
    }

    fn read_only_size(instance: &dyn Any) -> Result<u64, StorageError> {
        let data = instance.downcast_ref::<Vec<u8>>().ok_or(StorageError::InstanceMismatch)?;
        Ok(data.len() as u64)
    }

    fn configure(_: &mut FileFormat) -> Result<ConfigureOutcome, FormatError> {
        Ok(ConfigureOutcome::Cancelled)
    }

    fn end_pass(_: &mut FileFormat) -> Result<ViewStatus, FormatError> {
        Ok(ViewStatus::Retraverse)
    }

    /// A class tree with the engine's classes and the test storages.
    pub fn test_tree() -> ClassTree {
        let mut tree = ClassTree::new();
        crate::register_classes(&mut tree).unwrap();
        tree.register_class(
            STORAGE_TYPE,
            READ_ONLY_STORAGE,
            "ReadOnlyStorage",
            &[Method::ReadData(read_only_read), Method::GetSize(read_only_size)],
        )
        .unwrap();
        tree.register_class(
            READ_ONLY_STORAGE,
            TRICKLE_STORAGE,
            "TrickleStorage",
            &[Method::ReadData(trickle_read)],
        )
        .unwrap();
        tree.register_class(STORAGE_TYPE, OPAQUE_STORAGE, "OpaqueStorage", &[]).unwrap();
        tree.register_class(
            FILE_FORMAT_READER_TYPE,
            CONFIGURABLE_READER,
            "ConfigurableReader",
            &[Method::ModalConfigure(configure), Method::EndPass(end_pass)],
        )
        .unwrap();
        tree
    }

    pub fn storage_of(tree: &ClassTree, object_type: ObjectType, data: &[u8]) -> SharedObject {
        tree.create_instance_with(object_type, Box::new(data.to_vec()))
            .unwrap()
            .into_shared()
    }

    /// A reader attached to a memory storage with the data.
    pub fn attached_format(tree: &ClassTree, data: &[u8]) -> FileFormat {
        let mut format = FileFormat::new_from_type(tree, TEXT_TOKEN_READER_TYPE).unwrap();
        format
            .init(Some(MemoryStorage::new_shared(tree, data.to_vec()).unwrap()))
            .unwrap();
        format
    }

    #[test]
    fn init_attaches_and_caches_the_size() {
        let tree = test_tree();
        let mut format = FileFormat::new_from_type(&tree, TEXT_TOKEN_READER_TYPE).unwrap();
        assert!(format.storage().is_none());
        assert!(!format.read_in_group());

        format
            .init(Some(MemoryStorage::new_shared(&tree, vec![0; 10]).unwrap()))
            .unwrap();
        assert_eq!(10, format.logical_eof());
        assert_eq!(0, format.position());
        assert!(format.read_in_group());
    }

    #[test]
    fn reattaching_releases_the_previous_storage() {
        let tree = test_tree();
        let first = MemoryStorage::new_shared(&tree, vec![0; 4]).unwrap();
        let second = MemoryStorage::new_shared(&tree, vec![0; 8]).unwrap();

        let mut format = FileFormat::new_from_type(&tree, TEXT_TOKEN_READER_TYPE).unwrap();
        format.init(Some(first.clone())).unwrap();
        assert_eq!(2, Rc::strong_count(&first));
        format.set_position(3);

        format.init(Some(second.clone())).unwrap();
        assert_eq!(1, Rc::strong_count(&first));
        assert_eq!(2, Rc::strong_count(&second));
        assert_eq!(0, format.position());
        assert_eq!(8, format.logical_eof());

        format.init(None).unwrap();
        assert_eq!(1, Rc::strong_count(&second));
        drop(format);
        assert_eq!(Some(Ok(8)), storage::size(&second.borrow()));
    }

    #[test]
    fn init_needs_a_sized_storage() {
        let tree = test_tree();
        let mut format = FileFormat::new_from_type(&tree, TEXT_TOKEN_READER_TYPE).unwrap();
        let opaque = storage_of(&tree, OPAQUE_STORAGE, b"abc");
        assert_eq!(
            Err(FormatError::CapabilityMissing(MethodType::GetSize)),
            format.init(Some(opaque)),
        );
    }

    #[test]
    fn only_concrete_formats_can_be_created() {
        let tree = test_tree();
        let not_a_format = FileFormat::new_from_type(&tree, STORAGE_TYPE);
        assert!(matches!(
            not_a_format,
            Err(FormatError::Class(ClassTreeError::NotKindOf { .. }))
        ));
        assert!(FileFormat::new_from_type(&tree, FILE_FORMAT_TYPE).is_err());
        assert!(matches!(
            FileFormat::new_from_type(&tree, ObjectType::from_fourcc(*b"none")),
            Err(FormatError::Class(ClassTreeError::UnregisteredType(_)))
        ));
    }

    #[test]
    fn object_type_is_the_format_kind() {
        let tree = test_tree();
        let reader = FileFormat::new_from_type(&tree, CONFIGURABLE_READER).unwrap();
        assert_eq!(FILE_FORMAT_READER_TYPE, reader.object_type());
        assert_eq!(CONFIGURABLE_READER, reader.class_type());

        let writer = FileFormat::new_from_type(&tree, TEXT_TOKEN_WRITER_TYPE).unwrap();
        assert_eq!(FILE_FORMAT_WRITER_TYPE, writer.object_type());
    }

    #[test]
    fn optional_methods() {
        let tree = test_tree();
        let mut configurable = FileFormat::new_from_type(&tree, CONFIGURABLE_READER).unwrap();
        assert!(configurable.has_modal_configure());
        assert_eq!(Ok(ConfigureOutcome::Cancelled), configurable.modal_configure());
        assert_eq!(Ok(ViewStatus::Retraverse), configurable.end_pass());
        assert_eq!(Ok(()), configurable.start_file());
        assert_eq!(Ok(()), configurable.start_pass());
        assert_eq!(
            Err(FormatError::CapabilityMissing(MethodType::WriteToken)),
            configurable.write_token(b"x", TokenInfo { line: 1 }),
        );

        let mut writer = FileFormat::new_from_type(&tree, TEXT_TOKEN_WRITER_TYPE).unwrap();
        assert!(!writer.has_modal_configure());
        assert_eq!(
            Err(FormatError::CapabilityMissing(MethodType::ModalConfigure)),
            writer.modal_configure(),
        );
        assert_eq!(
            Err(FormatError::CapabilityMissing(MethodType::SetConfigurationData)),
            writer.set_configuration_data(b""),
        );
    }

    #[test]
    fn nicknames() {
        let tree = test_tree();
        assert_eq!(Ok("Text tokens"), format_name_string(&tree, TEXT_TOKEN_READER_TYPE));
        assert_eq!(
            Err(FormatError::CapabilityMissing(MethodType::GetNickNameString)),
            format_name_string(&tree, FILE_FORMAT_READER_TYPE),
        );
        assert_eq!(
            Err(FormatError::Class(ClassTreeError::UnregisteredType(CONFIGURABLE_READER))),
            format_name_string(&ClassTree::new(), CONFIGURABLE_READER),
        );
    }

    #[test]
    fn registration_round_trips() {
        let mut tree = ClassTree::new();
        assert_eq!(
            Err(ClassTreeError::UnregisteredType(TEXT_TOKEN_READER_TYPE)),
            crate::unregister_classes(&mut tree),
        );
        crate::register_classes(&mut tree).unwrap();
        assert!(tree.is_registered(TEXT_TOKEN_WRITER_TYPE));
        assert_eq!(
            Err(ClassTreeError::AlreadyRegistered(STORAGE_TYPE)),
            crate::register_classes(&mut tree),
        );
        crate::unregister_classes(&mut tree).unwrap();
        assert_eq!(1, tree.len());
    }
}
