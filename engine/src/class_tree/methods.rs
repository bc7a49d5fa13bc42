// SPDX-FileCopyrightText: 2024 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use core::any::Any;

use alloc::{boxed::Box, vec::Vec};
use enum_map::Enum;

use crate::{
    file_format::{ConfigureOutcome, FileFormat, FormatError, TokenInfo, ViewStatus},
    storage::StorageError,
};

/// The kinds of methods a class can provide. Each [`Method`] variant has a
/// matching [`MethodType`], and a class has at most one method of each type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
pub enum MethodType {
    NewObject,
    GetNickNameString,
    // Storage
    ReadData,
    WriteData,
    GetSize,
    // File formats
    ModalConfigure,
    GetConfigurationData,
    SetConfigurationData,
    StartFile,
    StartPass,
    EndPass,
    ReadToken,
    WriteToken,
}

/// A class method. Methods of instance-carrying classes receive the instance
/// data as [`Any`], and downcast it to the type their class creates in
/// [`Method::NewObject`].
#[derive(Clone, Copy)]
pub enum Method {
    /// Creates the instance data for a new object of the class.
    NewObject(fn() -> Box<dyn Any>),
    /// Returns a short human readable name for the class.
    GetNickNameString(fn() -> &'static str),
    /// Reads from the storage at the position into the buffer, returning the
    /// amount of bytes read. Reading fewer bytes than requested is not an
    /// error, it happens e.g. at the end of the storage.
    ReadData(fn(&mut dyn Any, u64, &mut [u8]) -> Result<usize, StorageError>),
    /// Writes the buffer to the storage at the position, returning the amount
    /// of bytes written.
    WriteData(fn(&mut dyn Any, u64, &[u8]) -> Result<usize, StorageError>),
    /// Returns the current size of the storage in bytes.
    GetSize(fn(&dyn Any) -> Result<u64, StorageError>),
    /// Lets the user configure the format interactively.
    ModalConfigure(fn(&mut FileFormat) -> Result<ConfigureOutcome, FormatError>),
    /// Appends the format's configuration, in the format's own encoding, to
    /// the buffer.
    GetConfigurationData(fn(&FileFormat, &mut Vec<u8>) -> Result<(), FormatError>),
    SetConfigurationData(fn(&mut FileFormat, &[u8]) -> Result<(), FormatError>),
    StartFile(fn(&mut FileFormat) -> Result<(), FormatError>),
    StartPass(fn(&mut FileFormat) -> Result<(), FormatError>),
    EndPass(fn(&mut FileFormat) -> Result<ViewStatus, FormatError>),
    /// Reads the next token into the buffer, returning `None` at the end of
    /// the stream.
    ReadToken(fn(&mut FileFormat, &mut Vec<u8>) -> Result<Option<TokenInfo>, FormatError>),
    WriteToken(fn(&mut FileFormat, &[u8], TokenInfo) -> Result<(), FormatError>),
}

impl Method {
    pub fn method_type(&self) -> MethodType {
        match self {
            Method::NewObject(_) => MethodType::NewObject,
            Method::GetNickNameString(_) => MethodType::GetNickNameString,
            Method::ReadData(_) => MethodType::ReadData,
            Method::WriteData(_) => MethodType::WriteData,
            Method::GetSize(_) => MethodType::GetSize,
            Method::ModalConfigure(_) => MethodType::ModalConfigure,
            Method::GetConfigurationData(_) => MethodType::GetConfigurationData,
            Method::SetConfigurationData(_) => MethodType::SetConfigurationData,
            Method::StartFile(_) => MethodType::StartFile,
            Method::StartPass(_) => MethodType::StartPass,
            Method::EndPass(_) => MethodType::EndPass,
            Method::ReadToken(_) => MethodType::ReadToken,
            Method::WriteToken(_) => MethodType::WriteToken,
        }
    }
}

impl core::fmt::Debug for Method {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("Method").field(&self.method_type()).finish()
    }
}
