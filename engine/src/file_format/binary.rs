// SPDX-FileCopyrightText: 2024 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Fixed-size binary reads and writes.
//!
//! Every transfer advances the position by the full size of the transfer,
//! whether or not it succeeds. The plain variants use the native byte order,
//! the `bin_swap` variants the opposite one.

use bytemuck::Pod;
use tracing::{trace, warn};

use super::{FileFormat, FormatError};

fn check_transfer(requested: usize, result: Result<usize, FormatError>) -> Result<(), FormatError> {
    let transferred = result.inspect_err(|err| trace!(%err, requested, "binary transfer failed"))?;
    if transferred != requested {
        warn!(requested, transferred, "short binary transfer");
        return Err(FormatError::ShortTransfer {
            requested,
            transferred,
        });
    }
    Ok(())
}

impl FileFormat {
    /// Fills the whole buffer from the storage.
    pub fn read_binary_raw(&mut self, buffer: &mut [u8]) -> Result<(), FormatError> {
        profiling::function_scope!();
        let requested = buffer.len();
        let result = self.storage_read(self.current_storage_position, buffer);
        self.current_storage_position += requested as u64;
        check_transfer(requested, result)
    }

    pub fn read_binary_8(&mut self) -> Result<u8, FormatError> {
        let mut bytes = [0; 1];
        self.read_binary_raw(&mut bytes)?;
        Ok(bytes[0])
    }

    pub fn read_binary_16(&mut self) -> Result<u16, FormatError> {
        let mut bytes = [0; 2];
        self.read_binary_raw(&mut bytes)?;
        Ok(u16::from_ne_bytes(bytes))
    }

    pub fn read_binary_32(&mut self) -> Result<u32, FormatError> {
        let mut bytes = [0; 4];
        self.read_binary_raw(&mut bytes)?;
        Ok(u32::from_ne_bytes(bytes))
    }

    pub fn read_binary_64(&mut self) -> Result<u64, FormatError> {
        let mut bytes = [0; 8];
        self.read_binary_raw(&mut bytes)?;
        Ok(u64::from_ne_bytes(bytes))
    }

    pub fn read_bin_swap_16(&mut self) -> Result<u16, FormatError> {
        self.read_binary_16().map(u16::swap_bytes)
    }

    pub fn read_bin_swap_32(&mut self) -> Result<u32, FormatError> {
        self.read_binary_32().map(u32::swap_bytes)
    }

    /// Reads 64 bits and reverses their byte order, i.e. swaps the bytes of
    /// both 32-bit halves, and exchanges the halves.
    pub fn read_bin_swap_64(&mut self) -> Result<u64, FormatError> {
        self.read_binary_64().map(u64::swap_bytes)
    }

    /// Fills the slice with plain data from the storage, in native byte
    /// order.
    pub fn read_binary_array<T: Pod>(&mut self, items: &mut [T]) -> Result<(), FormatError> {
        self.read_binary_raw(bytemuck::cast_slice_mut(items))
    }

    /// Writes the whole buffer to the storage.
    pub fn write_binary_raw(&mut self, buffer: &[u8]) -> Result<(), FormatError> {
        profiling::function_scope!();
        let requested = buffer.len();
        let result = self.storage_write(self.current_storage_position, buffer);
        self.current_storage_position += requested as u64;
        check_transfer(requested, result)
    }

    pub fn write_binary_8(&mut self, value: u8) -> Result<(), FormatError> {
        self.write_binary_raw(&[value])
    }

    pub fn write_binary_16(&mut self, value: u16) -> Result<(), FormatError> {
        self.write_binary_raw(&value.to_ne_bytes())
    }

    pub fn write_binary_32(&mut self, value: u32) -> Result<(), FormatError> {
        self.write_binary_raw(&value.to_ne_bytes())
    }

    pub fn write_binary_64(&mut self, value: u64) -> Result<(), FormatError> {
        self.write_binary_raw(&value.to_ne_bytes())
    }

    pub fn write_bin_swap_16(&mut self, value: u16) -> Result<(), FormatError> {
        self.write_binary_16(value.swap_bytes())
    }

    pub fn write_bin_swap_32(&mut self, value: u32) -> Result<(), FormatError> {
        self.write_binary_32(value.swap_bytes())
    }

    pub fn write_bin_swap_64(&mut self, value: u64) -> Result<(), FormatError> {
        self.write_binary_64(value.swap_bytes())
    }

    /// Writes the string up to its first zero byte, followed by a zero byte.
    pub fn write_binary_string(&mut self, string: &[u8]) -> Result<(), FormatError> {
        let end = string.iter().position(|c| *c == 0).unwrap_or(string.len());
        self.write_binary_raw(&string[..end])?;
        self.write_binary_8(0)
    }

    pub fn write_binary_array<T: Pod>(&mut self, items: &[T]) -> Result<(), FormatError> {
        self.write_binary_raw(bytemuck::cast_slice(items))
    }
}
