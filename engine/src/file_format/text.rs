// SPDX-FileCopyrightText: 2024 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use alloc::vec::Vec;

use super::{FileFormat, FormatError};

const CR: u8 = 0x0D;
const LF: u8 = 0x0A;

/// Returns `true` for the bytes skipped by [`FileFormat::skip_blanks`]:
/// control characters, space, and DEL.
pub fn is_blank(byte: u8) -> bool {
    byte <= 0x20 || byte == 0x7F
}

/// The outcome of [`FileFormat::read_until_chars`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanResult {
    /// The byte which stopped the scan, or `None` if the scan ran out of
    /// bytes before finding one.
    pub found: Option<u8>,
    /// The amount of bytes before the stopping byte.
    pub chars_read: usize,
}

impl FileFormat {
    /// Reads bytes into the buffer one at a time until a zero byte, and
    /// returns the amount of bytes appended, not counting the zero.
    ///
    /// Each byte read advances the position. Fails with
    /// [`FormatError::EndOfStream`] if the stream ends before the zero byte,
    /// leaving the bytes read so far in the buffer.
    pub fn read_zero_terminated_string(
        &mut self,
        buffer: &mut Vec<u8>,
    ) -> Result<usize, FormatError> {
        profiling::function_scope!();
        let mut count = 0;
        loop {
            let mut byte = [0; 1];
            let result = self.storage_read(self.current_storage_position, &mut byte);
            self.current_storage_position += 1;
            match result? {
                0 => return Err(FormatError::EndOfStream),
                _ if byte[0] == 0 => return Ok(count),
                _ => {
                    buffer.push(byte[0]);
                    count += 1;
                }
            }
        }
    }

    /// Moves the position past any blank bytes (see [`is_blank`]), stopping
    /// at the first other byte, or at the logical end of the stream.
    pub fn skip_blanks(&mut self) -> Result<(), FormatError> {
        profiling::function_scope!();
        if self.storage.is_none() {
            return Err(FormatError::NotAttached);
        }
        while self.current_storage_position < self.logical_eof {
            let mut byte = [0; 1];
            let read = self.storage_read(self.current_storage_position, &mut byte)?;
            if read == 0 || !is_blank(byte[0]) {
                break;
            }
            self.current_storage_position += 1;
        }
        Ok(())
    }

    /// Reads up to `max_len` bytes in one go, and looks for the first byte
    /// that is in `stop_chars`, or blank (any byte up to 0x20) if `blanks` is
    /// set. The buffer is left with the bytes before the stopping byte.
    ///
    /// A CR in `stop_chars` also stops at LF, so that both line ending styles
    /// can be found with just CR. If a CR is found and followed by LF, the LF
    /// is consumed as well.
    ///
    /// The position ends up right after the stopping byte, or after the bytes
    /// read if there was none. Fails with [`FormatError::EndOfStream`] if
    /// there were no bytes to read at all.
    pub fn read_until_chars(
        &mut self,
        buffer: &mut Vec<u8>,
        stop_chars: &[u8],
        blanks: bool,
        max_len: usize,
    ) -> Result<ScanResult, FormatError> {
        profiling::function_scope!();
        buffer.clear();
        buffer.resize(max_len, 0);
        let size_read = match self.storage_read(self.current_storage_position, buffer) {
            Ok(0) if max_len > 0 => Err(FormatError::EndOfStream),
            result => result,
        }
        .inspect_err(|_| buffer.clear())?;

        let mut found = None;
        let mut index = 0;
        while self.current_storage_position < self.logical_eof && index < size_read {
            self.current_storage_position += 1;
            let byte = buffer[index];
            let matched = stop_chars
                .iter()
                .copied()
                .find(|stop| *stop == byte || (*stop == CR && byte == LF));
            if matched.is_some() || (blanks && byte <= 0x20) {
                found = Some(byte);
                let crlf = matched == Some(CR)
                    && byte == CR
                    && self.next_is_lf(buffer, index + 1, size_read)?;
                if crlf {
                    self.current_storage_position += 1;
                }
                break;
            }
            index += 1;
        }

        buffer.truncate(index);
        Ok(ScanResult {
            found,
            chars_read: index,
        })
    }

    /// Checks if the byte at `index` of the bulk-read buffer is LF. Past the
    /// end of the bulk read, peeks at the storage instead, unless the
    /// position is already at the logical end of the stream.
    fn next_is_lf(
        &self,
        buffer: &[u8],
        index: usize,
        size_read: usize,
    ) -> Result<bool, FormatError> {
        if index < size_read {
            return Ok(buffer[index] == LF);
        }
        if self.current_storage_position >= self.logical_eof {
            return Ok(false);
        }
        let mut byte = [0; 1];
        let read = self.storage_read(self.current_storage_position, &mut byte)?;
        Ok(read == 1 && byte[0] == LF)
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use crate::file_format::{
        tests::{attached_format, storage_of, test_tree, TRICKLE_STORAGE},
        FileFormat, FormatError, ScanResult,
    };
    use crate::formats::TEXT_TOKEN_READER_TYPE;

    #[test]
    fn zero_terminated_strings() {
        let tree = test_tree();
        let mut format = attached_format(&tree, b"abc\0\0xy");
        let mut buffer = Vec::new();
        assert_eq!(Ok(3), format.read_zero_terminated_string(&mut buffer));
        assert_eq!(b"abc", &buffer[..]);
        assert_eq!(4, format.position());

        assert_eq!(Ok(0), format.read_zero_terminated_string(&mut buffer));
        assert_eq!(5, format.position());

        buffer.clear();
        assert_eq!(
            Err(FormatError::EndOfStream),
            format.read_zero_terminated_string(&mut buffer),
        );
        assert_eq!(b"xy", &buffer[..]);
    }

    #[test]
    fn skip_blanks_stops_at_text() {
        let tree = test_tree();
        let mut format = attached_format(&tree, b" \t\r\n\x7Fx y");
        format.skip_blanks().unwrap();
        assert_eq!(5, format.position());
        assert_eq!(Ok(b'x'), format.read_binary_8());
    }

    #[test]
    fn skip_blanks_stops_at_the_logical_eof() {
        let tree = test_tree();
        let mut format = attached_format(&tree, b"    ");
        format.skip_blanks().unwrap();
        assert_eq!(format.logical_eof(), format.position());
        format.skip_blanks().unwrap();
        assert_eq!(4, format.position());
    }

    #[test]
    fn high_bytes_are_not_blank() {
        let tree = test_tree();
        let mut format = attached_format(&tree, b" \xC3\xA4");
        format.skip_blanks().unwrap();
        assert_eq!(1, format.position());
    }

    #[test]
    fn skip_blanks_needs_a_storage() {
        let tree = test_tree();
        let mut format = FileFormat::new_from_type(&tree, TEXT_TOKEN_READER_TYPE).unwrap();
        assert_eq!(Err(FormatError::NotAttached), format.skip_blanks());
    }

    #[test]
    fn crlf_is_one_terminator() {
        let tree = test_tree();
        let mut format = attached_format(&tree, b"abc\r\ndef");
        let mut buffer = Vec::new();
        let result = format.read_until_chars(&mut buffer, b"\r", false, 16).unwrap();
        assert_eq!(
            ScanResult {
                found: Some(0x0D),
                chars_read: 3
            },
            result,
        );
        assert_eq!(b"abc", &buffer[..]);
        assert_eq!(5, format.position());
    }

    #[test]
    fn crlf_is_one_terminator_across_the_read_boundary() {
        let tree = test_tree();
        let mut format = attached_format(&tree, b"abc\r\ndef");
        let mut buffer = Vec::new();
        let result = format.read_until_chars(&mut buffer, b"\r", false, 4).unwrap();
        assert_eq!(Some(0x0D), result.found);
        assert_eq!(b"abc", &buffer[..]);
        assert_eq!(5, format.position());
    }

    #[test]
    fn lone_cr_at_the_read_boundary() {
        let tree = test_tree();
        let mut format = attached_format(&tree, b"abc\rdef");
        let mut buffer = Vec::new();
        let result = format.read_until_chars(&mut buffer, b"\r", false, 4).unwrap();
        assert_eq!(Some(0x0D), result.found);
        assert_eq!(4, format.position());

        let mut format = attached_format(&tree, b"abc\r");
        format.read_until_chars(&mut buffer, b"\r", false, 4).unwrap();
        assert_eq!(4, format.position(), "the lookahead should stop at the end");
    }

    #[test]
    fn cr_also_finds_lf() {
        let tree = test_tree();
        let mut format = attached_format(&tree, b"ab\n\ncd");
        let mut buffer = Vec::new();
        let result = format.read_until_chars(&mut buffer, b"\r", false, 16).unwrap();
        assert_eq!(Some(0x0A), result.found);
        assert_eq!(2, result.chars_read);
        assert_eq!(3, format.position(), "only one LF should be consumed");
    }

    #[test]
    fn blanks_stop_the_scan() {
        let tree = test_tree();
        let mut format = attached_format(&tree, b"token\tnext");
        let mut buffer = Vec::new();
        let result = format.read_until_chars(&mut buffer, &[], true, 16).unwrap();
        assert_eq!(Some(b'\t'), result.found);
        assert_eq!(b"token", &buffer[..]);
        assert_eq!(6, format.position());
    }

    #[test]
    fn scans_without_a_match_stop_at_max_len() {
        let tree = test_tree();
        let mut format = attached_format(&tree, b"abcdefgh(");
        let mut buffer = Vec::new();
        let result = format.read_until_chars(&mut buffer, b"(", false, 4).unwrap();
        assert_eq!(
            ScanResult {
                found: None,
                chars_read: 4
            },
            result,
        );
        assert_eq!(4, format.position());

        let result = format.read_until_chars(&mut buffer, b"(", false, 16).unwrap();
        assert_eq!(Some(b'('), result.found);
        assert_eq!(b"efgh", &buffer[..]);
        assert_eq!(9, format.position());

        assert_eq!(
            Err(FormatError::EndOfStream),
            format.read_until_chars(&mut buffer, b"(", false, 16),
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn short_reads_are_scanned_as_is() {
        let tree = test_tree();
        let mut format = FileFormat::new_from_type(&tree, TEXT_TOKEN_READER_TYPE).unwrap();
        format
            .init(Some(storage_of(&tree, TRICKLE_STORAGE, b"abcdef")))
            .unwrap();
        let mut buffer = Vec::new();
        let result = format.read_until_chars(&mut buffer, b"e", false, 16).unwrap();
        assert_eq!(None, result.found);
        assert_eq!(b"abc", &buffer[..]);
        assert_eq!(3, format.position());
    }
}
