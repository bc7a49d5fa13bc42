// SPDX-FileCopyrightText: 2024 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Whitespace-separated text tokens.
//!
//! The reader splits the stream at blanks, and optionally at a few extra
//! stop characters, which are returned as tokens of their own. Tokens carry
//! the line they started on, which the writer uses to reproduce the line
//! structure.

use core::any::Any;

use alloc::{boxed::Box, vec::Vec};
use arrayvec::ArrayVec;

use crate::{
    class_tree::{ClassTree, ClassTreeError, Method, ObjectType},
    file_format::{
        is_blank, FileFormat, FormatError, TokenInfo, ViewStatus, FILE_FORMAT_READER_TYPE,
        FILE_FORMAT_WRITER_TYPE,
    },
};

pub const TEXT_TOKEN_READER_TYPE: ObjectType = ObjectType::from_fourcc(*b"ttrd");
pub const TEXT_TOKEN_WRITER_TYPE: ObjectType = ObjectType::from_fourcc(*b"ttwr");

/// Tokens longer than this are split into multiple tokens.
pub const MAX_TOKEN_LEN: usize = 1024;
pub const MAX_EXTRA_STOP_CHARS: usize = 8;

const CR: u8 = 0x0D;
const LF: u8 = 0x0A;

/// Instance data of the text token reader.
#[derive(Debug, Clone)]
pub struct TextTokenReader {
    extra_stop_chars: ArrayVec<u8, MAX_EXTRA_STOP_CHARS>,
    line: u32,
    /// Set when the previous token ended in a line break, which has already
    /// been consumed.
    pending_line_break: bool,
}

impl Default for TextTokenReader {
    fn default() -> Self {
        TextTokenReader {
            extra_stop_chars: ArrayVec::new(),
            line: 1,
            pending_line_break: false,
        }
    }
}

impl TextTokenReader {
    /// Bytes which end a token and form a token of their own, e.g. brackets.
    pub fn extra_stop_chars(&self) -> &[u8] {
        &self.extra_stop_chars
    }

    /// The line of the most recently read token.
    pub fn line(&self) -> u32 {
        self.line
    }
}

/// Instance data of the text token writer.
#[derive(Debug, Clone, Default)]
pub struct TextTokenWriter {
    last_line: Option<u32>,
}

pub(crate) fn register_reader(tree: &mut ClassTree) -> Result<(), ClassTreeError> {
    tree.register_class(
        FILE_FORMAT_READER_TYPE,
        TEXT_TOKEN_READER_TYPE,
        "TextTokenReader",
        &[
            Method::NewObject(new_reader),
            Method::GetNickNameString(nickname),
            Method::GetConfigurationData(reader_configuration),
            Method::SetConfigurationData(set_reader_configuration),
            Method::StartFile(start_reading),
            Method::ReadToken(read_token),
        ],
    )
}

pub(crate) fn unregister_reader(tree: &mut ClassTree) -> Result<(), ClassTreeError> {
    tree.unregister_class(TEXT_TOKEN_READER_TYPE)
}

pub(crate) fn register_writer(tree: &mut ClassTree) -> Result<(), ClassTreeError> {
    tree.register_class(
        FILE_FORMAT_WRITER_TYPE,
        TEXT_TOKEN_WRITER_TYPE,
        "TextTokenWriter",
        &[
            Method::NewObject(new_writer),
            Method::GetNickNameString(nickname),
            Method::StartFile(start_writing),
            Method::EndPass(end_writing_pass),
            Method::WriteToken(write_token),
        ],
    )
}

pub(crate) fn unregister_writer(tree: &mut ClassTree) -> Result<(), ClassTreeError> {
    tree.unregister_class(TEXT_TOKEN_WRITER_TYPE)
}

fn nickname() -> &'static str {
    "Text tokens"
}

fn new_reader() -> Box<dyn Any> {
    Box::new(TextTokenReader::default())
}

fn new_writer() -> Box<dyn Any> {
    Box::new(TextTokenWriter::default())
}

fn reader_configuration(format: &FileFormat, buffer: &mut Vec<u8>) -> Result<(), FormatError> {
    let reader = format.instance_data::<TextTokenReader>()?;
    buffer.extend_from_slice(&reader.extra_stop_chars);
    Ok(())
}

/// The configuration is the list of extra stop characters, which must be
/// printable ASCII.
fn set_reader_configuration(format: &mut FileFormat, data: &[u8]) -> Result<(), FormatError> {
    if data.iter().any(|c| !c.is_ascii_graphic()) {
        return Err(FormatError::Rejected);
    }
    let extra_stop_chars: ArrayVec<u8, MAX_EXTRA_STOP_CHARS> =
        ArrayVec::try_from(data).map_err(|_| FormatError::Rejected)?;
    format.instance_data_mut::<TextTokenReader>()?.extra_stop_chars = extra_stop_chars;
    Ok(())
}

fn start_reading(format: &mut FileFormat) -> Result<(), FormatError> {
    let reader = format.instance_data_mut::<TextTokenReader>()?;
    reader.line = 1;
    reader.pending_line_break = false;
    Ok(())
}

fn read_token(
    format: &mut FileFormat,
    token: &mut Vec<u8>,
) -> Result<Option<TokenInfo>, FormatError> {
    profiling::function_scope!();
    let reader = format.instance_data::<TextTokenReader>()?;
    let extra_stop_chars = reader.extra_stop_chars.clone();
    let mut line = reader.line + reader.pending_line_break as u32;
    token.clear();

    // Skip blanks, counting the line breaks
    loop {
        if format.position() >= format.logical_eof() {
            let reader = format.instance_data_mut::<TextTokenReader>()?;
            reader.line = line;
            reader.pending_line_break = false;
            return Ok(None);
        }
        match format.read_binary_8()? {
            LF => line += 1,
            CR => {
                line += 1;
                if format.position() < format.logical_eof() && format.read_binary_8()? != LF {
                    format.set_position(format.position() - 1);
                }
            }
            byte if is_blank(byte) => {}
            _ => {
                format.set_position(format.position() - 1);
                break;
            }
        }
    }

    let mut stop_chars = ArrayVec::<u8, { MAX_EXTRA_STOP_CHARS + 1 }>::new();
    stop_chars.push(CR);
    stop_chars.extend(extra_stop_chars.iter().copied());

    let scan = format.read_until_chars(token, &stop_chars, true, MAX_TOKEN_LEN)?;
    let mut pending_line_break = false;
    match scan.found {
        // The token is just the stop character
        Some(c) if scan.chars_read == 0 => token.push(c),
        // Leave the stop character to be the next token
        Some(c) if extra_stop_chars.contains(&c) => format.set_position(format.position() - 1),
        Some(CR | LF) => pending_line_break = true,
        _ => {}
    }

    let reader = format.instance_data_mut::<TextTokenReader>()?;
    reader.line = line;
    reader.pending_line_break = pending_line_break;
    Ok(Some(TokenInfo { line }))
}

fn start_writing(format: &mut FileFormat) -> Result<(), FormatError> {
    format.instance_data_mut::<TextTokenWriter>()?.last_line = None;
    Ok(())
}

/// Separates tokens on the same line with a space, and reproduces line breaks
/// between lines.
fn write_token(format: &mut FileFormat, token: &[u8], info: TokenInfo) -> Result<(), FormatError> {
    profiling::function_scope!();
    let last_line = format.instance_data::<TextTokenWriter>()?.last_line;
    match last_line {
        Some(last_line) if info.line > last_line => {
            for _ in last_line..info.line {
                format.write_binary_8(LF)?;
            }
        }
        Some(_) => format.write_binary_8(b' ')?,
        None => {}
    }
    format.write_binary_raw(token)?;
    format.instance_data_mut::<TextTokenWriter>()?.last_line = Some(info.line);
    Ok(())
}

fn end_writing_pass(format: &mut FileFormat) -> Result<ViewStatus, FormatError> {
    if format.instance_data::<TextTokenWriter>()?.last_line.is_some() {
        format.write_binary_8(LF)?;
        format.instance_data_mut::<TextTokenWriter>()?.last_line = None;
    }
    Ok(ViewStatus::Done)
}
