// SPDX-FileCopyrightText: 2024 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! The built-in file formats.

pub(crate) mod text_tokens;

pub use text_tokens::{
    TextTokenReader, TextTokenWriter, MAX_EXTRA_STOP_CHARS, MAX_TOKEN_LEN, TEXT_TOKEN_READER_TYPE,
    TEXT_TOKEN_WRITER_TYPE,
};
