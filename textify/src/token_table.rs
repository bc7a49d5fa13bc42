// SPDX-FileCopyrightText: 2024 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use std::ops::Range;

use anyhow::anyhow;
use platform::Platform;
use scene_engine::{
    allocators::{Placement, Pool, PoolHandle},
    file_format::TokenInfo,
};

#[derive(Debug)]
pub struct TokenRow {
    pub line: u32,
    /// Set on the first token of each line.
    pub starts_line: bool,
    text: Range<usize>,
}

/// All the tokens of a file, in the order they were read.
///
/// The rows live in a pool, each line's tokens placed near the line's first
/// token, which can be found again from any token of the line with
/// [`TokenTable::line_start`].
pub struct TokenTable<'p> {
    rows: Pool<'p, TokenRow>,
    order: Vec<PoolHandle<TokenRow>>,
    text: Vec<u8>,
    line_start: Option<PoolHandle<TokenRow>>,
}

impl<'p> TokenTable<'p> {
    pub fn new(platform: &'p dyn Platform) -> TokenTable<'p> {
        TokenTable::with_block_length(platform, Pool::<TokenRow>::DEFAULT_BLOCK_LENGTH)
    }

    pub fn with_block_length(platform: &'p dyn Platform, block_length: usize) -> TokenTable<'p> {
        TokenTable {
            rows: Pool::with_block_length(platform, block_length),
            order: Vec::new(),
            text: Vec::new(),
            line_start: None,
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn push(&mut self, token: &[u8], info: TokenInfo) -> anyhow::Result<PoolHandle<TokenRow>> {
        let line_start = self
            .line_start
            .filter(|start| self.rows.get(*start).is_some_and(|row| row.line == info.line));

        let text_start = self.text.len();
        self.text.extend_from_slice(token);
        let row = TokenRow {
            line: info.line,
            starts_line: line_start.is_none(),
            text: text_start..self.text.len(),
        };

        let placement = match line_start {
            Some(start) => Placement::Near(start),
            None => Placement::Any,
        };
        let handle = self
            .rows
            .allocate_tagged(row, placement)
            .map_err(|_| anyhow!("Ran out of memory for the token table"))?;

        if line_start.is_none() {
            self.line_start = Some(handle);
        }
        self.order.push(handle);
        Ok(handle)
    }

    /// The tokens in the order they were pushed.
    pub fn handles(&self) -> &[PoolHandle<TokenRow>] {
        &self.order
    }

    pub fn row(&self, handle: PoolHandle<TokenRow>) -> Option<&TokenRow> {
        self.rows.get(handle)
    }

    pub fn text(&self, handle: PoolHandle<TokenRow>) -> Option<&[u8]> {
        let row = self.rows.get(handle)?;
        self.text.get(row.text.clone())
    }

    /// Finds the first token of the line the token is on.
    pub fn line_start(&self, handle: PoolHandle<TokenRow>) -> Option<PoolHandle<TokenRow>> {
        self.rows.item_tag(handle, |row| row.starts_line)
    }

    pub fn block_count(&self) -> usize {
        self.rows.block_count()
    }
}
