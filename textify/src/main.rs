// SPDX-FileCopyrightText: 2024 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

mod cli;
mod settings;
mod system_platform;
mod token_table;

use std::{
    io::{self, Write},
    path::Path,
};

use anyhow::Context;
use cli::Command;
use scene_engine::{
    class_tree::ClassTree,
    file_format::{format_name_string, FileFormat, ViewStatus},
    formats::{TEXT_TOKEN_READER_TYPE, TEXT_TOKEN_WRITER_TYPE},
    storage::FileStorage,
};
use settings::Settings;
use system_platform::SystemPlatform;
use token_table::TokenTable;
use tracing::{debug, info, warn};

fn main() -> anyhow::Result<()> {
    let options = cli::options().run();

    tracing_subscriber::fmt()
        .with_max_level(options.verbosity_level)
        .with_writer(io::stderr)
        .init();

    let settings = match &options.settings_path {
        Some(path) => settings::read(path)?,
        None => Settings::default(),
    };
    let extra_stop_chars = options.stop_chars.as_deref().unwrap_or(settings.extra_stop_chars());

    let mut tree = ClassTree::new();
    scene_engine::register_classes(&mut tree)
        .context("Failed to register the engine classes")?;
    debug!(classes = tree.len(), "registered the engine classes");

    match &options.command {
        Command::Dump { input } => dump(&tree, input, extra_stop_chars)?,
        Command::Copy { input, output } => copy(&tree, input, output, extra_stop_chars)?,
        Command::Formats => list_formats(&tree)?,
    }

    scene_engine::unregister_classes(&mut tree)
        .context("Failed to unregister the engine classes")?;
    Ok(())
}

fn open_reader(
    tree: &ClassTree,
    path: &Path,
    extra_stop_chars: &str,
) -> anyhow::Result<FileFormat> {
    let storage = FileStorage::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?
        .into_shared(tree)?;
    let mut reader = FileFormat::new_from_type(tree, TEXT_TOKEN_READER_TYPE)?;
    reader
        .set_configuration_data(extra_stop_chars.as_bytes())
        .context("Invalid extra stop characters, they should be printable ASCII")?;
    reader.init(Some(storage))?;
    reader.start_file()?;
    reader.start_pass()?;
    Ok(reader)
}

fn dump(tree: &ClassTree, input: &Path, extra_stop_chars: &str) -> anyhow::Result<()> {
    let mut reader = open_reader(tree, input, extra_stop_chars)?;
    let platform = SystemPlatform;
    let mut table = TokenTable::new(&platform);

    let mut token = Vec::new();
    while let Some(info) = reader
        .read_token(&mut token)
        .with_context(|| format!("Failed to read a token from {}", input.display()))?
    {
        table.push(&token, info)?;
    }
    if reader.end_pass()? != ViewStatus::Done {
        warn!("the reader asked for another pass, which is not supported");
    }

    let mut out = io::stdout().lock();
    let mut current_line = None;
    for &handle in table.handles() {
        let (Some(row), Some(text)) = (table.row(handle), table.text(handle)) else {
            continue;
        };
        let line_start = table.line_start(handle);
        if line_start != current_line {
            if current_line.is_some() {
                writeln!(out)?;
            }
            write!(out, "{:>5} |", row.line)?;
            current_line = line_start;
        }
        out.write_all(b" ")?;
        out.write_all(text)?;
    }
    if current_line.is_some() {
        writeln!(out)?;
    }

    info!(
        tokens = table.len(),
        pool_blocks = table.block_count(),
        "dumped {}",
        input.display(),
    );
    Ok(())
}

fn copy(
    tree: &ClassTree,
    input: &Path,
    output: &Path,
    extra_stop_chars: &str,
) -> anyhow::Result<()> {
    let mut reader = open_reader(tree, input, extra_stop_chars)?;

    let storage = FileStorage::create(output)
        .with_context(|| format!("Failed to create {}", output.display()))?
        .into_shared(tree)?;
    let mut writer = FileFormat::new_from_type(tree, TEXT_TOKEN_WRITER_TYPE)?;
    writer.init(Some(storage))?;
    writer.start_file()?;
    writer.start_pass()?;

    let mut token = Vec::new();
    let mut count = 0;
    while let Some(info) = reader.read_token(&mut token)? {
        writer
            .write_token(&token, info)
            .with_context(|| format!("Failed to write to {}", output.display()))?;
        count += 1;
    }
    reader.end_pass()?;
    writer.end_pass()?;

    info!(
        tokens = count,
        bytes = writer.position(),
        "copied {} to {}",
        input.display(),
        output.display(),
    );
    Ok(())
}

fn list_formats(tree: &ClassTree) -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    for format_type in [TEXT_TOKEN_READER_TYPE, TEXT_TOKEN_WRITER_TYPE] {
        let format = FileFormat::new_from_type(tree, format_type)?;
        let nickname = format_name_string(tree, format_type)?;
        let kind = tree
            .class_by_type(format.object_type())
            .map(|class| class.name())
            .unwrap_or("?");
        let configurable = if format.has_modal_configure() {
            ", configurable"
        } else {
            ""
        };
        writeln!(out, "{format_type}  {nickname} ({kind}{configurable})")?;
    }
    Ok(())
}
