// SPDX-FileCopyrightText: 2024 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::PathBuf;

use bpaf::{
    batteries::verbose_by_slice, construct, long, positional, pure, OptionParser, Parser, ShellComp,
};
use tracing::level_filters::LevelFilter;

#[derive(Debug, Clone)]
pub struct Options {
    pub verbosity_level: LevelFilter,
    pub settings_path: Option<PathBuf>,
    pub stop_chars: Option<String>,
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Dump { input: PathBuf },
    Copy { input: PathBuf, output: PathBuf },
    Formats,
}

fn file(metavar: &'static str, help: &'static str) -> impl Parser<PathBuf> {
    positional::<PathBuf>(metavar)
        .help(help)
        .complete_shell(ShellComp::File { mask: None })
}

pub fn options() -> OptionParser<Options> {
    let verbosity_level = verbose_by_slice(
        2,
        [
            LevelFilter::OFF,
            LevelFilter::ERROR,
            LevelFilter::WARN,
            LevelFilter::INFO,
            LevelFilter::DEBUG,
            LevelFilter::TRACE,
        ],
    );

    let settings_path = long("settings")
        .help("Reads the reader configuration from a JSON settings file")
        .argument::<PathBuf>("FILE")
        .complete_shell(ShellComp::File {
            mask: Some("*.json"),
        })
        .optional();

    let stop_chars = long("stop-chars")
        .help("Characters which are tokens of their own, overriding the settings file")
        .argument::<String>("CHARS")
        .optional();

    let dump = {
        let input = file("INPUT", "The text file to tokenize");
        construct!(Command::Dump { input })
            .to_options()
            .descr("Prints the tokens of a file, grouped by the line they're on")
            .command("dump")
    };

    let copy = {
        let input = file("INPUT", "The text file to read tokens from");
        let output = file("OUTPUT", "The file to write the tokens into");
        construct!(Command::Copy { input, output })
            .to_options()
            .descr("Rewrites the tokens of a file into another file")
            .command("copy")
    };

    let formats = pure(Command::Formats)
        .to_options()
        .descr("Lists the built-in file formats")
        .command("formats");

    let command = construct!([dump, copy, formats]);

    construct!(Options {
        verbosity_level,
        settings_path,
        stop_chars,
        command,
    })
    .to_options()
    .descr("Tokenizes text files with the scene engine's file format readers")
}
