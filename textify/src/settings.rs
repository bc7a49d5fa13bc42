// SPDX-FileCopyrightText: 2024 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{fs, path::Path};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// The settings file for configuring the token reader.
///
/// Has enum variants for breaking changes in the format of the settings file,
/// but [`read`] always returns the newest variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "settings_file_version", rename_all = "snake_case")]
pub enum Settings {
    V1 {
        /// Characters which are tokens of their own, e.g. brackets.
        #[serde(default)]
        extra_stop_chars: String,
    },
}

impl Default for Settings {
    fn default() -> Self {
        Settings::V1 {
            extra_stop_chars: String::new(),
        }
    }
}

impl Settings {
    pub fn extra_stop_chars(&self) -> &str {
        match self {
            Settings::V1 { extra_stop_chars } => extra_stop_chars,
        }
    }
}

pub fn read(settings: &Path) -> anyhow::Result<Settings> {
    let settings = fs::read_to_string(settings).context("Failed to open the settings file")?;
    parse(&settings)
}

fn parse(settings: &str) -> anyhow::Result<Settings> {
    let settings = serde_json::from_str(settings).context("Failed to parse the settings file")?;

    // NOTE: When there's new versions of Settings, convert to the newest here

    Ok(settings)
}
