// Copyright 2025 Dougless Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! `.douglessrc` discovery, loading and atomic persistence.
//!
//! The file is a JSON object with a single `permissions` key mapping kinds to
//! pattern arrays. Discovery walks upward from the script directory and takes
//! the first match; a missing file is equivalent to `{}`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::kind::PermissionKind;

pub const CONFIG_FILE_NAMES: [&str; 2] = [".douglessrc", ".douglessrc.json"];

#[derive(Snafu, Debug)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    #[snafu(display("Failed to read config at {}", path.display()))]
    Read {
        path:   PathBuf,
        #[snafu(source)]
        source: std::io::Error,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    #[snafu(display("Failed to parse config at {}", path.display()))]
    Parse {
        path:   PathBuf,
        #[snafu(source)]
        source: serde_json::Error,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    #[snafu(display("Failed to write config at {}", path.display()))]
    Write {
        path:   PathBuf,
        #[snafu(source)]
        source: std::io::Error,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub permissions: PermissionsSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionsSection {
    pub read:  Vec<String>,
    pub write: Vec<String>,
    pub net:   Vec<String>,
    pub env:   Vec<String>,
    pub run:   Vec<String>,
}

impl PermissionsSection {
    #[must_use]
    pub fn for_kind(&self, kind: PermissionKind) -> &[String] {
        match kind {
            PermissionKind::Read => &self.read,
            PermissionKind::Write => &self.write,
            PermissionKind::Net => &self.net,
            PermissionKind::Env => &self.env,
            PermissionKind::Run => &self.run,
        }
    }

    pub fn for_kind_mut(&mut self, kind: PermissionKind) -> &mut Vec<String> {
        match kind {
            PermissionKind::Read => &mut self.read,
            PermissionKind::Write => &mut self.write,
            PermissionKind::Net => &mut self.net,
            PermissionKind::Env => &mut self.env,
            PermissionKind::Run => &mut self.run,
        }
    }
}

/// Walks upward from `start` and returns the first config file found.
#[must_use]
pub fn discover(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(current) = dir {
        for name in CONFIG_FILE_NAMES {
            let candidate = current.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        dir = current.parent();
    }
    None
}

/// Loads a config file; a missing file is `{}`.
pub fn load(path: &Path) -> Result<ConfigFile, ConfigError> {
    if !path.exists() {
        return Ok(ConfigFile::default());
    }
    let raw = std::fs::read_to_string(path).context(ReadSnafu { path })?;
    serde_json::from_str(&raw).context(ParseSnafu { path })
}

/// Appends a pattern under `kind` and atomically replaces the file (write to
/// a sibling temp file, then rename). No-op when the pattern is already
/// present.
pub fn append_pattern(
    path: &Path,
    kind: PermissionKind,
    pattern: &str,
) -> Result<(), ConfigError> {
    let mut config = load(path)?;
    let patterns = config.permissions.for_kind_mut(kind);
    if patterns.iter().any(|existing| existing == pattern) {
        return Ok(());
    }
    patterns.push(pattern.to_string());

    let serialized =
        serde_json::to_string_pretty(&config).expect("config serialization cannot fail");
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, serialized).context(WriteSnafu { path: &tmp })?;
    std::fs::rename(&tmp, path).context(WriteSnafu { path })
}
