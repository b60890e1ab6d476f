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

//! The capability/permission policy consulted on every privileged host
//! operation.
//!
//! Decisions are config-first: a `.douglessrc` discovered near the script
//! seeds the grant table, programmatic grants layer on top, and an
//! interactive prompt is the last resort on a TTY. A denial is always a soft
//! failure: it travels to the script through the ordinary callback/promise
//! path, never a panic.

mod config;
mod holder;
mod kind;
mod manager;
mod pattern;
mod prompt;

pub use config::{
    CONFIG_FILE_NAMES, ConfigError, ConfigFile, PermissionsSection, append_pattern, discover, load,
};
pub use holder::{current, install, swap};
pub use kind::PermissionKind;
pub use manager::PermissionManager;
pub use prompt::{DenyPrompter, Prompter, ScriptedPrompter, TtyPrompter};
