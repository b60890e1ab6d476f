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

use serde::{Deserialize, Serialize};

/// The five privileged capability classes.
///
/// Read/Write match canonicalised filesystem paths, Net matches
/// `host[:port]`, Env and Run match exact names. Every kind accepts the
/// blanket pattern `*`.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PermissionKind {
    Read,
    Write,
    Net,
    Env,
    Run,
}

impl PermissionKind {
    /// The key under `"permissions"` in the config file; same as `Display`.
    #[must_use]
    pub fn config_key(self) -> String { self.to_string() }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn round_trips_through_config_spelling() {
        for kind in PermissionKind::iter() {
            let spelled = kind.config_key();
            assert_eq!(PermissionKind::from_str(&spelled).unwrap(), kind);
        }
        assert_eq!(PermissionKind::from_str("net").unwrap(), PermissionKind::Net);
    }
}
