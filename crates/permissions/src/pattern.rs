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

//! Pattern matchers for the three target shapes: filesystem paths,
//! `host[:port]` endpoints, and exact names.

use std::path::{Component, Path, PathBuf};

pub(crate) const GRANT_ALL: &str = "*";

/// Canonicalises a path for permission matching: absolute, symlink-resolved
/// where the filesystem cooperates, logically normalised where it does not
/// (targets that do not exist yet must still match their subtree).
pub(crate) fn canonical_path(target: &Path) -> PathBuf {
    let absolute = if target.is_absolute() {
        target.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("/"))
            .join(target)
    };
    match absolute.canonicalize() {
        Ok(resolved) => resolved,
        Err(_) => normalize(&absolute),
    }
}

/// Logical normalisation: strips `.`, folds `..` onto the parent. No
/// filesystem access.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// A path pattern matches when the canonical target equals the canonical
/// pattern or lives in its subtree.
pub(crate) fn path_matches(pattern: &str, canonical_target: &Path) -> bool {
    if pattern == GRANT_ALL {
        return true;
    }
    let pattern = canonical_path(Path::new(pattern));
    canonical_target == pattern.as_path() || canonical_target.starts_with(&pattern)
}

/// Splits `host[:port]`, tolerating a bracketed IPv6 host.
fn split_endpoint(endpoint: &str) -> (String, Option<u16>) {
    if let Some(rest) = endpoint.strip_prefix('[') {
        if let Some((host, tail)) = rest.split_once(']') {
            let port = tail.strip_prefix(':').and_then(|p| p.parse().ok());
            return (normalize_host(host), port);
        }
    }
    match endpoint.rsplit_once(':') {
        // A second colon means a bare IPv6 address, not a port separator.
        Some((host, port)) if !host.contains(':') => {
            (normalize_host(host), port.parse().ok())
        }
        _ => (normalize_host(endpoint), None),
    }
}

/// The `localhost` alias covers the loopback addresses in both directions.
fn normalize_host(host: &str) -> String {
    match host {
        "127.0.0.1" | "::1" => "localhost".to_string(),
        other => other.to_ascii_lowercase(),
    }
}

/// A net pattern matches by host (any port) or by exact `host:port`.
pub(crate) fn net_matches(pattern: &str, target: &str) -> bool {
    if pattern == GRANT_ALL {
        return true;
    }
    let (pattern_host, pattern_port) = split_endpoint(pattern);
    let (target_host, target_port) = split_endpoint(target);
    if pattern_host != target_host {
        return false;
    }
    match pattern_port {
        None => true,
        Some(port) => target_port == Some(port),
    }
}

/// Env and Run match exact names, plus the blanket `*`.
pub(crate) fn name_matches(pattern: &str, target: &str) -> bool {
    pattern == GRANT_ALL || pattern == target
}
