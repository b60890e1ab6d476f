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

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::{
    config::{self, ConfigFile},
    kind::PermissionKind,
    pattern,
    prompt::{Prompter, TtyPrompter},
};

/// Grants for one kind: a pattern list plus the blanket flag.
#[derive(Debug, Default, Clone)]
struct PermissionSet {
    grant_all: bool,
    patterns:  Vec<String>,
}

impl PermissionSet {
    fn grant(&mut self, pattern: &str) {
        if pattern == pattern::GRANT_ALL {
            self.grant_all = true;
        } else if !self.patterns.iter().any(|existing| existing == pattern) {
            self.patterns.push(pattern.to_string());
        }
    }
}

#[derive(Debug, Default, Clone)]
struct GrantTable {
    read:  PermissionSet,
    write: PermissionSet,
    net:   PermissionSet,
    env:   PermissionSet,
    run:   PermissionSet,
}

impl GrantTable {
    fn for_kind(&self, kind: PermissionKind) -> &PermissionSet {
        match kind {
            PermissionKind::Read => &self.read,
            PermissionKind::Write => &self.write,
            PermissionKind::Net => &self.net,
            PermissionKind::Env => &self.env,
            PermissionKind::Run => &self.run,
        }
    }

    fn for_kind_mut(&mut self, kind: PermissionKind) -> &mut PermissionSet {
        match kind {
            PermissionKind::Read => &mut self.read,
            PermissionKind::Write => &mut self.write,
            PermissionKind::Net => &mut self.net,
            PermissionKind::Env => &mut self.env,
            PermissionKind::Run => &mut self.run,
        }
    }
}

/// The process-wide capability store.
///
/// `check` is pure and synchronous; `check_with_prompt` may additionally ask
/// the user once and, on a yes, remember the grant for the session and
/// optionally persist it. The manager is replaced as a whole through
/// [`crate::install`]/[`crate::swap`]; nothing outside the session-grant
/// list mutates in place, so decisions stay deterministic for a given
/// (policy, request) pair.
pub struct PermissionManager {
    grants:      RwLock<GrantTable>,
    config_path: Option<PathBuf>,
    prompter:    Box<dyn Prompter>,
}

impl Default for PermissionManager {
    /// Deny-everything policy with the terminal prompter.
    fn default() -> Self {
        Self {
            grants:      RwLock::new(GrantTable::default()),
            config_path: None,
            prompter:    Box::new(TtyPrompter),
        }
    }
}

impl PermissionManager {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Seeds the grant table from a loaded config file. `config_path` is
    /// where prompt-approved grants are persisted.
    #[must_use]
    pub fn from_config(config: &ConfigFile, config_path: Option<PathBuf>) -> Self {
        let manager = Self {
            config_path,
            ..Self::default()
        };
        for kind in [
            PermissionKind::Read,
            PermissionKind::Write,
            PermissionKind::Net,
            PermissionKind::Env,
            PermissionKind::Run,
        ] {
            let patterns: Vec<&str> = config
                .permissions
                .for_kind(kind)
                .iter()
                .map(String::as_str)
                .collect();
            manager.grant(kind, patterns);
        }
        manager
    }

    /// A manager granting everything; startup flags and tests use this.
    #[must_use]
    pub fn allow_all() -> Self {
        let manager = Self::default();
        manager.grant_all();
        manager
    }

    /// Replaces the prompter; tests inject scripted answers here.
    #[must_use]
    pub fn with_prompter(mut self, prompter: Box<dyn Prompter>) -> Self {
        self.prompter = prompter;
        self
    }

    /// Adds session grants for `kind`. Prompt approvals land here too;
    /// grants are only ever added, never downgraded.
    pub fn grant<I, P>(&self, kind: PermissionKind, patterns: I)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let mut grants = self.grants.write();
        let set = grants.for_kind_mut(kind);
        for pattern in patterns {
            set.grant(pattern.as_ref());
        }
    }

    /// Blanket grant for every kind.
    pub fn grant_all(&self) {
        for kind in [
            PermissionKind::Read,
            PermissionKind::Write,
            PermissionKind::Net,
            PermissionKind::Env,
            PermissionKind::Run,
        ] {
            self.grant(kind, [pattern::GRANT_ALL]);
        }
    }

    /// Pure, synchronous decision: no I/O, no prompting.
    #[must_use]
    pub fn check(&self, kind: PermissionKind, target: &str) -> bool {
        let grants = self.grants.read();
        let set = grants.for_kind(kind);
        if set.grant_all {
            return true;
        }
        match kind {
            PermissionKind::Read | PermissionKind::Write => {
                let canonical = pattern::canonical_path(Path::new(target));
                set.patterns
                    .iter()
                    .any(|p| pattern::path_matches(p, &canonical))
            }
            PermissionKind::Net => set.patterns.iter().any(|p| pattern::net_matches(p, target)),
            PermissionKind::Env | PermissionKind::Run => set
                .patterns
                .iter()
                .any(|p| pattern::name_matches(p, target)),
        }
    }

    /// [`PermissionManager::check`] with the interactive fallback: when the
    /// policy denies, a TTY is attached and `ctx` is not cancelled, ask to
    /// grant for the session and then whether to persist to the config file.
    /// Any non-yes answer is a denial.
    pub fn check_with_prompt(
        &self,
        ctx: &CancellationToken,
        kind: PermissionKind,
        target: &str,
    ) -> bool {
        if self.check(kind, target) {
            return true;
        }
        if ctx.is_cancelled() || !self.prompter.interactive() {
            return false;
        }

        let question = format!("Allow {kind} access to \"{target}\"?");
        if self.prompter.ask(&question) != Some(true) {
            return false;
        }

        let pattern = self.pattern_for(kind, target);
        self.grant(kind, [pattern.as_str()]);
        tracing::debug!(%kind, target, "session grant added via prompt");

        if self.prompter.ask("Add to config file?") == Some(true) {
            let path = self
                .config_path
                .clone()
                .unwrap_or_else(|| PathBuf::from(crate::config::CONFIG_FILE_NAMES[0]));
            if let Err(error) = config::append_pattern(&path, kind, &pattern) {
                tracing::warn!(%error, "failed to persist permission grant");
            }
        }
        true
    }

    /// The script-facing denial text, including the config fragment that
    /// would allow the operation.
    #[must_use]
    pub fn error_message(&self, kind: PermissionKind, target: &str) -> String {
        let pattern = self.pattern_for(kind, target);
        format!(
            "Permission denied: {kind} access to \"{target}\". Grant it by adding \"{pattern}\" \
             to permissions.{kind} in .douglessrc."
        )
    }

    /// The config pattern a grant for `target` would use: the canonical path
    /// for filesystem kinds, the target itself otherwise.
    fn pattern_for(&self, kind: PermissionKind, target: &str) -> String {
        match kind {
            PermissionKind::Read | PermissionKind::Write => {
                pattern::canonical_path(Path::new(target))
                    .to_string_lossy()
                    .to_string()
            }
            _ => target.to_string(),
        }
    }
}

impl std::fmt::Debug for PermissionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionManager")
            .field("grants", &*self.grants.read())
            .field("config_path", &self.config_path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::ScriptedPrompter;

    #[test]
    fn deny_by_default_grant_by_pattern() {
        let manager = PermissionManager::new();
        assert!(!manager.check(PermissionKind::Read, "/tmp/file"));

        manager.grant(PermissionKind::Read, ["/tmp"]);
        assert!(manager.check(PermissionKind::Read, "/tmp/file"));
        assert!(!manager.check(PermissionKind::Write, "/tmp/file"));
    }

    #[test]
    fn grant_all_flag_per_kind() {
        let manager = PermissionManager::new();
        manager.grant(PermissionKind::Env, ["*"]);
        assert!(manager.check(PermissionKind::Env, "ANYTHING"));
        assert!(!manager.check(PermissionKind::Run, "anything"));
    }

    #[test]
    fn config_seeding_matches_documented_example() {
        let config: ConfigFile = serde_json::from_str(
            r#"{"permissions": {"read": ["/tmp"], "net": ["localhost:8080", "api.example.com"]}}"#,
        )
        .unwrap();
        let manager = PermissionManager::from_config(&config, None);

        assert!(manager.check(PermissionKind::Read, "/tmp/data.txt"));
        assert!(manager.check(PermissionKind::Net, "localhost:8080"));
        assert!(manager.check(PermissionKind::Net, "api.example.com:443"));
        assert!(!manager.check(PermissionKind::Net, "localhost:9090"));
    }

    #[test]
    fn non_interactive_prompt_denies_without_asking() {
        let manager = PermissionManager::new();
        let ctx = CancellationToken::new();
        assert!(!manager.check_with_prompt(&ctx, PermissionKind::Net, "example.com"));
    }

    #[test]
    fn cancelled_context_denies_immediately() {
        let prompter = Box::new(ScriptedPrompter::with_answers([Some(true), Some(true)]));
        let manager = PermissionManager::new().with_prompter(prompter);
        let ctx = CancellationToken::new();
        ctx.cancel();
        assert!(!manager.check_with_prompt(&ctx, PermissionKind::Net, "example.com"));
    }

    #[test]
    fn prompt_grants_for_the_session() {
        let manager = PermissionManager::new().with_prompter(Box::new(
            ScriptedPrompter::with_answers([Some(true), Some(false)]),
        ));
        let ctx = CancellationToken::new();

        assert!(manager.check_with_prompt(&ctx, PermissionKind::Net, "example.com"));
        // Second check passes without prompting: the session grant stuck.
        assert!(manager.check(PermissionKind::Net, "example.com"));
    }

    #[test]
    fn prompt_persists_to_config_on_second_yes() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join(".douglessrc");
        let manager = PermissionManager {
            config_path: Some(config_path.clone()),
            ..PermissionManager::default()
        }
        .with_prompter(Box::new(ScriptedPrompter::with_answers([
            Some(true),
            Some(true),
        ])));

        let ctx = CancellationToken::new();
        assert!(manager.check_with_prompt(&ctx, PermissionKind::Net, "api.example.com"));

        let config = config::load(&config_path).unwrap();
        assert_eq!(config.permissions.net, vec!["api.example.com"]);
    }

    #[test]
    fn error_message_suggests_the_config_line() {
        let manager = PermissionManager::new();
        let message = manager.error_message(PermissionKind::Net, "api.example.com:443");
        assert!(message.contains("Permission denied"));
        assert!(message.contains("api.example.com:443"));
        assert!(message.contains("permissions.net"));
    }
}
