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

use std::{
    collections::VecDeque,
    io::{BufRead, IsTerminal, Write},
};

use parking_lot::Mutex;

/// The interactive seam of the permission manager. The production
/// implementation talks to the controlling terminal; tests inject scripted
/// answers.
pub trait Prompter: Send + Sync {
    /// Whether asking is possible at all. `false` short-circuits every
    /// prompt into a denial.
    fn interactive(&self) -> bool;

    /// Asks a yes/no question. `None` means the answer was unreadable or
    /// unrecognised, which is treated as "no".
    fn ask(&self, question: &str) -> Option<bool>;
}

/// Prompts on the controlling terminal when one is attached.
#[derive(Default)]
pub struct TtyPrompter;

impl Prompter for TtyPrompter {
    fn interactive(&self) -> bool {
        std::io::stdin().is_terminal() && std::io::stderr().is_terminal()
    }

    fn ask(&self, question: &str) -> Option<bool> {
        // The prompt goes to stderr so piped script output stays clean.
        let mut stderr = std::io::stderr();
        write!(stderr, "{question} [y/N] ").ok()?;
        stderr.flush().ok()?;

        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line).ok()?;
        match line.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => Some(true),
            "n" | "no" | "" => Some(false),
            _ => None,
        }
    }
}

/// Never interactive; the default for embedded and non-TTY use.
#[derive(Default)]
pub struct DenyPrompter;

impl Prompter for DenyPrompter {
    fn interactive(&self) -> bool { false }

    fn ask(&self, _question: &str) -> Option<bool> { None }
}

/// Replays canned answers in order; questions beyond the script get `None`.
#[derive(Default)]
pub struct ScriptedPrompter {
    answers:   Mutex<VecDeque<Option<bool>>>,
    questions: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    #[must_use]
    pub fn with_answers(answers: impl IntoIterator<Item = Option<bool>>) -> Self {
        Self {
            answers:   Mutex::new(answers.into_iter().collect()),
            questions: Mutex::new(Vec::new()),
        }
    }

    /// Every question asked so far, in order.
    #[must_use]
    pub fn questions(&self) -> Vec<String> { self.questions.lock().clone() }
}

impl Prompter for ScriptedPrompter {
    fn interactive(&self) -> bool { true }

    fn ask(&self, question: &str) -> Option<bool> {
        self.questions.lock().push(question.to_string());
        self.answers.lock().pop_front().flatten()
    }
}
