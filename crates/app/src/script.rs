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

//! The two collaborator seams: the embedded interpreter and the source
//! transformer.
//!
//! The runtime core never parses or executes script text itself. An engine
//! adapter implements [`ScriptEngine`] against the host's [`GlobalScope`];
//! a transformer implements [`SourceTransform`] with line-accurate
//! diagnostics. Both methods are only ever called on the task consumer.

use dougless_base::Value;
use dougless_error::Error;
use dougless_host::GlobalScope;

/// A source position carried by transform warnings and errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub line:    u32,
    pub column:  u32,
    pub message: String,
}

/// A script after transformation to the supported dialect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransformedSource {
    /// Display name, usually the script path.
    pub name:     String,
    pub code:     String,
    /// Non-fatal findings; the runtime reports them on standard error.
    pub warnings: Vec<Diagnostic>,
}

/// The source-to-dialect transformation step.
pub trait SourceTransform: Send + Sync {
    /// Transforms `source`; a fatal problem is an [`Error::Transform`] with
    /// file/line/column.
    fn transform(&self, name: &str, source: &str) -> Result<TransformedSource, Error>;
}

/// Assumes the input is already in the target dialect; the default when no
/// external transformer is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityTransform;

impl SourceTransform for IdentityTransform {
    fn transform(&self, name: &str, source: &str) -> Result<TransformedSource, Error> {
        Ok(TransformedSource {
            name:     name.to_string(),
            code:     source.to_string(),
            warnings: Vec::new(),
        })
    }
}

/// The embedded interpreter.
///
/// Implementations execute against the global table of the provided scope
/// and call back into host code only through the values it hands out. The
/// runtime guarantees both methods run on the task consumer.
pub trait ScriptEngine: Send {
    /// Runs a whole program. An uncaught script error comes back as
    /// [`Error::Execution`] and is fatal to the run.
    fn execute(&mut self, program: &TransformedSource, scope: &GlobalScope) -> Result<(), Error>;

    /// Evaluates one interactive chunk and returns its value; errors are
    /// recoverable in the read-evaluate loop.
    fn eval(&mut self, chunk: &str, scope: &GlobalScope) -> Result<Value, Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_transform_passes_source_through() {
        let program = IdentityTransform
            .transform("main.js", "console.log(1)")
            .unwrap();
        assert_eq!(program.name, "main.js");
        assert_eq!(program.code, "console.log(1)");
        assert!(program.warnings.is_empty());
    }
}
