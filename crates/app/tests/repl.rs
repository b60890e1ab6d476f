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

//! The read-evaluate loop driver against a canned engine.

use std::{io::Cursor, sync::Arc};

use dougless_app::{Runtime, RuntimeConfig, ScriptEngine, TransformedSource, repl::run_repl};
use dougless_base::Value;
use dougless_error::Error;
use dougless_host::GlobalScope;
use dougless_permissions::PermissionManager;

/// Uppercases every chunk; "boom" raises a recoverable error.
struct UppercaseEngine;

impl ScriptEngine for UppercaseEngine {
    fn execute(&mut self, _program: &TransformedSource, _scope: &GlobalScope) -> Result<(), Error> {
        Err(dougless_error::ExecutionSnafu {
            message: "uppercase engine only evaluates chunks".to_string(),
        }
        .build())
    }

    fn eval(&mut self, chunk: &str, _scope: &GlobalScope) -> Result<Value, Error> {
        if chunk == "boom" {
            return Err(dougless_error::ExecutionSnafu {
                message: "boom".to_string(),
            }
            .build());
        }
        Ok(Value::string(chunk.to_ascii_uppercase()))
    }
}

#[test]
fn evaluates_lines_and_recovers_from_errors() {
    let config = RuntimeConfig::builder()
        .argv(vec!["dougless".to_string()])
        .permissions(Arc::new(PermissionManager::new()))
        .build();
    let runtime = Runtime::interactive(config).unwrap();

    let input = Cursor::new("hello\nboom\nworld\n.exit\nignored\n");
    let mut output = Vec::new();
    run_repl(&runtime, Box::new(UppercaseEngine), input, &mut output).unwrap();

    let output = String::from_utf8(output).unwrap();
    assert!(output.contains("'HELLO'"));
    assert!(output.contains("Uncaught boom"));
    assert!(output.contains("'WORLD'"));
    assert!(!output.contains("IGNORED"));
}

#[test]
fn empty_lines_reprompt_without_evaluating() {
    let config = RuntimeConfig::builder()
        .argv(vec!["dougless".to_string()])
        .permissions(Arc::new(PermissionManager::new()))
        .build();
    let runtime = Runtime::interactive(config).unwrap();

    let input = Cursor::new("\n\n.exit\n");
    let mut output = Vec::new();
    run_repl(&runtime, Box::new(UppercaseEngine), input, &mut output).unwrap();

    let output = String::from_utf8(output).unwrap();
    assert_eq!(output.matches("> ").count(), 3);
}
