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

//! End-to-end runs through the façade, driven through the `ScriptEngine`
//! seam by programs built from native closures against the script-visible
//! surface.

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use dougless_app::{
    ExitStatus, IdentityTransform, Runtime, RuntimeConfig, ScriptEngine, SourceTransform,
    TransformedSource,
};
use dougless_base::{NativeFunction, Value};
use dougless_error::Error;
use dougless_host::{GlobalScope, console::Console};
use dougless_permissions::PermissionManager;
use dougless_test_support::SharedBuffer;
use parking_lot::Mutex;

type Program = Box<dyn FnOnce(&GlobalScope) -> Result<(), Error> + Send>;

/// Stands in for the embedded interpreter: `execute` runs a canned program
/// against the scope, ignoring the (already transformed) source text.
struct ScriptedEngine {
    program: Option<Program>,
}

fn scripted<F>(program: F) -> Box<dyn ScriptEngine>
where
    F: FnOnce(&GlobalScope) -> Result<(), Error> + Send + 'static,
{
    Box::new(ScriptedEngine {
        program: Some(Box::new(program)),
    })
}

impl ScriptEngine for ScriptedEngine {
    fn execute(&mut self, _program: &TransformedSource, scope: &GlobalScope) -> Result<(), Error> {
        self.program.take().expect("program runs once")(scope)
    }

    fn eval(&mut self, _chunk: &str, _scope: &GlobalScope) -> Result<Value, Error> {
        Err(dougless_error::ExecutionSnafu {
            message: "scripted engine is not interactive".to_string(),
        }
        .build())
    }
}

fn globals_of(scope: &GlobalScope) -> HashMap<String, Value> {
    scope.globals().into_iter().collect()
}

fn member(value: &Value, name: &str) -> NativeFunction {
    value
        .as_object()
        .and_then(|obj| obj.get(name))
        .and_then(|m| m.as_function().cloned())
        .expect("callable member")
}

fn write_script(dir: &std::path::Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path
}

fn captured_config(out: &SharedBuffer) -> RuntimeConfig {
    RuntimeConfig::builder()
        .argv(vec!["dougless".to_string()])
        .permissions(Arc::new(PermissionManager::allow_all()))
        .console(Console::with_streams(
            Box::new(out.clone()),
            Box::new(SharedBuffer::new()),
        ))
        .build()
}

#[test]
fn timers_order_after_synchronous_output() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "ordering.js", "// driven through the seam\n");
    let out = SharedBuffer::new();

    let runtime = Runtime::for_script(&script, captured_config(&out)).unwrap();
    let status = runtime
        .run(
            scripted(|scope| {
                let globals = globals_of(scope);
                let log = member(&globals["console"], "log");
                let set_timeout = globals["setTimeout"].as_function().unwrap().clone();

                log.call(&[Value::string("A")]).unwrap();
                let deferred = {
                    let log = log.clone();
                    NativeFunction::new("deferred", move |_| {
                        log.call(&[Value::string("B")])?;
                        Ok(Value::Undefined)
                    })
                };
                set_timeout
                    .call(&[Value::Function(deferred), Value::Number(0.0)])
                    .unwrap();
                log.call(&[Value::string("C")]).unwrap();
                Ok(())
            }),
            &IdentityTransform,
        )
        .unwrap();

    assert_eq!(status, ExitStatus::Clean);
    assert_eq!(out.lines(), vec!["A", "C", "B"]);
}

#[test]
fn keep_alive_drains_once_the_interval_is_cleared() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "drain.js", "// timers\n");
    let out = SharedBuffer::new();
    let ticks = Arc::new(Mutex::new(0u32));

    let started = Instant::now();
    let runtime = Runtime::for_script(&script, captured_config(&out)).unwrap();
    let status = runtime
        .run(
            scripted({
                let ticks = Arc::clone(&ticks);
                move |scope| {
                    let globals = globals_of(scope);
                    let set_timeout = globals["setTimeout"].as_function().unwrap().clone();
                    let set_interval = globals["setInterval"].as_function().unwrap().clone();
                    let clear_interval = globals["clearInterval"].as_function().unwrap().clone();

                    set_timeout
                        .call(&[
                            Value::Function(NativeFunction::anonymous(|_| Ok(Value::Undefined))),
                            Value::Number(50.0),
                        ])
                        .unwrap();

                    let tick = {
                        let ticks = Arc::clone(&ticks);
                        NativeFunction::new("tick", move |_| {
                            *ticks.lock() += 1;
                            Ok(Value::Undefined)
                        })
                    };
                    let interval_id = set_interval
                        .call(&[Value::Function(tick), Value::Number(20.0)])
                        .unwrap();

                    let stop = NativeFunction::new("stop", move |_| {
                        clear_interval.call(&[interval_id.clone()])?;
                        Ok(Value::Undefined)
                    });
                    set_timeout
                        .call(&[Value::Function(stop), Value::Number(110.0)])
                        .unwrap();
                    Ok(())
                }
            }),
            &IdentityTransform,
        )
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(status, ExitStatus::Clean);
    assert!(*ticks.lock() >= 2, "interval ticked {}", *ticks.lock());
    assert!(
        elapsed >= Duration::from_millis(100),
        "drained too early: {elapsed:?}"
    );
    assert!(
        elapsed < Duration::from_secs(3),
        "drained too late: {elapsed:?}"
    );
}

#[test]
fn process_exit_code_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "exit.js", "// exit\n");
    let out = SharedBuffer::new();

    let runtime = Runtime::for_script(&script, captured_config(&out)).unwrap();
    let status = runtime
        .run(
            scripted(|scope| {
                let globals = globals_of(scope);
                let exit = member(&globals["process"], "exit");
                exit.call(&[Value::Number(7.0)]).unwrap();
                Ok(())
            }),
            &IdentityTransform,
        )
        .unwrap();

    assert_eq!(status, ExitStatus::Exit(7));
    assert_eq!(status.code(), 7);
}

#[test]
fn transform_failures_are_fatal() {
    struct FailingTransform;
    impl SourceTransform for FailingTransform {
        fn transform(&self, name: &str, _source: &str) -> Result<TransformedSource, Error> {
            Err(dougless_error::TransformSnafu {
                path:    name.to_string(),
                line:    2u32,
                column:  5u32,
                message: "unexpected token".to_string(),
            }
            .build())
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "broken.js", "let let let\n");
    let out = SharedBuffer::new();

    let runtime = Runtime::for_script(&script, captured_config(&out)).unwrap();
    let error = runtime
        .run(scripted(|_| Ok(())), &FailingTransform)
        .unwrap_err();
    assert!(error.is_fatal());
    assert!(error.to_string().contains("unexpected token"));
}

#[test]
fn uncaught_script_errors_are_fatal_and_halt_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "throws.js", "throw new Error('nope')\n");
    let out = SharedBuffer::new();

    let started = Instant::now();
    let runtime = Runtime::for_script(&script, captured_config(&out)).unwrap();
    let error = runtime
        .run(
            scripted(|scope| {
                // Pending work exists, but the uncaught error halts the run.
                let globals = globals_of(scope);
                let set_timeout = globals["setTimeout"].as_function().unwrap().clone();
                set_timeout
                    .call(&[
                        Value::Function(NativeFunction::anonymous(|_| Ok(Value::Undefined))),
                        Value::Number(60_000.0),
                    ])
                    .unwrap();
                Err(dougless_error::ExecutionSnafu {
                    message: "Error: nope".to_string(),
                }
                .build())
            }),
            &IdentityTransform,
        )
        .unwrap_err();

    assert!(error.is_fatal());
    assert!(error.to_string().contains("nope"));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn douglessrc_discovery_feeds_the_permission_manager() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data.txt");
    std::fs::write(&data, "granted").unwrap();
    std::fs::write(
        dir.path().join(".douglessrc"),
        format!(r#"{{"permissions": {{"read": ["{}"]}}}}"#, dir.path().display()),
    )
    .unwrap();
    let script = write_script(dir.path(), "main.js", "// reads data.txt\n");

    let out = SharedBuffer::new();
    let config = RuntimeConfig::builder()
        .argv(vec!["dougless".to_string()])
        .console(Console::with_streams(
            Box::new(out.clone()),
            Box::new(SharedBuffer::new()),
        ))
        .build();

    let slot: Arc<Mutex<Option<Result<Value, Value>>>> = Arc::new(Mutex::new(None));
    let runtime = Runtime::for_script(&script, config).unwrap();
    let status = runtime
        .run(
            scripted({
                let slot = Arc::clone(&slot);
                let data = data.to_string_lossy().to_string();
                move |scope| {
                    let callback = {
                        let slot = Arc::clone(&slot);
                        NativeFunction::new("callback", move |args| {
                            let result = match args {
                                [Value::Null, value] => Ok(value.clone()),
                                [error, ..] => Err(error.clone()),
                                [] => Ok(Value::Undefined),
                            };
                            *slot.lock() = Some(result);
                            Ok(Value::Undefined)
                        })
                    };
                    scope.files().read(data, Some(callback));
                    Ok(())
                }
            }),
            &IdentityTransform,
        )
        .unwrap();

    assert_eq!(status, ExitStatus::Clean);
    assert_eq!(slot.lock().clone(), Some(Ok(Value::string("granted"))));
}

#[test]
fn without_permissions_privileged_operations_are_denied() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data.txt");
    std::fs::write(&data, "secret").unwrap();
    let script = write_script(dir.path(), "main.js", "// tries to read\n");

    let out = SharedBuffer::new();
    let config = RuntimeConfig::builder()
        .argv(vec!["dougless".to_string()])
        .permissions(Arc::new(PermissionManager::new()))
        .console(Console::with_streams(
            Box::new(out.clone()),
            Box::new(SharedBuffer::new()),
        ))
        .build();

    let slot: Arc<Mutex<Option<Result<Value, Value>>>> = Arc::new(Mutex::new(None));
    let runtime = Runtime::for_script(&script, config).unwrap();
    let status = runtime
        .run(
            scripted({
                let slot = Arc::clone(&slot);
                let data = data.to_string_lossy().to_string();
                move |scope| {
                    let callback = {
                        let slot = Arc::clone(&slot);
                        NativeFunction::new("callback", move |args| {
                            let result = match args {
                                [Value::Null, value] => Ok(value.clone()),
                                [error, ..] => Err(error.clone()),
                                [] => Ok(Value::Undefined),
                            };
                            *slot.lock() = Some(result);
                            Ok(Value::Undefined)
                        })
                    };
                    scope.files().read(data, Some(callback));
                    Ok(())
                }
            }),
            &IdentityTransform,
        )
        .unwrap();

    assert_eq!(status, ExitStatus::Clean);
    let denied = slot.lock().clone().unwrap().unwrap_err();
    assert!(denied.as_str().unwrap().contains("Permission denied"));
}
