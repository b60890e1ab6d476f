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

//! `process`: environment, arguments, identity, exit and signals.
//!
//! `exit` runs the registered exit handlers and halts the engine with the
//! recorded code; the embedding front end owns the actual OS exit. Signal
//! watchers live on the background runtime, enqueue a task per delivery and
//! hold no keep-alive, so a subscription alone never pins the process open.

use std::sync::Arc;

use dougless_base::{NativeFunction, ObjectRef, Value};
use dougless_common_runtime::spawn_background;
use dougless_engine::{EngineHandle, Task, TaskOrigin};
use parking_lot::Mutex;

use crate::{report_uncaught, require_string, type_error};

#[derive(Clone)]
pub struct ProcessModule {
    engine:        EngineHandle,
    argv:          Arc<Vec<String>>,
    exit_handlers: Arc<Mutex<Vec<NativeFunction>>>,
    exit_code:     Arc<Mutex<Option<i32>>>,
}

impl ProcessModule {
    #[must_use]
    pub fn new(engine: EngineHandle) -> Self {
        Self::with_argv(engine, std::env::args().collect())
    }

    #[must_use]
    pub fn with_argv(engine: EngineHandle, argv: Vec<String>) -> Self {
        Self {
            engine,
            argv: Arc::new(argv),
            exit_handlers: Arc::new(Mutex::new(Vec::new())),
            exit_code: Arc::new(Mutex::new(None)),
        }
    }

    /// The code passed to `process.exit`, once a script has called it.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> { *self.exit_code.lock() }

    /// Runs exit handlers (newest last), records the code and shuts the
    /// engine down. Called on the consumer.
    pub fn exit(&self, code: i32) {
        let handlers = self.exit_handlers.lock().clone();
        for handler in handlers {
            if let Err(thrown) = handler.call(&[Value::Number(f64::from(code))]) {
                report_uncaught(&thrown);
            }
        }
        *self.exit_code.lock() = Some(code);
        self.engine.shutdown();
    }

    /// `process.on("exit", f)` registers an exit handler; a signal name
    /// subscribes a watcher that enqueues `handler` per delivery.
    pub fn on(&self, event: &str, handler: NativeFunction) -> Result<(), Value> {
        if event == "exit" {
            self.exit_handlers.lock().push(handler);
            return Ok(());
        }
        let Some(kind) = signal_kind(event) else {
            return Err(type_error(&format!("unknown process event '{event}'")));
        };

        let engine = self.engine.clone();
        let token = engine.cancellation_token();
        let event = event.to_string();
        spawn_background(async move {
            let mut stream = match tokio::signal::unix::signal(kind) {
                Ok(stream) => stream,
                Err(error) => {
                    tracing::warn!(%error, event, "failed to install signal handler");
                    return;
                }
            };
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    received = stream.recv() => {
                        if received.is_none() {
                            break;
                        }
                        let handler = handler.clone();
                        let event = event.clone();
                        let task = Task::immediate(TaskOrigin::IoCompletion, move || {
                            if let Err(thrown) = handler.call(&[Value::string(event)]) {
                                report_uncaught(&thrown);
                            }
                        });
                        if engine.schedule_async(task).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });
        Ok(())
    }

    /// The script-visible `process` object.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let object = ObjectRef::new();

        let env = ObjectRef::new();
        for (key, value) in std::env::vars() {
            env.set(key, Value::String(value));
        }
        object.set("env", env);

        object.set(
            "argv",
            Value::Array(self.argv.iter().cloned().map(Value::String).collect()),
        );

        object.set(
            "cwd",
            NativeFunction::new("cwd", |_| {
                std::env::current_dir()
                    .map(|dir| Value::string(dir.to_string_lossy()))
                    .map_err(|error| Value::string(error.to_string()))
            }),
        );
        object.set(
            "chdir",
            NativeFunction::new("chdir", |args| {
                let dir = require_string(args, 0, "process.chdir(directory)")?;
                std::env::set_current_dir(&dir)
                    .map(|()| Value::Undefined)
                    .map_err(|error| Value::string(format!("chdir '{dir}': {error}")))
            }),
        );

        object.set("pid", Value::Number(f64::from(std::process::id())));
        object.set("platform", Value::string(platform()));
        object.set("arch", Value::string(arch()));
        object.set(
            "version",
            Value::string(concat!("v", env!("CARGO_PKG_VERSION"))),
        );

        let process = self.clone();
        object.set(
            "exit",
            NativeFunction::new("exit", move |args| {
                let code = args
                    .first()
                    .and_then(Value::as_number)
                    .map_or(0, |code| code as i32);
                process.exit(code);
                Ok(Value::Undefined)
            }),
        );

        let process = self.clone();
        object.set(
            "on",
            NativeFunction::new("on", move |args| {
                let event = require_string(args, 0, "process.on(event, handler)")?;
                let handler = crate::require_function(args, 1, "process.on(event, handler)")?;
                process.on(&event, handler)?;
                Ok(Value::Undefined)
            }),
        );

        Value::Object(object)
    }
}

fn signal_kind(name: &str) -> Option<tokio::signal::unix::SignalKind> {
    use tokio::signal::unix::SignalKind;
    match name {
        "SIGINT" => Some(SignalKind::interrupt()),
        "SIGTERM" => Some(SignalKind::terminate()),
        "SIGHUP" => Some(SignalKind::hangup()),
        "SIGUSR1" => Some(SignalKind::user_defined1()),
        "SIGUSR2" => Some(SignalKind::user_defined2()),
        _ => None,
    }
}

/// Platform spelling scripts expect.
fn platform() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        "windows" => "win32",
        other => other,
    }
}

fn arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "x64",
        "aarch64" => "arm64",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use dougless_test_support::TestLoop;

    use super::*;

    #[test]
    fn exit_runs_handlers_then_halts_the_engine() {
        let test_loop = TestLoop::start();
        let process = ProcessModule::with_argv(test_loop.handle(), vec!["dougless".to_string()]);

        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            process
                .on(
                    "exit",
                    NativeFunction::new("onexit", move |args| {
                        seen.lock().push(args[0].clone());
                        Ok(Value::Undefined)
                    }),
                )
                .unwrap();
        }

        process.exit(3);
        assert_eq!(process.exit_code(), Some(3));
        assert_eq!(*seen.lock(), vec![Value::Number(3.0)]);
        assert!(test_loop.handle().is_cancelled());
    }

    #[test]
    fn unknown_event_is_a_type_error() {
        let test_loop = TestLoop::start();
        let process = ProcessModule::with_argv(test_loop.handle(), Vec::new());
        let result = process.on("SIGWHATEVER", NativeFunction::anonymous(|_| Ok(Value::Undefined)));
        assert!(result.is_err());
    }

    #[test]
    fn object_shape() {
        let test_loop = TestLoop::start();
        let process = ProcessModule::with_argv(test_loop.handle(), vec!["dougless".to_string()]);
        let value = process.to_value();
        let object = value.as_object().unwrap();

        assert!(object.contains("env"));
        assert!(object.get("pid").unwrap().as_number().unwrap() > 0.0);
        let version = object.get("version").unwrap();
        assert!(version.as_str().unwrap().starts_with('v'));
        assert_eq!(
            object.get("argv").unwrap(),
            Value::Array(vec![Value::string("dougless")])
        );
    }
}
