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

//! The script-visible host surface.
//!
//! Each module here has two faces: a typed Rust API (what the runtime and
//! the tests drive) and a [`Value`] binding (what an engine adapter installs
//! as globals). Every native operation follows the same bridge discipline:
//! permission check first, I/O on a dedicated runtime, delivery to script by
//! enqueuing a task that invokes the callback or settles the promise.

pub mod console;
mod respond;
pub mod crypto;
pub mod files;
pub mod http;
pub mod path;
pub mod process;
pub mod timers;

use std::sync::Arc;

use dougless_base::{NativeFunction, Value};
use dougless_engine::EngineHandle;
use dougless_permissions::PermissionManager;

pub use respond::Responder;

/// Everything a script can reach, keyed the way the interpreter sees it.
///
/// The scope is cheap to clone and safe to share with an engine adapter; the
/// one rule is that the functions inside are only ever *called* on the task
/// consumer.
#[derive(Clone)]
pub struct GlobalScope {
    engine:      EngineHandle,
    permissions: Arc<PermissionManager>,
    console:     console::Console,
    files:       files::Files,
    http:        http::HttpModule,
    process:     process::ProcessModule,
}

impl GlobalScope {
    #[must_use]
    pub fn new(engine: EngineHandle, permissions: Arc<PermissionManager>) -> Self {
        Self::with_console(engine, permissions, console::Console::new())
    }

    /// Like [`GlobalScope::new`] with a console writing somewhere else;
    /// tests capture output this way.
    #[must_use]
    pub fn with_console(
        engine: EngineHandle,
        permissions: Arc<PermissionManager>,
        console: console::Console,
    ) -> Self {
        Self::with_options(engine, permissions, console, std::env::args().collect())
    }

    /// Fully parameterised construction: console sink and the `process.argv`
    /// the runtime front end saw.
    #[must_use]
    pub fn with_options(
        engine: EngineHandle,
        permissions: Arc<PermissionManager>,
        console: console::Console,
        argv: Vec<String>,
    ) -> Self {
        let files = files::Files::new(engine.clone(), Arc::clone(&permissions));
        let http = http::HttpModule::new(engine.clone(), Arc::clone(&permissions));
        let process = process::ProcessModule::with_argv(engine.clone(), argv);
        Self {
            engine,
            permissions,
            console,
            files,
            http,
            process,
        }
    }

    #[must_use]
    pub fn engine(&self) -> &EngineHandle { &self.engine }

    #[must_use]
    pub fn permissions(&self) -> &Arc<PermissionManager> { &self.permissions }

    #[must_use]
    pub fn console(&self) -> &console::Console { &self.console }

    #[must_use]
    pub fn files(&self) -> &files::Files { &self.files }

    #[must_use]
    pub fn http(&self) -> &http::HttpModule { &self.http }

    #[must_use]
    pub fn process(&self) -> &process::ProcessModule { &self.process }

    /// The full global table an engine adapter installs: module objects,
    /// timer functions, the Promise surface and `require`.
    #[must_use]
    pub fn globals(&self) -> Vec<(String, Value)> {
        let mut globals = vec![
            ("console".to_string(), self.console.to_value()),
            ("path".to_string(), path::to_value()),
            ("files".to_string(), self.files.to_value()),
            ("http".to_string(), self.http.to_value()),
            ("crypto".to_string(), crypto::to_value()),
            ("process".to_string(), self.process.to_value()),
            ("Promise".to_string(), crate::promise_global(&self.engine)),
            ("require".to_string(), self.require_fn()),
        ];
        globals.extend(timers::globals(&self.engine));
        globals
    }

    /// The name→built-in registry behind `require`. Unknown names throw.
    pub fn require(&self, name: &str) -> Result<Value, Value> {
        match name {
            "console" => Ok(self.console.to_value()),
            "path" => Ok(path::to_value()),
            "files" => Ok(self.files.to_value()),
            "http" => Ok(self.http.to_value()),
            "crypto" => Ok(crypto::to_value()),
            "process" => Ok(self.process.to_value()),
            other => Err(Value::string(format!("Cannot find module '{other}'"))),
        }
    }

    fn require_fn(&self) -> Value {
        let scope = self.clone();
        Value::Function(NativeFunction::new("require", move |args| {
            let name = require_string(args, 0, "require(name)")?;
            scope.require(&name)
        }))
    }
}

/// The `Promise` global: `new` runs an executor, the statics are the
/// combinators. An engine adapter maps construction syntax onto `new`.
#[must_use]
pub fn promise_global(engine: &EngineHandle) -> Value {
    use dougless_promise::Promise;

    let object = dougless_base::ObjectRef::new();

    let constructor = {
        let engine = engine.clone();
        NativeFunction::new("Promise", move |args| {
            let Some(Value::Function(executor)) = args.first() else {
                return Err(type_error("Promise executor must be a function"));
            };
            Ok(Promise::with_executor(engine.clone(), executor).to_value())
        })
    };
    object.set("new", constructor);

    let engine_for = |name: &str, f: fn(&EngineHandle, &[Value]) -> Result<Value, Value>| {
        let engine = engine.clone();
        NativeFunction::new(name, move |args| f(&engine, args))
    };

    object.set(
        "resolve",
        engine_for("resolve", |engine, args| {
            Ok(Promise::resolved(engine.clone(), first_or_undefined(args)).to_value())
        }),
    );
    object.set(
        "reject",
        engine_for("reject", |engine, args| {
            Ok(Promise::rejected(engine.clone(), first_or_undefined(args)).to_value())
        }),
    );
    object.set(
        "all",
        engine_for("all", |engine, args| {
            Ok(Promise::all(engine, require_array(args, "Promise.all(iterable)")?).to_value())
        }),
    );
    object.set(
        "race",
        engine_for("race", |engine, args| {
            Ok(Promise::race(engine, require_array(args, "Promise.race(iterable)")?).to_value())
        }),
    );
    object.set(
        "allSettled",
        engine_for("allSettled", |engine, args| {
            Ok(
                Promise::all_settled(engine, require_array(args, "Promise.allSettled(iterable)")?)
                    .to_value(),
            )
        }),
    );
    object.set(
        "any",
        engine_for("any", |engine, args| {
            Ok(Promise::any(engine, require_array(args, "Promise.any(iterable)")?).to_value())
        }),
    );

    Value::Object(object)
}

/// A script-level `TypeError` value.
pub(crate) fn type_error(message: &str) -> Value { Value::string(format!("TypeError: {message}")) }

/// Prints an uncaught script throw from an asynchronous callback. The engine
/// keeps running; only the main-script path treats uncaught errors as fatal.
pub(crate) fn report_uncaught(thrown: &Value) {
    eprintln!("Uncaught {}", thrown.to_display_string());
}

pub(crate) fn first_or_undefined(args: &[Value]) -> Value {
    args.first().cloned().unwrap_or_default()
}

/// Argument helpers shared by the bindings: positional extraction with
/// script-level type errors, never arity reflection.
pub(crate) fn require_string(args: &[Value], index: usize, usage: &str) -> Result<String, Value> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s.clone()),
        _ => Err(type_error(&format!("expected a string: {usage}"))),
    }
}

pub(crate) fn require_number(args: &[Value], index: usize, usage: &str) -> Result<f64, Value> {
    match args.get(index) {
        Some(Value::Number(n)) => Ok(*n),
        _ => Err(type_error(&format!("expected a number: {usage}"))),
    }
}

pub(crate) fn require_function(
    args: &[Value],
    index: usize,
    usage: &str,
) -> Result<NativeFunction, Value> {
    match args.get(index) {
        Some(Value::Function(f)) => Ok(f.clone()),
        _ => Err(type_error(&format!("expected a function: {usage}"))),
    }
}

fn require_array(args: &[Value], usage: &str) -> Result<Vec<Value>, Value> {
    match args.first() {
        Some(Value::Array(items)) => Ok(items.clone()),
        _ => Err(type_error(&format!("expected an array: {usage}"))),
    }
}

/// `Some(callback)` when `args[index]` is a function; `None` when absent or
/// nullish (the promise variant). Anything else is a type error.
pub(crate) fn optional_callback(
    args: &[Value],
    index: usize,
    usage: &str,
) -> Result<Option<NativeFunction>, Value> {
    match args.get(index) {
        None | Some(Value::Undefined | Value::Null) => Ok(None),
        Some(Value::Function(f)) => Ok(Some(f.clone())),
        _ => Err(type_error(&format!("expected a callback function: {usage}"))),
    }
}
