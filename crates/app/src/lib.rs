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

//! The runtime façade.
//!
//! Constructs the engine, permissions and host scope, hands a transformed
//! script to the interpreter on the consumer thread, and waits for the
//! keep-alive counter to drain before mapping the outcome to an exit
//! status. The command-line front end is a thin driver over
//! [`Runtime::run`] and [`repl::run_repl`].

pub mod repl;
mod script;

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Once},
    thread,
};

use bon::Builder;
use dougless_common_telemetry::{logging, panic_hook};
use dougless_engine::{EngineHandle, EngineOptions, TaskEngine, TaskOrigin};
use dougless_error::{Error, IoSnafu};
use dougless_host::{GlobalScope, console::Console};
use dougless_permissions::PermissionManager;
use parking_lot::Mutex;
use smart_default::SmartDefault;
use snafu::{IntoError, ResultExt};

pub use crate::script::{
    Diagnostic, IdentityTransform, ScriptEngine, SourceTransform, TransformedSource,
};

/// How a finished run maps onto the front end's process exit code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitStatus {
    /// The script completed and the keep-alive counter drained.
    Clean,
    /// The script called `process.exit(code)`.
    Exit(i32),
}

impl ExitStatus {
    /// Fatal run errors (transform, uncaught execution) map to 1 at the
    /// front end; successful outcomes map here.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Clean => 0,
            Self::Exit(code) => code,
        }
    }
}

/// Runtime construction options.
#[derive(SmartDefault, Builder)]
pub struct RuntimeConfig {
    /// `process.argv` as the front end saw it.
    #[default(_code = "std::env::args().collect()")]
    #[builder(default = std::env::args().collect())]
    pub argv: Vec<String>,

    /// Pre-built permission manager; skips `.douglessrc` discovery. Tests
    /// and embedders use this.
    pub permissions: Option<Arc<PermissionManager>>,

    /// Console sink override for captured output.
    pub console: Option<Console>,

    #[default(_code = "EngineOptions::default()")]
    #[builder(default = EngineOptions::default())]
    pub engine: EngineOptions,

    #[default(_code = "logging::LoggingOptions::default()")]
    #[builder(default = logging::LoggingOptions::default())]
    pub logging: logging::LoggingOptions,
}

/// A constructed runtime: engine consumer running, scope built, permissions
/// installed. One runtime runs one script (or one interactive session).
pub struct Runtime {
    script:      Option<PathBuf>,
    engine:      Arc<TaskEngine>,
    handle:      EngineHandle,
    scope:       GlobalScope,
    permissions: Arc<PermissionManager>,
    consumer:    Option<thread::JoinHandle<()>>,
    _log_guards: Vec<tracing_appender::non_blocking::WorkerGuard>,
}

impl Runtime {
    /// A runtime for executing `script`. Permission config is discovered by
    /// walking upward from the script's directory unless the config already
    /// carries a manager.
    pub fn for_script(script: impl Into<PathBuf>, config: RuntimeConfig) -> Result<Self, Error> {
        let script = script.into();
        let base = script
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map_or_else(
                || std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
                Path::to_path_buf,
            );
        Self::open(Some(script), &base, config)
    }

    /// A runtime for an interactive session; discovery starts at the
    /// working directory.
    pub fn interactive(config: RuntimeConfig) -> Result<Self, Error> {
        let base = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::open(None, &base, config)
    }

    fn open(script: Option<PathBuf>, base: &Path, config: RuntimeConfig) -> Result<Self, Error> {
        static HOOKS: Once = Once::new();
        let log_guards = logging::init_global_logging("dougless", &config.logging);
        HOOKS.call_once(panic_hook::set_panic_hook);

        let permissions = match config.permissions {
            Some(permissions) => permissions,
            None => Arc::new(resolve_permissions(base)?),
        };
        // Install process-wide; in-flight checks elsewhere keep the manager
        // they already loaded.
        let _previous = dougless_permissions::swap(Arc::clone(&permissions));

        let engine = Arc::new(TaskEngine::with_options(config.engine));
        let handle = engine.handle();
        let consumer = {
            let engine = Arc::clone(&engine);
            thread::Builder::new()
                .name("dougless-consumer".to_string())
                .spawn(move || engine.run())
                .map_err(|error| {
                    IoSnafu {
                        message: "failed to spawn consumer thread".to_string(),
                    }
                    .into_error(error)
                })?
        };

        let console = config.console.unwrap_or_default();
        let scope =
            GlobalScope::with_options(handle.clone(), Arc::clone(&permissions), console, config.argv);

        Ok(Self {
            script,
            engine,
            handle,
            scope,
            permissions,
            consumer: Some(consumer),
            _log_guards: log_guards,
        })
    }

    #[must_use]
    pub fn scope(&self) -> &GlobalScope { &self.scope }

    #[must_use]
    pub fn handle(&self) -> &EngineHandle { &self.handle }

    #[must_use]
    pub fn permissions(&self) -> &Arc<PermissionManager> { &self.permissions }

    /// Transforms the script, executes it on the consumer, and blocks until
    /// the keep-alive counter drains. Transform failures and uncaught script
    /// errors are fatal (`Err`); both map to exit code 1 at the front end.
    pub fn run(
        mut self,
        engine: Box<dyn ScriptEngine>,
        transform: &dyn SourceTransform,
    ) -> Result<ExitStatus, Error> {
        let script = self.script.clone().ok_or_else(|| {
            dougless_error::InvalidArgumentSnafu {
                message: "this runtime was opened without a script; use the REPL driver"
                    .to_string(),
            }
            .build()
        })?;

        let source = std::fs::read_to_string(&script).context(IoSnafu {
            message: format!("failed to read {}", script.display()),
        })?;
        let program = transform.transform(&script.to_string_lossy(), &source)?;
        for warning in &program.warnings {
            eprintln!(
                "{}:{}:{}: warning: {}",
                program.name, warning.line, warning.column, warning.message
            );
        }

        let failure: Arc<Mutex<Option<Error>>> = Arc::new(Mutex::new(None));
        {
            let mut engine = engine;
            let scope = self.scope.clone();
            let failure = Arc::clone(&failure);
            let handle = self.handle.clone();
            self.handle
                .submit(TaskOrigin::Microtask, move || {
                    if let Err(error) = engine.execute(&program, &scope) {
                        // Fatal: record and halt instead of draining.
                        *failure.lock() = Some(error);
                        handle.shutdown();
                    }
                })
                .map_err(|_| {
                    dougless_error::ExecutionSnafu {
                        message: "engine halted before the script started".to_string(),
                    }
                    .build()
                })?;
        }

        self.engine.wait();
        self.shutdown();

        if let Some(error) = failure.lock().take() {
            return Err(error);
        }
        Ok(match self.scope.process().exit_code() {
            Some(code) => ExitStatus::Exit(code),
            None => ExitStatus::Clean,
        })
    }

    /// Stops the engine and joins the consumer thread. Idempotent; `run`
    /// calls it, and `Drop` covers abandoned runtimes.
    pub fn shutdown(&mut self) {
        self.engine.stop();
        if let Some(consumer) = self.consumer.take() {
            let _ = consumer.join();
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) { self.shutdown(); }
}

/// `.douglessrc` discovery and loading, mapped into the error taxonomy.
fn resolve_permissions(base: &Path) -> Result<PermissionManager, Error> {
    let Some(config_path) = dougless_permissions::discover(base) else {
        return Ok(PermissionManager::new());
    };
    let config = dougless_permissions::load(&config_path).map_err(|error| {
        dougless_error::InvalidArgumentSnafu {
            message: error.to_string(),
        }
        .build()
    })?;
    Ok(PermissionManager::from_config(&config, Some(config_path)))
}
