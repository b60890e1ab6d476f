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
    env,
    io::IsTerminal,
    sync::{Arc, Mutex, Once},
};

use bon::Builder;
use once_cell::sync::{Lazy, OnceCell};
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_log::LogTracer;
use tracing_subscriber::{EnvFilter, Registry, filter, layer::SubscriberExt, prelude::*};

/// Default directory name for log files when file logging is enabled.
pub const DEFAULT_LOGGING_DIR: &str = "logs";

/// Default log level filter when neither `LoggingOptions.level` nor
/// `RUST_LOG` is set. Host diagnostics stay quiet by default so they never
/// interleave with script console output.
const DEFAULT_LOG_TARGETS: &str = "warn";

/// Global handle for dynamically reloading log levels at runtime.
///
/// Populated during logging initialization; `None` before that.
pub static RELOAD_HANDLE: OnceCell<tracing_subscriber::reload::Handle<filter::Targets, Registry>> =
    OnceCell::new();

/// Configuration for the host logging stack.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, SmartDefault, Builder)]
#[serde(default)]
pub struct LoggingOptions {
    /// Directory for rolling log files. Empty disables file logging.
    #[default = ""]
    pub dir: String,

    /// Log level filter string ("info", "debug,hyper=warn", ...). Falls back
    /// to `RUST_LOG`, then to "warn".
    pub level: Option<String>,

    /// Whether to log to stderr in addition to files. Stderr rather than
    /// stdout: scripts own stdout.
    #[default = true]
    pub append_stderr: bool,

    /// Maximum number of rotated log files to retain.
    #[default = 24]
    pub max_log_files: usize,
}

/// Initialize tracing with defaults; the runtime façade calls this once at
/// startup.
///
/// Returns the worker guards that must stay alive for the logger to flush.
#[must_use]
pub fn init_tracing_subscriber(app_name: &str) -> Vec<WorkerGuard> {
    init_global_logging(app_name, &LoggingOptions::default())
}

/// Initialize logging for unit tests; safe to call from every test.
pub fn init_default_ut_logging() {
    static START: Once = Once::new();

    START.call_once(|| {
        let mut g = GLOBAL_UT_LOG_GUARD.as_ref().lock().unwrap();

        let dir =
            env::var("UNITTEST_LOG_DIR").unwrap_or_else(|_| "/tmp/__dougless_test_logs".to_string());
        let level = env::var("UNITTEST_LOG_LEVEL")
            .unwrap_or_else(|_| "debug,hyper=warn,tower=warn,reqwest=warn,h2=info".to_string());

        let opts = LoggingOptions {
            dir: dir.clone(),
            level: Some(level),
            ..Default::default()
        };
        *g = Some(init_global_logging("unittest", &opts));

        tracing::info!("logs dir = {}", dir);
    });
}

static GLOBAL_UT_LOG_GUARD: Lazy<Arc<Mutex<Option<Vec<WorkerGuard>>>>> =
    Lazy::new(|| Arc::new(Mutex::new(None)));

/// Initialize the global tracing subscriber.
///
/// Layers: stderr (optional), rolling main log file and error-only log file
/// (when `dir` is set), behind a reloadable target filter. Only the first
/// call takes effect.
pub fn init_global_logging(app_name: &str, opts: &LoggingOptions) -> Vec<WorkerGuard> {
    static START: Once = Once::new();
    let mut guards = vec![];

    START.call_once(|| {
        LogTracer::init().expect("log tracer must be valid");

        let stderr_layer = if opts.append_stderr {
            let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
            guards.push(guard);
            Some(
                tracing_subscriber::fmt::Layer::new()
                    .with_writer(writer)
                    .with_ansi(std::io::stderr().is_terminal())
                    .boxed(),
            )
        } else {
            None
        };

        let file_layer = if opts.dir.is_empty() {
            None
        } else {
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::HOURLY)
                .filename_prefix(app_name.to_string())
                .max_log_files(opts.max_log_files)
                .build(&opts.dir)
                .unwrap_or_else(|e| {
                    panic!("initializing rolling file appender at {} failed: {e}", &opts.dir)
                });
            let (writer, guard) = tracing_appender::non_blocking(appender);
            guards.push(guard);
            Some(
                tracing_subscriber::fmt::Layer::new()
                    .with_writer(writer)
                    .with_ansi(false)
                    .boxed(),
            )
        };

        let err_file_layer = if opts.dir.is_empty() {
            None
        } else {
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::HOURLY)
                .filename_prefix(format!("{app_name}-err"))
                .max_log_files(opts.max_log_files)
                .build(&opts.dir)
                .unwrap_or_else(|e| {
                    panic!("initializing rolling file appender at {} failed: {e}", &opts.dir)
                });
            let (writer, guard) = tracing_appender::non_blocking(appender);
            guards.push(guard);
            Some(
                tracing_subscriber::fmt::Layer::new()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_filter(filter::LevelFilter::ERROR)
                    .boxed(),
            )
        };

        let targets = opts
            .level
            .as_deref()
            .or(env::var(EnvFilter::DEFAULT_ENV).ok().as_deref())
            .unwrap_or(DEFAULT_LOG_TARGETS)
            .parse::<filter::Targets>()
            .expect("error parsing log level string");

        let (dyn_filter, reload_handle) = tracing_subscriber::reload::Layer::new(targets);

        RELOAD_HANDLE
            .set(reload_handle)
            .expect("reload handle already set, maybe init_global_logging got called twice?");

        let subscriber = Registry::default()
            .with(dyn_filter)
            .with(stderr_layer)
            .with(file_layer)
            .with(err_file_layer);

        tracing::subscriber::set_global_default(subscriber)
            .expect("error setting global tracing subscriber");
    });

    guards
}
