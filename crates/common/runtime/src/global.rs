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
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use once_cell::sync::OnceCell;
use tokio::{runtime::Runtime, task::JoinHandle};

use crate::options::IoRuntimeOptions;

#[derive(Debug)]
struct IoRuntimes {
    file_io:    Arc<Runtime>,
    net_io:     Arc<Runtime>,
    background: Arc<Runtime>,
}

static IO_RUNTIMES: OnceCell<IoRuntimes> = OnceCell::new();

/// Builds one I/O-class runtime. Every class needs both drivers (file work
/// uses the blocking pool and timeouts, sockets use the reactor), so they are
/// always on; the label becomes the thread-name prefix, which is how the
/// single-writer discipline stays auditable in stack traces: interpreter
/// work never appears on a thread named here.
fn build_io_runtime(label: &'static str, worker_threads: usize) -> Arc<Runtime> {
    let next_thread = AtomicUsize::new(0);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads.max(1))
        .enable_io()
        .enable_time()
        .thread_name_fn(move || {
            format!("{label}-{}", next_thread.fetch_add(1, Ordering::SeqCst))
        })
        .build()
        .unwrap_or_else(|error| panic!("failed to build {label} runtime: {error}"));
    Arc::new(runtime)
}

fn build_io_runtimes(options: &IoRuntimeOptions) -> IoRuntimes {
    IoRuntimes {
        file_io:    build_io_runtime("dougless-file-io", options.file_io_threads),
        net_io:     build_io_runtime("dougless-net-io", options.net_io_threads),
        background: build_io_runtime("dougless-bg", options.background_threads),
    }
}

fn io_runtimes() -> &'static IoRuntimes {
    IO_RUNTIMES.get_or_init(|| build_io_runtimes(&IoRuntimeOptions::default()))
}

/// Initialize the I/O runtimes with custom thread budgets.
///
/// # Panics
/// Panics if the runtimes were already initialized (explicitly or lazily).
pub fn init_global_runtimes(options: &IoRuntimeOptions) {
    IO_RUNTIMES
        .set(build_io_runtimes(options))
        .expect("I/O runtimes already initialized");
}

#[must_use]
pub fn file_io_runtime() -> Arc<Runtime> { Arc::clone(&io_runtimes().file_io) }

#[must_use]
pub fn network_io_runtime() -> Arc<Runtime> { Arc::clone(&io_runtimes().net_io) }

#[must_use]
pub fn background_runtime() -> Arc<Runtime> { Arc::clone(&io_runtimes().background) }

/// Spawn file-system work; used by the file adapter's native half.
pub fn spawn_file_io<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    file_io_runtime().handle().spawn(future)
}

pub fn spawn_blocking_file_io<F, R>(job: F) -> JoinHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    file_io_runtime().handle().spawn_blocking(job)
}

/// Spawn socket/HTTP work; used by the network adapters' native halves.
pub fn spawn_network_io<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    network_io_runtime().handle().spawn(future)
}

pub fn block_on_network_io<F>(future: F) -> F::Output
where
    F: Future,
{
    network_io_runtime().block_on(future)
}

/// Spawn long-lived chores (signal watchers, teardown) off both the consumer
/// and the I/O pools.
pub fn spawn_background<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    background_runtime().handle().spawn(future)
}
