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

//! Fixtures shared by the workspace's test suites.

use std::{
    io::{self, Write},
    sync::Arc,
    thread,
    time::Duration,
};

use dougless_engine::{EngineHandle, TaskEngine};
use parking_lot::Mutex;

/// A task engine with its consumer running on a named background thread,
/// stopped and joined on drop. Most tests want exactly this: schedule work,
/// [`TestLoop::drain`], assert.
pub struct TestLoop {
    engine:   Arc<TaskEngine>,
    consumer: Option<thread::JoinHandle<()>>,
}

impl TestLoop {
    #[must_use]
    pub fn start() -> Self {
        let engine = Arc::new(TaskEngine::new());
        let consumer = {
            let engine = Arc::clone(&engine);
            thread::Builder::new()
                .name("dougless-consumer".to_string())
                .spawn(move || engine.run())
                .expect("failed to spawn consumer thread")
        };
        Self {
            engine,
            consumer: Some(consumer),
        }
    }

    #[must_use]
    pub fn handle(&self) -> EngineHandle { self.engine.handle() }

    #[must_use]
    pub fn engine(&self) -> &TaskEngine { &self.engine }

    /// Waits for the keep-alive counter to drain; returns whether it did
    /// before the timeout.
    #[must_use]
    pub fn drain(&self, timeout: Duration) -> bool { self.engine.wait_timeout(timeout) }

    /// [`TestLoop::drain`] with the timeout used throughout the suites.
    #[must_use]
    pub fn drain_default(&self) -> bool { self.drain(Duration::from_secs(5)) }
}

impl Drop for TestLoop {
    fn drop(&mut self) {
        self.engine.stop();
        if let Some(consumer) = self.consumer.take() {
            let _ = consumer.join();
        }
    }
}

/// An `io::Write` that appends into shared memory, standing in for
/// stdout/stderr when tests capture console output.
#[derive(Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    #[must_use]
    pub fn contents(&self) -> String { String::from_utf8_lossy(&self.bytes.lock()).to_string() }

    /// The captured output split into non-empty lines.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.contents()
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> { Ok(()) }
}

/// Grabs an ephemeral port by binding to port 0 and releasing it.
#[must_use]
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("failed to bind port 0");
    let port = listener.local_addr().expect("listener has no addr").port();
    drop(listener);
    port
}
