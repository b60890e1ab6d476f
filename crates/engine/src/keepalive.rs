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

use std::{sync::Arc, time::Duration};

use parking_lot::{Condvar, Mutex};

/// The counter that keeps the process alive while scheduled or background
/// work is in flight. Zero with an empty ready queue and an empty wheel means
/// the runtime may exit.
#[derive(Default)]
pub struct KeepAlive {
    count: Mutex<u64>,
    zero:  Condvar,
}

impl KeepAlive {
    pub(crate) fn increment(&self) { *self.count.lock() += 1; }

    pub(crate) fn decrement(&self) {
        let mut count = self.count.lock();
        match count.checked_sub(1) {
            Some(next) => *count = next,
            // An underflow means a unit was released twice somewhere; clamp
            // and report rather than poisoning the whole engine.
            None => tracing::error!("keep-alive underflow"),
        }
        if *count == 0 {
            self.zero.notify_all();
        }
    }

    #[must_use]
    pub fn count(&self) -> u64 { *self.count.lock() }

    /// Blocks until the counter reaches zero.
    pub fn wait_zero(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.zero.wait(&mut count);
        }
    }

    /// Blocks until the counter reaches zero or `timeout` elapses; returns
    /// whether it drained.
    pub fn wait_zero_timeout(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        let mut count = self.count.lock();
        while *count > 0 {
            if self.zero.wait_until(&mut count, deadline).timed_out() {
                return *count == 0;
            }
        }
        true
    }
}

/// RAII keep-alive unit. Acquiring increments the counter; dropping (or
/// explicitly releasing) decrements it exactly once; the type system rules
/// out a double release.
#[must_use = "dropping the token immediately releases the keep-alive unit"]
pub struct KeepAliveToken {
    counter: Arc<KeepAlive>,
}

impl KeepAliveToken {
    pub(crate) fn acquire(counter: Arc<KeepAlive>) -> Self {
        counter.increment();
        Self { counter }
    }

    /// Releases the unit now instead of at end of scope.
    pub fn release(self) { drop(self); }
}

impl Drop for KeepAliveToken {
    fn drop(&mut self) { self.counter.decrement(); }
}
