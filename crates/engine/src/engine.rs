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
    any::Any,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use bon::Builder;
use parking_lot::{Condvar, Mutex, MutexGuard};
use smart_default::SmartDefault;
use snafu::ensure;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{self, Result},
    keepalive::{KeepAlive, KeepAliveToken},
    task::{Deadline, Task, TaskFn, TaskId, TaskOrigin},
    wheel::{TimerEntry, TimerWheel},
};

/// Engine tunables.
#[derive(Debug, Clone, SmartDefault, Builder)]
#[builder(finish_fn = build)]
pub struct EngineOptions {
    /// Ready-queue bound. Producers block when the queue is full, which caps
    /// in-flight interpreter-bound work at a fixed constant.
    #[default = 1024]
    #[builder(default = 1024)]
    pub queue_capacity: usize,
}

enum QueueItem {
    Task(Task),
    Shutdown,
}

struct Shared {
    keep_alive:   Arc<KeepAlive>,
    wheel:        Mutex<TimerWheel>,
    timer_wakeup: Condvar,
    token:        CancellationToken,
    sender:       mpsc::Sender<QueueItem>,
}

impl Shared {
    /// Cancels the lifetime token, drains the wheel (one keep-alive unit per
    /// cancelled timer) and wakes both the timer thread and the consumer.
    /// Idempotent.
    fn stop(&self) {
        if self.token.is_cancelled() {
            return;
        }
        self.token.cancel();

        let cancelled = self.wheel.lock().drain();
        for _ in 0..cancelled {
            self.keep_alive.decrement();
        }
        self.timer_wakeup.notify_all();

        // The consumer may be parked on an empty queue; a sentinel wakes it.
        // Sent from a helper thread because the queue may be full.
        let sender = self.sender.clone();
        std::thread::spawn(move || {
            let _ = sender.blocking_send(QueueItem::Shutdown);
        });
    }
}

/// The task engine.
///
/// Construction spawns the timer thread; the consumer runs wherever
/// [`TaskEngine::run`] is called. Producers go through [`EngineHandle`],
/// which is cheap to clone and freely shared with background workers.
pub struct TaskEngine {
    shared:       Arc<Shared>,
    receiver:     Mutex<Option<mpsc::Receiver<QueueItem>>>,
    running:      AtomicBool,
    timer_thread: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl TaskEngine {
    #[must_use]
    pub fn new() -> Self { Self::with_options(EngineOptions::default()) }

    #[must_use]
    pub fn with_options(options: EngineOptions) -> Self {
        let (sender, receiver) = mpsc::channel(options.queue_capacity.max(1));
        let shared = Arc::new(Shared {
            keep_alive: Arc::new(KeepAlive::default()),
            wheel: Mutex::new(TimerWheel::default()),
            timer_wakeup: Condvar::new(),
            token: CancellationToken::new(),
            sender,
        });

        let timer_thread = {
            let shared = Arc::clone(&shared);
            std::thread::Builder::new()
                .name("dougless-timer".to_string())
                .spawn(move || timer_loop(&shared))
                .expect("failed to spawn timer thread")
        };

        Self {
            shared,
            receiver: Mutex::new(Some(receiver)),
            running: AtomicBool::new(false),
            timer_thread: Mutex::new(Some(timer_thread)),
        }
    }

    /// A producer handle for host modules and background workers.
    #[must_use]
    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Consumes tasks one at a time on the calling thread until the lifetime
    /// token is cancelled. The calling thread is the interpreter thread:
    /// every callback executes here, serialized, in enqueue order. Re-entrant
    /// calls are no-ops.
    pub fn run(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let receiver = self.receiver.lock().take();
        let Some(mut receiver) = receiver else { return };

        loop {
            match receiver.blocking_recv() {
                Some(QueueItem::Task(task)) => {
                    if self.shared.token.is_cancelled() {
                        // Admitted before cancellation, never run; account it.
                        self.shared.keep_alive.decrement();
                        continue;
                    }
                    execute(task);
                    self.shared.keep_alive.decrement();
                }
                Some(QueueItem::Shutdown) | None => break,
            }
        }

        // Close first so late producers get a send error and settle their own
        // accounting, then release the unit of everything already queued.
        receiver.close();
        while let Ok(item) = receiver.try_recv() {
            if matches!(item, QueueItem::Task(_)) {
                self.shared.keep_alive.decrement();
            }
        }
    }

    /// Cancels the lifetime token, stops every pending timer (accounting one
    /// keep-alive unit each) and wakes the consumer. Idempotent.
    pub fn stop(&self) {
        self.shared.stop();
        if let Some(thread) = self.timer_thread.lock().take() {
            let _ = thread.join();
        }
    }

    /// Blocks until the keep-alive counter reaches zero.
    pub fn wait(&self) { self.shared.keep_alive.wait_zero(); }

    /// Like [`TaskEngine::wait`] with an upper bound; returns whether the
    /// counter drained.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.shared.keep_alive.wait_zero_timeout(timeout)
    }

    #[must_use]
    pub fn keep_alive_count(&self) -> u64 { self.shared.keep_alive.count() }
}

impl Default for TaskEngine {
    fn default() -> Self { Self::new() }
}

impl Drop for TaskEngine {
    fn drop(&mut self) { self.stop(); }
}

/// Cloneable producer half of the engine.
#[derive(Clone)]
pub struct EngineHandle {
    shared: Arc<Shared>,
}

impl EngineHandle {
    /// Admits a task: immediate deadlines go to the ready queue (blocking
    /// when it is full), future deadlines to the timer wheel. Either way the
    /// task holds one keep-alive unit until it runs or is cancelled.
    ///
    /// Must not be called from async context; use
    /// [`EngineHandle::schedule_async`] there.
    pub fn schedule(&self, task: Task) -> Result<TaskId> {
        ensure!(!self.shared.token.is_cancelled(), error::CancelledSnafu);
        self.shared.keep_alive.increment();

        let Task {
            id,
            origin,
            deadline,
            period,
            callback,
        } = task;

        match deadline {
            Deadline::Immediate => {
                let item = QueueItem::Task(Task {
                    id: id.clone(),
                    origin,
                    deadline,
                    period,
                    callback,
                });
                if self.shared.sender.blocking_send(item).is_err() {
                    self.shared.keep_alive.decrement();
                    return error::StoppedSnafu.fail();
                }
            }
            Deadline::At(when) => self.arm_timer(when, id.clone(), origin, period, callback),
        }
        Ok(id)
    }

    /// [`EngineHandle::schedule`] for async producers (I/O completions).
    pub async fn schedule_async(&self, task: Task) -> Result<TaskId> {
        ensure!(!self.shared.token.is_cancelled(), error::CancelledSnafu);
        self.shared.keep_alive.increment();

        let Task {
            id,
            origin,
            deadline,
            period,
            callback,
        } = task;

        match deadline {
            Deadline::Immediate => {
                let item = QueueItem::Task(Task {
                    id: id.clone(),
                    origin,
                    deadline,
                    period,
                    callback,
                });
                if self.shared.sender.send(item).await.is_err() {
                    self.shared.keep_alive.decrement();
                    return error::StoppedSnafu.fail();
                }
            }
            Deadline::At(when) => self.arm_timer(when, id.clone(), origin, period, callback),
        }
        Ok(id)
    }

    fn arm_timer(
        &self,
        when: Instant,
        id: TaskId,
        origin: TaskOrigin,
        period: Option<Duration>,
        callback: TaskFn,
    ) {
        let mut wheel = self.shared.wheel.lock();
        wheel.insert(when, TimerEntry {
            id,
            origin,
            period,
            callback,
        });
        drop(wheel);
        self.shared.timer_wakeup.notify_all();
    }

    /// Sugar for an immediate task.
    pub fn submit<F>(&self, origin: TaskOrigin, f: F) -> Result<TaskId>
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule(Task::immediate(origin, f))
    }

    /// Sugar for a one-shot timer; the returned id cancels it.
    pub fn set_timeout<F>(&self, delay: Duration, f: F) -> Result<TaskId>
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule(Task::delayed(delay, f))
    }

    /// Sugar for a repeating timer; the returned id cancels it.
    pub fn set_interval<F>(&self, period: Duration, f: F) -> Result<TaskId>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.schedule(Task::interval(period, f))
    }

    /// Removes a pending timer and settles its keep-alive unit. Safe against
    /// double-clears and clears after fire: those return `false` and change
    /// nothing.
    pub fn clear_timer(&self, id: &TaskId) -> bool {
        let removed = self.shared.wheel.lock().remove(id).is_some();
        if removed {
            self.shared.keep_alive.decrement();
        }
        removed
    }

    /// Claims a keep-alive unit for long-lived native work (listener,
    /// read loop, in-flight transfer).
    #[must_use]
    pub fn keep_alive(&self) -> KeepAliveToken {
        KeepAliveToken::acquire(Arc::clone(&self.shared.keep_alive))
    }

    /// Initiates engine shutdown from a task callback or a host module
    /// (`process.exit` does this). Equivalent to [`TaskEngine::stop`] except
    /// the timer thread is joined later, by the engine owner.
    pub fn shutdown(&self) { self.shared.stop(); }

    /// The engine lifetime token; background workers select against it.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken { self.shared.token.clone() }

    #[must_use]
    pub fn is_cancelled(&self) -> bool { self.shared.token.is_cancelled() }

    #[must_use]
    pub fn keep_alive_count(&self) -> u64 { self.shared.keep_alive.count() }
}

/// Runs one callback, containing panics at the consumer boundary.
fn execute(task: Task) {
    let id = task.id.clone();
    let origin = task.origin;
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
        task.callback.invoke();
    }));
    if let Err(payload) = result {
        tracing::error!(
            task = %id,
            %origin,
            "task callback panicked: {}",
            panic_message(payload.as_ref())
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}

/// The timer thread: sleeps until the earliest deadline, then moves every due
/// entry to the ready queue in stable order, re-arming intervals first.
fn timer_loop(shared: &Shared) {
    let mut wheel = shared.wheel.lock();
    while !shared.token.is_cancelled() {
        match wheel.next_deadline() {
            None => shared.timer_wakeup.wait(&mut wheel),
            Some(deadline) => {
                let now = Instant::now();
                if deadline > now {
                    let _ = shared.timer_wakeup.wait_until(&mut wheel, deadline);
                    continue;
                }

                let due = wheel.pop_due(now);
                let mut ready = Vec::with_capacity(due.len());
                for (fired_at, entry) in due {
                    let callback = match entry.callback {
                        TaskFn::Once(f) => TaskFn::Once(f),
                        TaskFn::Repeated(f) => {
                            if let Some(period) = entry.period {
                                shared.keep_alive.increment();
                                wheel.insert(fired_at + period, TimerEntry {
                                    id:       entry.id.clone(),
                                    origin:   entry.origin,
                                    period:   Some(period),
                                    callback: TaskFn::Repeated(Arc::clone(&f)),
                                });
                            }
                            TaskFn::Repeated(f)
                        }
                    };
                    ready.push(Task {
                        id: entry.id,
                        origin: entry.origin,
                        deadline: Deadline::Immediate,
                        period: entry.period,
                        callback,
                    });
                }

                // The queue may block; hand due tasks over without holding
                // the wheel so producers can keep arming timers meanwhile.
                MutexGuard::unlocked(&mut wheel, || {
                    for task in ready {
                        if shared.sender.blocking_send(QueueItem::Task(task)).is_err() {
                            shared.keep_alive.decrement();
                        }
                    }
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn start_consumer(engine: &Arc<TaskEngine>) -> thread::JoinHandle<()> {
        let engine = Arc::clone(engine);
        thread::Builder::new()
            .name("dougless-consumer".to_string())
            .spawn(move || engine.run())
            .unwrap()
    }

    fn shutdown(engine: &Arc<TaskEngine>, consumer: thread::JoinHandle<()>) {
        engine.stop();
        consumer.join().unwrap();
    }

    #[test]
    fn immediate_tasks_run_in_enqueue_order() {
        let engine = Arc::new(TaskEngine::new());
        let consumer = start_consumer(&engine);
        let handle = engine.handle();

        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..100 {
            let seen = Arc::clone(&seen);
            handle
                .submit(TaskOrigin::Microtask, move || seen.lock().push(i))
                .unwrap();
        }

        assert!(engine.wait_timeout(Duration::from_secs(5)));
        assert_eq!(*seen.lock(), (0..100).collect::<Vec<_>>());
        shutdown(&engine, consumer);
    }

    #[test]
    fn every_task_settles_its_keep_alive_unit() {
        let engine = Arc::new(TaskEngine::new());
        let consumer = start_consumer(&engine);
        let handle = engine.handle();

        for _ in 0..10 {
            handle.submit(TaskOrigin::Microtask, || {}).unwrap();
        }
        handle
            .set_timeout(Duration::from_millis(10), || {})
            .unwrap();

        assert!(engine.wait_timeout(Duration::from_secs(5)));
        assert_eq!(engine.keep_alive_count(), 0);
        shutdown(&engine, consumer);
    }

    #[test]
    fn cleared_timer_never_fires_and_settles_accounting() {
        let engine = Arc::new(TaskEngine::new());
        let consumer = start_consumer(&engine);
        let handle = engine.handle();

        let fired = Arc::new(AtomicBool::new(false));
        let id = {
            let fired = Arc::clone(&fired);
            handle
                .set_timeout(Duration::from_millis(100), move || {
                    fired.store(true, Ordering::SeqCst);
                })
                .unwrap()
        };

        assert!(handle.clear_timer(&id));
        assert!(!handle.clear_timer(&id));
        assert!(engine.wait_timeout(Duration::from_secs(1)));
        std::thread::sleep(Duration::from_millis(150));
        assert!(!fired.load(Ordering::SeqCst));
        shutdown(&engine, consumer);
    }

    #[test]
    fn same_instant_timers_fire_in_schedule_order() {
        let engine = Arc::new(TaskEngine::new());
        let consumer = start_consumer(&engine);
        let handle = engine.handle();

        let deadline = Instant::now() + Duration::from_millis(30);
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let seen = Arc::clone(&seen);
            handle
                .schedule(Task::at(deadline, move || seen.lock().push(i)))
                .unwrap();
        }

        assert!(engine.wait_timeout(Duration::from_secs(5)));
        assert_eq!(*seen.lock(), vec![0, 1, 2, 3, 4]);
        shutdown(&engine, consumer);
    }

    #[test]
    fn interval_rearms_until_cleared() {
        let engine = Arc::new(TaskEngine::new());
        let consumer = start_consumer(&engine);
        let handle = engine.handle();

        let hits = Arc::new(Mutex::new(0u32));
        let id = {
            let hits = Arc::clone(&hits);
            handle
                .set_interval(Duration::from_millis(20), move || *hits.lock() += 1)
                .unwrap()
        };

        std::thread::sleep(Duration::from_millis(110));
        assert!(handle.clear_timer(&id));
        assert!(engine.wait_timeout(Duration::from_secs(1)));

        let hits = *hits.lock();
        assert!((2..=8).contains(&hits), "interval fired {hits} times");
        assert_eq!(engine.keep_alive_count(), 0);
        shutdown(&engine, consumer);
    }

    #[test]
    fn panicking_callback_does_not_stop_the_consumer() {
        let engine = Arc::new(TaskEngine::new());
        let consumer = start_consumer(&engine);
        let handle = engine.handle();

        handle
            .submit(TaskOrigin::Microtask, || panic!("scripted explosion"))
            .unwrap();
        let survived = Arc::new(AtomicBool::new(false));
        {
            let survived = Arc::clone(&survived);
            handle
                .submit(TaskOrigin::Microtask, move || {
                    survived.store(true, Ordering::SeqCst);
                })
                .unwrap();
        }

        assert!(engine.wait_timeout(Duration::from_secs(5)));
        assert!(survived.load(Ordering::SeqCst));
        assert_eq!(engine.keep_alive_count(), 0);
        shutdown(&engine, consumer);
    }

    #[test]
    fn stop_cancels_pending_timers_and_unblocks_wait() {
        let engine = Arc::new(TaskEngine::new());
        let consumer = start_consumer(&engine);
        let handle = engine.handle();

        handle.set_timeout(Duration::from_secs(60), || {}).unwrap();
        handle.set_timeout(Duration::from_secs(90), || {}).unwrap();
        assert_eq!(engine.keep_alive_count(), 2);

        engine.stop();
        assert!(engine.wait_timeout(Duration::from_secs(1)));
        assert_eq!(engine.keep_alive_count(), 0);

        assert!(handle.submit(TaskOrigin::Microtask, || {}).is_err());
        consumer.join().unwrap();
    }

    #[test]
    fn run_returns_after_stop_and_is_reentrant_safe() {
        let engine = TaskEngine::new();
        engine.stop();
        // Consumes the shutdown sentinel and returns.
        engine.run();
        // Re-entrant call is a no-op.
        engine.run();
    }
}
