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
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

/// Opaque unique task identifier; timer ids handed to scripts are these,
/// stringified.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TaskId(Arc<str>);

impl TaskId {
    pub(crate) fn fresh() -> Self { Self(Arc::from(uuid::Uuid::new_v4().to_string())) }

    #[must_use]
    pub fn as_str(&self) -> &str { &self.0 }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self { Self(Arc::from(s)) }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "TaskId({})", self.0) }
}

/// Where a task came from; drives nothing, explains everything in traces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, derive_more::Display)]
pub enum TaskOrigin {
    #[display("timer")]
    Timer,
    #[display("microtask")]
    Microtask,
    #[display("io-completion")]
    IoCompletion,
}

/// When a task becomes runnable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Deadline {
    Immediate,
    At(Instant),
}

/// A task callback. Intervals need a re-invocable closure since the wheel
/// re-arms them after every firing; everything else is call-once.
pub enum TaskFn {
    Once(Box<dyn FnOnce() + Send>),
    Repeated(Arc<dyn Fn() + Send + Sync>),
}

impl TaskFn {
    pub(crate) fn invoke(self) {
        match self {
            Self::Once(f) => f(),
            Self::Repeated(f) => f(),
        }
    }
}

impl fmt::Debug for TaskFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Once(_) => write!(f, "TaskFn::Once"),
            Self::Repeated(_) => write!(f, "TaskFn::Repeated"),
        }
    }
}

/// A unit of work scheduled on the engine.
///
/// Every pending task accounts for exactly one unit of keep-alive, taken when
/// it is scheduled and released after its callback returns or the task is
/// cancelled.
#[derive(Debug)]
pub struct Task {
    pub(crate) id:       TaskId,
    pub(crate) origin:   TaskOrigin,
    pub(crate) deadline: Deadline,
    pub(crate) period:   Option<Duration>,
    pub(crate) callback: TaskFn,
}

impl Task {
    /// A task runnable as soon as the consumer gets to it.
    pub fn immediate<F>(origin: TaskOrigin, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            id:       TaskId::fresh(),
            origin,
            deadline: Deadline::Immediate,
            period:   None,
            callback: TaskFn::Once(Box::new(f)),
        }
    }

    /// A one-shot timer firing `delay` from now.
    pub fn delayed<F>(delay: Duration, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::at(Instant::now() + delay, f)
    }

    /// A one-shot timer with an absolute deadline.
    pub fn at<F>(deadline: Instant, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            id:       TaskId::fresh(),
            origin:   TaskOrigin::Timer,
            deadline: Deadline::At(deadline),
            period:   None,
            callback: TaskFn::Once(Box::new(f)),
        }
    }

    /// A repeating timer; re-armed at `deadline + period` after each firing.
    pub fn interval<F>(period: Duration, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            id:       TaskId::fresh(),
            origin:   TaskOrigin::Timer,
            deadline: Deadline::At(Instant::now() + period),
            period:   Some(period),
            callback: TaskFn::Repeated(Arc::new(f)),
        }
    }

    #[must_use]
    pub fn id(&self) -> TaskId { self.id.clone() }

    #[must_use]
    pub const fn origin(&self) -> TaskOrigin { self.origin }
}
