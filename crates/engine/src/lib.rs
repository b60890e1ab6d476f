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

//! The task engine ordering all asynchronous re-entry into the interpreter.
//!
//! One bounded FIFO ready queue, one timer wheel on a dedicated thread, one
//! keep-alive counter governing process lifetime, one cancellable lifetime
//! token, and exactly one consumer. The thread that calls
//! [`TaskEngine::run`] becomes the interpreter thread: every task callback
//! executes there, serialized, in enqueue order. Background workers never
//! call into script; they enqueue a task that does.

mod engine;
mod error;
mod keepalive;
mod task;
mod wheel;

pub use engine::{EngineHandle, EngineOptions, TaskEngine};
pub use error::{Result, ScheduleError};
pub use keepalive::{KeepAlive, KeepAliveToken};
pub use task::{Deadline, Task, TaskFn, TaskId, TaskOrigin};
