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

//! The optional-continuation pattern every host operation uses.
//!
//! `(args..., optional callback)`: with a callback, the result is delivered
//! as `callback(err, data)`; without one, the operation hands back a pending
//! promise and settles it instead. Dispatch happens here, in host code,
//! never by reflecting on arity at the interpreter boundary. Either way the
//! delivery is a task enqueued from the background worker, so results
//! re-enter script on the consumer only.

use dougless_base::{NativeFunction, Value};
use dougless_engine::{EngineHandle, KeepAliveToken, Task, TaskOrigin};
use dougless_promise::Promise;

use crate::report_uncaught;

enum Completion {
    Callback(NativeFunction),
    Promise(Promise),
}

/// One pending host operation's path back into script.
///
/// Holds a keep-alive unit from creation until the delivery task is enqueued,
/// so the process cannot drain while native I/O is still in flight.
pub struct Responder {
    engine:     EngineHandle,
    completion: Completion,
    keep_alive: KeepAliveToken,
}

impl Responder {
    /// Builds the responder and the operation's script-visible return value:
    /// `undefined` for the callback variant, the pending promise otherwise.
    #[must_use]
    pub fn new(engine: &EngineHandle, callback: Option<NativeFunction>) -> (Self, Value) {
        let keep_alive = engine.keep_alive();
        match callback {
            Some(callback) => (
                Self {
                    engine:     engine.clone(),
                    completion: Completion::Callback(callback),
                    keep_alive,
                },
                Value::Undefined,
            ),
            None => {
                let promise = Promise::new(engine.clone());
                let value = promise.to_value();
                (
                    Self {
                        engine:     engine.clone(),
                        completion: Completion::Promise(promise),
                        keep_alive,
                    },
                    value,
                )
            }
        }
    }

    /// Delivers from an async worker: enqueues the task invoking the
    /// callback (`(err, data)` convention, `err` is `null` on success) or
    /// settling the promise.
    pub async fn deliver(self, result: Result<Value, Value>) {
        let Self {
            engine,
            completion,
            keep_alive,
        } = self;
        let task = Task::immediate(TaskOrigin::IoCompletion, move || {
            run_completion(completion, result);
        });
        if engine.schedule_async(task).await.is_err() {
            tracing::debug!("host result dropped: engine is shutting down");
        }
        // The unit transfers: the delivery task holds its own.
        drop(keep_alive);
    }
}

fn run_completion(completion: Completion, result: Result<Value, Value>) {
    match completion {
        Completion::Callback(callback) => {
            // Uniform two-argument shape: (null, data) or (err, undefined).
            let args = match result {
                Ok(data) => vec![Value::Null, data],
                Err(error) => vec![error, Value::Undefined],
            };
            if let Err(thrown) = callback.call(&args) {
                report_uncaught(&thrown);
            }
        }
        Completion::Promise(promise) => match result {
            Ok(data) => promise.resolve(data),
            Err(error) => promise.reject(error),
        },
    }
}
