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

//! The Promise/A+ runtime.
//!
//! A promise is a mutex-protected state machine whose continuations are never
//! invoked inline: every handler dispatch is a task on the engine, so `then`
//! returns before any handler can observe the world, even on promises that
//! settled long ago. The mutex is dropped before anything is scheduled.

mod combinators;

use std::sync::Arc;

use dougless_base::{NativeFunction, Settle, Thenable, Value, adopt_thenable};
use dougless_engine::{EngineHandle, Task, TaskOrigin};
use parking_lot::Mutex;

/// A snapshot of a promise's state, mostly for assertions and the REPL.
#[derive(Clone, Debug, PartialEq)]
pub enum PromiseState {
    Pending,
    Fulfilled(Value),
    Rejected(Value),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Outcome {
    Fulfilled,
    Rejected,
}

enum Continuation {
    /// A `then`/`catch` registration: both wrappers always attach, missing
    /// handlers pass the settlement through unchanged.
    Chained {
        on_fulfilled: Option<NativeFunction>,
        on_rejected:  Option<NativeFunction>,
        downstream:   Promise,
    },
    /// A host-side subscription (combinators, thenable adoption).
    Native { resolve: Settle, reject: Settle },
}

enum State {
    Pending {
        /// Set by the first `resolve`/`reject` call; later calls are silent
        /// no-ops even while an adopted thenable is still pending.
        resolved:      bool,
        continuations: Vec<Continuation>,
    },
    Fulfilled(Value),
    Rejected(Value),
}

struct Inner {
    engine: EngineHandle,
    state:  Mutex<State>,
}

/// A promise. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Promise {
    inner: Arc<Inner>,
}

impl Promise {
    /// A fresh pending promise bound to `engine` for continuation dispatch.
    #[must_use]
    pub fn new(engine: EngineHandle) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                state: Mutex::new(State::Pending {
                    resolved:      false,
                    continuations: Vec::new(),
                }),
            }),
        }
    }

    /// Runs `executor` with a fresh resolve/reject pair; a throw out of the
    /// executor converts to rejection.
    #[must_use]
    pub fn with_executor(engine: EngineHandle, executor: &NativeFunction) -> Self {
        let promise = Self::new(engine);
        let (resolve, reject) = promise.resolver_pair();
        if let Err(thrown) = executor.call(&[Value::Function(resolve), Value::Function(reject)]) {
            promise.reject(thrown);
        }
        promise
    }

    /// `Promise.resolve`: adopts thenables, otherwise fulfils.
    #[must_use]
    pub fn resolved(engine: EngineHandle, value: Value) -> Self {
        let promise = Self::new(engine);
        promise.resolve(value);
        promise
    }

    /// `Promise.reject`.
    #[must_use]
    pub fn rejected(engine: EngineHandle, reason: Value) -> Self {
        let promise = Self::new(engine);
        promise.reject(reason);
        promise
    }

    /// The script-visible resolve/reject pair for this promise.
    #[must_use]
    pub fn resolver_pair(&self) -> (NativeFunction, NativeFunction) {
        let resolve = {
            let promise = self.clone();
            NativeFunction::new("resolve", move |args| {
                promise.resolve(args.first().cloned().unwrap_or_default());
                Ok(Value::Undefined)
            })
        };
        let reject = {
            let promise = self.clone();
            NativeFunction::new("reject", move |args| {
                promise.reject(args.first().cloned().unwrap_or_default());
                Ok(Value::Undefined)
            })
        };
        (resolve, reject)
    }

    /// Resolves the promise: thenable values are adopted, everything else
    /// fulfils. Only the first `resolve`/`reject` call has any effect.
    pub fn resolve(&self, value: Value) {
        if !self.latch() {
            return;
        }
        self.resolve_unlatched(value);
    }

    /// Rejects the promise. Only the first `resolve`/`reject` call has any
    /// effect.
    pub fn reject(&self, reason: Value) {
        if !self.latch() {
            return;
        }
        self.settle(Outcome::Rejected, reason);
    }

    /// Claims the resolve latch; `false` means a prior call already owns the
    /// promise's fate.
    fn latch(&self) -> bool {
        let mut state = self.inner.state.lock();
        match &mut *state {
            State::Pending { resolved, .. } if !*resolved => {
                *resolved = true;
                true
            }
            _ => false,
        }
    }

    /// The recursive half of the resolution algorithm: adopted thenables may
    /// themselves settle with thenables.
    fn resolve_unlatched(&self, value: Value) {
        let resolve: Settle = {
            let promise = self.clone();
            Box::new(move |v: Value| promise.resolve_unlatched(v))
        };
        let reject: Settle = {
            let promise = self.clone();
            Box::new(move |v: Value| promise.settle(Outcome::Rejected, v))
        };
        if adopt_thenable(&value, resolve, reject).is_err() {
            self.settle(Outcome::Fulfilled, value);
        }
    }

    /// Registers the continuation pair and returns the downstream promise.
    /// Handlers are never invoked before `then` returns, settled or not.
    #[must_use]
    pub fn then(
        &self,
        on_fulfilled: Option<NativeFunction>,
        on_rejected: Option<NativeFunction>,
    ) -> Self {
        let downstream = Self::new(self.inner.engine.clone());
        self.register(Continuation::Chained {
            on_fulfilled,
            on_rejected,
            downstream: downstream.clone(),
        });
        downstream
    }

    /// `catch(onRejected)` is `then(null, onRejected)`.
    #[must_use]
    pub fn catch(&self, on_rejected: NativeFunction) -> Self { self.then(None, Some(on_rejected)) }

    /// Host-side subscription used by combinators and thenable adoption;
    /// delivery still goes through the engine, in registration order with
    /// everything else.
    pub fn subscribe(&self, resolve: Settle, reject: Settle) {
        self.register(Continuation::Native { resolve, reject });
    }

    #[must_use]
    pub fn state(&self) -> PromiseState {
        match &*self.inner.state.lock() {
            State::Pending { .. } => PromiseState::Pending,
            State::Fulfilled(value) => PromiseState::Fulfilled(value.clone()),
            State::Rejected(reason) => PromiseState::Rejected(reason.clone()),
        }
    }

    /// The bridge representation of this promise.
    #[must_use]
    pub fn to_value(&self) -> Value { Value::Thenable(Arc::new(self.clone())) }

    fn register(&self, continuation: Continuation) {
        let mut state = self.inner.state.lock();
        let (outcome, value) = match &mut *state {
            State::Pending { continuations, .. } => {
                continuations.push(continuation);
                return;
            }
            State::Fulfilled(value) => (Outcome::Fulfilled, value.clone()),
            State::Rejected(reason) => (Outcome::Rejected, reason.clone()),
        };
        drop(state);
        self.dispatch(continuation, outcome, value);
    }

    /// The single transition out of `Pending`; drains continuations under the
    /// lock, dispatches after dropping it.
    fn settle(&self, outcome: Outcome, value: Value) {
        let continuations = {
            let mut state = self.inner.state.lock();
            match &mut *state {
                State::Pending { continuations, .. } => {
                    let drained = std::mem::take(continuations);
                    *state = match outcome {
                        Outcome::Fulfilled => State::Fulfilled(value.clone()),
                        Outcome::Rejected => State::Rejected(value.clone()),
                    };
                    drained
                }
                _ => return,
            }
        };
        for continuation in continuations {
            self.dispatch(continuation, outcome, value.clone());
        }
    }

    fn dispatch(&self, continuation: Continuation, outcome: Outcome, value: Value) {
        let task = Task::immediate(TaskOrigin::Microtask, move || {
            run_continuation(continuation, outcome, value);
        });
        if self.inner.engine.schedule(task).is_err() {
            tracing::debug!("promise continuation dropped: engine is shutting down");
        }
    }
}

impl Thenable for Promise {
    fn then(&self, resolve: Settle, reject: Settle) { self.subscribe(resolve, reject); }
}

impl std::fmt::Debug for Promise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.state() {
            PromiseState::Pending => write!(f, "Promise {{ <pending> }}"),
            PromiseState::Fulfilled(v) => write!(f, "Promise {{ {v:?} }}"),
            PromiseState::Rejected(r) => write!(f, "Promise {{ <rejected> {r:?} }}"),
        }
    }
}

/// Runs on the consumer: invokes the appropriate handler and settles the
/// downstream promise per the resolution algorithm.
fn run_continuation(continuation: Continuation, outcome: Outcome, value: Value) {
    match continuation {
        Continuation::Native { resolve, reject } => match outcome {
            Outcome::Fulfilled => resolve(value),
            Outcome::Rejected => reject(value),
        },
        Continuation::Chained {
            on_fulfilled,
            on_rejected,
            downstream,
        } => {
            let handler = match outcome {
                Outcome::Fulfilled => on_fulfilled,
                Outcome::Rejected => on_rejected,
            };
            match handler {
                Some(handler) => match handler.call(&[value]) {
                    Ok(result) => downstream.resolve(result),
                    Err(thrown) => downstream.reject(thrown),
                },
                // Pass-through: both fulfilment and rejection cross missing
                // handlers unchanged.
                None => match outcome {
                    Outcome::Fulfilled => downstream.resolve(value),
                    Outcome::Rejected => downstream.reject(value),
                },
            }
        }
    }
}

pub use combinators::aggregate_error;
