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

//! Aggregate combinators: `all`, `race`, `allSettled`, `any`.
//!
//! Every combinator pins results to input-index order regardless of
//! settlement order, and treats non-thenable inputs as already settled.

use std::sync::Arc;

use dougless_base::{ObjectRef, Settle, Value, adopt_thenable};
use dougless_engine::EngineHandle;
use parking_lot::Mutex;

use crate::{Outcome, Promise};

/// The rejection value of `Promise.any` when every input rejects: an object
/// shaped `{name: "AggregateError", message, errors}` with `errors` in input
/// order.
#[must_use]
pub fn aggregate_error(errors: Vec<Value>) -> Value {
    Value::Object(ObjectRef::from([
        ("name", Value::string("AggregateError")),
        ("message", Value::string("All promises were rejected")),
        ("errors", Value::Array(errors)),
    ]))
}

/// Hands the settlement pair to `input` when it is a thenable; otherwise the
/// input is its own fulfilment value, immediately.
fn observe(input: Value, resolve: Settle, reject: Settle) {
    if let Err((resolve, _)) = adopt_thenable(&input, resolve, reject) {
        resolve(input);
    }
}

impl Promise {
    /// `Promise.all`: fulfils with every value in input order, or rejects
    /// with the first rejection. Empty input fulfils with `[]`.
    #[must_use]
    pub fn all(engine: &EngineHandle, inputs: Vec<Value>) -> Self {
        let result = Self::new(engine.clone());
        let total = inputs.len();
        if total == 0 {
            result.settle(Outcome::Fulfilled, Value::Array(Vec::new()));
            return result;
        }

        struct AllState {
            results:   Vec<Option<Value>>,
            remaining: usize,
            done:      bool,
        }
        let state = Arc::new(Mutex::new(AllState {
            results:   vec![None; total],
            remaining: total,
            done:      false,
        }));

        for (index, input) in inputs.into_iter().enumerate() {
            let on_fulfilled: Settle = {
                let state = Arc::clone(&state);
                let result = result.clone();
                Box::new(move |value: Value| {
                    let mut s = state.lock();
                    if s.done || s.results[index].is_some() {
                        return;
                    }
                    s.results[index] = Some(value);
                    s.remaining -= 1;
                    if s.remaining == 0 {
                        s.done = true;
                        let values = s
                            .results
                            .iter_mut()
                            .map(|slot| slot.take().unwrap_or_default())
                            .collect();
                        drop(s);
                        result.settle(Outcome::Fulfilled, Value::Array(values));
                    }
                })
            };
            let on_rejected: Settle = {
                let state = Arc::clone(&state);
                let result = result.clone();
                Box::new(move |reason: Value| {
                    let mut s = state.lock();
                    if s.done {
                        return;
                    }
                    s.done = true;
                    drop(s);
                    result.settle(Outcome::Rejected, reason);
                })
            };
            observe(input, on_fulfilled, on_rejected);
        }
        result
    }

    /// `Promise.race`: settles with the first settlement. Empty input stays
    /// pending forever; non-thenables settle immediately and win.
    #[must_use]
    pub fn race(engine: &EngineHandle, inputs: Vec<Value>) -> Self {
        let result = Self::new(engine.clone());
        for input in inputs {
            let on_fulfilled: Settle = {
                let result = result.clone();
                Box::new(move |value: Value| result.settle(Outcome::Fulfilled, value))
            };
            let on_rejected: Settle = {
                let result = result.clone();
                Box::new(move |reason: Value| result.settle(Outcome::Rejected, reason))
            };
            observe(input, on_fulfilled, on_rejected);
        }
        result
    }

    /// `Promise.allSettled`: always fulfils, with `{status, value|reason}`
    /// records in input order.
    #[must_use]
    pub fn all_settled(engine: &EngineHandle, inputs: Vec<Value>) -> Self {
        let result = Self::new(engine.clone());
        let total = inputs.len();
        if total == 0 {
            result.settle(Outcome::Fulfilled, Value::Array(Vec::new()));
            return result;
        }

        struct SettledState {
            entries:   Vec<Option<Value>>,
            remaining: usize,
        }
        let state = Arc::new(Mutex::new(SettledState {
            entries:   vec![None; total],
            remaining: total,
        }));

        for (index, input) in inputs.into_iter().enumerate() {
            let record = |state: &Arc<Mutex<SettledState>>, result: &Self, entry_of: fn(Value) -> Value| {
                let state = Arc::clone(state);
                let result = result.clone();
                let settle: Settle = Box::new(move |value: Value| {
                    let mut s = state.lock();
                    if s.entries[index].is_some() {
                        return;
                    }
                    s.entries[index] = Some(entry_of(value));
                    s.remaining -= 1;
                    if s.remaining == 0 {
                        let entries = s
                            .entries
                            .iter_mut()
                            .map(|slot| slot.take().unwrap_or_default())
                            .collect();
                        drop(s);
                        result.settle(Outcome::Fulfilled, Value::Array(entries));
                    }
                });
                settle
            };

            let on_fulfilled = record(&state, &result, |value| {
                Value::Object(ObjectRef::from([
                    ("status", Value::string("fulfilled")),
                    ("value", value),
                ]))
            });
            let on_rejected = record(&state, &result, |reason| {
                Value::Object(ObjectRef::from([
                    ("status", Value::string("rejected")),
                    ("reason", reason),
                ]))
            });
            observe(input, on_fulfilled, on_rejected);
        }
        result
    }

    /// `Promise.any`: fulfils with the first fulfilment; rejects with an
    /// [`aggregate_error`] once every input has rejected. Empty input rejects
    /// immediately.
    #[must_use]
    pub fn any(engine: &EngineHandle, inputs: Vec<Value>) -> Self {
        let result = Self::new(engine.clone());
        let total = inputs.len();
        if total == 0 {
            result.settle(Outcome::Rejected, aggregate_error(Vec::new()));
            return result;
        }

        struct AnyState {
            errors:    Vec<Option<Value>>,
            remaining: usize,
            done:      bool,
        }
        let state = Arc::new(Mutex::new(AnyState {
            errors:    vec![None; total],
            remaining: total,
            done:      false,
        }));

        for (index, input) in inputs.into_iter().enumerate() {
            let on_fulfilled: Settle = {
                let state = Arc::clone(&state);
                let result = result.clone();
                Box::new(move |value: Value| {
                    let mut s = state.lock();
                    if s.done {
                        return;
                    }
                    s.done = true;
                    drop(s);
                    result.settle(Outcome::Fulfilled, value);
                })
            };
            let on_rejected: Settle = {
                let state = Arc::clone(&state);
                let result = result.clone();
                Box::new(move |reason: Value| {
                    let mut s = state.lock();
                    if s.done || s.errors[index].is_some() {
                        return;
                    }
                    s.errors[index] = Some(reason);
                    s.remaining -= 1;
                    if s.remaining == 0 {
                        s.done = true;
                        let errors = s
                            .errors
                            .iter_mut()
                            .map(|slot| slot.take().unwrap_or_default())
                            .collect();
                        drop(s);
                        result.settle(Outcome::Rejected, aggregate_error(errors));
                    }
                })
            };
            observe(input, on_fulfilled, on_rejected);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use dougless_test_support::TestLoop;

    use super::*;
    use crate::PromiseState;

    /// A promise fulfilling with `value` after `delay`, like a scripted
    /// `delay(ms, value)` helper.
    fn delay(handle: &EngineHandle, delay: Duration, value: &str) -> Promise {
        let promise = Promise::new(handle.clone());
        let _ = handle.set_timeout(delay, {
            let promise = promise.clone();
            let value = value.to_string();
            move || promise.resolve(Value::string(value))
        });
        promise
    }

    #[test]
    fn all_preserves_input_order_across_settlement_order() {
        let test_loop = TestLoop::start();
        let handle = test_loop.handle();

        let combined = Promise::all(&handle, vec![
            delay(&handle, Duration::from_millis(100), "slow").to_value(),
            Promise::resolved(handle.clone(), Value::string("instant")).to_value(),
            delay(&handle, Duration::from_millis(50), "medium").to_value(),
        ]);

        assert!(test_loop.drain_default());
        assert_eq!(
            combined.state(),
            PromiseState::Fulfilled(Value::Array(vec![
                Value::string("slow"),
                Value::string("instant"),
                Value::string("medium"),
            ]))
        );
    }

    #[test]
    fn all_rejects_with_first_rejection_and_ignores_the_rest() {
        let test_loop = TestLoop::start();
        let handle = test_loop.handle();

        let combined = Promise::all(&handle, vec![
            Promise::rejected(handle.clone(), Value::string("first")).to_value(),
            Promise::rejected(handle.clone(), Value::string("second")).to_value(),
            Value::Number(3.0),
        ]);

        assert!(test_loop.drain_default());
        assert_eq!(
            combined.state(),
            PromiseState::Rejected(Value::string("first"))
        );
    }

    #[test]
    fn all_on_empty_input_fulfils_with_empty_array() {
        let test_loop = TestLoop::start();
        let combined = Promise::all(&test_loop.handle(), Vec::new());
        assert_eq!(
            combined.state(),
            PromiseState::Fulfilled(Value::Array(Vec::new()))
        );
    }

    #[test]
    fn all_treats_non_thenables_as_fulfilled() {
        let test_loop = TestLoop::start();
        let handle = test_loop.handle();
        let combined = Promise::all(&handle, vec![
            Value::Number(1.0),
            Value::string("two"),
            Promise::resolved(handle.clone(), Value::Number(3.0)).to_value(),
        ]);

        assert!(test_loop.drain_default());
        assert_eq!(
            combined.state(),
            PromiseState::Fulfilled(Value::Array(vec![
                Value::Number(1.0),
                Value::string("two"),
                Value::Number(3.0),
            ]))
        );
    }

    #[test]
    fn race_on_empty_input_stays_pending() {
        let test_loop = TestLoop::start();
        let raced = Promise::race(&test_loop.handle(), Vec::new());
        assert!(test_loop.drain_default());
        assert_eq!(raced.state(), PromiseState::Pending);
    }

    #[test]
    fn race_is_won_by_a_non_thenable_over_a_settled_promise() {
        let test_loop = TestLoop::start();
        let handle = test_loop.handle();
        let raced = Promise::race(&handle, vec![
            Promise::resolved(handle.clone(), Value::string("promise")).to_value(),
            Value::string("plain"),
        ]);

        assert!(test_loop.drain_default());
        assert_eq!(
            raced.state(),
            PromiseState::Fulfilled(Value::string("plain"))
        );
    }

    #[test]
    fn race_settles_with_first_settlement() {
        let test_loop = TestLoop::start();
        let handle = test_loop.handle();
        let raced = Promise::race(&handle, vec![
            delay(&handle, Duration::from_millis(80), "slow").to_value(),
            delay(&handle, Duration::from_millis(20), "fast").to_value(),
        ]);

        assert!(test_loop.drain_default());
        assert_eq!(raced.state(), PromiseState::Fulfilled(Value::string("fast")));
    }

    #[test]
    fn all_settled_reports_mixed_outcomes_in_order() {
        let test_loop = TestLoop::start();
        let handle = test_loop.handle();

        let settled = Promise::all_settled(&handle, vec![
            Promise::resolved(handle.clone(), Value::Number(42.0)).to_value(),
            Promise::rejected(handle.clone(), Value::string("x")).to_value(),
            Promise::resolved(handle.clone(), Value::string("y")).to_value(),
        ]);

        assert!(test_loop.drain_default());
        let expected = Value::Array(vec![
            Value::Object(ObjectRef::from([
                ("status", Value::string("fulfilled")),
                ("value", Value::Number(42.0)),
            ])),
            Value::Object(ObjectRef::from([
                ("status", Value::string("rejected")),
                ("reason", Value::string("x")),
            ])),
            Value::Object(ObjectRef::from([
                ("status", Value::string("fulfilled")),
                ("value", Value::string("y")),
            ])),
        ]);
        assert_eq!(settled.state(), PromiseState::Fulfilled(expected));
    }

    #[test]
    fn all_settled_on_empty_input_fulfils_with_empty_array() {
        let test_loop = TestLoop::start();
        let settled = Promise::all_settled(&test_loop.handle(), Vec::new());
        assert_eq!(
            settled.state(),
            PromiseState::Fulfilled(Value::Array(Vec::new()))
        );
    }

    #[test]
    fn any_rejects_with_aggregate_error_in_input_order() {
        let test_loop = TestLoop::start();
        let handle = test_loop.handle();

        let any = Promise::any(&handle, vec![
            Promise::rejected(handle.clone(), Value::string("e1")).to_value(),
            Promise::rejected(handle.clone(), Value::string("e2")).to_value(),
        ]);

        assert!(test_loop.drain_default());
        let PromiseState::Rejected(reason) = any.state() else {
            panic!("expected rejection");
        };
        let obj = reason.as_object().expect("aggregate error object").clone();
        assert_eq!(obj.get("name"), Some(Value::string("AggregateError")));
        assert_eq!(
            obj.get("errors"),
            Some(Value::Array(vec![
                Value::string("e1"),
                Value::string("e2")
            ]))
        );
    }

    #[test]
    fn any_fulfils_with_first_fulfilment() {
        let test_loop = TestLoop::start();
        let handle = test_loop.handle();

        let any = Promise::any(&handle, vec![
            Promise::rejected(handle.clone(), Value::string("nope")).to_value(),
            delay(&handle, Duration::from_millis(30), "eventually").to_value(),
            Value::Number(9.0),
        ]);

        assert!(test_loop.drain_default());
        // The non-thenable short-circuits as fulfilment.
        assert_eq!(any.state(), PromiseState::Fulfilled(Value::Number(9.0)));
    }

    #[test]
    fn any_on_empty_input_rejects_with_aggregate_error() {
        let test_loop = TestLoop::start();
        let any = Promise::any(&test_loop.handle(), Vec::new());
        let PromiseState::Rejected(reason) = any.state() else {
            panic!("expected rejection");
        };
        let obj = reason.as_object().expect("aggregate error object").clone();
        assert_eq!(obj.get("name"), Some(Value::string("AggregateError")));
        assert_eq!(obj.get("errors"), Some(Value::Array(Vec::new())));
    }
}
