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

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{NativeFunction, Value};

/// One half of a settlement pair. At most one of the pair is ever invoked.
pub type Settle = Box<dyn FnOnce(Value) + Send>;

/// Anything whose state can be adopted by a promise.
///
/// Adoption always goes through fresh resolve/reject functions; there is no
/// own-type special case anywhere, so foreign thenables (including objects
/// with a callable `then` member, see [`adopt_thenable`]) participate on the
/// same footing as promises.
pub trait Thenable: Send + Sync {
    /// Registers a settlement pair. The implementation must call at most one
    /// of the two, exactly once, and never synchronously re-enter script.
    fn then(&self, resolve: Settle, reject: Settle);
}

pub type ThenableRef = Arc<dyn Thenable>;

/// Wraps a settlement pair into two script-visible functions sharing a
/// first-call-wins latch, as required when handing resolve/reject to a
/// duck-typed `then`.
#[must_use]
pub fn settle_pair(resolve: Settle, reject: Settle) -> (NativeFunction, NativeFunction) {
    let latch = Arc::new(Mutex::new(Some((resolve, reject))));

    let resolve_fn = {
        let latch = Arc::clone(&latch);
        NativeFunction::new("resolve", move |args| {
            if let Some((resolve, _)) = latch.lock().take() {
                resolve(args.first().cloned().unwrap_or_default());
            }
            Ok(Value::Undefined)
        })
    };
    let reject_fn = NativeFunction::new("reject", move |args| {
        if let Some((_, reject)) = latch.lock().take() {
            reject(args.first().cloned().unwrap_or_default());
        }
        Ok(Value::Undefined)
    });
    (resolve_fn, reject_fn)
}

/// Attempts thenable adoption of `value`.
///
/// `Ok(())` means `value` was a thenable, either a [`Thenable`] implementor
/// or an object exposing a callable `then`, and the settlement pair has been
/// handed over; a throw out of a duck-typed `then` rejects, unless one of the
/// pair already fired. For anything else the untouched pair comes back in
/// `Err`, so the caller can settle immediately.
pub fn adopt_thenable(
    value: &Value,
    resolve: Settle,
    reject: Settle,
) -> Result<(), (Settle, Settle)> {
    match value {
        Value::Thenable(thenable) => {
            thenable.then(resolve, reject);
            Ok(())
        }
        Value::Object(obj) => {
            let Some(Value::Function(then)) = obj.get("then") else {
                return Err((resolve, reject));
            };
            let latch = Arc::new(Mutex::new(Some((resolve, reject))));
            let (resolve_fn, reject_fn) = {
                let resolve_latch = Arc::clone(&latch);
                let resolve: Settle = Box::new(move |v: Value| {
                    if let Some((resolve, _)) = resolve_latch.lock().take() {
                        resolve(v);
                    }
                });
                let reject_latch = Arc::clone(&latch);
                let reject: Settle = Box::new(move |v: Value| {
                    if let Some((_, reject)) = reject_latch.lock().take() {
                        reject(v);
                    }
                });
                settle_pair(resolve, reject)
            };
            if let Err(thrown) = then.call(&[Value::Function(resolve_fn), Value::Function(reject_fn)])
            {
                if let Some((_, reject)) = latch.lock().take() {
                    reject(thrown);
                }
            }
            Ok(())
        }
        _ => Err((resolve, reject)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ObjectRef;

    fn capture() -> (Settle, Settle, Arc<Mutex<Option<(String, Value)>>>) {
        let slot = Arc::new(Mutex::new(None));
        let resolved = {
            let slot = Arc::clone(&slot);
            Box::new(move |v: Value| {
                *slot.lock() = Some(("resolved".to_string(), v));
            })
        };
        let rejected = {
            let slot = Arc::clone(&slot);
            Box::new(move |v: Value| {
                *slot.lock() = Some(("rejected".to_string(), v));
            })
        };
        (resolved, rejected, slot)
    }

    #[test]
    fn plain_values_are_not_thenables() {
        let (resolve, reject, slot) = capture();
        let returned = adopt_thenable(&Value::Number(1.0), resolve, reject);
        assert!(returned.is_err());
        assert!(slot.lock().is_none());
        // The pair comes back usable.
        let (resolve, _) = returned.unwrap_err();
        resolve(Value::Number(1.0));
        assert_eq!(
            slot.lock().clone(),
            Some(("resolved".to_string(), Value::Number(1.0)))
        );
    }

    #[test]
    fn object_with_callable_then_is_adopted() {
        let obj = ObjectRef::new();
        obj.set(
            "then",
            NativeFunction::new("then", |args| {
                let resolve = args[0].as_function().cloned().unwrap();
                resolve.call(&[Value::string("from thenable")])?;
                Ok(Value::Undefined)
            }),
        );
        let (resolve, reject, slot) = capture();
        assert!(adopt_thenable(&Value::Object(obj), resolve, reject).is_ok());
        assert_eq!(
            slot.lock().clone(),
            Some(("resolved".to_string(), Value::string("from thenable")))
        );
    }

    #[test]
    fn throwing_then_rejects() {
        let obj = ObjectRef::new();
        obj.set(
            "then",
            NativeFunction::new("then", |_| Err(Value::string("boom"))),
        );
        let (resolve, reject, slot) = capture();
        assert!(adopt_thenable(&Value::Object(obj), resolve, reject).is_ok());
        assert_eq!(
            slot.lock().clone(),
            Some(("rejected".to_string(), Value::string("boom")))
        );
    }

    #[test]
    fn settle_pair_is_first_call_wins() {
        let (resolve, reject, slot) = capture();
        let (resolve_fn, reject_fn) = settle_pair(resolve, reject);
        resolve_fn.call(&[Value::Number(1.0)]).unwrap();
        reject_fn.call(&[Value::Number(2.0)]).unwrap();
        resolve_fn.call(&[Value::Number(3.0)]).unwrap();
        assert_eq!(
            slot.lock().clone(),
            Some(("resolved".to_string(), Value::Number(1.0)))
        );
    }
}
