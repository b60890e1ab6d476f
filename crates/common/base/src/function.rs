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

use std::{fmt, sync::Arc};

use crate::Value;

/// Result of calling a script-visible function: `Err` carries the thrown
/// script value, not a host error.
pub type FnResult = Result<Value, Value>;

type CallFn = dyn Fn(&[Value]) -> FnResult + Send + Sync;

/// A callable crossing the bridge in either direction.
///
/// Host modules expose their operations as `NativeFunction`s; an engine
/// adapter wraps scripted function handles in them so the host can invoke
/// callbacks without knowing anything about the interpreter. The wrapped
/// closure must only ever be *called* on the task consumer; constructing and
/// cloning the handle is allowed anywhere.
#[derive(Clone)]
pub struct NativeFunction {
    name: Arc<str>,
    call: Arc<CallFn>,
}

impl NativeFunction {
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[Value]) -> FnResult + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            call: Arc::new(f),
        }
    }

    /// An anonymous function, the common case for script callbacks.
    pub fn anonymous<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> FnResult + Send + Sync + 'static,
    {
        Self::new("anonymous", f)
    }

    #[must_use]
    pub fn name(&self) -> &str { &self.name }

    pub fn call(&self, args: &[Value]) -> FnResult { (self.call)(args) }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool { Arc::ptr_eq(&self.call, &other.call) }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Function: {}]", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calls_through_to_the_closure() {
        let double = NativeFunction::new("double", |args| {
            let n = args.first().and_then(Value::as_number).unwrap_or(0.0);
            Ok(Value::Number(n * 2.0))
        });
        assert_eq!(double.call(&[Value::Number(21.0)]), Ok(Value::Number(42.0)));
        assert_eq!(double.name(), "double");
    }

    #[test]
    fn clones_compare_equal_by_identity() {
        let f = NativeFunction::anonymous(|_| Ok(Value::Undefined));
        let g = f.clone();
        assert!(f.ptr_eq(&g));
        assert!(!f.ptr_eq(&NativeFunction::anonymous(|_| Ok(Value::Undefined))));
    }
}
