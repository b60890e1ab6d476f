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

//! `setTimeout` / `setInterval` / `clearTimeout` / `clearInterval`: thin
//! sugar over the engine's timer wheel. The returned ids are the engine's
//! opaque task ids, stringified.

use std::time::Duration;

use dougless_base::{NativeFunction, Value};
use dougless_engine::{EngineHandle, TaskId};

use crate::{report_uncaught, require_function};

/// The four timer globals.
#[must_use]
pub fn globals(engine: &EngineHandle) -> Vec<(String, Value)> {
    vec![
        ("setTimeout".to_string(), set_timeout_fn(engine.clone())),
        ("setInterval".to_string(), set_interval_fn(engine.clone())),
        ("clearTimeout".to_string(), clear_fn(engine.clone(), "clearTimeout")),
        ("clearInterval".to_string(), clear_fn(engine.clone(), "clearInterval")),
    ]
}

fn delay_from(args: &[Value]) -> Duration {
    let millis = args
        .get(1)
        .and_then(Value::as_number)
        .filter(|ms| ms.is_finite() && *ms >= 0.0)
        .unwrap_or(0.0);
    Duration::from_millis(millis as u64)
}

/// Arguments past the delay are forwarded to the callback, as scripts
/// expect from `setTimeout(fn, ms, ...args)`.
fn extra_args(args: &[Value]) -> Vec<Value> { args.iter().skip(2).cloned().collect() }

fn set_timeout_fn(engine: EngineHandle) -> Value {
    Value::Function(NativeFunction::new("setTimeout", move |args| {
        let callback = require_function(args, 0, "setTimeout(callback, delay)")?;
        let delay = delay_from(args);
        let forwarded = extra_args(args);

        let scheduled = engine.set_timeout(delay, move || {
            if let Err(thrown) = callback.call(&forwarded) {
                report_uncaught(&thrown);
            }
        });
        match scheduled {
            Ok(id) => Ok(Value::string(id.to_string())),
            Err(_) => Ok(Value::Undefined),
        }
    }))
}

fn set_interval_fn(engine: EngineHandle) -> Value {
    Value::Function(NativeFunction::new("setInterval", move |args| {
        let callback = require_function(args, 0, "setInterval(callback, period)")?;
        let period = delay_from(args).max(Duration::from_millis(1));
        let forwarded = extra_args(args);

        let scheduled = engine.set_interval(period, move || {
            if let Err(thrown) = callback.call(&forwarded) {
                report_uncaught(&thrown);
            }
        });
        match scheduled {
            Ok(id) => Ok(Value::string(id.to_string())),
            Err(_) => Ok(Value::Undefined),
        }
    }))
}

fn clear_fn(engine: EngineHandle, name: &'static str) -> Value {
    Value::Function(NativeFunction::new(name, move |args| {
        if let Some(Value::String(id)) = args.first() {
            engine.clear_timer(&TaskId::from(id.as_str()));
        }
        // Unknown or already-cleared ids are a silent no-op.
        Ok(Value::Undefined)
    }))
}
