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

use std::{collections::BTreeMap, fmt, sync::Arc};

use parking_lot::Mutex;

use crate::{NativeFunction, ThenableRef};

/// A script-level value crossing the interpreter host bridge.
///
/// `Value` is an exchange type, not an object model: it carries enough of the
/// scripted world (data, shared objects, callables, thenables) for host
/// modules to parse arguments and deliver results, and an engine adapter maps
/// it onto its own representation.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    /// Shared, mutable, reference-semantics object. Cloning a `Value::Object`
    /// clones the reference, matching script assignment semantics.
    Object(ObjectRef),
    Function(NativeFunction),
    Thenable(ThenableRef),
}

impl Value {
    /// Convenience constructor for `Value::String`.
    pub fn string(s: impl Into<String>) -> Self { Self::String(s.into()) }

    #[must_use]
    pub const fn number(n: f64) -> Self { Self::Number(n) }

    #[must_use]
    pub fn is_nullish(&self) -> bool { matches!(self, Self::Undefined | Self::Null) }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_function(&self) -> Option<&NativeFunction> {
        match self {
            Self::Function(f) => Some(f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Renders the value the way a console would print it.
    ///
    /// Strings print bare at the top level and quoted when nested, matching
    /// the familiar console behavior.
    #[must_use]
    pub fn to_display_string(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            other => other.to_quoted_string(),
        }
    }

    fn to_quoted_string(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_string(),
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::String(s) => format!("'{s}'"),
            Self::Bytes(b) => format!("<bytes {}>", b.len()),
            Self::Array(items) => {
                let inner: Vec<String> = items.iter().map(Self::to_quoted_string).collect();
                format!("[ {} ]", inner.join(", "))
            }
            Self::Object(obj) => {
                let entries = obj.entries();
                let inner: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{k}: {}", v.to_quoted_string()))
                    .collect();
                format!("{{ {} }}", inner.join(", "))
            }
            Self::Function(f) => format!("[Function: {}]", f.name()),
            Self::Thenable(_) => "[object Promise]".to_string(),
        }
    }
}

/// Formats an f64 the way scripts expect: integral values print without a
/// trailing `.0`.
fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_quoted_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

impl PartialEq for Value {
    /// Deep equality for data, identity for callables and thenables.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.entries() == b.entries(),
            (Self::Function(a), Self::Function(b)) => a.ptr_eq(b),
            (Self::Thenable(a), Self::Thenable(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self { Self::String(s.to_string()) }
}

impl From<String> for Value {
    fn from(s: String) -> Self { Self::String(s) }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self { Self::Number(n) }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self { Self::Bool(b) }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self { Self::Array(items) }
}

impl From<ObjectRef> for Value {
    fn from(obj: ObjectRef) -> Self { Self::Object(obj) }
}

impl From<NativeFunction> for Value {
    fn from(f: NativeFunction) -> Self { Self::Function(f) }
}

/// A shared, mutable script object.
///
/// Cheap to clone; all clones observe the same entries. This is what backs
/// request/response records, WebSocket connection objects and everything else
/// a script can mutate after the host handed it over.
#[derive(Clone, Default)]
pub struct ObjectRef {
    entries: Arc<Mutex<BTreeMap<String, Value>>>,
}

impl ObjectRef {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Builder-style insertion, used when assembling module objects.
    #[must_use]
    pub fn with(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<Value> { self.entries.lock().get(key).cloned() }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.lock().insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<Value> { self.entries.lock().remove(key) }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool { self.entries.lock().contains_key(key) }

    #[must_use]
    pub fn keys(&self) -> Vec<String> { self.entries.lock().keys().cloned().collect() }

    #[must_use]
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.entries
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize { self.entries.lock().len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.entries.lock().is_empty() }
}

impl<K: Into<String>, V: Into<Value>, const N: usize> From<[(K, V); N]> for ObjectRef {
    fn from(pairs: [(K, V); N]) -> Self {
        let obj = Self::new();
        for (k, v) in pairs {
            obj.set(k, v);
        }
        obj
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.clone()).to_display_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_renders_like_a_console() {
        assert_eq!(Value::string("hi").to_display_string(), "hi");
        assert_eq!(Value::Number(3.0).to_display_string(), "3");
        assert_eq!(Value::Number(1.5).to_display_string(), "1.5");
        assert_eq!(Value::Undefined.to_display_string(), "undefined");

        let arr = Value::Array(vec![Value::string("a"), Value::Number(1.0)]);
        assert_eq!(arr.to_display_string(), "[ 'a', 1 ]");
    }

    #[test]
    fn object_clones_share_state() {
        let a = ObjectRef::new();
        let b = a.clone();
        a.set("x", Value::Number(1.0));
        assert_eq!(b.get("x"), Some(Value::Number(1.0)));
    }

    #[test]
    fn deep_equality_on_objects() {
        let a = ObjectRef::from([("k", Value::string("v"))]);
        let b = ObjectRef::from([("k", Value::string("v"))]);
        assert_eq!(Value::Object(a), Value::Object(b));
    }
}
