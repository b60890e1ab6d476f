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

//! `crypto`: digests, HMACs, constant-time comparison, randomness, UUIDs.
//!
//! Hash and HMAC objects follow the `createX(...).update(data).digest(enc)`
//! chaining convention; `digest` consumes the state and a second call is a
//! type error. The sha-2 family is supported.

use std::sync::Arc;

use dougless_base::{NativeFunction, ObjectRef, Value};
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256, Sha512};
use subtle::ConstantTimeEq;

use crate::{require_string, type_error};

enum HashState {
    Sha256(Sha256),
    Sha512(Sha512),
}

impl HashState {
    fn new(algorithm: &str) -> Option<Self> {
        match algorithm {
            "sha256" | "sha-256" => Some(Self::Sha256(Sha256::new())),
            "sha512" | "sha-512" => Some(Self::Sha512(Sha512::new())),
            _ => None,
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(hasher) => hasher.update(data),
            Self::Sha512(hasher) => hasher.update(data),
        }
    }

    fn finalize(self) -> Vec<u8> {
        match self {
            Self::Sha256(hasher) => hasher.finalize().to_vec(),
            Self::Sha512(hasher) => hasher.finalize().to_vec(),
        }
    }
}

enum HmacState {
    Sha256(Hmac<Sha256>),
    Sha512(Hmac<Sha512>),
}

impl HmacState {
    fn new(algorithm: &str, key: &[u8]) -> Option<Self> {
        match algorithm {
            "sha256" | "sha-256" => {
                Hmac::<Sha256>::new_from_slice(key).ok().map(Self::Sha256)
            }
            "sha512" | "sha-512" => {
                Hmac::<Sha512>::new_from_slice(key).ok().map(Self::Sha512)
            }
            _ => None,
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(mac) => mac.update(data),
            Self::Sha512(mac) => mac.update(data),
        }
    }

    fn finalize(self) -> Vec<u8> {
        match self {
            Self::Sha256(mac) => mac.finalize().into_bytes().to_vec(),
            Self::Sha512(mac) => mac.finalize().into_bytes().to_vec(),
        }
    }
}

fn data_bytes(value: &Value, usage: &str) -> Result<Vec<u8>, Value> {
    match value {
        Value::String(s) => Ok(s.clone().into_bytes()),
        Value::Bytes(b) => Ok(b.clone()),
        _ => Err(type_error(&format!("expected a string or bytes: {usage}"))),
    }
}

fn encode_digest(digest: Vec<u8>, encoding: Option<&Value>) -> Result<Value, Value> {
    match encoding {
        None | Some(Value::Undefined | Value::Null) => Ok(Value::string(hex::encode(digest))),
        Some(Value::String(encoding)) => match encoding.as_str() {
            "hex" => Ok(Value::string(hex::encode(digest))),
            "bytes" => Ok(Value::Bytes(digest)),
            other => Err(type_error(&format!("unknown digest encoding '{other}'"))),
        },
        Some(_) => Err(type_error("digest encoding must be a string")),
    }
}

/// Builds the chaining object shared by hashes and HMACs; `update` returns
/// the object itself, `digest` consumes the state.
fn chaining_object<S: Send + 'static>(
    state: S,
    update: fn(&mut S, &[u8]),
    finalize: fn(S) -> Vec<u8>,
) -> Value {
    let object = ObjectRef::new();
    let state = Arc::new(Mutex::new(Some(state)));

    {
        let chain = object.clone();
        let state = Arc::clone(&state);
        object.set(
            "update",
            NativeFunction::new("update", move |args| {
                let data = data_bytes(&crate::first_or_undefined(args), "update(data)")?;
                match state.lock().as_mut() {
                    Some(inner) => update(inner, &data),
                    None => return Err(type_error("digest already called")),
                }
                Ok(Value::Object(chain.clone()))
            }),
        );
    }
    {
        let state = Arc::clone(&state);
        object.set(
            "digest",
            NativeFunction::new("digest", move |args| {
                let Some(inner) = state.lock().take() else {
                    return Err(type_error("digest already called"));
                };
                encode_digest(finalize(inner), args.first())
            }),
        );
    }
    Value::Object(object)
}

/// The script-visible `crypto` object.
#[must_use]
pub fn to_value() -> Value {
    let object = ObjectRef::new();

    object.set(
        "createHash",
        NativeFunction::new("createHash", |args| {
            let algorithm = require_string(args, 0, "crypto.createHash(algorithm)")?;
            let state = HashState::new(&algorithm)
                .ok_or_else(|| type_error(&format!("unsupported hash algorithm '{algorithm}'")))?;
            Ok(chaining_object(state, HashState::update, HashState::finalize))
        }),
    );

    object.set(
        "createHmac",
        NativeFunction::new("createHmac", |args| {
            let usage = "crypto.createHmac(algorithm, key)";
            let algorithm = require_string(args, 0, usage)?;
            let key = data_bytes(&crate::first_or_undefined(&args[1..]), usage)?;
            let state = HmacState::new(&algorithm, &key)
                .ok_or_else(|| type_error(&format!("unsupported hmac algorithm '{algorithm}'")))?;
            Ok(chaining_object(state, HmacState::update, HmacState::finalize))
        }),
    );

    object.set(
        "timingSafeEqual",
        NativeFunction::new("timingSafeEqual", |args| {
            let usage = "crypto.timingSafeEqual(a, b)";
            let a = require_string(args, 0, usage)?;
            let b = require_string(args, 1, usage)?;
            if a.len() != b.len() {
                return Err(type_error("timingSafeEqual inputs must have equal length"));
            }
            let equal: bool = a.as_bytes().ct_eq(b.as_bytes()).into();
            Ok(Value::Bool(equal))
        }),
    );

    object.set(
        "random",
        NativeFunction::new("random", |_| {
            let value: f64 = rand::thread_rng().r#gen();
            Ok(Value::Number(value))
        }),
    );

    object.set(
        "randomBytes",
        NativeFunction::new("randomBytes", |args| {
            let count = crate::require_number(args, 0, "crypto.randomBytes(count)")?;
            if !(0.0..=1e8).contains(&count) || count.fract() != 0.0 {
                return Err(type_error("randomBytes count must be a non-negative integer"));
            }
            let mut bytes = vec![0u8; count as usize];
            rand::thread_rng().fill_bytes(&mut bytes);
            Ok(Value::Bytes(bytes))
        }),
    );

    object.set(
        "uuid",
        NativeFunction::new("uuid", |_| {
            Ok(Value::string(uuid::Uuid::new_v4().to_string()))
        }),
    );

    Value::Object(object)
}
