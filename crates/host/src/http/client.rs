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

use dougless_base::{NativeFunction, ObjectRef, Value};
use dougless_common_runtime::spawn_network_io;
use dougless_engine::EngineHandle;
use dougless_permissions::{PermissionKind, PermissionManager};
use once_cell::sync::Lazy;

use crate::Responder;

static CLIENT: Lazy<reqwest::Client> = Lazy::new(reqwest::Client::new);

#[derive(Clone, Copy, Debug)]
pub(crate) enum Verb {
    Get,
    Post,
}

/// The permission target of a URL: `host:port` with the scheme's default
/// port filled in, bare host when there is none to infer.
fn permission_target(url: &reqwest::Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port_or_known_default() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// Repeated headers collapse to an array; everything else is a string.
fn headers_to_value(headers: &reqwest::header::HeaderMap) -> Value {
    let object = ObjectRef::new();
    for key in headers.keys() {
        let mut values: Vec<Value> = headers
            .get_all(key)
            .iter()
            .map(|v| Value::string(String::from_utf8_lossy(v.as_bytes())))
            .collect();
        let value = if values.len() == 1 {
            values.remove(0)
        } else {
            Value::Array(values)
        };
        object.set(key.as_str(), value);
    }
    Value::Object(object)
}

/// Performs the transfer on the network runtime and delivers the response
/// object (or the error) through the optional-continuation path. Permission
/// is checked before any bytes leave the process.
pub(crate) fn request(
    engine: &EngineHandle,
    permissions: Arc<PermissionManager>,
    verb: Verb,
    url: String,
    body: Option<String>,
    callback: Option<NativeFunction>,
) -> Value {
    let (responder, ret) = Responder::new(engine, callback);
    let ctx = engine.cancellation_token();

    spawn_network_io(async move {
        let parsed = match reqwest::Url::parse(&url) {
            Ok(parsed) => parsed,
            Err(error) => {
                responder
                    .deliver(Err(Value::string(format!("invalid URL '{url}': {error}"))))
                    .await;
                return;
            }
        };

        let target = permission_target(&parsed);
        if !permissions.check_with_prompt(&ctx, PermissionKind::Net, &target) {
            let message = permissions.error_message(PermissionKind::Net, &target);
            responder.deliver(Err(Value::string(message))).await;
            return;
        }

        let request = match verb {
            Verb::Get => CLIENT.get(parsed),
            Verb::Post => CLIENT.post(parsed).body(body.unwrap_or_default()),
        };

        let result = match request.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let headers = headers_to_value(response.headers());
                match response.text().await {
                    Ok(text) => Ok(Value::Object(ObjectRef::from([
                        ("status", Value::Number(f64::from(status))),
                        ("statusCode", Value::Number(f64::from(status))),
                        ("body", Value::String(text)),
                        ("headers", headers),
                    ]))),
                    Err(error) => Err(Value::string(error.to_string())),
                }
            }
            Err(error) => Err(Value::string(error.to_string())),
        };
        responder.deliver(result).await;
    });
    ret
}
