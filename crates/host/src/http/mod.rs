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

//! `http.{get,post,createServer}` plus the WebSocket upgrade.
//!
//! The client checks Net permission against the URL's host before any bytes
//! leave the process and delivers a `{status, statusCode, body, headers}`
//! response object. The server reifies each native request into a script
//! request/response pair on the consumer while the network worker waits on a
//! completion signal (a handler that never finishes produces `504`).

mod client;
mod server;
mod websocket;

use std::sync::Arc;

use dougless_base::{NativeFunction, ObjectRef, Value};
use dougless_engine::EngineHandle;
use dougless_permissions::PermissionManager;
pub use server::ScriptServer;
pub use websocket::WsCallbacks;

use crate::{optional_callback, require_function, require_string};

#[derive(Clone)]
pub struct HttpModule {
    engine:      EngineHandle,
    permissions: Arc<PermissionManager>,
}

impl HttpModule {
    #[must_use]
    pub fn new(engine: EngineHandle, permissions: Arc<PermissionManager>) -> Self {
        Self {
            engine,
            permissions,
        }
    }

    /// `http.get(url, [callback])`.
    pub fn get(&self, url: String, callback: Option<NativeFunction>) -> Value {
        client::request(
            &self.engine,
            Arc::clone(&self.permissions),
            client::Verb::Get,
            url,
            None,
            callback,
        )
    }

    /// `http.post(url, [body], [callback])`.
    pub fn post(&self, url: String, body: Option<String>, callback: Option<NativeFunction>) -> Value {
        client::request(
            &self.engine,
            Arc::clone(&self.permissions),
            client::Verb::Post,
            url,
            body,
            callback,
        )
    }

    /// `http.createServer(handler)`.
    #[must_use]
    pub fn create_server(&self, handler: NativeFunction) -> ScriptServer {
        ScriptServer::new(self.engine.clone(), Arc::clone(&self.permissions), handler)
    }

    /// The script-visible `http` object.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let object = ObjectRef::new();

        let module = self.clone();
        object.set(
            "get",
            NativeFunction::new("get", move |args| {
                let usage = "http.get(url, [callback])";
                let url = require_string(args, 0, usage)?;
                let callback = optional_callback(args, 1, usage)?;
                Ok(module.get(url, callback))
            }),
        );

        let module = self.clone();
        object.set(
            "post",
            NativeFunction::new("post", move |args| {
                let usage = "http.post(url, [body], [callback])";
                let url = require_string(args, 0, usage)?;
                // An optional body; a function in its place is the callback.
                let (body, callback) = match args.get(1) {
                    Some(Value::Function(callback)) => (None, Some(callback.clone())),
                    Some(Value::String(body)) => {
                        (Some(body.clone()), optional_callback(args, 2, usage)?)
                    }
                    None | Some(Value::Undefined | Value::Null) => {
                        (None, optional_callback(args, 2, usage)?)
                    }
                    Some(_) => return Err(crate::type_error(&format!("expected a string: {usage}"))),
                };
                Ok(module.post(url, body, callback))
            }),
        );

        let module = self.clone();
        object.set(
            "createServer",
            NativeFunction::new("createServer", move |args| {
                let handler = require_function(args, 0, "http.createServer(handler)")?;
                Ok(module.create_server(handler).to_value())
            }),
        );

        Value::Object(object)
    }
}
