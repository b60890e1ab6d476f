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

//! The script HTTP server.
//!
//! `listen` binds an axum server on the network runtime (Net permission on
//! `host:port` first) and holds a keep-alive token until `close`. Each
//! request is reified into a script request object plus a response record
//! whose `setHeader`/`writeHead`/`end` methods mutate consumer-owned state;
//! the network worker waits on the `end` signal with a timeout that produces
//! `504 Gateway Timeout`.

use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::{
    Router,
    body::Body,
    extract::{Request, ws::WebSocketUpgrade},
    response::{IntoResponse, Response},
    routing::any,
};
use dougless_base::{NativeFunction, ObjectRef, Value};
use dougless_common_runtime::spawn_network_io;
use dougless_engine::{EngineHandle, Task, TaskOrigin};
use dougless_permissions::{PermissionKind, PermissionManager};
use http::StatusCode;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::websocket::{self, WsCallbacks};
use crate::{optional_callback, report_uncaught, require_string};

/// How long the network worker waits for the script handler to `end()` the
/// response before answering `504` itself.
const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(30);

struct ActiveListener {
    cancel: CancellationToken,
}

struct ServerInner {
    engine:          EngineHandle,
    permissions:     Arc<PermissionManager>,
    handler:         NativeFunction,
    ws_routes:       Mutex<HashMap<String, Arc<WsCallbacks>>>,
    active:          Mutex<Option<ActiveListener>>,
    handler_timeout: Mutex<Duration>,
}

/// A server created by `http.createServer(handler)`.
#[derive(Clone)]
pub struct ScriptServer {
    inner: Arc<ServerInner>,
}

impl ScriptServer {
    pub(crate) fn new(
        engine: EngineHandle,
        permissions: Arc<PermissionManager>,
        handler: NativeFunction,
    ) -> Self {
        Self {
            inner: Arc::new(ServerInner {
                engine,
                permissions,
                handler,
                ws_routes: Mutex::new(HashMap::new()),
                active: Mutex::new(None),
                handler_timeout: Mutex::new(DEFAULT_HANDLER_TIMEOUT),
            }),
        }
    }

    /// Registers a WebSocket upgrade for `path`; effective at `listen` time.
    pub fn websocket(&self, path: String, callbacks: WsCallbacks) {
        self.inner.ws_routes.lock().insert(path, Arc::new(callbacks));
    }

    /// Shrinks the handler-completion timeout; tests exercise the `504` path
    /// with this.
    pub fn set_handler_timeout(&self, timeout: Duration) {
        *self.inner.handler_timeout.lock() = timeout;
    }

    /// Binds `host:port` and starts serving. Requires Net permission on the
    /// exact endpoint; the listener holds one keep-alive token until
    /// [`ScriptServer::close`]. The optional callback fires with `(err)` or
    /// `(null)` once the bind settles.
    pub fn listen(&self, host: Option<String>, port: u16, callback: Option<NativeFunction>) {
        let host = host.unwrap_or_else(|| "127.0.0.1".to_string());
        let target = format!("{host}:{port}");
        let inner = Arc::clone(&self.inner);
        let ctx = inner.engine.cancellation_token();
        let startup_keep_alive = inner.engine.keep_alive();

        spawn_network_io(async move {
            if !inner
                .permissions
                .check_with_prompt(&ctx, PermissionKind::Net, &target)
            {
                let message = inner
                    .permissions
                    .error_message(PermissionKind::Net, &target);
                notify_listen(&inner.engine, callback, Some(message)).await;
                drop(startup_keep_alive);
                return;
            }

            let listener = match tokio::net::TcpListener::bind((host.as_str(), port)).await {
                Ok(listener) => listener,
                Err(error) => {
                    notify_listen(
                        &inner.engine,
                        callback,
                        Some(format!("listen {target}: {error}")),
                    )
                    .await;
                    drop(startup_keep_alive);
                    return;
                }
            };

            let cancel = inner.engine.cancellation_token().child_token();
            *inner.active.lock() = Some(ActiveListener {
                cancel: cancel.clone(),
            });

            let router = build_router(&inner);
            notify_listen(&inner.engine, callback, None).await;
            tracing::debug!(%target, "script server listening");

            // The bind token becomes the serve token: held while bound,
            // released when the graceful shutdown completes.
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(cancel.cancelled_owned())
                .await;
            if let Err(error) = result {
                tracing::warn!(%error, %target, "script server terminated");
            }
            drop(startup_keep_alive);
        });
    }

    /// Releases the listener and its keep-alive token. Idempotent.
    pub fn close(&self) {
        if let Some(active) = self.inner.active.lock().take() {
            active.cancel.cancel();
        }
    }

    /// The script-visible server object.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let object = ObjectRef::new();

        let server = self.clone();
        object.set(
            "listen",
            NativeFunction::new("listen", move |args| {
                let usage = "server.listen([host,] port, [callback])";
                let (host, port_index) = match args.first() {
                    Some(Value::String(host)) => (Some(host.clone()), 1),
                    _ => (None, 0),
                };
                let port = crate::require_number(args, port_index, usage)?;
                if !(0.0..=65535.0).contains(&port) || port.fract() != 0.0 {
                    return Err(crate::type_error("port must be an integer in 0..=65535"));
                }
                let callback = optional_callback(args, port_index + 1, usage)?;
                server.listen(host, port as u16, callback);
                Ok(Value::Undefined)
            }),
        );

        let server = self.clone();
        object.set(
            "close",
            NativeFunction::new("close", move |_| {
                server.close();
                Ok(Value::Undefined)
            }),
        );

        let server = self.clone();
        object.set(
            "websocket",
            NativeFunction::new("websocket", move |args| {
                let usage = "server.websocket(path, callbacks)";
                let path = require_string(args, 0, usage)?;
                if !path.starts_with('/') {
                    return Err(crate::type_error("websocket path must start with '/'"));
                }
                let callbacks = WsCallbacks::from_value(args.get(1))?;
                server.websocket(path, callbacks);
                Ok(Value::Undefined)
            }),
        );

        Value::Object(object)
    }
}

/// Settles the listen callback (if any) through the engine; errors without a
/// callback are reported, not swallowed.
async fn notify_listen(engine: &EngineHandle, callback: Option<NativeFunction>, error: Option<String>) {
    let task = Task::immediate(TaskOrigin::IoCompletion, move || match (callback, error) {
        (Some(callback), Some(error)) => {
            if let Err(thrown) = callback.call(&[Value::string(error)]) {
                report_uncaught(&thrown);
            }
        }
        (Some(callback), None) => {
            if let Err(thrown) = callback.call(&[Value::Null]) {
                report_uncaught(&thrown);
            }
        }
        (None, Some(error)) => report_uncaught(&Value::string(error)),
        (None, None) => {}
    });
    if engine.schedule_async(task).await.is_err() {
        tracing::debug!("listen notification dropped: engine is shutting down");
    }
}

fn build_router(inner: &Arc<ServerInner>) -> Router {
    let mut router = Router::new();

    for (path, callbacks) in inner.ws_routes.lock().iter() {
        let engine = inner.engine.clone();
        let callbacks = Arc::clone(callbacks);
        router = router.route(
            path,
            any(move |ws: WebSocketUpgrade| {
                let engine = engine.clone();
                let callbacks = Arc::clone(&callbacks);
                async move {
                    ws.on_upgrade(move |socket| websocket::run(engine, callbacks, socket))
                }
            }),
        );
    }

    let inner = Arc::clone(inner);
    router.fallback(move |request: Request| {
        let inner = Arc::clone(&inner);
        async move { handle_request(&inner, request).await }
    })
}

/// Per-request response scratch, owned by the consumer until `end`.
#[derive(Default)]
struct ResponseState {
    status:  Option<u16>,
    headers: Vec<(String, String)>,
    body:    Vec<u8>,
}

async fn handle_request(inner: &Arc<ServerInner>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, 16 * 1024 * 1024)
        .await
        .unwrap_or_default();

    let headers = ObjectRef::new();
    for key in parts.headers.keys() {
        let mut values: Vec<Value> = parts
            .headers
            .get_all(key)
            .iter()
            .map(|v| Value::string(String::from_utf8_lossy(v.as_bytes())))
            .collect();
        let value = if values.len() == 1 {
            values.remove(0)
        } else {
            Value::Array(values)
        };
        headers.set(key.as_str(), value);
    }

    let url = parts
        .uri
        .path_and_query()
        .map_or_else(|| "/".to_string(), ToString::to_string);
    let request_value = Value::Object(ObjectRef::from([
        ("method", Value::string(parts.method.as_str())),
        ("url", Value::string(url)),
        ("headers", Value::Object(headers)),
        (
            "body",
            Value::string(String::from_utf8_lossy(&body).to_string()),
        ),
    ]));

    let state = Arc::new(Mutex::new(ResponseState::default()));
    let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();
    let done_tx = Arc::new(Mutex::new(Some(done_tx)));
    let response_value = response_object(&state, &done_tx);

    let handler = inner.handler.clone();
    let error_state = Arc::clone(&state);
    let error_done = Arc::clone(&done_tx);
    let task = Task::immediate(TaskOrigin::IoCompletion, move || {
        if let Err(thrown) = handler.call(&[request_value, response_value]) {
            // A throwing handler answers 500 instead of hanging the socket.
            let mut response = error_state.lock();
            response.status = Some(500);
            response.body = thrown.to_display_string().into_bytes();
            if let Some(done) = error_done.lock().take() {
                let _ = done.send(());
            }
        }
    });
    if inner.engine.schedule_async(task).await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let timeout = *inner.handler_timeout.lock();
    match tokio::time::timeout(timeout, done_rx).await {
        Ok(Ok(())) => {
            let state = state.lock();
            let mut builder = http::Response::builder()
                .status(StatusCode::from_u16(state.status.unwrap_or(200)).unwrap_or(StatusCode::OK));
            for (name, value) in &state.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            builder
                .body(Body::from(state.body.clone()))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        // The response object was dropped without `end`, or the handler is
        // still busy after the deadline.
        Ok(Err(_)) | Err(_) => {
            (StatusCode::GATEWAY_TIMEOUT, "Gateway Timeout").into_response()
        }
    }
}

/// The script-visible response record: `setHeader`, `writeHead`, `end`.
fn response_object(
    state: &Arc<Mutex<ResponseState>>,
    done: &Arc<Mutex<Option<tokio::sync::oneshot::Sender<()>>>>,
) -> Value {
    let object = ObjectRef::new();

    {
        let state = Arc::clone(state);
        object.set(
            "setHeader",
            NativeFunction::new("setHeader", move |args| {
                let usage = "response.setHeader(name, value)";
                let name = require_string(args, 0, usage)?;
                let value = require_string(args, 1, usage)?;
                let mut state = state.lock();
                state
                    .headers
                    .retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
                state.headers.push((name, value));
                Ok(Value::Undefined)
            }),
        );
    }
    {
        let state = Arc::clone(state);
        object.set(
            "writeHead",
            NativeFunction::new("writeHead", move |args| {
                let usage = "response.writeHead(statusCode, [headers])";
                let status = crate::require_number(args, 0, usage)?;
                if !(100.0..=999.0).contains(&status) || status.fract() != 0.0 {
                    return Err(crate::type_error("statusCode must be a 3-digit integer"));
                }
                let mut locked = state.lock();
                locked.status = Some(status as u16);
                if let Some(Value::Object(headers)) = args.get(1) {
                    for (name, value) in headers.entries() {
                        locked
                            .headers
                            .retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
                        locked.headers.push((name, value.to_display_string()));
                    }
                }
                Ok(Value::Undefined)
            }),
        );
    }
    {
        let state = Arc::clone(state);
        let done = Arc::clone(done);
        object.set(
            "end",
            NativeFunction::new("end", move |args| {
                let Some(done) = done.lock().take() else {
                    // end() after end() is a silent no-op.
                    return Ok(Value::Undefined);
                };
                {
                    let mut state = state.lock();
                    match args.first() {
                        Some(Value::String(body)) => state.body.extend_from_slice(body.as_bytes()),
                        Some(Value::Bytes(body)) => state.body.extend_from_slice(body),
                        _ => {}
                    }
                }
                let _ = done.send(());
                Ok(Value::Undefined)
            }),
        );
    }

    Value::Object(object)
}
