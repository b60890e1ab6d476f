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

//! The WebSocket half of the script server.
//!
//! Each upgraded connection runs its read loop on the network runtime and
//! holds one keep-alive token until teardown. The script sees a connection
//! object with a live numeric `readyState` (0..3), `send(text)` and
//! `close()`; writes are serialized by a per-connection mutex around the
//! sink, and `send` on a non-open connection raises a connection-state
//! error. `open` receives the connection; `message`, `close` and `error`
//! receive an event object whose `target` is the connection.

use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};

use axum::extract::ws::{Message, WebSocket};
use dougless_base::{NativeFunction, ObjectRef, Value};
use dougless_common_runtime::spawn_network_io;
use dougless_engine::{EngineHandle, Task, TaskOrigin};
use futures::{SinkExt, StreamExt, stream::SplitSink};
use tokio_util::sync::CancellationToken;

use crate::{report_uncaught, require_string, type_error};

// Script-visible readyState constants, 0..3 verbatim.
pub const CONNECTING: u8 = 0;
pub const OPEN: u8 = 1;
pub const CLOSING: u8 = 2;
pub const CLOSED: u8 = 3;

/// The `{open, message, close, error}` table passed to
/// `server.websocket(path, callbacks)`.
#[derive(Default, Debug)]
pub struct WsCallbacks {
    pub open:    Option<NativeFunction>,
    pub message: Option<NativeFunction>,
    pub close:   Option<NativeFunction>,
    pub error:   Option<NativeFunction>,
}

impl WsCallbacks {
    /// Parses the script-side callback object; every member is optional but
    /// must be callable when present.
    pub(crate) fn from_value(value: Option<&Value>) -> Result<Self, Value> {
        let Some(Value::Object(object)) = value else {
            return Err(type_error(
                "expected a callbacks object: server.websocket(path, {open, message, close, error})",
            ));
        };
        Ok(Self {
            open:    member(object, "open")?,
            message: member(object, "message")?,
            close:   member(object, "close")?,
            error:   member(object, "error")?,
        })
    }
}

fn member(object: &ObjectRef, name: &str) -> Result<Option<NativeFunction>, Value> {
    match object.get(name) {
        None | Some(Value::Undefined | Value::Null) => Ok(None),
        Some(Value::Function(f)) => Ok(Some(f)),
        Some(_) => Err(type_error(&format!("websocket callback '{name}' must be a function"))),
    }
}

type SharedSink = Arc<tokio::sync::Mutex<SplitSink<WebSocket, Message>>>;

struct Connection {
    engine: EngineHandle,
    sink:   SharedSink,
    state:  Arc<AtomicU8>,
    object: ObjectRef,
    error:  Option<NativeFunction>,
}

impl Connection {
    fn set_state(&self, state: u8) {
        self.state.store(state, Ordering::SeqCst);
        self.object.set("readyState", Value::Number(f64::from(state)));
    }

    async fn report_error(&self, message: String) {
        let Some(error) = self.error.clone() else {
            return;
        };
        let event = Value::Object(ObjectRef::from([
            ("error", Value::string(message)),
            ("target", Value::Object(self.object.clone())),
        ]));
        schedule(&self.engine, move || {
            if let Err(thrown) = error.call(&[event]) {
                report_uncaught(&thrown);
            }
        })
        .await;
    }
}

/// Drives one upgraded connection: open callback, read loop, close callback
/// exactly once.
pub(crate) async fn run(engine: EngineHandle, callbacks: Arc<WsCallbacks>, socket: WebSocket) {
    let keep_alive = engine.keep_alive();
    let cancel = engine.cancellation_token().child_token();
    let (sink, mut stream) = socket.split();
    let sink: SharedSink = Arc::new(tokio::sync::Mutex::new(sink));
    let state = Arc::new(AtomicU8::new(OPEN));

    let object = connection_object(&engine, &sink, &state, &cancel, callbacks.error.clone());
    let connection = Connection {
        engine: engine.clone(),
        sink:   Arc::clone(&sink),
        state:  Arc::clone(&state),
        object: object.clone(),
        error:  callbacks.error.clone(),
    };

    if let Some(open) = callbacks.open.clone() {
        let target = Value::Object(object.clone());
        schedule(&engine, move || {
            if let Err(thrown) = open.call(&[target]) {
                report_uncaught(&thrown);
            }
        })
        .await;
    }

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    deliver_message(&engine, &callbacks, &object, Value::string(text.as_str()))
                        .await;
                }
                Some(Ok(Message::Binary(bytes))) => {
                    deliver_message(&engine, &callbacks, &object, Value::Bytes(bytes.to_vec()))
                        .await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {} // ping/pong handled by the stack
                Some(Err(error)) => {
                    connection.report_error(error.to_string()).await;
                    break;
                }
            }
        }
    }

    connection.set_state(CLOSED);
    if let Some(close) = callbacks.close.clone() {
        let event = Value::Object(ObjectRef::from([(
            "target",
            Value::Object(object.clone()),
        )]));
        schedule(&engine, move || {
            if let Err(thrown) = close.call(&[event]) {
                report_uncaught(&thrown);
            }
        })
        .await;
    }
    drop(keep_alive);
}

async fn deliver_message(
    engine: &EngineHandle,
    callbacks: &Arc<WsCallbacks>,
    object: &ObjectRef,
    data: Value,
) {
    let Some(message) = callbacks.message.clone() else {
        return;
    };
    let event = Value::Object(ObjectRef::from([
        ("data", data),
        ("target", Value::Object(object.clone())),
    ]));
    schedule(engine, move || {
        if let Err(thrown) = message.call(&[event]) {
            report_uncaught(&thrown);
        }
    })
    .await;
}

async fn schedule<F: FnOnce() + Send + 'static>(engine: &EngineHandle, f: F) {
    let task = Task::immediate(TaskOrigin::IoCompletion, f);
    if engine.schedule_async(task).await.is_err() {
        tracing::debug!("websocket callback dropped: engine is shutting down");
    }
}

/// Builds the script-visible connection object with a live `readyState`.
fn connection_object(
    engine: &EngineHandle,
    sink: &SharedSink,
    state: &Arc<AtomicU8>,
    cancel: &CancellationToken,
    error: Option<NativeFunction>,
) -> ObjectRef {
    let object = ObjectRef::new();
    object.set("readyState", Value::Number(f64::from(OPEN)));

    {
        let connection = Connection {
            engine: engine.clone(),
            sink:   Arc::clone(sink),
            state:  Arc::clone(state),
            object: object.clone(),
            error,
        };
        let send_state = Arc::clone(state);
        object.set(
            "send",
            NativeFunction::new("send", move |args| {
                let ready = send_state.load(Ordering::SeqCst);
                if ready != OPEN {
                    return Err(Value::string(format!(
                        "connection is not open: readyState is {ready}"
                    )));
                }
                let text = require_string(args, 0, "connection.send(text)")?;
                let sink = Arc::clone(&connection.sink);
                let connection_error = connection.error.clone();
                let engine = connection.engine.clone();
                let object = connection.object.clone();
                spawn_network_io(async move {
                    // The mutex serializes concurrent sends per connection.
                    let mut sink = sink.lock().await;
                    if let Err(error) = sink.send(Message::Text(text.into())).await {
                        if let Some(handler) = connection_error {
                            let event = Value::Object(ObjectRef::from([
                                ("error", Value::string(error.to_string())),
                                ("target", Value::Object(object)),
                            ]));
                            let task = Task::immediate(TaskOrigin::IoCompletion, move || {
                                if let Err(thrown) = handler.call(&[event]) {
                                    report_uncaught(&thrown);
                                }
                            });
                            let _ = engine.schedule_async(task).await;
                        }
                    }
                });
                Ok(Value::Undefined)
            }),
        );
    }

    {
        let close_state = Arc::clone(state);
        let sink = Arc::clone(sink);
        let cancel = cancel.clone();
        let close_object = object.clone();
        object.set(
            "close",
            NativeFunction::new("close", move |_| {
                if close_state.load(Ordering::SeqCst) >= CLOSING {
                    return Ok(Value::Undefined);
                }
                close_state.store(CLOSING, Ordering::SeqCst);
                close_object.set("readyState", Value::Number(f64::from(CLOSING)));

                let sink = Arc::clone(&sink);
                let cancel = cancel.clone();
                spawn_network_io(async move {
                    let _ = sink.lock().await.send(Message::Close(None)).await;
                    // Stop the read loop; it runs the close callback.
                    cancel.cancel();
                });
                Ok(Value::Undefined)
            }),
        );
    }

    object
}
