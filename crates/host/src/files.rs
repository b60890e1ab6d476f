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

//! The three-method, convention-based file facade.
//!
//! A trailing `/` selects directory semantics: `read` lists entry names,
//! `write` makes the directory tree. Missing read targets yield `null`, not
//! an error; `rm` is idempotent; `write` creates missing parents. Native I/O
//! runs on the file-I/O runtime after a permission check, and results come
//! back as `(err, data)` callbacks or a promise.

use std::{io, sync::Arc};

use dougless_base::{NativeFunction, ObjectRef, Value};
use dougless_common_runtime::spawn_file_io;
use dougless_engine::EngineHandle;
use dougless_permissions::{PermissionKind, PermissionManager};

use crate::{Responder, optional_callback, require_string};

#[derive(Clone)]
pub struct Files {
    engine:      EngineHandle,
    permissions: Arc<PermissionManager>,
}

impl Files {
    #[must_use]
    pub fn new(engine: EngineHandle, permissions: Arc<PermissionManager>) -> Self {
        Self {
            engine,
            permissions,
        }
    }

    /// File contents as a string, directory listing for a trailing `/`,
    /// `null` when the path does not exist.
    pub fn read(&self, path: String, callback: Option<NativeFunction>) -> Value {
        let (responder, ret) = Responder::new(&self.engine, callback);
        let permissions = Arc::clone(&self.permissions);
        let ctx = self.engine.cancellation_token();

        spawn_file_io(async move {
            if !permissions.check_with_prompt(&ctx, PermissionKind::Read, &path) {
                let message = permissions.error_message(PermissionKind::Read, &path);
                responder.deliver(Err(Value::string(message))).await;
                return;
            }
            responder.deliver(read_native(&path).await).await;
        });
        ret
    }

    /// Writes `contents` (creating missing parents), or makes the directory
    /// tree for a trailing `/`.
    pub fn write(&self, path: String, contents: String, callback: Option<NativeFunction>) -> Value {
        let (responder, ret) = Responder::new(&self.engine, callback);
        let permissions = Arc::clone(&self.permissions);
        let ctx = self.engine.cancellation_token();

        spawn_file_io(async move {
            if !permissions.check_with_prompt(&ctx, PermissionKind::Write, &path) {
                let message = permissions.error_message(PermissionKind::Write, &path);
                responder.deliver(Err(Value::string(message))).await;
                return;
            }
            responder.deliver(write_native(&path, &contents).await).await;
        });
        ret
    }

    /// Removes a file or a directory tree; missing paths are a success.
    pub fn rm(&self, path: String, callback: Option<NativeFunction>) -> Value {
        let (responder, ret) = Responder::new(&self.engine, callback);
        let permissions = Arc::clone(&self.permissions);
        let ctx = self.engine.cancellation_token();

        spawn_file_io(async move {
            if !permissions.check_with_prompt(&ctx, PermissionKind::Write, &path) {
                let message = permissions.error_message(PermissionKind::Write, &path);
                responder.deliver(Err(Value::string(message))).await;
                return;
            }
            responder.deliver(rm_native(&path).await).await;
        });
        ret
    }

    /// The script-visible `files` object.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let object = ObjectRef::new();

        let files = self.clone();
        object.set(
            "read",
            NativeFunction::new("read", move |args| {
                let path = require_string(args, 0, "files.read(path, [callback])")?;
                let callback = optional_callback(args, 1, "files.read(path, [callback])")?;
                Ok(files.read(path, callback))
            }),
        );

        let files = self.clone();
        object.set(
            "write",
            NativeFunction::new("write", move |args| {
                let usage = "files.write(path, [contents], [callback])";
                let path = require_string(args, 0, usage)?;
                // The contents argument is optional; a function in its place
                // is the callback of a contentless write.
                let (contents, callback) = match args.get(1) {
                    Some(Value::Function(callback)) => (String::new(), Some(callback.clone())),
                    Some(Value::String(contents)) => {
                        (contents.clone(), optional_callback(args, 2, usage)?)
                    }
                    None | Some(Value::Undefined | Value::Null) => {
                        (String::new(), optional_callback(args, 2, usage)?)
                    }
                    Some(_) => return Err(crate::type_error(&format!("expected a string: {usage}"))),
                };
                Ok(files.write(path, contents, callback))
            }),
        );

        let files = self.clone();
        object.set(
            "rm",
            NativeFunction::new("rm", move |args| {
                let path = require_string(args, 0, "files.rm(path, [callback])")?;
                let callback = optional_callback(args, 1, "files.rm(path, [callback])")?;
                Ok(files.rm(path, callback))
            }),
        );

        Value::Object(object)
    }
}

fn io_error(error: &io::Error) -> Value { Value::string(error.to_string()) }

async fn read_native(path: &str) -> Result<Value, Value> {
    if path.ends_with('/') {
        match tokio::fs::read_dir(path).await {
            Ok(mut entries) => {
                let mut names = Vec::new();
                loop {
                    match entries.next_entry().await {
                        Ok(Some(entry)) => {
                            names.push(Value::string(entry.file_name().to_string_lossy()));
                        }
                        Ok(None) => break,
                        Err(error) => return Err(io_error(&error)),
                    }
                }
                names.sort_by(|a, b| a.as_str().cmp(&b.as_str()));
                Ok(Value::Array(names))
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(Value::Null),
            Err(error) => Err(io_error(&error)),
        }
    } else {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Ok(Value::String(contents)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(Value::Null),
            Err(error) => Err(io_error(&error)),
        }
    }
}

async fn write_native(path: &str, contents: &str) -> Result<Value, Value> {
    if path.ends_with('/') {
        return match tokio::fs::create_dir_all(path).await {
            Ok(()) => Ok(Value::Null),
            Err(error) => Err(io_error(&error)),
        };
    }
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(error) = tokio::fs::create_dir_all(parent).await {
                return Err(io_error(&error));
            }
        }
    }
    match tokio::fs::write(path, contents).await {
        Ok(()) => Ok(Value::Null),
        Err(error) => Err(io_error(&error)),
    }
}

async fn rm_native(path: &str) -> Result<Value, Value> {
    let result = match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error),
    };
    match result {
        Ok(()) => Ok(Value::Null),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(Value::Null),
        Err(error) => Err(io_error(&error)),
    }
}
