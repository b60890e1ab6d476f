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

//! The read-evaluate loop driver.
//!
//! Each line is evaluated as one chunk on the task consumer (the reader
//! thread blocks on the result), values print in their quoted form, and
//! errors are recoverable: report and read the next line. EOF or `.exit`
//! ends the session.

use std::{
    io::{BufRead, Write},
    sync::{Arc, mpsc},
};

use dougless_engine::TaskOrigin;
use dougless_error::Error;
use parking_lot::Mutex;

use crate::{Runtime, ScriptEngine};

const PROMPT: &str = "> ";

/// Drives `engine` over `input` until EOF or `.exit`.
pub fn run_repl<R, W>(
    runtime: &Runtime,
    engine: Box<dyn ScriptEngine>,
    input: R,
    output: &mut W,
) -> Result<(), Error>
where
    R: BufRead,
    W: Write,
{
    let engine = Arc::new(Mutex::new(engine));

    let _ = write!(output, "{PROMPT}");
    let _ = output.flush();

    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };
        let chunk = line.trim();
        if chunk == ".exit" {
            break;
        }
        if chunk.is_empty() {
            let _ = write!(output, "{PROMPT}");
            let _ = output.flush();
            continue;
        }

        let (result_tx, result_rx) = mpsc::channel();
        let scheduled = {
            let engine = Arc::clone(&engine);
            let scope = runtime.scope().clone();
            let chunk = chunk.to_string();
            runtime.handle().submit(TaskOrigin::Microtask, move || {
                let result = engine.lock().eval(&chunk, &scope);
                let _ = result_tx.send(result);
            })
        };
        if scheduled.is_err() {
            break;
        }

        match result_rx.recv() {
            Ok(Ok(value)) => {
                let _ = writeln!(output, "{value:?}");
            }
            Ok(Err(error)) => {
                // Evaluation errors never end the session.
                let _ = writeln!(output, "{error}");
            }
            Err(_) => break,
        }
        let _ = write!(output, "{PROMPT}");
        let _ = output.flush();
    }
    Ok(())
}
