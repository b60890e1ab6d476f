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

//! `console.{log,error,warn,time,timeEnd,table}`.
//!
//! Script output goes straight to the process streams (or injected writers
//! in tests), not through the host logger: stdout belongs to the script.

use std::{collections::HashMap, io::Write, sync::Arc, time::Instant};

use dougless_base::{NativeFunction, ObjectRef, Value};
use parking_lot::Mutex;

type Sink = Arc<Mutex<Box<dyn Write + Send>>>;

#[derive(Clone)]
pub struct Console {
    out:    Sink,
    err:    Sink,
    timers: Arc<Mutex<HashMap<String, Instant>>>,
}

impl Default for Console {
    fn default() -> Self { Self::new() }
}

impl Console {
    #[must_use]
    pub fn new() -> Self {
        Self::with_streams(Box::new(std::io::stdout()), Box::new(std::io::stderr()))
    }

    #[must_use]
    pub fn with_streams(out: Box<dyn Write + Send>, err: Box<dyn Write + Send>) -> Self {
        Self {
            out:    Arc::new(Mutex::new(out)),
            err:    Arc::new(Mutex::new(err)),
            timers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn log(&self, args: &[Value]) { write_line(&self.out, args); }

    pub fn error(&self, args: &[Value]) { write_line(&self.err, args); }

    pub fn warn(&self, args: &[Value]) { write_line(&self.err, args); }

    /// Starts a named stopwatch; `timeEnd` reports and clears it.
    pub fn time(&self, label: &str) {
        self.timers.lock().insert(label.to_string(), Instant::now());
    }

    pub fn time_end(&self, label: &str) {
        let started = self.timers.lock().remove(label);
        match started {
            Some(started) => {
                let elapsed_ms = started.elapsed().as_secs_f64() * 1e3;
                let mut out = self.out.lock();
                let _ = writeln!(out, "{label}: {elapsed_ms:.3}ms");
            }
            None => {
                let mut err = self.err.lock();
                let _ = writeln!(err, "Timer '{label}' does not exist");
            }
        }
    }

    /// Tabulates an array: objects become one row per element with a column
    /// per key, scalars a single Values column.
    pub fn table(&self, value: &Value) {
        let mut out = self.out.lock();
        let _ = write!(out, "{}", render_table(value));
    }

    /// The script-visible `console` object.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let object = ObjectRef::new();
        let console = self.clone();
        object.set(
            "log",
            NativeFunction::new("log", move |args| {
                console.log(args);
                Ok(Value::Undefined)
            }),
        );
        let console = self.clone();
        object.set(
            "error",
            NativeFunction::new("error", move |args| {
                console.error(args);
                Ok(Value::Undefined)
            }),
        );
        let console = self.clone();
        object.set(
            "warn",
            NativeFunction::new("warn", move |args| {
                console.warn(args);
                Ok(Value::Undefined)
            }),
        );
        let console = self.clone();
        object.set(
            "time",
            NativeFunction::new("time", move |args| {
                console.time(args.first().and_then(Value::as_str).unwrap_or("default"));
                Ok(Value::Undefined)
            }),
        );
        let console = self.clone();
        object.set(
            "timeEnd",
            NativeFunction::new("timeEnd", move |args| {
                console.time_end(args.first().and_then(Value::as_str).unwrap_or("default"));
                Ok(Value::Undefined)
            }),
        );
        let console = self.clone();
        object.set(
            "table",
            NativeFunction::new("table", move |args| {
                console.table(&crate::first_or_undefined(args));
                Ok(Value::Undefined)
            }),
        );
        Value::Object(object)
    }
}

fn write_line(sink: &Sink, args: &[Value]) {
    let rendered: Vec<String> = args.iter().map(Value::to_display_string).collect();
    let mut sink = sink.lock();
    let _ = writeln!(sink, "{}", rendered.join(" "));
}

fn render_table(value: &Value) -> String {
    let Value::Array(rows) = value else {
        return format!("{}\n", value.to_display_string());
    };

    // Column set: the union of keys across object rows, in first-seen order.
    let mut columns: Vec<String> = Vec::new();
    let mut has_scalars = false;
    for row in rows {
        match row {
            Value::Object(obj) => {
                for key in obj.keys() {
                    if !columns.contains(&key) {
                        columns.push(key);
                    }
                }
            }
            _ => has_scalars = true,
        }
    }

    let mut header = vec!["(index)".to_string()];
    header.extend(columns.iter().cloned());
    if has_scalars {
        header.push("Values".to_string());
    }

    let mut body: Vec<Vec<String>> = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        let mut cells = vec![index.to_string()];
        match row {
            Value::Object(obj) => {
                for column in &columns {
                    cells.push(
                        obj.get(column)
                            .map(|v| v.to_display_string())
                            .unwrap_or_default(),
                    );
                }
                if has_scalars {
                    cells.push(String::new());
                }
            }
            scalar => {
                cells.extend(std::iter::repeat_n(String::new(), columns.len()));
                if has_scalars {
                    cells.push(scalar.to_display_string());
                }
            }
        }
        body.push(cells);
    }

    let mut widths: Vec<usize> = header.iter().map(String::len).collect();
    for row in &body {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let render_row = |cells: &[String]| {
        let padded: Vec<String> = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{cell:<width$}", width = widths[i]))
            .collect();
        format!("| {} |\n", padded.join(" | "))
    };

    let separator = format!(
        "|{}|\n",
        widths
            .iter()
            .map(|w| "-".repeat(w + 2))
            .collect::<Vec<_>>()
            .join("|")
    );

    let mut table = render_row(&header);
    table.push_str(&separator);
    for row in &body {
        table.push_str(&render_row(row));
    }
    table
}

#[cfg(test)]
mod tests {
    use dougless_test_support::SharedBuffer;

    use super::*;

    fn captured_console() -> (Console, SharedBuffer, SharedBuffer) {
        let out = SharedBuffer::new();
        let err = SharedBuffer::new();
        let console = Console::with_streams(Box::new(out.clone()), Box::new(err.clone()));
        (console, out, err)
    }

    #[test]
    fn log_joins_arguments_with_spaces() {
        let (console, out, _) = captured_console();
        console.log(&[Value::string("answer"), Value::Number(42.0)]);
        assert_eq!(out.lines(), vec!["answer 42"]);
    }

    #[test]
    fn error_and_warn_go_to_stderr() {
        let (console, out, err) = captured_console();
        console.error(&[Value::string("bad")]);
        console.warn(&[Value::string("iffy")]);
        assert!(out.lines().is_empty());
        assert_eq!(err.lines(), vec!["bad", "iffy"]);
    }

    #[test]
    fn time_end_reports_elapsed_label() {
        let (console, out, _) = captured_console();
        console.time("t");
        console.time_end("t");
        let lines = out.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("t: "));
        assert!(lines[0].ends_with("ms"));
    }

    #[test]
    fn table_renders_object_rows() {
        let (console, out, _) = captured_console();
        console.table(&Value::Array(vec![
            Value::Object(ObjectRef::from([("name", Value::string("a"))])),
            Value::Object(ObjectRef::from([("name", Value::string("b"))])),
        ]));
        let rendered = out.contents();
        assert!(rendered.contains("(index)"));
        assert!(rendered.contains("name"));
        assert!(rendered.contains("| 0"));
        assert!(rendered.contains("b"));
    }
}
