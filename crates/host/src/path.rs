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

//! `path.{join,resolve,dirname,basename,extname,sep}`: pure string
//! manipulation, no permission surface.

use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR_STR};

use dougless_base::{NativeFunction, ObjectRef, Value};

use crate::type_error;

/// Joins segments and normalises `.`/`..` without touching the filesystem.
#[must_use]
pub fn join(segments: &[String]) -> String {
    let mut joined = PathBuf::new();
    for segment in segments {
        joined.push(segment);
    }
    normalize(&joined)
}

/// Resolves segments into an absolute path, rooted at the working directory
/// unless a segment is already absolute.
#[must_use]
pub fn resolve(segments: &[String]) -> String {
    let mut resolved = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
    for segment in segments {
        let segment = Path::new(segment);
        if segment.is_absolute() {
            resolved = segment.to_path_buf();
        } else {
            resolved.push(segment);
        }
    }
    normalize(&resolved)
}

#[must_use]
pub fn dirname(path: &str) -> String {
    match Path::new(path).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_string_lossy().to_string(),
        Some(_) => ".".to_string(),
        None => path.to_string(),
    }
}

#[must_use]
pub fn basename(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// The extension including its dot, or the empty string.
#[must_use]
pub fn extname(path: &str) -> String {
    Path::new(path)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

fn normalize(path: &Path) -> String {
    let mut parts: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }
    let mut out = PathBuf::new();
    for part in parts {
        out.push(part.as_os_str());
    }
    if out.as_os_str().is_empty() {
        ".".to_string()
    } else {
        out.to_string_lossy().to_string()
    }
}

/// The script-visible `path` object.
#[must_use]
pub fn to_value() -> Value {
    let object = ObjectRef::new();

    object.set(
        "join",
        NativeFunction::new("join", |args| Ok(Value::string(join(&string_args(args)?)))),
    );
    object.set(
        "resolve",
        NativeFunction::new("resolve", |args| {
            Ok(Value::string(resolve(&string_args(args)?)))
        }),
    );
    object.set(
        "dirname",
        NativeFunction::new("dirname", |args| {
            Ok(Value::string(dirname(&crate::require_string(
                args,
                0,
                "path.dirname(path)",
            )?)))
        }),
    );
    object.set(
        "basename",
        NativeFunction::new("basename", |args| {
            Ok(Value::string(basename(&crate::require_string(
                args,
                0,
                "path.basename(path)",
            )?)))
        }),
    );
    object.set(
        "extname",
        NativeFunction::new("extname", |args| {
            Ok(Value::string(extname(&crate::require_string(
                args,
                0,
                "path.extname(path)",
            )?)))
        }),
    );
    object.set("sep", Value::string(MAIN_SEPARATOR_STR));

    Value::Object(object)
}

fn string_args(args: &[Value]) -> Result<Vec<String>, Value> {
    args.iter()
        .map(|arg| match arg {
            Value::String(s) => Ok(s.clone()),
            _ => Err(type_error("path segments must be strings")),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_normalises_dots() {
        let segments = vec!["a".to_string(), "./b".to_string(), "../c.txt".to_string()];
        assert_eq!(join(&segments), "a/c.txt");
    }

    #[test]
    fn dirname_basename_extname() {
        assert_eq!(dirname("/srv/app/main.js"), "/srv/app");
        assert_eq!(dirname("main.js"), ".");
        assert_eq!(basename("/srv/app/main.js"), "main.js");
        assert_eq!(extname("/srv/app/main.js"), ".js");
        assert_eq!(extname("/srv/app/LICENSE"), "");
    }

    #[test]
    fn resolve_is_absolute() {
        let resolved = resolve(&["x".to_string(), "y".to_string()]);
        assert!(Path::new(&resolved).is_absolute());
        assert!(resolved.ends_with("x/y"));

        let rerooted = resolve(&["x".to_string(), "/abs".to_string(), "z".to_string()]);
        assert_eq!(rerooted, "/abs/z");
    }
}
