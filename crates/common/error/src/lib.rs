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

//! The runtime's error taxonomy.
//!
//! Two of these kinds are fatal to a script run (`Transform`, `Execution`);
//! the rest are *soft*: they travel through the task engine to the calling
//! script's callback or promise and never unwind the host. The distinction is
//! captured by [`Error::is_fatal`] and the exit-code mapping lives with the
//! runtime façade.

use snafu::Snafu;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Source failed transformation; reported with position, fatal.
    #[snafu(display("{path}:{line}:{column}: {message}"))]
    Transform {
        path:    String,
        line:    u32,
        column:  u32,
        message: String,
        #[snafu(implicit)]
        loc:     snafu::Location,
    },

    /// Uncaught error out of script; fatal.
    #[snafu(display("Uncaught {message}"))]
    Execution {
        message: String,
        #[snafu(implicit)]
        loc:     snafu::Location,
    },

    /// A capability check failed. Soft: delivered to the calling script
    /// together with the configuration line that would allow the operation.
    #[snafu(display("Permission denied: {kind} access to \"{target}\". {suggestion}"))]
    PermissionDenied {
        kind:       String,
        target:     String,
        suggestion: String,
        #[snafu(implicit)]
        loc:        snafu::Location,
    },

    /// Host I/O failure. Soft: delivered with the native error message.
    #[snafu(display("{message}"))]
    Io {
        message: String,
        #[snafu(source)]
        source:  std::io::Error,
        #[snafu(implicit)]
        loc:     snafu::Location,
    },

    /// Script-visible API misuse (missing callback, wrong type). Raised to
    /// script as a type error; recoverable.
    #[snafu(display("TypeError: {message}"))]
    InvalidArgument {
        message: String,
        #[snafu(implicit)]
        loc:     snafu::Location,
    },

    /// WebSocket operation on a connection that is not open; recoverable.
    #[snafu(display("connection is not open: {message}"))]
    ConnectionState {
        message: String,
        #[snafu(implicit)]
        loc:     snafu::Location,
    },
}

impl Error {
    /// Fatal errors abort the script run; soft errors are delivered to
    /// script through the ordinary callback/promise path.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Transform { .. } | Self::Execution { .. })
    }

    /// The message a script sees when this error reaches a callback or a
    /// promise rejection. Same as `Display`; spelled out so call sites read
    /// as a bridge crossing rather than formatting.
    #[must_use]
    pub fn to_script_message(&self) -> String { self.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatality_split() {
        let transform = TransformSnafu {
            path:    "main.js".to_string(),
            line:    3u32,
            column:  7u32,
            message: "unexpected token".to_string(),
        }
        .build();
        assert!(transform.is_fatal());
        assert_eq!(transform.to_string(), "main.js:3:7: unexpected token");

        let denial = PermissionDeniedSnafu {
            kind:       "net".to_string(),
            target:     "example.com:443".to_string(),
            suggestion: "add \"example.com:443\" to permissions.net".to_string(),
        }
        .build();
        assert!(!denial.is_fatal());
    }
}
