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

//! The value model exchanged across the interpreter host bridge.
//!
//! Host modules never hand raw interpreter handles around; everything that
//! crosses the bridge is a [`Value`]. Script functions surface to the host as
//! [`NativeFunction`]s (an engine adapter wraps its own function handles in
//! them), and anything promise-like surfaces as a [`Thenable`].

mod function;
mod thenable;
mod value;

pub use function::{FnResult, NativeFunction};
pub use thenable::{Settle, Thenable, ThenableRef, adopt_thenable, settle_pair};
pub use value::{ObjectRef, Value};
