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

use std::thread::available_parallelism;

use bon::Builder;
use smart_default::SmartDefault;

/// Thread budgets for the three I/O runtimes.
///
/// A scripting runtime is not a server: file and network pools stay small by
/// default and scale only with explicit configuration. The background pool
/// carries signal watchers and teardown chores, so one thread suffices.
#[derive(Debug, Clone, SmartDefault, Builder)]
#[builder(finish_fn = build)]
pub struct IoRuntimeOptions {
    #[default(io_defaults())]
    #[builder(default = io_defaults())]
    pub file_io_threads: usize,

    #[default(io_defaults())]
    #[builder(default = io_defaults())]
    pub net_io_threads: usize,

    #[default(1)]
    #[builder(default = 1)]
    pub background_threads: usize,
}

fn io_defaults() -> usize {
    available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(1)
        .clamp(2, 4)
}
