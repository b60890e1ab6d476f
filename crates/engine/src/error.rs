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

use snafu::Snafu;

pub type Result<T> = std::result::Result<T, ScheduleError>;

/// Why a task could not be admitted.
#[derive(Snafu, Debug)]
#[snafu(visibility(pub(crate)))]
pub enum ScheduleError {
    /// The lifetime token was cancelled; the engine admits no new tasks.
    #[snafu(display("engine is shutting down"))]
    Cancelled {
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    /// The consumer is gone and the ready queue is closed.
    #[snafu(display("engine consumer has stopped"))]
    Stopped {
        #[snafu(implicit)]
        loc: snafu::Location,
    },
}
