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

//! Dedicated Tokio runtimes for the host's native I/O.
//!
//! The interpreter bridge forbids touching script state anywhere but the task
//! consumer, and equally forbids running the consumer on a network thread.
//! Host modules therefore spawn every native operation here (file work on
//! the file-I/O runtime, sockets and HTTP on the network runtime, signal
//! watchers and other long-lived chores on the background runtime) and
//! re-enter script by enqueuing tasks on the engine.

mod global;
mod options;

pub use global::{
    background_runtime, block_on_network_io, file_io_runtime, init_global_runtimes,
    network_io_runtime, spawn_background, spawn_blocking_file_io, spawn_file_io, spawn_network_io,
};
pub use options::IoRuntimeOptions;
pub use tokio::{runtime::Runtime, task::JoinHandle};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_runtimes_spawn_onto_their_own_named_threads() {
        init_global_runtimes(&IoRuntimeOptions {
            file_io_threads:    1,
            net_io_threads:     1,
            background_threads: 1,
        });

        let file = spawn_file_io(async { std::thread::current().name().map(str::to_owned) });
        let name = block_on_network_io(file).unwrap().unwrap_or_default();
        assert!(name.starts_with("dougless-file-io-"));

        let net = spawn_network_io(async { std::thread::current().name().map(str::to_owned) });
        let name = block_on_network_io(net).unwrap().unwrap_or_default();
        assert!(name.starts_with("dougless-net-io-"));

        let bg = spawn_background(async { 11 });
        assert_eq!(block_on_network_io(bg).unwrap(), 11);
    }
}
