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

//! The process-wide manager holder.
//!
//! The pointer swaps atomically and whole: in-flight checks finish against
//! the manager they loaded, new checks see the replacement. Tests install a
//! fresh manager and restore the previous one when done.

use std::sync::Arc;

use arc_swap::ArcSwap;
use once_cell::sync::Lazy;

use crate::manager::PermissionManager;

static CURRENT: Lazy<ArcSwap<PermissionManager>> =
    Lazy::new(|| ArcSwap::from_pointee(PermissionManager::default()));

/// The currently installed manager.
#[must_use]
pub fn current() -> Arc<PermissionManager> { CURRENT.load_full() }

/// Installs `manager` process-wide, returning the shared handle.
pub fn install(manager: PermissionManager) -> Arc<PermissionManager> {
    let manager = Arc::new(manager);
    CURRENT.store(Arc::clone(&manager));
    manager
}

/// Swaps in an already-shared manager, returning the previous one.
pub fn swap(manager: Arc<PermissionManager>) -> Arc<PermissionManager> { CURRENT.swap(manager) }
