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

use std::{
    collections::{BTreeMap, HashMap},
    time::{Duration, Instant},
};

use crate::task::{TaskFn, TaskId, TaskOrigin};

/// Wheel ordering key. The monotone `seq` breaks deadline ties, so two timers
/// armed for the same instant fire in the order they were scheduled.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
struct TimerKey {
    deadline: Instant,
    seq:      u64,
}

pub(crate) struct TimerEntry {
    pub id:       TaskId,
    pub origin:   TaskOrigin,
    pub period:   Option<Duration>,
    pub callback: TaskFn,
}

/// The pending-timer store, serviced by the dedicated timer thread.
#[derive(Default)]
pub(crate) struct TimerWheel {
    entries: BTreeMap<TimerKey, TimerEntry>,
    by_id:   HashMap<TaskId, TimerKey>,
    seq:     u64,
}

impl TimerWheel {
    pub fn insert(&mut self, deadline: Instant, entry: TimerEntry) {
        let key = TimerKey {
            deadline,
            seq: self.seq,
        };
        self.seq += 1;
        self.by_id.insert(entry.id.clone(), key);
        self.entries.insert(key, entry);
    }

    /// Removes a pending timer by id; `None` for unknown, already fired or
    /// already cleared ids.
    pub fn remove(&mut self, id: &TaskId) -> Option<TimerEntry> {
        let key = self.by_id.remove(id)?;
        self.entries.remove(&key)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.keys().next().map(|key| key.deadline)
    }

    /// Pops every entry due at `now`, in (deadline, schedule-order) order.
    pub fn pop_due(&mut self, now: Instant) -> Vec<(Instant, TimerEntry)> {
        let mut due = Vec::new();
        while let Some(key) = self.entries.keys().next().copied() {
            if key.deadline > now {
                break;
            }
            if let Some(entry) = self.entries.remove(&key) {
                self.by_id.remove(&entry.id);
                due.push((key.deadline, entry));
            }
        }
        due
    }

    /// Drops every pending timer, returning how many were cancelled so the
    /// caller can settle the keep-alive accounting.
    pub fn drain(&mut self) -> usize {
        let cancelled = self.entries.len();
        self.entries.clear();
        self.by_id.clear();
        cancelled
    }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str) -> TimerEntry {
        TimerEntry {
            id:       TaskId::from(id),
            origin:   TaskOrigin::Timer,
            period:   None,
            callback: TaskFn::Once(Box::new(|| {})),
        }
    }

    #[test]
    fn same_deadline_pops_in_schedule_order() {
        let mut wheel = TimerWheel::default();
        let deadline = Instant::now();
        wheel.insert(deadline, entry("first"));
        wheel.insert(deadline, entry("second"));
        wheel.insert(deadline, entry("third"));

        let due = wheel.pop_due(deadline);
        let ids: Vec<String> = due.iter().map(|(_, e)| e.id.to_string()).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
        assert!(wheel.is_empty());
    }

    #[test]
    fn pop_due_leaves_future_entries() {
        let mut wheel = TimerWheel::default();
        let now = Instant::now();
        wheel.insert(now, entry("due"));
        wheel.insert(now + Duration::from_secs(60), entry("later"));

        assert_eq!(wheel.pop_due(now).len(), 1);
        assert_eq!(wheel.next_deadline(), Some(now + Duration::from_secs(60)));
    }

    #[test]
    fn remove_is_single_shot() {
        let mut wheel = TimerWheel::default();
        wheel.insert(Instant::now() + Duration::from_secs(1), entry("t"));
        let id = TaskId::from("t");
        assert!(wheel.remove(&id).is_some());
        assert!(wheel.remove(&id).is_none());
    }
}
