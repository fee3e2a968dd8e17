// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Recent engine activity, kept for diagnostics.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Number of entries kept.
pub const HISTORY_CAPACITY: usize = 10;

/// Whether the engine ran something or saw something.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// An action was run.
    Run,
    /// A module reported an event.
    Observed,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Run => "run",
            Self::Observed => "observed",
        })
    }
}

/// One recorded run or observation.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// When it happened.
    pub at: DateTime<Utc>,
    /// Run or observed.
    pub direction: Direction,
    /// Action name, or module name for observations.
    pub name: String,
    /// Target and selector for observations.
    pub args: Vec<Value>,
}

impl fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} {} {}",
            self.at.format("%a %b %e %H:%M:%S %Y"),
            self.direction,
            self.name,
            Value::from(self.args.clone())
        )
    }
}

/// Fixed-capacity FIFO of [`HistoryEntry`].
#[derive(Debug, Clone)]
pub struct EventHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl EventHistory {
    /// Creates an empty history holding up to `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends an entry. Returns true if the oldest entry was evicted.
    pub fn push(&mut self, entry: HistoryEntry) -> bool {
        self.entries.push_back(entry);
        if self.entries.len() <= self.capacity {
            return false;
        }
        self.entries.pop_front();
        true
    }

    /// Returns the entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for EventHistory {
    fn default() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn entry(name: &str) -> HistoryEntry {
        HistoryEntry {
            at: Utc.with_ymd_and_hms(2024, 3, 1, 4, 0, 0).unwrap(),
            direction: Direction::Run,
            name: name.to_string(),
            args: Vec::new(),
        }
    }

    #[test]
    fn evicts_oldest() {
        let mut history = EventHistory::with_capacity(2);

        assert!(!history.push(entry("a")));
        assert!(!history.push(entry("b")));
        assert!(history.push(entry("c")));

        let names: Vec<_> = history.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn default_capacity() {
        let mut history = EventHistory::default();
        for n in 0..25 {
            history.push(entry(&n.to_string()));
        }
        assert_eq!(history.len(), HISTORY_CAPACITY);
        assert_eq!(history.iter().next().unwrap().name, "15");
    }

    #[test]
    fn display() {
        let observed = HistoryEntry {
            direction: Direction::Observed,
            args: vec![json!("qs"), json!([23, "Pendants"])],
            ..entry("lutron")
        };
        assert_eq!(
            observed.to_string(),
            r#"Fri Mar  1 04:00:00 2024: observed lutron ["qs",[23,"Pendants"]]"#
        );
    }
}
