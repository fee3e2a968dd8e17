// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Daily timers.
//!
//! [`TimerScheduler`] keeps a min-heap of today's remaining fire times (UTC).
//! When the date advances, timers left over from the previous day fire as a
//! catch-up and the heap is rebuilt with every timer for the new day.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A configured time of day.
///
/// Either packed `HHMMSS` digits (`40000` is 04:00:00) or `"HH:MM:SS"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeSpec {
    /// Packed `HHMMSS`.
    Packed(u32),
    /// `"HH:MM:SS"`.
    Text(String),
}

impl TimeSpec {
    /// Converts to a time of day.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidTimer`] for out-of-range fields.
    pub fn to_time(&self) -> Result<NaiveTime, ConfigError> {
        match self {
            Self::Packed(packed) => {
                NaiveTime::from_hms_opt(packed / 10_000, packed / 100 % 100, packed % 100)
                    .filter(|_| *packed < 1_000_000)
                    .ok_or_else(|| ConfigError::InvalidTimer(format!("{packed:06}")))
            }
            Self::Text(text) => NaiveTime::parse_from_str(text.trim(), "%H:%M:%S")
                .map_err(|_| ConfigError::InvalidTimer(text.clone())),
        }
    }
}

/// An action to run every day at a fixed UTC time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timer {
    /// Time of day, UTC.
    pub time: NaiveTime,
    /// Action name.
    pub action: String,
}

impl Timer {
    /// Creates a timer.
    pub fn new(time: NaiveTime, action: impl Into<String>) -> Self {
        Self {
            time,
            action: action.into(),
        }
    }
}

/// A timer that came due.
#[derive(Debug, Clone, PartialEq)]
pub struct FiredTimer {
    /// Action name.
    pub action: String,
    /// When it was due.
    pub scheduled: DateTime<Utc>,
}

/// What the timer loop should do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Wake {
    /// Run these actions, then ask again.
    Fire(Vec<FiredTimer>),
    /// Nothing is due; ask again after this long.
    Sleep(Duration),
}

/// Min-heap of today's remaining timers.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use chrono::{NaiveTime, TimeZone, Utc};
/// use porter_lib::brainstem::{Timer, TimerScheduler, Wake};
///
/// let four = NaiveTime::from_hms_opt(4, 0, 0).unwrap();
/// let now = Utc.with_ymd_and_hms(2024, 3, 1, 3, 59, 59).unwrap();
/// let mut timers = TimerScheduler::new(vec![Timer::new(four, "pump_on")], now);
///
/// assert_eq!(timers.next_deadline(now), Wake::Sleep(Duration::from_secs(1)));
/// ```
pub struct TimerScheduler {
    timers: Vec<Timer>,
    today: NaiveDate,
    heap: BinaryHeap<Reverse<(DateTime<Utc>, usize)>>,
}

impl TimerScheduler {
    /// Creates the heap with today's timers that have not passed yet.
    #[must_use]
    pub fn new(timers: Vec<Timer>, now: DateTime<Utc>) -> Self {
        let mut scheduler = Self {
            timers,
            today: now.date_naive(),
            heap: BinaryHeap::new(),
        };
        scheduler.rebuild(Some(now));
        scheduler
    }

    /// Returns the configured timers.
    #[must_use]
    pub fn timers(&self) -> &[Timer] {
        &self.timers
    }

    /// Returns how many timers are left today.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.heap.len()
    }

    /// Pops what is due, or says how long to sleep.
    pub fn next_deadline(&mut self, now: DateTime<Utc>) -> Wake {
        let mut fired = Vec::new();

        if now.date_naive() > self.today {
            while let Some(Reverse((scheduled, index))) = self.heap.pop() {
                tracing::info!(
                    action = %self.timers[index].action,
                    scheduled = %scheduled,
                    "Running timer left over from the previous day"
                );
                fired.push(self.fire(scheduled, index));
            }
            self.today = now.date_naive();
            self.rebuild(None);
            tracing::debug!(date = %self.today, timers = self.heap.len(), "Rebuilt timers");
        }

        while self.heap.peek().is_some_and(|Reverse((at, _))| *at <= now) {
            let Some(Reverse((scheduled, index))) = self.heap.pop() else {
                break;
            };
            let late = (now - scheduled).to_std().unwrap_or_default();
            tracing::info!(
                action = %self.timers[index].action,
                late_ms = late.as_millis(),
                "Timer running"
            );
            fired.push(self.fire(scheduled, index));
        }

        if !fired.is_empty() {
            return Wake::Fire(fired);
        }

        let next = match self.heap.peek() {
            Some(Reverse((at, _))) => Some(*at),
            None => self
                .today
                .succ_opt()
                .map(|tomorrow| tomorrow.and_time(NaiveTime::MIN).and_utc()),
        };
        let sleep = next.map_or(Duration::from_secs(86_400), |at| {
            (at - now).to_std().unwrap_or_default()
        });
        Wake::Sleep(sleep)
    }

    fn fire(&self, scheduled: DateTime<Utc>, index: usize) -> FiredTimer {
        FiredTimer {
            action: self.timers[index].action.clone(),
            scheduled,
        }
    }

    /// Fills the heap for `today`, skipping times before `not_before`.
    fn rebuild(&mut self, not_before: Option<DateTime<Utc>>) {
        self.heap = self
            .timers
            .iter()
            .enumerate()
            .map(|(index, timer)| (self.today.and_time(timer.time).and_utc(), index))
            .filter(|(at, _)| not_before.is_none_or(|now| *at >= now))
            .map(Reverse)
            .collect();
    }
}

impl fmt::Debug for TimerScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerScheduler")
            .field("timers", &self.timers)
            .field("today", &self.today)
            .field("pending", &self.heap.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(day: u32, h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, h, m, s).unwrap()
    }

    fn time(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    fn actions(wake: &Wake) -> Vec<&str> {
        match wake {
            Wake::Fire(fired) => fired.iter().map(|f| f.action.as_str()).collect(),
            Wake::Sleep(_) => Vec::new(),
        }
    }

    #[test]
    fn packed_and_text_specs() {
        assert_eq!(TimeSpec::Packed(40_000).to_time().unwrap(), time(4, 0, 0));
        assert_eq!(TimeSpec::Packed(235_959).to_time().unwrap(), time(23, 59, 59));
        assert_eq!(TimeSpec::Text("07:30:00".to_string()).to_time().unwrap(), time(7, 30, 0));
    }

    #[test]
    fn invalid_specs() {
        for spec in [
            TimeSpec::Packed(246_000),
            TimeSpec::Packed(16_000),
            TimeSpec::Packed(1_000_000),
            TimeSpec::Text("7am".to_string()),
        ] {
            assert!(matches!(spec.to_time(), Err(ConfigError::InvalidTimer(_))), "{spec:?}");
        }
    }

    #[test]
    fn spec_deserializes_either_form() {
        let specs: Vec<TimeSpec> = serde_json::from_str(r#"[40000, "04:00:00"]"#).unwrap();
        assert_eq!(specs[0].to_time().unwrap(), specs[1].to_time().unwrap());
    }

    #[test]
    fn sleeps_until_due_then_fires() {
        let mut timers = TimerScheduler::new(vec![Timer::new(time(4, 0, 0), "pump_on")], at(1, 3, 0, 0));

        assert_eq!(timers.next_deadline(at(1, 3, 59, 59)), Wake::Sleep(Duration::from_secs(1)));

        let wake = timers.next_deadline(at(1, 4, 0, 1));
        assert_eq!(actions(&wake), vec!["pump_on"]);
        assert_eq!(timers.pending(), 0);
    }

    #[test]
    fn passed_timers_are_skipped_on_creation() {
        let timers = TimerScheduler::new(
            vec![Timer::new(time(4, 0, 0), "early"), Timer::new(time(20, 0, 0), "late")],
            at(1, 12, 0, 0),
        );
        assert_eq!(timers.pending(), 1);
    }

    #[test]
    fn fires_in_time_order() {
        let mut timers = TimerScheduler::new(
            vec![Timer::new(time(6, 0, 0), "second"), Timer::new(time(5, 0, 0), "first")],
            at(1, 0, 0, 0),
        );

        let wake = timers.next_deadline(at(1, 7, 0, 0));
        assert_eq!(actions(&wake), vec!["first", "second"]);
    }

    #[test]
    fn empty_heap_sleeps_until_midnight() {
        let mut timers = TimerScheduler::new(vec![Timer::new(time(4, 0, 0), "pump_on")], at(1, 3, 0, 0));
        timers.next_deadline(at(1, 4, 0, 0));

        assert_eq!(
            timers.next_deadline(at(1, 22, 0, 0)),
            Wake::Sleep(Duration::from_secs(2 * 3600))
        );
    }

    #[test]
    fn rollover_rebuilds_full_set() {
        let mut timers = TimerScheduler::new(vec![Timer::new(time(4, 0, 0), "pump_on")], at(1, 3, 0, 0));
        assert_eq!(actions(&timers.next_deadline(at(1, 4, 0, 1))), vec!["pump_on"]);

        let wake = timers.next_deadline(at(2, 0, 0, 1));
        assert_eq!(wake, Wake::Sleep(Duration::from_secs(4 * 3600 - 1)));
        assert_eq!(timers.pending(), 1);

        assert_eq!(actions(&timers.next_deadline(at(2, 4, 0, 0))), vec!["pump_on"]);
    }

    #[test]
    fn rollover_catches_up_missed_timers() {
        let mut timers = TimerScheduler::new(
            vec![Timer::new(time(23, 59, 59), "nightly"), Timer::new(time(4, 0, 0), "pump_on")],
            at(1, 12, 0, 0),
        );

        let wake = timers.next_deadline(at(2, 0, 0, 5));

        assert_eq!(actions(&wake), vec!["nightly"]);
        assert_eq!(timers.pending(), 2);
    }
}
