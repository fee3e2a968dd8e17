// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reactions and timers.
//!
//! The brainstem turns what modules observe into actions, and runs actions
//! on a daily schedule.
//!
//! # Architecture
//!
//! ```text
//! Session poll task: ~DEVICE,40,1,3
//!                     ↓
//!     EventPropagator.emit("qs", [40, "Goodnight", "DEVICE", 1, 3])
//!                     ↓
//!       ReactionEngine.observe_event() → PendingAction("bedtime")
//!                     ↓
//!         TaskSender.submit(action_task("bedtime"))
//!                     ↓
//!     run_action: ratelimit? → nested actions → Runnable::run(...)
//! ```
//!
//! The timer task is one more scheduler participant: it sleeps until the next
//! [`Timer`] and then runs its action through the same path.

mod action;
mod config;
mod engine;
mod history;
mod propagator;
mod runnable;
mod selector;
mod timers;

pub use action::{ActionStep, Dispatch};
pub use config::BrainstemConfig;
pub use engine::{PendingAction, ReactionEngine, RunOutcome};
pub use history::{Direction, EventHistory, HISTORY_CAPACITY, HistoryEntry};
pub use propagator::{EventPropagator, EventSink};
pub use runnable::Runnable;
pub use selector::{json_number, selector_matches};
pub use timers::{FiredTimer, TimeSpec, Timer, TimerScheduler, Wake};
