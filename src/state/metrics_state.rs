// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-session levels and press counters.
//!
//! The session's poll task is the only writer; scrapes read through
//! [`MetricsState::snapshot`], which copies everything under one lock
//! acquisition so a reader never sees a half-applied change.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::state::StateChange;
use crate::types::IntegrationId;

#[derive(Debug, Default)]
struct Tables {
    levels: BTreeMap<IntegrationId, Option<f64>>,
    scene_presses: BTreeMap<u32, u64>,
    device_presses: BTreeMap<(IntegrationId, u32), u64>,
}

/// Lock-protected scrape state for one session.
///
/// # Examples
///
/// ```
/// use porter_lib::state::{MetricsState, StateChange};
/// use porter_lib::types::IntegrationId;
///
/// let state = MetricsState::new([IntegrationId::new(23)]);
/// assert!(state.snapshot().levels.is_empty());
///
/// state.apply(&StateChange::Level { device: IntegrationId::new(23), level: 75.0 });
/// assert_eq!(state.snapshot().levels[&IntegrationId::new(23)], 75.0);
/// ```
#[derive(Debug)]
pub struct MetricsState {
    tables: Mutex<Tables>,
    created: DateTime<Utc>,
}

/// A consistent copy of a [`MetricsState`].
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    /// Known levels; outputs that never reported are omitted.
    pub levels: BTreeMap<IntegrationId, f64>,
    /// Activations per scene.
    pub scene_presses: BTreeMap<u32, u64>,
    /// Presses per `(device, component)`.
    pub device_presses: BTreeMap<(IntegrationId, u32), u64>,
    /// When counting started.
    pub created: DateTime<Utc>,
}

impl MetricsState {
    /// Creates state with every dimmer seeded as unknown.
    pub fn new(dimmers: impl IntoIterator<Item = IntegrationId>) -> Self {
        Self::with_created(dimmers, Utc::now())
    }

    /// Creates state with an explicit counter creation time.
    pub fn with_created(
        dimmers: impl IntoIterator<Item = IntegrationId>,
        created: DateTime<Utc>,
    ) -> Self {
        let levels = dimmers.into_iter().map(|id| (id, None)).collect();
        Self {
            tables: Mutex::new(Tables {
                levels,
                ..Tables::default()
            }),
            created,
        }
    }

    /// Returns when counting started.
    #[must_use]
    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// Applies a change. Returns the new counter value for presses.
    pub fn apply(&self, change: &StateChange) -> Option<u64> {
        let mut tables = self.tables.lock();
        match change {
            StateChange::Level { device, level } => {
                tables.levels.insert(*device, Some(*level));
                None
            }
            StateChange::ScenePress { scene } => {
                let count = tables.scene_presses.entry(*scene).or_default();
                *count += 1;
                Some(*count)
            }
            StateChange::DevicePress { device, component } => {
                let count = tables
                    .device_presses
                    .entry((*device, *component))
                    .or_default();
                *count += 1;
                Some(*count)
            }
        }
    }

    /// Returns the current level of one output.
    #[must_use]
    pub fn level(&self, device: IntegrationId) -> Option<f64> {
        self.tables.lock().levels.get(&device).copied().flatten()
    }

    /// Returns the ids in the level table, known or not.
    #[must_use]
    pub fn tracked_outputs(&self) -> Vec<IntegrationId> {
        self.tables.lock().levels.keys().copied().collect()
    }

    /// Copies the state under a single lock acquisition.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let tables = self.tables.lock();
        MetricsSnapshot {
            levels: tables
                .levels
                .iter()
                .filter_map(|(id, level)| level.map(|l| (*id, l)))
                .collect(),
            scene_presses: tables.scene_presses.clone(),
            device_presses: tables.device_presses.clone(),
            created: self.created,
        }
    }
}
