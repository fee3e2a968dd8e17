// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The brainstem section of the bridge configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::brainstem::TimeSpec;

/// Timers, reactions and actions as configured.
///
/// Nothing is validated here; [`ReactionEngine::from_config`] does that.
///
/// [`ReactionEngine::from_config`]: crate::brainstem::ReactionEngine::from_config
///
/// # Examples
///
/// ```
/// use porter_lib::brainstem::BrainstemConfig;
///
/// let config: BrainstemConfig = serde_json::from_str(r#"{
///     "timers": [[40000, "pump_on"], ["22:30:00", "bedtime"]],
///     "reactions": [["lutron", "qs", [1, "", "DEVICE", 42, 3], "bedtime"]],
///     "actions": {
///         "pump_on": [["pool", "main", null, "on"]],
///         "bedtime": [["ratelimit", 60], ["lutron", "qs", "Laundry", "setlevel", 0]]
///     }
/// }"#).unwrap();
/// assert_eq!(config.timers.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrainstemConfig {
    /// `[time, action]` pairs.
    pub timers: Vec<(TimeSpec, String)>,
    /// `[module, target, selector, action]` entries, matched in order.
    pub reactions: Vec<(String, String, Value, String)>,
    /// Action name to its steps.
    pub actions: BTreeMap<String, Vec<Value>>,
}
