// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration identifier type.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Numeric address a controller assigns to a device, zone or the bridge.
///
/// This is the single canonical form used throughout the crate. Controllers
/// that report colon-grouped addresses (`[01:04:02:06]`) are translated at
/// the wire boundary, see [`crate::protocol::address`].
///
/// # Examples
///
/// ```
/// use porter_lib::types::IntegrationId;
///
/// let id: IntegrationId = "23".parse().unwrap();
/// assert_eq!(id.value(), 23);
/// assert!(IntegrationId::BRIDGE.is_bridge());
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct IntegrationId(u64);

impl IntegrationId {
    /// The bridge itself; its non-`"Button N"` buttons are scenes.
    pub const BRIDGE: Self = Self(1);

    /// Creates an identifier from a raw number.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw number.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Returns true for the bridge device.
    #[must_use]
    pub const fn is_bridge(&self) -> bool {
        self.0 == Self::BRIDGE.0
    }
}

impl fmt::Display for IntegrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for IntegrationId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<IntegrationId> for u64 {
    fn from(id: IntegrationId) -> Self {
        id.0
    }
}

impl FromStr for IntegrationId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|e| ParseError::InvalidValue {
                field: "integration id".to_string(),
                message: format!("{s:?}: {e}"),
            })
    }
}
