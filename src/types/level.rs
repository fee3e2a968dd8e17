// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Output level type for dimmer control.
//!
//! This module provides a type-safe representation of output levels,
//! ensuring values are always within the valid range of 0-100%.

use std::fmt;

use crate::error::ValueError;

/// Output level as a percentage (0-100).
///
/// Lutron controllers accept fractional levels (`75.5`). The [`Display`]
/// form is the one written on the wire: whole numbers are rendered without
/// a decimal point.
///
/// [`Display`]: fmt::Display
///
/// # Examples
///
/// ```
/// use porter_lib::types::Level;
///
/// let level = Level::new(50.0).unwrap();
/// assert_eq!(level.to_string(), "50");
///
/// assert_eq!(Level::new(12.5).unwrap().to_string(), "12.5");
/// assert!(Level::new(100.1).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Level(f64);

impl Level {
    /// Fully off.
    pub const MIN: Self = Self(0.0);

    /// Fully on.
    pub const MAX: Self = Self(100.0);

    /// Creates a new level.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::LevelOutOfRange` if value is outside [0, 100] or NaN.
    pub fn new(value: f64) -> Result<Self, ValueError> {
        if !(0.0..=100.0).contains(&value) {
            return Err(ValueError::LevelOutOfRange(value));
        }
        Ok(Self(value))
    }

    /// Returns the percentage value.
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.fract() == 0.0 {
            write!(f, "{:.0}", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl TryFrom<f64> for Level {
    type Error = ValueError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
