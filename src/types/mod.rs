// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value types shared across the crate.
//!
//! # Types
//!
//! - [`IntegrationId`] - Canonical numeric device address
//! - [`Level`] - Output level (0-100%)

mod integration_id;
mod level;

pub use integration_id::IntegrationId;
pub use level::Level;
