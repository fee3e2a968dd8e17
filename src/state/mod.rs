// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Scrape state management types.
//!
//! This module provides types for tracking what the controller has reported.
//! The [`MetricsState`] struct holds output levels and press counters for one
//! session, while [`StateChange`] represents the effect of one frame.
//!
//! # Examples
//!
//! ```
//! use porter_lib::protocol::{Frame, FrameKind};
//! use porter_lib::state::{MetricsState, StateChange};
//! use porter_lib::types::IntegrationId;
//!
//! let state = MetricsState::new([IntegrationId::new(23)]);
//! let frame = Frame::new(FrameKind::Output, IntegrationId::new(23), 1.0, Some(75.0));
//!
//! if let Some(change) = StateChange::from_frame(&frame) {
//!     state.apply(&change);
//! }
//! assert_eq!(state.level(IntegrationId::new(23)), Some(75.0));
//! ```

mod metrics_state;
mod state_change;

pub use metrics_state::{MetricsSnapshot, MetricsState};
pub use state_change::StateChange;
