// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! State change representation.
//!
//! A [`StateChange`] is what a decoded [`Frame`] means for the scrape state.
//! Interpretation happens in [`StateChange::from_frame`]; applying happens in
//! [`MetricsState::apply`](super::MetricsState::apply).
//!
//! | Frame | Change |
//! |---|---|
//! | `DEVICE,1,c,PRESS` | [`StateChange::ScenePress`] for scene `c` |
//! | `DEVICE,d,c,PRESS` | [`StateChange::DevicePress`] for `(d, c)` |
//! | `OUTPUT,d,SET,v` / `SHADEGRP,d,SET,v` | [`StateChange::Level`] |
//! | `GROUP,d,3,p` | [`StateChange::Level`] with 100 / 0 / -1 |
//! | anything else | none |
//!
//! # Examples
//!
//! ```
//! use porter_lib::protocol::{Frame, FrameKind};
//! use porter_lib::state::StateChange;
//! use porter_lib::types::IntegrationId;
//!
//! let press = Frame::new(FrameKind::Device, IntegrationId::BRIDGE, 7.0, Some(3.0));
//! assert_eq!(StateChange::from_frame(&press), Some(StateChange::ScenePress { scene: 7 }));
//!
//! let raising = Frame::new(FrameKind::Output, IntegrationId::new(23), 2.0, None);
//! assert_eq!(StateChange::from_frame(&raising), None);
//! ```

use crate::protocol::{ButtonEvent, Frame, FrameKind, OutputAction};
use crate::types::IntegrationId;

/// `GROUP` action reporting occupancy.
const GROUP_OCCUPANCY: u32 = 3;
const GROUP_OCCUPIED: u32 = 3;
const GROUP_UNOCCUPIED: u32 = 4;

/// Represents a change in scrape state.
#[derive(Debug, Clone, PartialEq)]
pub enum StateChange {
    /// An output level was reported.
    Level {
        /// The output (or group) id.
        device: IntegrationId,
        /// The new level.
        level: f64,
    },

    /// A scene on the bridge was activated.
    ScenePress {
        /// Bridge button number.
        scene: u32,
    },

    /// A button on a device was pressed.
    DevicePress {
        /// The device id.
        device: IntegrationId,
        /// The button (component) number.
        component: u32,
    },
}

impl StateChange {
    /// Interprets a frame.
    ///
    /// Returns `None` for frames that do not change state (releases, raise
    /// and lower notifications, errors, unknown kinds). Those are logged.
    #[must_use]
    pub fn from_frame(frame: &Frame) -> Option<Self> {
        match &frame.kind {
            FrameKind::Device => device_change(frame),
            FrameKind::Output | FrameKind::ShadeGroup => output_change(frame),
            FrameKind::Group => group_change(frame),
            FrameKind::Error => {
                tracing::warn!(
                    address = %frame.address,
                    action = frame.action,
                    value = ?frame.value,
                    "Controller reported an error"
                );
                None
            }
            FrameKind::Other(kind) => {
                tracing::info!(
                    kind = %kind,
                    address = %frame.address,
                    action = frame.action,
                    value = ?frame.value,
                    "Unrecognized frame"
                );
                None
            }
        }
    }
}

fn device_change(frame: &Frame) -> Option<StateChange> {
    let (Some(component), Some(code)) = (frame.action_code(), frame.value_code()) else {
        tracing::warn!(
            address = %frame.address,
            action = frame.action,
            value = ?frame.value,
            "Malformed device frame"
        );
        return None;
    };
    if ButtonEvent::from_code(code) != Some(ButtonEvent::Press) {
        // Releases, holds and double taps are observed but not counted.
        return None;
    }
    if frame.address.is_bridge() {
        Some(StateChange::ScenePress { scene: component })
    } else {
        Some(StateChange::DevicePress {
            device: frame.address,
            component,
        })
    }
}

fn output_change(frame: &Frame) -> Option<StateChange> {
    let code = frame.action_code();
    match code.and_then(OutputAction::from_code) {
        Some(OutputAction::Set) => {
            if let Some(level) = frame.value {
                return Some(StateChange::Level {
                    device: frame.address,
                    level,
                });
            }
            tracing::warn!(address = %frame.address, "Output set without a level");
        }
        // The level follows in a later SET.
        Some(OutputAction::Raising | OutputAction::Lowering | OutputAction::Stop) => {}
        _ if matches!(code, Some(OutputAction::CAUSE | OutputAction::CAUSE_EXTRA)) => {
            tracing::debug!(
                address = %frame.address,
                action = frame.action,
                value = ?frame.value,
                "Ignoring change-cause report"
            );
        }
        _ => {
            tracing::warn!(
                kind = %frame.kind,
                address = %frame.address,
                action = frame.action,
                value = ?frame.value,
                "Unknown output action"
            );
        }
    }
    None
}

fn group_change(frame: &Frame) -> Option<StateChange> {
    if frame.action_code() != Some(GROUP_OCCUPANCY) {
        tracing::warn!(
            address = %frame.address,
            action = frame.action,
            value = ?frame.value,
            "Unknown group action"
        );
        return None;
    }
    let level = match frame.value_code() {
        Some(GROUP_OCCUPIED) => 100.0,
        Some(GROUP_UNOCCUPIED) => 0.0,
        _ => {
            tracing::warn!(
                address = %frame.address,
                value = ?frame.value,
                "Unknown group occupancy value"
            );
            -1.0
        }
    };
    Some(StateChange::Level {
        device: frame.address,
        level,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(kind: FrameKind, address: u64, action: f64, value: Option<f64>) -> Frame {
        Frame::new(kind, IntegrationId::new(address), action, value)
    }

    #[test]
    fn bridge_press_is_scene() {
        let change = StateChange::from_frame(&frame(FrameKind::Device, 1, 42.0, Some(3.0)));
        assert_eq!(change, Some(StateChange::ScenePress { scene: 42 }));
    }

    #[test]
    fn device_press_is_device_component() {
        let change = StateChange::from_frame(&frame(FrameKind::Device, 28, 2.0, Some(3.0)));
        assert_eq!(
            change,
            Some(StateChange::DevicePress {
                device: IntegrationId::new(28),
                component: 2
            })
        );
    }

    #[test]
    fn release_hold_doubletap_are_not_counted() {
        for event in [4.0, 5.0, 6.0] {
            assert_eq!(
                StateChange::from_frame(&frame(FrameKind::Device, 28, 2.0, Some(event))),
                None
            );
        }
    }

    #[test]
    fn output_and_shade_set_levels() {
        assert_eq!(
            StateChange::from_frame(&frame(FrameKind::Output, 23, 1.0, Some(55.0))),
            Some(StateChange::Level {
                device: IntegrationId::new(23),
                level: 55.0
            })
        );
        assert!(matches!(
            StateChange::from_frame(&frame(FrameKind::ShadeGroup, 40, 1.0, Some(20.0))),
            Some(StateChange::Level { level, .. }) if level == 20.0
        ));
    }

    #[test]
    fn raise_lower_stop_and_cause_codes_do_nothing() {
        for action in [2.0, 3.0, 4.0, 29.0, 30.0, 77.0] {
            assert_eq!(
                StateChange::from_frame(&frame(FrameKind::Output, 23, action, Some(8.0))),
                None,
                "action {action}"
            );
        }
    }

    #[test]
    fn group_occupancy_maps_to_level() {
        let level = |param: f64| match StateChange::from_frame(&frame(
            FrameKind::Group,
            9,
            3.0,
            Some(param),
        )) {
            Some(StateChange::Level { level, .. }) => Some(level),
            _ => None,
        };

        assert_eq!(level(3.0), Some(100.0));
        assert_eq!(level(4.0), Some(0.0));
        assert_eq!(level(255.0), Some(-1.0));
    }

    #[test]
    fn group_other_action_is_ignored() {
        assert_eq!(
            StateChange::from_frame(&frame(FrameKind::Group, 9, 1.0, Some(3.0))),
            None
        );
    }

    #[test]
    fn error_and_unknown_kinds_do_nothing() {
        assert_eq!(StateChange::from_frame(&frame(FrameKind::Error, 6, 0.0, None)), None);
        assert_eq!(
            StateChange::from_frame(&frame(
                FrameKind::Other("KLS".to_string()),
                10612,
                1.0,
                None
            )),
            None
        );
    }
}
