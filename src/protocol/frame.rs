// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Decoded notification frames.
//!
//! Both controller families are normalized to the same [`Frame`] shape:
//!
//! ```text
//! Lip:           ~OUTPUT,23,1,75.00            -> Output  23  action 1   value 75
//!                ~DEVICE,1,42,3                -> Device  1   action 42  value 3 (press)
//! Illumination:  DL, [01:04:02:06], 50.00      -> Output  1040206  action 1  value 50
//!                KBP, [01:06:12], 5            -> Device  10612    action 5  value 3 (press)
//! ```
//!
//! For `DEVICE` frames the action slot carries the component (button)
//! number and the value carries the [`ButtonEvent`] code.

use std::fmt;
use std::sync::LazyLock;

use regex::bytes::{Captures, Regex};

use crate::error::ParseError;
use crate::protocol::address;
use crate::types::IntegrationId;

/// Line pattern for Lutron Integration Protocol notifications.
pub(crate) static LIP_FRAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"~([A-Z]+),([0-9.]+),([0-9.]+)(?:,([0-9.]+))?\r\n")
        .expect("LIP frame pattern should compile")
});

/// Line pattern for Homeworks Illumination notifications.
pub(crate) static ILLUMINATION_FRAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Z]+), *\[([0-9.:]+)\], *([0-9.]+)(?:, *([0-9.]+))? *\r\n")
        .expect("Illumination frame pattern should compile")
});

/// Kind of notification, normalized across controller families.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Button or scene event.
    Device,
    /// Output (zone) level.
    Output,
    /// Shade group level, reported by Homeworks QS.
    ShadeGroup,
    /// Occupancy group status.
    Group,
    /// Controller error report.
    Error,
    /// Anything else, kept verbatim.
    Other(String),
}

impl FrameKind {
    /// Parses the wire name.
    #[must_use]
    pub fn from_wire(name: &str) -> Self {
        match name {
            "DEVICE" => Self::Device,
            "OUTPUT" => Self::Output,
            "SHADEGRP" => Self::ShadeGroup,
            "GROUP" => Self::Group,
            "ERROR" => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns the wire name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Device => "DEVICE",
            Self::Output => "OUTPUT",
            Self::ShadeGroup => "SHADEGRP",
            Self::Group => "GROUP",
            Self::Error => "ERROR",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action codes for `OUTPUT` and `SHADEGRP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum OutputAction {
    /// Level set (or reported).
    Set = 1,
    /// Started raising.
    Raising = 2,
    /// Started lowering.
    Lowering = 3,
    /// Stopped raising or lowering.
    Stop = 4,
    /// Shade group preset.
    Preset = 6,
}

impl OutputAction {
    /// Homeworks QS "cause of last change" report.
    pub const CAUSE: u32 = 29;
    /// Undocumented Homeworks QS report seen alongside [`Self::CAUSE`].
    pub const CAUSE_EXTRA: u32 = 30;

    /// Maps a wire code.
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::Set),
            2 => Some(Self::Raising),
            3 => Some(Self::Lowering),
            4 => Some(Self::Stop),
            6 => Some(Self::Preset),
            _ => None,
        }
    }

    /// Returns the wire code.
    #[must_use]
    pub const fn code(self) -> u32 {
        self as u32
    }
}

/// Event codes for `DEVICE` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ButtonEvent {
    /// Button pressed or scene activated.
    Press = 3,
    /// Button released.
    Release = 4,
    /// Button held.
    Hold = 5,
    /// Button double-tapped.
    DoubleTap = 6,
    /// LED state report.
    LedState = 9,
}

impl ButtonEvent {
    /// Maps a wire code.
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            3 => Some(Self::Press),
            4 => Some(Self::Release),
            5 => Some(Self::Hold),
            6 => Some(Self::DoubleTap),
            9 => Some(Self::LedState),
            _ => None,
        }
    }

    /// Returns the wire code.
    #[must_use]
    pub const fn code(self) -> u32 {
        self as u32
    }
}

/// One decoded notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Notification kind.
    pub kind: FrameKind,
    /// Canonical address of the reporting device.
    pub address: IntegrationId,
    /// Action code, or component number for `DEVICE`.
    pub action: f64,
    /// Optional trailing value.
    pub value: Option<f64>,
}

impl Frame {
    /// Creates a frame.
    #[must_use]
    pub fn new(kind: FrameKind, address: IntegrationId, action: f64, value: Option<f64>) -> Self {
        Self {
            kind,
            address,
            action,
            value,
        }
    }

    /// Returns the action as a whole-number code, if it is one.
    #[must_use]
    pub fn action_code(&self) -> Option<u32> {
        as_code(self.action)
    }

    /// Returns the value as a whole-number code, if it is one.
    #[must_use]
    pub fn value_code(&self) -> Option<u32> {
        self.value.and_then(as_code)
    }
}

/// Converts a whole, non-negative float into a code.
pub(crate) fn as_code(n: f64) -> Option<u32> {
    if n.fract() == 0.0 && (0.0..=f64::from(u32::MAX)).contains(&n) {
        // Range checked above.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let code = n as u32;
        Some(code)
    } else {
        None
    }
}

/// Decodes a Lutron Integration Protocol notification line.
///
/// # Errors
///
/// Returns `ParseError` if the bytes do not match or a field is malformed.
pub fn decode_lip(raw: &[u8]) -> Result<Frame, ParseError> {
    let caps = captures(&LIP_FRAME, raw)?;
    let kind = FrameKind::from_wire(&field(&caps, 1)?);
    let address: IntegrationId = field(&caps, 2)?.parse()?;
    let action = parse_number("action", &field(&caps, 3)?)?;
    if action.fract() != 0.0 {
        return Err(ParseError::InvalidValue {
            field: "action".to_string(),
            message: format!("{action} is not a whole number"),
        });
    }
    let value = optional_number(&caps, 4)?;
    Ok(Frame::new(kind, address, action, value))
}

/// Decodes a Homeworks Illumination notification line and normalizes it.
///
/// `DL` and `GSS` become `OUTPUT` set reports; keypad, dimmer and seeTouch
/// button codes become `DEVICE` events. Other kinds pass through.
///
/// # Errors
///
/// Returns `ParseError` if the bytes do not match or a field is malformed.
pub fn decode_illumination(raw: &[u8]) -> Result<Frame, ParseError> {
    let caps = captures(&ILLUMINATION_FRAME, raw)?;
    let name = field(&caps, 1)?;
    let address =
        address::decode_grouped(&field(&caps, 2)?).map_err(|e| ParseError::InvalidValue {
            field: "address".to_string(),
            message: e.to_string(),
        })?;
    let third = parse_number("field", &field(&caps, 3)?)?;
    let fourth = optional_number(&caps, 4)?;

    if name == "DL" || name == "GSS" {
        return Ok(Frame::new(
            FrameKind::Output,
            address,
            f64::from(OutputAction::Set.code()),
            Some(third),
        ));
    }
    if let Some(event) = illumination_button_event(&name) {
        if let Some(extra) = fourth {
            tracing::warn!(
                kind = %name,
                address = %address,
                extra,
                "Unexpected final field in button report"
            );
        }
        return Ok(Frame::new(
            FrameKind::Device,
            address,
            third,
            Some(f64::from(event.code())),
        ));
    }
    Ok(Frame::new(FrameKind::from_wire(&name), address, third, fourth))
}

/// Maps `KBP`, `DBR`, `SVBDT` and friends to their button event.
fn illumination_button_event(name: &str) -> Option<ButtonEvent> {
    let suffix = ["KB", "DB", "SVB"]
        .iter()
        .find_map(|prefix| name.strip_prefix(prefix))?;
    match suffix {
        "P" => Some(ButtonEvent::Press),
        "R" => Some(ButtonEvent::Release),
        "H" => Some(ButtonEvent::Hold),
        "DT" => Some(ButtonEvent::DoubleTap),
        _ => None,
    }
}

fn captures<'h>(pattern: &Regex, raw: &'h [u8]) -> Result<Captures<'h>, ParseError> {
    pattern
        .captures(raw)
        .ok_or_else(|| ParseError::UnexpectedFormat(String::from_utf8_lossy(raw).into_owned()))
}

fn field(caps: &Captures<'_>, index: usize) -> Result<String, ParseError> {
    caps.get(index)
        .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
        .ok_or_else(|| ParseError::MissingField(format!("group {index}")))
}

fn optional_number(caps: &Captures<'_>, index: usize) -> Result<Option<f64>, ParseError> {
    caps.get(index)
        .map(|m| parse_number("value", &String::from_utf8_lossy(m.as_bytes())))
        .transpose()
}

fn parse_number(name: &str, text: &str) -> Result<f64, ParseError> {
    text.parse::<f64>().map_err(|e| ParseError::InvalidValue {
        field: name.to_string(),
        message: format!("{text:?}: {e}"),
    })
}
