// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Controller families and their dialect differences.

use std::fmt;

use regex::bytes::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::protocol::frame::{self, Frame};

/// The dialect a controller speaks.
///
/// | | `Lip` | `Illumination` |
/// |---|---|---|
/// | Controllers | RadioRA2 Select, Homeworks QS | Homeworks Illumination |
/// | Login | `login: ` / `password: ` / prompt | `LOGIN: ` with `user,password` |
/// | Monitoring | always on | `kbmon`, `dlmon`, `klmon`, `gsmon` |
/// | Addresses | decimal | colon-grouped |
/// | Keepalive | `#PING` | `rst` |
/// | Logout | `LOGOUT` | `quit` |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerFamily {
    /// Lutron Integration Protocol.
    #[default]
    #[serde(alias = "radiora2", alias = "homeworksqs")]
    Lip,
    /// Homeworks Illumination RS232/telnet protocol.
    #[serde(alias = "homeworks")]
    Illumination,
}

impl ControllerFamily {
    /// Monitoring subscriptions enabled after login.
    pub const ILLUMINATION_MONITORS: [&'static str; 4] = ["kbmon", "dlmon", "klmon", "gsmon"];

    /// Returns the notification line pattern.
    #[must_use]
    pub fn frame_pattern(self) -> &'static Regex {
        match self {
            Self::Lip => &frame::LIP_FRAME,
            Self::Illumination => &frame::ILLUMINATION_FRAME,
        }
    }

    /// Decodes a line matched by [`Self::frame_pattern`].
    ///
    /// # Errors
    ///
    /// Returns `ParseError` if a field is malformed.
    pub fn decode(self, raw: &[u8]) -> Result<Frame, ParseError> {
        match self {
            Self::Lip => frame::decode_lip(raw),
            Self::Illumination => frame::decode_illumination(raw),
        }
    }
}

impl fmt::Display for ControllerFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lip => f.write_str("lip"),
            Self::Illumination => f.write_str("illumination"),
        }
    }
}
