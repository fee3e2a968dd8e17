// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Outbound command lines.
//!
//! A [`Command`] renders to one CRLF-terminated line in the dialect of a
//! [`ControllerFamily`]:
//!
//! | Command | `Lip` | `Illumination` |
//! |---|---|---|
//! | `Write` | `#OUTPUT,23,1,75` | `#OUTPUT,23,1,75` |
//! | `Query` | `?OUTPUT,23,1` | `rdl,01:01:00:03:01` |
//! | `Ping` | `#PING` | `rst` |
//! | `Logout` | `LOGOUT` | `quit` |
//! | `Raw` | fields joined by `,` | fields joined by `,` |
//!
//! # Examples
//!
//! ```
//! use porter_lib::protocol::{Command, ControllerFamily};
//! use porter_lib::types::IntegrationId;
//!
//! let cmd = Command::write("OUTPUT", IntegrationId::new(177), 1).with_value("0");
//! assert_eq!(cmd.to_line(ControllerFamily::Lip), "#OUTPUT,177,1,0\r\n");
//!
//! let query = Command::query("OUTPUT", IntegrationId::new(101_000_301), 1);
//! assert_eq!(query.to_line(ControllerFamily::Illumination), "rdl,01:01:00:03:01\r\n");
//! ```

use crate::protocol::ControllerFamily;
use crate::protocol::address;
use crate::types::IntegrationId;

/// A command line to send to a controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `#MODE,ADDRESS,ACTION[,VALUE][,ARGS...]`.
    Write {
        /// Command mode such as `OUTPUT` or `DEVICE`.
        mode: String,
        /// Target address.
        address: IntegrationId,
        /// Action code or component number.
        action: u32,
        /// Optional value.
        value: Option<String>,
        /// Trailing arguments.
        args: Vec<String>,
    },
    /// Level or state query.
    Query {
        /// Command mode.
        mode: String,
        /// Target address.
        address: IntegrationId,
        /// Action code.
        action: u32,
    },
    /// Keepalive.
    Ping,
    /// Ends the session.
    Logout,
    /// Pre-split fields written verbatim, comma-joined.
    Raw(Vec<String>),
}

impl Command {
    /// Creates a write command with no value.
    #[must_use]
    pub fn write(mode: impl Into<String>, address: IntegrationId, action: u32) -> Self {
        Self::Write {
            mode: mode.into(),
            address,
            action,
            value: None,
            args: Vec::new(),
        }
    }

    /// Creates a query command.
    #[must_use]
    pub fn query(mode: impl Into<String>, address: IntegrationId, action: u32) -> Self {
        Self::Query {
            mode: mode.into(),
            address,
            action,
        }
    }

    /// Creates a raw command from its fields.
    #[must_use]
    pub fn raw<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Raw(fields.into_iter().map(Into::into).collect())
    }

    /// Sets the value of a write command. Other commands are unchanged.
    #[must_use]
    pub fn with_value(mut self, new_value: impl Into<String>) -> Self {
        if let Self::Write { value, .. } = &mut self {
            *value = Some(new_value.into());
        }
        self
    }

    /// Appends an argument to a write command. Other commands are unchanged.
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        if let Self::Write { args, .. } = &mut self {
            args.push(arg.into());
        }
        self
    }

    /// Renders the command as a CRLF-terminated line.
    #[must_use]
    pub fn to_line(&self, family: ControllerFamily) -> String {
        let mut line = match self {
            Self::Write {
                mode,
                address,
                action,
                value,
                args,
            } => {
                let mut line = format!("#{mode},{address},{action}");
                for field in value.iter().chain(args) {
                    line.push(',');
                    line.push_str(field);
                }
                line
            }
            Self::Query {
                mode,
                address,
                action,
            } => match family {
                ControllerFamily::Lip => format!("?{mode},{address},{action}"),
                ControllerFamily::Illumination => {
                    format!("rdl,{}", address::encode_grouped(*address))
                }
            },
            Self::Ping => match family {
                ControllerFamily::Lip => "#PING".to_string(),
                ControllerFamily::Illumination => "rst".to_string(),
            },
            Self::Logout => match family {
                ControllerFamily::Lip => "LOGOUT".to_string(),
                ControllerFamily::Illumination => "quit".to_string(),
            },
            Self::Raw(fields) => fields.join(","),
        };
        line.push_str("\r\n");
        line
    }
}
