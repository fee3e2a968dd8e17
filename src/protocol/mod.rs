// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Line protocol spoken by Lutron controllers.
//!
//! This module provides the telnet-level pieces: buffered frame extraction,
//! frame decoding for both controller dialects, command serialization and
//! the stateful connection.
//!
//! # Components
//!
//! - [`FrameReader`]: Extracts terminator-delimited frames from a byte stream
//! - [`Frame`]: A decoded notification, normalized across dialects
//! - [`Command`]: An outbound command line
//! - [`ProtocolConnection`]: Socket lifecycle, login and typed operations
//! - [`address`]: Colon-grouped address translation

pub mod address;
mod command;
mod connection;
mod family;
mod frame;
mod frame_reader;

pub use command::Command;
pub use connection::{
    ConnectionState, DEFAULT_CONNECT_TIMEOUT, DEFAULT_PROMPT, Endpoint, ProtocolConnection,
};
pub use family::ControllerFamily;
pub(crate) use frame::as_code;
pub use frame::{ButtonEvent, Frame, FrameKind, OutputAction, decode_illumination, decode_lip};
pub use frame_reader::{DEFAULT_MAX_BUFFER, FrameReader, ReadError, Terminator};
