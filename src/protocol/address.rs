// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Colon-grouped address translation.
//!
//! Homeworks Illumination processors report addresses as colon-separated
//! two-digit groups (`[01:01:00:03:01]`). Everything above the wire uses the
//! decimal [`IntegrationId`] obtained by concatenating the groups, so these
//! two functions are the only place the grouped form exists.
//!
//! The mapping is lossy for leading `00` groups: `[00:05]` decodes to `5`,
//! which encodes back to `05`.

use crate::error::ProtocolError;
use crate::types::IntegrationId;

/// Decodes a colon-grouped address into its canonical id.
///
/// # Errors
///
/// Returns `ProtocolError::InvalidAddress` if the text contains anything but
/// digits and colons, or overflows.
///
/// # Examples
///
/// ```
/// use porter_lib::protocol::address::decode_grouped;
///
/// let id = decode_grouped("01:01:00:03:01").unwrap();
/// assert_eq!(id.value(), 101_000_301);
/// ```
pub fn decode_grouped(grouped: &str) -> Result<IntegrationId, ProtocolError> {
    let digits: String = grouped.chars().filter(|c| *c != ':').collect();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProtocolError::InvalidAddress(grouped.to_string()));
    }
    digits
        .parse::<u64>()
        .map(IntegrationId::new)
        .map_err(|_| ProtocolError::InvalidAddress(grouped.to_string()))
}

/// Encodes a canonical id into the colon-grouped form.
///
/// The decimal digits are left-padded to an even length and split into
/// two-digit groups.
///
/// # Examples
///
/// ```
/// use porter_lib::protocol::address::encode_grouped;
/// use porter_lib::types::IntegrationId;
///
/// assert_eq!(encode_grouped(IntegrationId::new(101_000_301)), "01:01:00:03:01");
/// assert_eq!(encode_grouped(IntegrationId::new(1_040_206)), "01:04:02:06");
/// ```
#[must_use]
pub fn encode_grouped(id: IntegrationId) -> String {
    let mut digits = id.value().to_string();
    if digits.len() % 2 == 1 {
        digits.insert(0, '0');
    }
    digits
        .as_bytes()
        .chunks(2)
        .map(|pair| String::from_utf8_lossy(pair).into_owned())
        .collect::<Vec<_>>()
        .join(":")
}
