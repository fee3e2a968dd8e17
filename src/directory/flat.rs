// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The flat directory form kept in configuration.
//!
//! ```json
//! {
//!   "scenes": {"42": "Movie Time"},
//!   "areas": {
//!     "Den": [[24, "Cans"], [28, "Pico", [2, 3, 4]]],
//!     "Kitchen": [[23, "Pendants"]]
//!   }
//! }
//! ```
//!
//! A two-element entry is a dimmer; a three-element entry is a sensor with
//! its button numbers. No naming heuristics apply.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::directory::{DeviceDirectory, DeviceKind, IntegrationDevice};
use crate::error::{ParseError, Result};
use crate::types::IntegrationId;

/// One device in an area list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlatEntry {
    /// `[id, name, [buttons]]`.
    Sensor(IntegrationId, String, Vec<u32>),
    /// `[id, name]`.
    Dimmer(IntegrationId, String),
}

impl FlatEntry {
    /// Returns the entry's id.
    #[must_use]
    pub fn id(&self) -> IntegrationId {
        match self {
            Self::Sensor(id, ..) | Self::Dimmer(id, _) => *id,
        }
    }
}

/// Flattened scenes and area lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatDirectory {
    /// Bridge button number to scene name.
    #[serde(default)]
    pub scenes: BTreeMap<u32, String>,
    /// Area name to its devices.
    #[serde(default)]
    pub areas: BTreeMap<String, Vec<FlatEntry>>,
}

impl DeviceDirectory {
    /// Builds a directory from the flat form.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if an id appears twice.
    pub fn load_from_flat(flat: FlatDirectory) -> Result<Self> {
        let mut directory = Self::new();
        for (id, name) in flat.scenes {
            directory.insert_scene(id, name);
        }
        for (area, entries) in flat.areas {
            for entry in entries {
                let device = match entry {
                    FlatEntry::Sensor(id, name, buttons) => IntegrationDevice {
                        id,
                        name,
                        kind: DeviceKind::Sensor,
                        area: area.clone(),
                        buttons,
                    },
                    FlatEntry::Dimmer(id, name) => IntegrationDevice {
                        id,
                        name,
                        kind: DeviceKind::Dimmer,
                        area: area.clone(),
                        buttons: Vec::new(),
                    },
                };
                directory.insert_device(device)?;
            }
        }
        Ok(directory.finish())
    }

    /// Parses the flat form from JSON and builds a directory.
    ///
    /// # Errors
    ///
    /// Returns `Error::Parse` for malformed JSON and `Error::Config` if an id
    /// appears twice.
    pub fn load_from_flat_json(json: &str) -> Result<Self> {
        let flat: FlatDirectory = serde_json::from_str(json).map_err(ParseError::from)?;
        Self::load_from_flat(flat)
    }

    /// Returns the flat form, sorted by area then id.
    #[must_use]
    pub fn to_flat(&self) -> FlatDirectory {
        let scenes = self
            .scenes
            .values()
            .map(|scene| (scene.id, scene.name.clone()))
            .collect();
        let areas = self
            .areas
            .iter()
            .map(|(area, ids)| {
                let entries = ids
                    .iter()
                    .filter_map(|id| {
                        if let Some(d) = self.dimmers.get(id) {
                            Some(FlatEntry::Dimmer(d.id, d.name.clone()))
                        } else {
                            self.sensors
                                .get(id)
                                .map(|s| FlatEntry::Sensor(s.id, s.name.clone(), s.buttons.clone()))
                        }
                    })
                    .collect();
                (area.clone(), entries)
            })
            .collect();
        FlatDirectory { scenes, areas }
    }

    /// Serializes the flat form as deterministic JSON.
    ///
    /// # Errors
    ///
    /// Returns `Error::Parse` if serialization fails.
    pub fn serialize_flat(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.to_flat()).map_err(|e| ParseError::from(e).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_deserialize_by_length() {
        let entries: Vec<FlatEntry> =
            serde_json::from_str(r#"[[23, "Pendants"], [28, "Pico", [2, 4]]]"#).unwrap();

        assert_eq!(
            entries,
            vec![
                FlatEntry::Dimmer(IntegrationId::new(23), "Pendants".to_string()),
                FlatEntry::Sensor(IntegrationId::new(28), "Pico".to_string(), vec![2, 4]),
            ]
        );
    }

    #[test]
    fn load_from_flat_json_builds_maps() {
        let json = r#"{
            "scenes": {"42": "Movie Time"},
            "areas": {"Kitchen": [[23, "Pendants"]], "Den": [[28, "Pico", [2]]]}
        }"#;

        let dir = DeviceDirectory::load_from_flat_json(json).unwrap();

        assert_eq!(dir.scene_name(42), Some("Movie Time"));
        assert_eq!(dir.dimmer(IntegrationId::new(23)).unwrap().area, "Kitchen");
        assert_eq!(dir.sensor(IntegrationId::new(28)).unwrap().buttons, vec![2]);
    }

    #[test]
    fn malformed_entry_is_rejected() {
        let json = r#"{"areas": {"Kitchen": [[23]]}}"#;
        assert!(DeviceDirectory::load_from_flat_json(json).is_err());
    }

    #[test]
    fn serialization_is_sorted() {
        let json = r#"{
            "scenes": {"7": "Goodnight", "42": "Movie Time"},
            "areas": {"Kitchen": [[23, "Pendants"], [5, "Island"]], "Den": [[28, "Pico", [2]]]}
        }"#;
        let dir = DeviceDirectory::load_from_flat_json(json).unwrap();

        let out = dir.serialize_flat().unwrap();

        let den = out.find("\"Den\"").unwrap();
        let kitchen = out.find("\"Kitchen\"").unwrap();
        let island = out.find("Island").unwrap();
        let pendants = out.find("Pendants").unwrap();
        assert!(den < kitchen);
        assert!(island < pendants);
        assert_eq!(out, dir.serialize_flat().unwrap());
    }
}
