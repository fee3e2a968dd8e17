// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Static metadata about the devices behind a controller.
//!
//! A [`DeviceDirectory`] maps integration ids to names, areas and buttons.
//! It is built once per target, either from the JSON integration report
//! exported by the Lutron app ([`DeviceDirectory::load_from_report`]) or
//! from the compact flat form kept in configuration
//! ([`DeviceDirectory::load_from_flat`]). The flat form can be regenerated
//! from any directory with [`DeviceDirectory::serialize_flat`].
//!
//! The directory is immutable; a re-import builds a new value that replaces
//! the old one behind its `Arc`.
//!
//! # Examples
//!
//! ```
//! use porter_lib::directory::DeviceDirectory;
//! use porter_lib::types::IntegrationId;
//!
//! let report = r#"{"LIPIdList": {
//!     "Devices": [{"ID": 1, "Name": "Smart Bridge",
//!                  "Buttons": [{"Number": 1, "Name": "Button 1"},
//!                              {"Number": 42, "Name": "Movie Time"}]}],
//!     "Zones": [{"ID": 23, "Name": "Pendants", "Area": {"Name": "Kitchen"}}]
//! }}"#;
//!
//! let directory = DeviceDirectory::load_from_report(report).unwrap();
//! assert_eq!(directory.scene_name(42), Some("Movie Time"));
//! assert_eq!(directory.scene_name(1), None);
//! assert_eq!(directory.dimmer(IntegrationId::new(23)).unwrap().area, "Kitchen");
//! ```

mod flat;
mod report;

use std::collections::BTreeMap;

pub use flat::{FlatDirectory, FlatEntry};

use crate::error::ConfigError;
use crate::types::IntegrationId;

/// What a device is, as far as metrics are concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// An output zone with a level.
    Dimmer,
    /// A keypad, remote or occupancy sensor with buttons.
    Sensor,
    /// The bridge itself (id 1); its named buttons are scenes.
    Bridge,
}

/// A device known to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrationDevice {
    /// Integration id.
    pub id: IntegrationId,
    /// Display name.
    pub name: String,
    /// Device kind.
    pub kind: DeviceKind,
    /// Area name; empty when unassigned.
    pub area: String,
    /// Button numbers; empty for dimmers.
    pub buttons: Vec<u32>,
}

/// A scene: a named button on the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scene {
    /// Button number on the bridge.
    pub id: u32,
    /// Scene name.
    pub name: String,
}

/// Result of [`DeviceDirectory::find`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryEntry<'a> {
    /// A scene on the bridge.
    Scene(&'a Scene),
    /// A dimmer or sensor.
    Device(&'a IntegrationDevice),
}

/// Integration id to device, scene and area metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceDirectory {
    bridge: Option<IntegrationDevice>,
    scenes: BTreeMap<u32, Scene>,
    dimmers: BTreeMap<IntegrationId, IntegrationDevice>,
    sensors: BTreeMap<IntegrationId, IntegrationDevice>,
    areas: BTreeMap<String, Vec<IntegrationId>>,
}

impl DeviceDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the bridge, when the source described it.
    #[must_use]
    pub fn bridge(&self) -> Option<&IntegrationDevice> {
        self.bridge.as_ref()
    }

    /// Returns all scenes keyed by bridge button number.
    #[must_use]
    pub fn scenes(&self) -> &BTreeMap<u32, Scene> {
        &self.scenes
    }

    /// Returns all dimmers.
    #[must_use]
    pub fn dimmers(&self) -> &BTreeMap<IntegrationId, IntegrationDevice> {
        &self.dimmers
    }

    /// Returns all sensors.
    #[must_use]
    pub fn sensors(&self) -> &BTreeMap<IntegrationId, IntegrationDevice> {
        &self.sensors
    }

    /// Returns device ids per area, sorted by id.
    #[must_use]
    pub fn areas(&self) -> &BTreeMap<String, Vec<IntegrationId>> {
        &self.areas
    }

    /// Looks up a dimmer.
    #[must_use]
    pub fn dimmer(&self, id: IntegrationId) -> Option<&IntegrationDevice> {
        self.dimmers.get(&id)
    }

    /// Looks up a sensor.
    #[must_use]
    pub fn sensor(&self, id: IntegrationId) -> Option<&IntegrationDevice> {
        self.sensors.get(&id)
    }

    /// Looks up any device, including the bridge.
    #[must_use]
    pub fn device(&self, id: IntegrationId) -> Option<&IntegrationDevice> {
        self.dimmers
            .get(&id)
            .or_else(|| self.sensors.get(&id))
            .or_else(|| self.bridge.as_ref().filter(|b| b.id == id))
    }

    /// Returns the name of a scene.
    #[must_use]
    pub fn scene_name(&self, scene: u32) -> Option<&str> {
        self.scenes.get(&scene).map(|s| s.name.as_str())
    }

    /// Returns `(name, area)` for a device; empty strings when unknown.
    #[must_use]
    pub fn device_labels(&self, id: IntegrationId) -> (&str, &str) {
        self.device(id)
            .map_or(("", ""), |d| (d.name.as_str(), d.area.as_str()))
    }

    /// Finds a device or scene by selector.
    ///
    /// A numeric selector matches a dimmer or sensor id. Otherwise an exact
    /// scene name wins, then the first dimmer or sensor whose name starts
    /// with the selector, then the first scene whose name does.
    #[must_use]
    pub fn find(&self, selector: &str) -> Option<DirectoryEntry<'_>> {
        if let Ok(id) = selector.parse::<IntegrationId>() {
            return self
                .dimmers
                .get(&id)
                .or_else(|| self.sensors.get(&id))
                .map(DirectoryEntry::Device);
        }
        if let Some(scene) = self.scenes.values().find(|s| s.name == selector) {
            return Some(DirectoryEntry::Scene(scene));
        }
        self.dimmers
            .values()
            .chain(self.sensors.values())
            .find(|d| d.name.starts_with(selector))
            .map(DirectoryEntry::Device)
            .or_else(|| {
                self.scenes
                    .values()
                    .find(|s| s.name.starts_with(selector))
                    .map(DirectoryEntry::Scene)
            })
    }

    fn insert_device(&mut self, device: IntegrationDevice) -> Result<(), ConfigError> {
        if device.kind == DeviceKind::Bridge {
            self.bridge = Some(device);
            return Ok(());
        }
        if self.dimmers.contains_key(&device.id) || self.sensors.contains_key(&device.id) {
            return Err(ConfigError::DuplicateDevice(device.id.value()));
        }
        self.areas
            .entry(device.area.clone())
            .or_default()
            .push(device.id);
        if device.kind == DeviceKind::Dimmer {
            self.dimmers.insert(device.id, device);
        } else {
            self.sensors.insert(device.id, device);
        }
        Ok(())
    }

    fn insert_scene(&mut self, id: u32, name: impl Into<String>) {
        self.scenes.insert(
            id,
            Scene {
                id,
                name: name.into(),
            },
        );
    }

    fn finish(mut self) -> Self {
        for ids in self.areas.values_mut() {
            ids.sort_unstable();
        }
        tracing::debug!(
            scenes = self.scenes.len(),
            dimmers = self.dimmers.len(),
            sensors = self.sensors.len(),
            areas = self.areas.len(),
            "Loaded device directory"
        );
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: u64, name: &str, kind: DeviceKind, area: &str) -> IntegrationDevice {
        IntegrationDevice {
            id: IntegrationId::new(id),
            name: name.to_string(),
            kind,
            area: area.to_string(),
            buttons: if kind == DeviceKind::Sensor { vec![2, 4] } else { Vec::new() },
        }
    }

    fn sample() -> DeviceDirectory {
        let mut dir = DeviceDirectory::new();
        dir.insert_device(device(23, "Pendants", DeviceKind::Dimmer, "Kitchen"))
            .unwrap();
        dir.insert_device(device(5, "Island", DeviceKind::Dimmer, "Kitchen"))
            .unwrap();
        dir.insert_device(device(28, "Pico", DeviceKind::Sensor, "Den"))
            .unwrap();
        dir.insert_scene(42, "Movie Time");
        dir.insert_scene(7, "Pendants Off");
        dir.finish()
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut dir = DeviceDirectory::new();
        dir.insert_device(device(23, "A", DeviceKind::Dimmer, "")).unwrap();

        let err = dir
            .insert_device(device(23, "B", DeviceKind::Sensor, ""))
            .unwrap_err();

        assert!(matches!(err, ConfigError::DuplicateDevice(23)));
    }

    #[test]
    fn areas_are_sorted_by_id() {
        let dir = sample();
        assert_eq!(
            dir.areas()["Kitchen"],
            vec![IntegrationId::new(5), IntegrationId::new(23)]
        );
    }

    #[test]
    fn labels_for_known_and_unknown_devices() {
        let dir = sample();
        assert_eq!(dir.device_labels(IntegrationId::new(28)), ("Pico", "Den"));
        assert_eq!(dir.device_labels(IntegrationId::new(99)), ("", ""));
    }

    #[test]
    fn find_by_id_and_name() {
        let dir = sample();

        assert!(matches!(
            dir.find("28"),
            Some(DirectoryEntry::Device(d)) if d.name == "Pico"
        ));
        assert!(matches!(
            dir.find("Movie Time"),
            Some(DirectoryEntry::Scene(s)) if s.id == 42
        ));
        assert!(matches!(
            dir.find("Pend"),
            Some(DirectoryEntry::Device(d)) if d.id == IntegrationId::new(23)
        ));
        assert!(matches!(dir.find("Movie"), Some(DirectoryEntry::Scene(_))));
        assert!(dir.find("Garage").is_none());
        assert!(dir.find("99").is_none());
    }
}
