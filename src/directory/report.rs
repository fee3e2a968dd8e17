// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parser for the JSON integration report exported by the Lutron app.

use serde::Deserialize;

use crate::directory::{DeviceDirectory, DeviceKind, IntegrationDevice};
use crate::error::{ParseError, Result};
use crate::types::IntegrationId;

/// Bridge buttons named like this are plain buttons, not scenes.
const PLAIN_BUTTON_PREFIX: &str = "Button ";

#[derive(Debug, Deserialize)]
struct Report {
    #[serde(rename = "LIPIdList")]
    lip_id_list: Option<LipIdList>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LipIdList {
    #[serde(default)]
    devices: Vec<ReportDevice>,
    #[serde(default)]
    zones: Vec<ReportZone>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ReportDevice {
    #[serde(rename = "ID")]
    id: IntegrationId,
    #[serde(default)]
    name: String,
    #[serde(default)]
    area: Option<ReportArea>,
    #[serde(default)]
    buttons: Vec<ReportButton>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ReportZone {
    #[serde(rename = "ID")]
    id: IntegrationId,
    #[serde(default)]
    name: String,
    #[serde(default)]
    area: Option<ReportArea>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ReportArea {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ReportButton {
    number: u32,
    #[serde(default)]
    name: String,
}

fn area_name(area: Option<ReportArea>) -> String {
    area.map(|a| a.name).unwrap_or_default()
}

impl DeviceDirectory {
    /// Builds a directory from a JSON integration report.
    ///
    /// The bridge's buttons whose names do not start with `"Button "` become
    /// scenes. Every other device becomes a sensor with its button list, and
    /// every zone becomes a dimmer.
    ///
    /// # Errors
    ///
    /// Returns `Error::Parse` if the JSON is malformed or has no `LIPIdList`,
    /// and `Error::Config` if an id appears twice.
    pub fn load_from_report(json: &str) -> Result<Self> {
        let report: Report = serde_json::from_str(json).map_err(ParseError::from)?;
        let list = report
            .lip_id_list
            .ok_or_else(|| ParseError::MissingField("LIPIdList".to_string()))?;

        let mut directory = Self::new();
        for device in list.devices {
            let area = area_name(device.area);
            let buttons: Vec<u32> = device.buttons.iter().map(|b| b.number).collect();
            let kind = if device.id.is_bridge() {
                for button in &device.buttons {
                    if !button.name.starts_with(PLAIN_BUTTON_PREFIX) {
                        directory.insert_scene(button.number, button.name.clone());
                    }
                }
                DeviceKind::Bridge
            } else {
                DeviceKind::Sensor
            };
            directory.insert_device(IntegrationDevice {
                id: device.id,
                name: device.name,
                kind,
                area,
                buttons,
            })?;
        }
        for zone in list.zones {
            directory.insert_device(IntegrationDevice {
                id: zone.id,
                name: zone.name,
                kind: DeviceKind::Dimmer,
                area: area_name(zone.area),
                buttons: Vec::new(),
            })?;
        }
        Ok(directory.finish())
    }
}
