// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `Porter` Lib - Lutron lighting telemetry and automation core.
//!
//! This library keeps long-lived telnet sessions to Lutron lighting
//! controllers, turns their notifications into scrape-ready metrics, and
//! reacts to events with configured actions.
//!
//! # Supported Features
//!
//! - **Telemetry**: Output levels, button presses and scene activations
//! - **Automation**: Event reactions, daily timers, rate-limited actions
//! - **Control**: Set output levels and press buttons or scenes
//! - **Directories**: Integration report import and a compact flat form
//!
//! # Supported Controllers
//!
//! - RadioRA2 Select and Homeworks QS (Lutron Integration Protocol)
//! - Homeworks Illumination (colon-grouped addresses)
//!
//! # Quick Start
//!
//! ## Scraping a Controller
//!
//! ```no_run
//! use std::time::Duration;
//! use porter_lib::LutronClient;
//! use porter_lib::manager::LutronConfig;
//! use prometheus::{Encoder, TextEncoder};
//!
//! #[tokio::main]
//! async fn main() -> porter_lib::Result<()> {
//!     let config: LutronConfig = serde_json::from_str(r#"{
//!         "defaults": {
//!             "system": "radiora2",
//!             "scenes": {"42": "Movie Time"},
//!             "areas": {"Kitchen": [[23, "Pendants"]]}
//!         }
//!     }"#).expect("valid configuration");
//!     let client = LutronClient::new(config);
//!     client.register("192.168.1.20")?;
//!
//!     loop {
//!         client.drive_once(Duration::from_secs(1)).await?;
//!         let mut text = Vec::new();
//!         TextEncoder::new()
//!             .encode(&client.collect("192.168.1.20"), &mut text)
//!             .expect("encodable metrics");
//!         println!("{}", String::from_utf8_lossy(&text));
//!     }
//! }
//! ```
//!
//! ## Reacting to Events
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use porter_lib::{LutronClient, ReactionEngine};
//! use porter_lib::brainstem::BrainstemConfig;
//! use porter_lib::manager::LutronConfig;
//!
//! #[tokio::main]
//! async fn main() -> porter_lib::Result<()> {
//!     let brainstem: BrainstemConfig = serde_json::from_str(r#"{
//!         "timers": [[223000, "night"]],
//!         "reactions": [["lutron", "192.168.1.20", [40, "Goodnight", "DEVICE", 1, 3], "night"]],
//!         "actions": {"night": [["lutron", "192.168.1.20", "Pendants", "setlevel", 0]]}
//!     }"#).expect("valid configuration");
//!
//!     let engine = Arc::new(ReactionEngine::from_config(&brainstem)?);
//!     let client = Arc::new(LutronClient::new(LutronConfig::default()));
//!     engine.register_module("lutron", &client);
//!     engine.verify_modules()?;
//!
//!     let manager = client.manager();
//!     manager.set_event_sink(Arc::new(engine.propagator("lutron", manager.sender())));
//!     manager.sender().submit(Arc::clone(&engine).timer_task());
//!     client.register("192.168.1.20")?;
//!
//!     loop {
//!         client.drive_once(Duration::from_secs(1)).await?;
//!     }
//! }
//! ```

pub mod brainstem;
mod client;
pub mod directory;
pub mod error;
pub mod manager;
pub mod protocol;
pub mod scheduler;
pub mod state;
pub mod types;

pub use brainstem::{BrainstemConfig, ReactionEngine, Runnable};
pub use client::LutronClient;
pub use directory::DeviceDirectory;
pub use error::{ConfigError, DispatchError, Error, ParseError, ProtocolError, Result, ValueError};
pub use manager::{LutronConfig, SessionManager, Target, TargetConfig};
pub use prometheus::proto::MetricFamily;
pub use protocol::{ControllerFamily, ProtocolConnection};
pub use scheduler::{Scheduler, Task, TaskSender};
pub use types::{IntegrationId, Level};
