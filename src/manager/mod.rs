// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Session manager for coordinating multiple Lutron controllers.
//!
//! This module keeps one telnet session per controller alive and fresh, with
//! reconnection, keepalives and the initial level query all running as
//! scheduler tasks.
//!
//! # Overview
//!
//! The [`SessionManager`] is the central component for a bridge process:
//!
//! - **Registration**: Target names (`host[:port]`) map to a [`TargetConfig`]
//! - **Lazy sessions**: A [`Session`] is created the first time a target is
//!   needed, and shared by every name that resolves to the same controller
//! - **Scheduling**: [`SessionManager::drive_once`] runs session tasks
//! - **Auto-reconnection**: Configurable backoff via [`ReconnectionPolicy`]
//!
//! # Examples
//!
//! ## Basic Usage
//!
//! ```no_run
//! use std::time::Duration;
//! use porter_lib::manager::{SessionManager, TargetConfig};
//! use porter_lib::protocol::ControllerFamily;
//!
//! #[tokio::main]
//! async fn main() -> porter_lib::Result<()> {
//!     let manager = SessionManager::new();
//!
//!     let config = TargetConfig::new(ControllerFamily::Lip)
//!         .with_credentials("lutron", "integration")
//!         .with_keepalive(Duration::from_secs(300));
//!     manager.register_target("192.168.1.20:23", config)?;
//!
//!     loop {
//!         manager.drive_once(Duration::from_secs(1)).await?;
//!     }
//! }
//! ```
//!
//! ## Configuration File
//!
//! ```
//! use porter_lib::manager::LutronConfig;
//!
//! let config: LutronConfig = serde_json::from_str(r#"{
//!     "defaults": {"system": "radiora2"},
//!     "targets": {
//!         "hwi.local": {"system": "homeworks", "user": "admin"}
//!     }
//! }"#).unwrap();
//!
//! assert_eq!(config.target("hwi.local").user, "admin");
//! assert_eq!(config.target("other.local").user, "lutron");
//! ```

mod session;
mod session_manager;
mod target;
mod target_config;

pub use session::Session;
pub use session_manager::SessionManager;
pub use target::{DEFAULT_PORT, Target};
pub use target_config::{LutronConfig, ReconnectionPolicy, TargetConfig};
