// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Target configuration types for the session manager.
//!
//! These types are deserialized by whatever loads the bridge configuration;
//! this crate never reads files itself.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::directory::{DeviceDirectory, FlatDirectory, FlatEntry};
use crate::error::Result;
use crate::manager::Target;
use crate::protocol::{ControllerFamily, Endpoint};

/// Configuration for one controller.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use porter_lib::manager::TargetConfig;
/// use porter_lib::protocol::ControllerFamily;
///
/// let config = TargetConfig::new(ControllerFamily::Illumination)
///     .with_credentials("admin", "secret")
///     .with_keepalive(Duration::from_secs(300));
///
/// let config: TargetConfig = serde_json::from_str(r#"{
///     "system": "radiora2",
///     "prompt": "QSE",
///     "scenes": {"42": "Movie Time"},
///     "areas": {"Living": [[23, "Pendants"]]}
/// }"#).unwrap();
/// assert_eq!(config.system, ControllerFamily::Lip);
/// assert_eq!(config.user, "lutron");
/// ```
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Controller family.
    pub system: ControllerFamily,
    /// Integration user.
    pub user: String,
    /// Integration password.
    pub password: String,
    /// Custom command prompt, without the trailing `"> "`.
    pub prompt: Option<String>,
    /// Integration report JSON. Takes precedence over `scenes` and `areas`.
    pub integration: Option<String>,
    /// Bridge button number to scene name.
    pub scenes: BTreeMap<u32, String>,
    /// Area name to its devices.
    pub areas: BTreeMap<String, Vec<FlatEntry>>,
    /// Quiet time after which a keepalive is sent. Values below one second
    /// are treated as one second.
    pub keepalive_secs: u64,
    /// Connect and login timeout.
    pub connect_timeout_secs: u64,
    /// Reconnection policy.
    pub reconnection: ReconnectionPolicy,
}

impl TargetConfig {
    /// Creates a configuration with default credentials and no devices.
    #[must_use]
    pub fn new(system: ControllerFamily) -> Self {
        Self {
            system,
            ..Self::default()
        }
    }

    /// Sets the integration credentials.
    #[must_use]
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    /// Sets a custom command prompt.
    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// Uses an integration report for the directory.
    #[must_use]
    pub fn with_integration_report(mut self, json: impl Into<String>) -> Self {
        self.integration = Some(json.into());
        self
    }

    /// Uses a flat directory.
    #[must_use]
    pub fn with_flat_directory(mut self, flat: FlatDirectory) -> Self {
        self.scenes = flat.scenes;
        self.areas = flat.areas;
        self
    }

    /// Sets the keepalive interval.
    #[must_use]
    pub fn with_keepalive(mut self, interval: Duration) -> Self {
        self.keepalive_secs = interval.as_secs();
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_secs = timeout.as_secs();
        self
    }

    /// Sets the reconnection policy.
    #[must_use]
    pub fn with_reconnection(mut self, policy: ReconnectionPolicy) -> Self {
        self.reconnection = policy;
        self
    }

    /// Returns the keepalive interval, at least one second.
    #[must_use]
    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs.max(1))
    }

    /// Returns the connect timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Returns the login endpoint for a target.
    #[must_use]
    pub fn endpoint(&self, target: &Target) -> Endpoint {
        Endpoint::new(target.host(), target.port(), &self.user, &self.password)
    }

    /// Builds the device directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the report does not parse or ids repeat.
    pub fn directory(&self) -> Result<DeviceDirectory> {
        match &self.integration {
            Some(report) => DeviceDirectory::load_from_report(report),
            None => DeviceDirectory::load_from_flat(FlatDirectory {
                scenes: self.scenes.clone(),
                areas: self.areas.clone(),
            }),
        }
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            system: ControllerFamily::default(),
            user: "lutron".to_string(),
            password: "integration".to_string(),
            prompt: None,
            integration: None,
            scenes: BTreeMap::new(),
            areas: BTreeMap::new(),
            keepalive_secs: 600,
            connect_timeout_secs: 10,
            reconnection: ReconnectionPolicy::default(),
        }
    }
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("system", &self.system)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("prompt", &self.prompt)
            .field("integration", &self.integration.as_ref().map(String::len))
            .field("scenes", &self.scenes.len())
            .field("areas", &self.areas.len())
            .field("keepalive_secs", &self.keepalive_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("reconnection", &self.reconnection)
            .finish()
    }
}

/// The Lutron section of the bridge configuration.
///
/// Targets without an entry use `defaults`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LutronConfig {
    /// Per-target configuration, keyed by `host[:port]`.
    pub targets: BTreeMap<String, TargetConfig>,
    /// Fallback for unlisted targets.
    pub defaults: TargetConfig,
}

impl LutronConfig {
    /// Returns the configuration for a target name.
    #[must_use]
    pub fn target(&self, name: &str) -> &TargetConfig {
        self.targets.get(name).unwrap_or(&self.defaults)
    }
}

/// How a session retries a controller it cannot reach.
///
/// The first retry waits `min_delay`; each later one waits twice as long,
/// up to `max_delay`.
///
/// ```
/// use std::time::Duration;
/// use porter_lib::manager::ReconnectionPolicy;
///
/// let policy: ReconnectionPolicy = serde_json::from_str(r#"{"max_attempts": 5}"#).unwrap();
/// assert_eq!(policy.delay(3), Duration::from_secs(8));
/// assert!(policy.gives_up_after(5));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectionPolicy {
    /// Whether a session retries at all.
    pub enabled: bool,
    /// Failed attempts before giving up; unlimited when absent.
    pub max_attempts: Option<u32>,
    /// Delay before the first retry.
    #[serde(with = "secs")]
    pub min_delay: Duration,
    /// Delay cap.
    #[serde(with = "secs")]
    pub max_delay: Duration,
}

impl ReconnectionPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Delay after the failed attempt numbered `attempt`, counting from 0.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1_u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.min_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Returns true once `attempts` failures are enough to stop.
    #[must_use]
    pub fn gives_up_after(&self, attempts: u32) -> bool {
        !self.enabled || self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

impl Default for ReconnectionPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: None,
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// Durations as fractional seconds.
mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
