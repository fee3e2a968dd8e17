// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Lutron module: scrapes and commands.
//!
//! [`LutronClient`] is what the bridge process talks to. Scrapes go through
//! [`LutronClient::collect`], which never blocks on the network, and
//! reactions reach controllers through its [`Runnable`] implementation:
//!
//! | Command | Arguments | Lip | Illumination |
//! |---|---|---|---|
//! | `setlevel` | `level [fade]` | `#OUTPUT,id,1,level[,fade]` | `FADEDIM,level,fade,0,addr` |
//! | `press` | `component` | `#DEVICE,id,c,3` then `,4` | `KBP,addr,c` then `KBR,addr,c` |
//!
//! A `press` whose selector names a scene presses that scene's button on
//! the bridge and takes no argument.

use std::sync::Arc;
use std::time::Duration;

use prometheus::proto::MetricFamily;
use prometheus::{Gauge, GaugeVec, IntCounterVec, Opts, Registry};
use serde_json::Value;

use crate::brainstem::Runnable;
use crate::directory::{DeviceDirectory, DirectoryEntry};
use crate::error::{DispatchError, Error, Result, ValueError};
use crate::manager::{LutronConfig, Session, SessionManager};
use crate::protocol::address::encode_grouped;
use crate::protocol::{ButtonEvent, ConnectionState, ControllerFamily, OutputAction, as_code};
use crate::scheduler::BoxFuture;
use crate::types::{IntegrationId, Level};

/// Scrape and command entry point for all configured controllers.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use porter_lib::LutronClient;
/// use porter_lib::manager::LutronConfig;
///
/// # async fn example() -> porter_lib::Result<()> {
/// let client = LutronClient::new(LutronConfig::default());
///
/// // First scrape registers the target and returns nothing yet.
/// assert!(client.collect("192.168.1.20").is_empty());
///
/// client.drive_once(Duration::from_secs(1)).await?;
/// for family in client.collect("192.168.1.20") {
///     println!("{}: {} samples", family.get_name(), family.get_metric().len());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct LutronClient {
    manager: Arc<SessionManager>,
    config: LutronConfig,
}

impl LutronClient {
    /// Creates a client with its own session manager.
    #[must_use]
    pub fn new(config: LutronConfig) -> Self {
        Self::with_manager(Arc::new(SessionManager::new()), config)
    }

    /// Creates a client on an existing session manager.
    #[must_use]
    pub fn with_manager(manager: Arc<SessionManager>, config: LutronConfig) -> Self {
        Self { manager, config }
    }

    /// Returns the session manager.
    #[must_use]
    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &LutronConfig {
        &self.config
    }

    /// Registers a target with its configured (or default) settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the name or its directory is invalid.
    pub fn register(&self, target: &str) -> Result<()> {
        self.manager
            .register_target(target, self.config.target(target).clone())
    }

    /// Runs session and reaction tasks for up to `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskFailed`] if a task failed.
    pub async fn drive_once(&self, timeout: Duration) -> Result<usize> {
        self.manager.drive_once(timeout).await
    }

    /// Gathers the metrics of one target.
    ///
    /// The first scrape of a target registers it; a target without a
    /// session yet renders nothing. Encode the result with
    /// [`prometheus::TextEncoder`].
    #[must_use]
    pub fn collect(&self, target: &str) -> Vec<MetricFamily> {
        if let Err(e) = self.register(target) {
            tracing::warn!(target = %target, error = %e, "Cannot scrape target");
            return Vec::new();
        }
        let Some(session) = self.manager.session(target) else {
            return Vec::new();
        };
        render(&session).unwrap_or_else(|e| {
            tracing::error!(target = %target, error = %e, "Cannot render metrics");
            Vec::new()
        })
    }

    fn session(&self, target: &str) -> Result<Arc<Session>> {
        self.register(target)?;
        self.manager.ensure_connection(target)
    }

    async fn set_level(&self, target: &str, selector: &Value, args: &[Value]) -> Result<()> {
        let session = self.session(target)?;
        let id = match resolve(session.directory(), selector) {
            Some(DirectoryEntry::Device(device))
                if session.directory().dimmer(device.id).is_some() =>
            {
                device.id
            }
            _ => return Err(no_match(target, selector)),
        };
        let level = Level::new(number_arg("setlevel", args.first())?)?;
        let fade = args
            .get(1)
            .map(|fade| number_arg("setlevel", Some(fade)))
            .transpose()?;

        ensure_open(&session).await;
        let connection = session.connection();
        let level = level.to_string();
        match connection.family() {
            ControllerFamily::Lip => {
                let fade = fade.map(format_number);
                let args: Vec<&str> = fade.iter().map(String::as_str).collect();
                connection
                    .write("OUTPUT", id, OutputAction::Set.code(), Some(&level), &args)
                    .await;
            }
            ControllerFamily::Illumination => {
                let fade = format_number(fade.unwrap_or(0.0));
                connection
                    .send_fields(&["FADEDIM", &level, &fade, "0", &encode_grouped(id)])
                    .await;
            }
        }
        Ok(())
    }

    async fn press(&self, target: &str, selector: &Value, args: &[Value]) -> Result<()> {
        let session = self.session(target)?;
        let (id, component) = match resolve(session.directory(), selector) {
            Some(DirectoryEntry::Scene(scene)) => (IntegrationId::BRIDGE, scene.id),
            Some(DirectoryEntry::Device(device)) => {
                (device.id, component_arg(args.first())?)
            }
            None => return Err(no_match(target, selector)),
        };

        ensure_open(&session).await;
        let connection = session.connection();
        match connection.family() {
            ControllerFamily::Lip => {
                for event in [ButtonEvent::Press, ButtonEvent::Release] {
                    let code = event.code().to_string();
                    connection
                        .write("DEVICE", id, component, Some(&code), &[])
                        .await;
                }
            }
            ControllerFamily::Illumination => {
                let address = encode_grouped(id);
                let component = component.to_string();
                for mode in ["KBP", "KBR"] {
                    connection.send_fields(&[mode, &address, &component]).await;
                }
            }
        }
        Ok(())
    }
}

impl Runnable for LutronClient {
    fn run<'a>(
        &'a self,
        target: &'a str,
        selector: &'a Value,
        command: &'a str,
        args: &'a [Value],
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            tracing::debug!(target = %target, selector = %selector, command = %command, "Running command");
            match command {
                "setlevel" => self.set_level(target, selector, args).await,
                "press" => self.press(target, selector, args).await,
                _ => Err(DispatchError::UnknownCommand {
                    target: target.to_string(),
                    command: command.to_string(),
                }
                .into()),
            }
        })
    }
}

/// Opens a session that has not connected yet. Writes on a closed
/// connection are dropped by the connection itself.
async fn ensure_open(session: &Session) {
    session.open().await;
    if session.connection().state() == ConnectionState::Closed {
        tracing::warn!(target = %session.target(), "Controller not connected, command dropped");
    }
}

/// Builds a throwaway registry from the session's snapshot.
fn render(session: &Session) -> prometheus::Result<Vec<MetricFamily>> {
    let snapshot = session.snapshot();
    let directory = session.directory();
    let registry = Registry::new();

    let levels = GaugeVec::new(
        Opts::new("output_level_pct", "Output level in percent"),
        &["deviceid", "name", "area"],
    )?;
    registry.register(Box::new(levels.clone()))?;
    for (id, level) in &snapshot.levels {
        let (name, area) = directory.device_labels(*id);
        let id = id.to_string();
        levels
            .get_metric_with_label_values(&[id.as_str(), name, area])?
            .set(*level);
    }

    let presses = IntCounterVec::new(
        Opts::new("press_actions", "Button presses and scene activations"),
        &["deviceid", "name", "button", "area", "scene_number"],
    )?;
    registry.register(Box::new(presses.clone()))?;
    for (scene, count) in &snapshot.scene_presses {
        let name = directory.scene_name(*scene).unwrap_or_default();
        let scene = scene.to_string();
        presses
            .get_metric_with_label_values(&["", name, "", "", scene.as_str()])?
            .inc_by(*count);
    }
    for ((id, component), count) in &snapshot.device_presses {
        let (name, area) = directory.device_labels(*id);
        let (id, component) = (id.to_string(), component.to_string());
        presses
            .get_metric_with_label_values(&[id.as_str(), name, component.as_str(), area, ""])?
            .inc_by(*count);
    }

    let created = Gauge::with_opts(Opts::new(
        "press_actions_created",
        "Unix time the press counters started",
    ))?;
    // Safe: millisecond timestamps stay far below 2^53.
    #[allow(clippy::cast_precision_loss)]
    let started = snapshot.created.timestamp_millis() as f64 / 1000.0;
    created.set(started);
    registry.register(Box::new(created))?;

    Ok(registry.gather())
}

fn resolve<'d>(directory: &'d DeviceDirectory, selector: &Value) -> Option<DirectoryEntry<'d>> {
    match selector {
        Value::Number(n) => directory.find(&n.as_u64()?.to_string()),
        Value::String(s) => directory.find(s),
        _ => None,
    }
}

fn no_match(target: &str, selector: &Value) -> Error {
    DispatchError::NoMatch {
        target: target.to_string(),
        selector: selector.to_string(),
    }
    .into()
}

fn number_arg(command: &str, arg: Option<&Value>) -> Result<f64> {
    let parsed = match arg {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        ValueError::InvalidArgument {
            command: command.to_string(),
            message: format!("expected a number, got {}", arg.unwrap_or(&Value::Null)),
        }
        .into()
    })
}

fn component_arg(arg: Option<&Value>) -> Result<u32> {
    let component = number_arg("press", arg)?;
    as_code(component).ok_or_else(|| {
        ValueError::InvalidArgument {
            command: "press".to_string(),
            message: format!("{component} is not a component number"),
        }
        .into()
    })
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}
