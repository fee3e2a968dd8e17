// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! One controller connection and the state it keeps fresh.
//!
//! A [`Session`] runs three kinds of scheduled work:
//!
//! | Task | Runs | Does |
//! |---|---|---|
//! | poll | forever | read a frame, apply it, report it, repeat |
//! | keepalive | forever | ping after a quiet period |
//! | query levels | once | open and ask for every dimmer's level |

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::{Value, json};
use tokio::time::Instant;

use crate::brainstem::{EventSink, json_number};
use crate::directory::DeviceDirectory;
use crate::manager::{ReconnectionPolicy, Target, TargetConfig};
use crate::protocol::{ConnectionState, Endpoint, Frame, FrameKind, OutputAction, ProtocolConnection};
use crate::scheduler::Task;
use crate::state::{MetricsSnapshot, MetricsState, StateChange};

/// A live controller session.
pub struct Session {
    names: RwLock<Vec<String>>,
    target: Target,
    endpoint: Endpoint,
    connection: ProtocolConnection,
    directory: Arc<DeviceDirectory>,
    metrics: MetricsState,
    keepalive: Duration,
    reconnection: ReconnectionPolicy,
    reconnect_attempts: AtomicU32,
    last_traffic: Mutex<Instant>,
    events: Option<Arc<dyn EventSink>>,
}

impl Session {
    /// Creates a closed session with every dimmer's level unknown.
    pub fn new(
        name: impl Into<String>,
        target: Target,
        config: &TargetConfig,
        directory: Arc<DeviceDirectory>,
        events: Option<Arc<dyn EventSink>>,
    ) -> Self {
        let mut connection = ProtocolConnection::new(config.system)
            .with_connect_timeout(config.connect_timeout());
        if let Some(prompt) = &config.prompt {
            connection = connection.with_prompt(prompt);
        }
        let metrics = MetricsState::new(directory.dimmers().keys().copied());
        let name = name.into();
        tracing::info!(target = %target, name = %name, family = %config.system, "New controller session");

        Self {
            names: RwLock::new(vec![name]),
            endpoint: config.endpoint(&target),
            target,
            connection,
            directory,
            metrics,
            keepalive: config.keepalive(),
            reconnection: config.reconnection.clone(),
            reconnect_attempts: AtomicU32::new(0),
            last_traffic: Mutex::new(Instant::now()),
            events,
        }
    }

    /// Returns the names events are reported under, in order of first use.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.names.read().clone()
    }

    /// Also reports events under `name`.
    pub fn add_name(&self, name: &str) {
        let mut names = self.names.write();
        if !names.iter().any(|n| n == name) {
            tracing::debug!(target = %self.target, name = %name, "Session shared by another name");
            names.push(name.to_string());
        }
    }

    /// Returns the controller address.
    #[must_use]
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Returns the connection.
    #[must_use]
    pub fn connection(&self) -> &ProtocolConnection {
        &self.connection
    }

    /// Returns the device directory.
    #[must_use]
    pub fn directory(&self) -> &Arc<DeviceDirectory> {
        &self.directory
    }

    /// Returns the live scrape state.
    #[must_use]
    pub fn metrics(&self) -> &MetricsState {
        &self.metrics
    }

    /// Copies the scrape state.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Opens the connection if it is closed.
    pub async fn open(&self) {
        self.connection.open(&self.endpoint).await;
        if self.connection.is_connected() {
            self.touch();
        }
    }

    /// Returns the perpetual read loop.
    #[must_use]
    pub fn poll_task(self: Arc<Self>) -> Task {
        Task::new(format!("poll {}", self.target), async move {
            if self.poll_once().await {
                Ok(Some(self.poll_task()))
            } else {
                Ok(None)
            }
        })
    }

    /// Returns the perpetual keepalive loop.
    #[must_use]
    pub fn keepalive_task(self: Arc<Self>) -> Task {
        Task::new(format!("keepalive {}", self.target), async move {
            loop {
                let due = *self.last_traffic.lock() + self.keepalive;
                if Instant::now() >= due {
                    break;
                }
                tokio::time::sleep_until(due).await;
            }
            self.touch();
            self.connection.ping().await;
            Ok(Some(self.keepalive_task()))
        })
    }

    /// Returns the one-time level query.
    #[must_use]
    pub fn query_levels_task(self: Arc<Self>) -> Task {
        Task::new(format!("query levels {}", self.target), async move {
            self.open().await;
            for id in self.metrics.tracked_outputs() {
                self.connection
                    .query("OUTPUT", id, OutputAction::Set.code())
                    .await;
            }
            Ok(None)
        })
    }

    /// Reads and handles one frame. Returns false once reconnecting is
    /// given up.
    async fn poll_once(&self) -> bool {
        if self.connection.state() == ConnectionState::Closed {
            return self.reconnect().await;
        }
        // An opening connection holds the read lock until it settles.
        if let Some(frame) = self.connection.read().await {
            self.handle_frame(&frame);
        }
        true
    }

    async fn reconnect(&self) -> bool {
        self.open().await;
        if self.connection.is_connected() {
            self.reconnect_attempts.store(0, Ordering::Relaxed);
            return true;
        }

        let attempt = self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
        if self.reconnection.gives_up_after(attempt) {
            tracing::error!(target = %self.target, attempts = attempt, "Giving up on controller");
            return false;
        }
        let delay = self.reconnection.delay(attempt);
        tracing::info!(
            target = %self.target,
            attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "Controller unreachable, retrying"
        );
        tokio::time::sleep(delay).await;
        true
    }

    fn handle_frame(&self, frame: &Frame) {
        if matches!(
            frame.kind,
            FrameKind::Device | FrameKind::Output | FrameKind::ShadeGroup
        ) {
            self.touch();
        }
        if let Some(change) = StateChange::from_frame(frame) {
            self.metrics.apply(&change);
        }
        if let Some(events) = &self.events {
            let selector = self.selector(frame);
            for name in self.names() {
                events.emit(&name, selector.clone());
            }
        }
    }

    /// `[address, name, kind, action, value]`; the name is the scene name
    /// for bridge buttons.
    fn selector(&self, frame: &Frame) -> Value {
        let name = match (frame.address.is_bridge(), &frame.kind, frame.action_code()) {
            (true, FrameKind::Device, Some(scene)) => self.directory.scene_name(scene).unwrap_or(""),
            _ => self.directory.device_labels(frame.address).0,
        };
        json!([
            frame.address.value(),
            name,
            frame.kind.as_str(),
            json_number(frame.action),
            frame.value.map_or(Value::Null, json_number),
        ])
    }

    fn touch(&self) {
        *self.last_traffic.lock() = Instant::now();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("names", &*self.names.read())
            .field("target", &self.target)
            .field("connection", &self.connection)
            .field("keepalive", &self.keepalive)
            .finish_non_exhaustive()
    }
}
