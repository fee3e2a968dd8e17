// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Session manager implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::brainstem::EventSink;
use crate::directory::DeviceDirectory;
use crate::error::{Error, Result};
use crate::manager::{Session, Target, TargetConfig};
use crate::scheduler::{Scheduler, TaskSender};
use crate::state::MetricsSnapshot;

/// A target name's resolved configuration.
#[derive(Debug, Clone)]
struct Registration {
    target: Target,
    config: TargetConfig,
    directory: Arc<DeviceDirectory>,
}

/// Owns one [`Session`] per controller and drives their tasks.
///
/// Registration and scrapes are synchronous and cheap; all network work
/// happens inside [`Self::drive_once`].
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use porter_lib::manager::{SessionManager, TargetConfig};
///
/// # async fn example() -> porter_lib::Result<()> {
/// let manager = SessionManager::new();
/// manager.register_target("192.168.1.20", TargetConfig::default())?;
///
/// loop {
///     manager.drive_once(Duration::from_secs(1)).await?;
///     if let Some(snapshot) = manager.snapshot("192.168.1.20") {
///         println!("{} outputs known", snapshot.levels.len());
///     }
/// }
/// # }
/// ```
pub struct SessionManager {
    registrations: RwLock<HashMap<String, Registration>>,
    sessions: RwLock<HashMap<Target, Arc<Session>>>,
    events: RwLock<Option<Arc<dyn EventSink>>>,
    scheduler: Mutex<Scheduler>,
    sender: TaskSender,
}

impl SessionManager {
    /// Creates a manager with no targets.
    #[must_use]
    pub fn new() -> Self {
        let scheduler = Scheduler::new();
        let sender = scheduler.sender();
        Self {
            registrations: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            events: RwLock::new(None),
            scheduler: Mutex::new(scheduler),
            sender,
        }
    }

    /// Returns a handle for scheduling extra tasks alongside the sessions.
    #[must_use]
    pub fn sender(&self) -> TaskSender {
        self.sender.clone()
    }

    /// Sets where sessions created from now on report their frames.
    pub fn set_event_sink(&self, sink: Arc<dyn EventSink>) {
        *self.events.write() = Some(sink);
    }

    /// Registers a target name. Later registrations of the same name are
    /// ignored.
    ///
    /// Reactions are matched against the name, so a controller registered
    /// under two names reports every event under both.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the name is not `host[:port]`, and
    /// `Error::Parse` or `Error::Config` if the directory cannot be built.
    pub fn register_target(&self, name: &str, config: TargetConfig) -> Result<()> {
        if self.registrations.read().contains_key(name) {
            return Ok(());
        }
        let target: Target = name.parse()?;
        let directory = Arc::new(config.directory()?);
        tracing::debug!(
            name = %name,
            target = %target,
            dimmers = directory.dimmers().len(),
            sensors = directory.sensors().len(),
            scenes = directory.scenes().len(),
            "Registered target"
        );
        self.registrations
            .write()
            .entry(name.to_string())
            .or_insert(Registration {
                target,
                config,
                directory,
            });
        Ok(())
    }

    /// Returns true if the name was registered.
    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.registrations.read().contains_key(name)
    }

    /// Returns the directory for a registered name.
    #[must_use]
    pub fn directory(&self, name: &str) -> Option<Arc<DeviceDirectory>> {
        self.registrations
            .read()
            .get(name)
            .map(|r| Arc::clone(&r.directory))
    }

    /// Returns the session for a name, creating it and scheduling its tasks
    /// on first use.
    ///
    /// Names resolving to the same `(host, port)` share a session, which
    /// reports each event once per name. The configuration and directory
    /// of the name that created it are used.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTarget`] if the name was never registered.
    pub fn ensure_connection(&self, name: &str) -> Result<Arc<Session>> {
        let registration = self
            .registrations
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownTarget(name.to_string()))?;

        let mut sessions = self.sessions.write();
        if let Some(session) = sessions.get(&registration.target) {
            session.add_name(name);
            return Ok(Arc::clone(session));
        }

        let session = Arc::new(Session::new(
            name,
            registration.target.clone(),
            &registration.config,
            registration.directory,
            self.events.read().clone(),
        ));
        sessions.insert(registration.target, Arc::clone(&session));
        drop(sessions);

        self.sender.submit(Arc::clone(&session).query_levels_task());
        self.sender.submit(Arc::clone(&session).poll_task());
        self.sender.submit(Arc::clone(&session).keepalive_task());
        Ok(session)
    }

    /// Starts sessions for new registrations, then waits up to `timeout`
    /// for the first task to complete.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskFailed`] if a task failed; the caller should
    /// exit.
    pub async fn drive_once(&self, timeout: Duration) -> Result<usize> {
        let names: Vec<String> = self.registrations.read().keys().cloned().collect();
        for name in names {
            self.ensure_connection(&name)?;
        }
        self.scheduler.lock().await.drive_once(timeout).await
    }

    /// Returns the session serving a name, if it exists.
    #[must_use]
    pub fn session(&self, name: &str) -> Option<Arc<Session>> {
        let target = match self.registrations.read().get(name) {
            Some(registration) => registration.target.clone(),
            None => name.parse().ok()?,
        };
        self.sessions.read().get(&target).cloned()
    }

    /// Copies a session's scrape state without touching the network.
    #[must_use]
    pub fn snapshot(&self, name: &str) -> Option<MetricsSnapshot> {
        self.session(name).map(|session| session.snapshot())
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("targets", &self.registrations.read().keys().collect::<Vec<_>>())
            .field("sessions", &self.sessions.read().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::ConfigError;

    fn config() -> TargetConfig {
        serde_json::from_value(json!({
            "scenes": {"42": "Movie Time"},
            "areas": {"Living": [[23, "Pendants"]]}
        }))
        .unwrap()
    }

    #[test]
    fn unknown_target() {
        let manager = SessionManager::new();

        assert!(matches!(
            manager.ensure_connection("nowhere"),
            Err(Error::UnknownTarget(_))
        ));
        assert!(manager.snapshot("nowhere").is_none());
    }

    #[test]
    fn invalid_target_name() {
        let manager = SessionManager::new();
        assert!(matches!(
            manager.register_target("host:port", config()),
            Err(Error::Config(ConfigError::InvalidTarget(_)))
        ));
        assert!(!manager.is_registered("host:port"));
    }

    #[test]
    fn first_registration_wins() {
        let manager = SessionManager::new();
        manager.register_target("qs.local", config()).unwrap();
        manager
            .register_target("qs.local", TargetConfig::default())
            .unwrap();

        let directory = manager.directory("qs.local").unwrap();
        assert_eq!(directory.scene_name(42), Some("Movie Time"));
    }

    #[tokio::test]
    async fn names_for_same_controller_share_a_session() {
        let manager = SessionManager::new();
        manager.register_target("qs.local", config()).unwrap();
        manager.register_target("qs.local:23", config()).unwrap();

        let a = manager.ensure_connection("qs.local").unwrap();
        let b = manager.ensure_connection("qs.local:23").unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.names(), ["qs.local", "qs.local:23"]);
    }

    #[tokio::test]
    async fn new_session_has_empty_snapshot() {
        let manager = SessionManager::new();
        manager.register_target("qs.local", config()).unwrap();
        manager.ensure_connection("qs.local").unwrap();

        let snapshot = manager.snapshot("qs.local").unwrap();
        assert!(snapshot.levels.is_empty());
        assert!(snapshot.scene_presses.is_empty());
    }
}
