// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The reaction engine.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use prometheus::proto::MetricFamily;
use prometheus::{Gauge, Opts, Registry};
use serde_json::Value;
use tokio::time::Instant;

use crate::brainstem::action::{self, ActionStep, Dispatch};
use crate::brainstem::history::{Direction, EventHistory, HistoryEntry};
use crate::brainstem::timers::{Timer, TimerScheduler, Wake};
use crate::brainstem::{BrainstemConfig, EventPropagator, Runnable, selector_matches};
use crate::error::{ConfigError, DispatchError, Result};
use crate::scheduler::{BoxFuture, Task, TaskSender};

/// An action chosen by a reaction, not yet run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction {
    action: String,
}

impl PendingAction {
    /// Returns the action name.
    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every step ran.
    Completed,
    /// A rate limit stopped the run early.
    RateLimited,
}

type Reactions = HashMap<String, HashMap<String, Vec<(Value, String)>>>;

/// Matches events to reactions and runs action sequences.
///
/// Modules are held weakly; dropping a module makes dispatches to it fail
/// with [`DispatchError::ModuleDropped`].
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use porter_lib::brainstem::{BrainstemConfig, ReactionEngine};
///
/// let config: BrainstemConfig = serde_json::from_value(json!({
///     "reactions": [["lutron", "qs", [0, ["Goodnight"], "DEVICE", 1, 3], "bedtime"]],
///     "actions": {"bedtime": [["lutron", "qs", "Laundry", "setlevel", 0]]}
/// })).unwrap();
/// let engine = ReactionEngine::from_config(&config).unwrap();
///
/// let pending = engine.observe_event("lutron", "qs", &json!([40, "Goodnight", "DEVICE", 1, 3]));
/// assert_eq!(pending.unwrap().action(), "bedtime");
/// ```
pub struct ReactionEngine {
    actions: BTreeMap<String, Vec<ActionStep>>,
    reactions: Reactions,
    timers: Mutex<TimerScheduler>,
    modules: RwLock<HashMap<String, Weak<dyn Runnable>>>,
    last_completed: Mutex<HashMap<String, Instant>>,
    history: Mutex<EventHistory>,
}

impl ReactionEngine {
    /// Builds an engine, validating the whole configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for bad timers, malformed or cyclic actions,
    /// references to unknown actions, and duplicate reaction selectors.
    pub fn from_config(config: &BrainstemConfig) -> Result<Self> {
        Self::from_config_at(config, Utc::now())
    }

    /// Like [`Self::from_config`], with an explicit current time for timers.
    ///
    /// # Errors
    ///
    /// See [`Self::from_config`].
    pub fn from_config_at(config: &BrainstemConfig, now: DateTime<Utc>) -> Result<Self> {
        let actions = action::resolve(&config.actions)?;

        let mut timers = Vec::with_capacity(config.timers.len());
        for (spec, name) in &config.timers {
            known_action(&actions, name)?;
            timers.push(Timer::new(spec.to_time()?, name.clone()));
        }

        let mut reactions: Reactions = HashMap::new();
        for (module, target, selector, name) in &config.reactions {
            known_action(&actions, name)?;
            let registered = reactions
                .entry(module.clone())
                .or_default()
                .entry(target.clone())
                .or_default();
            if registered.iter().any(|(existing, _)| existing == selector) {
                return Err(ConfigError::DuplicateReaction {
                    module: module.clone(),
                    target: target.clone(),
                    selector: selector.to_string(),
                }
                .into());
            }
            registered.push((selector.clone(), name.clone()));
        }

        tracing::debug!(
            actions = actions.len(),
            timers = timers.len(),
            reactions = config.reactions.len(),
            "Brainstem configured"
        );

        Ok(Self {
            actions,
            reactions,
            timers: Mutex::new(TimerScheduler::new(timers, now)),
            modules: RwLock::new(HashMap::new()),
            last_completed: Mutex::new(HashMap::new()),
            history: Mutex::new(EventHistory::default()),
        })
    }

    /// Registers a module for dispatch.
    ///
    /// If a previous registration exists for this name, it is replaced.
    pub fn register_module<R: Runnable + 'static>(&self, name: impl Into<String>, module: &Arc<R>) {
        let name = name.into();
        tracing::debug!(module = %name, "Registering module");
        let module: Weak<dyn Runnable> = Arc::<R>::downgrade(module);
        self.modules.write().insert(name, module);
    }

    /// Checks that every module an action dispatches to is registered.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownModule`] for the first missing module.
    pub fn verify_modules(&self) -> Result<()> {
        let modules = self.modules.read();
        for (name, steps) in &self.actions {
            for step in steps {
                if let ActionStep::Dispatch(dispatch) = step
                    && !modules.contains_key(&dispatch.module)
                {
                    return Err(ConfigError::UnknownModule {
                        action: name.clone(),
                        module: dispatch.module.clone(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Creates a propagator that reports events for `module`.
    #[must_use]
    pub fn propagator(self: &Arc<Self>, module: impl Into<String>, sender: TaskSender) -> EventPropagator {
        EventPropagator::new(Arc::clone(self), module, sender)
    }

    /// Records an event and returns the first matching reaction.
    pub fn observe_event(&self, module: &str, target: &str, selector: &Value) -> Option<PendingAction> {
        tracing::debug!(module = %module, target = %target, selector = %selector, "Observed event");
        self.record(Direction::Observed, module, vec![Value::from(target), selector.clone()]);

        self.reactions
            .get(module)?
            .get(target)?
            .iter()
            .find(|(registered, _)| selector_matches(registered, selector))
            .map(|(_, action)| PendingAction {
                action: action.clone(),
            })
    }

    /// Runs an action's steps in order.
    ///
    /// A rate-limit step ends this run early, reporting
    /// [`RunOutcome::RateLimited`], when the action last completed less than
    /// the limit ago. Nested actions are rate limited on their own.
    ///
    /// # Errors
    ///
    /// Returns the first step error; later steps do not run.
    pub fn run_action<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<RunOutcome>> {
        Box::pin(async move {
            let steps = self
                .actions
                .get(name)
                .ok_or_else(|| ConfigError::UnknownAction(name.to_string()))?;
            self.record(Direction::Run, name, Vec::new());
            tracing::debug!(action = %name, "Running action");

            for step in steps {
                match step {
                    ActionStep::Nested(nested) => {
                        self.run_action(nested).await?;
                    }
                    ActionStep::RateLimit(limit) => {
                        let last = self.last_completed.lock().get(name).copied();
                        if last.is_some_and(|last| last.elapsed() < *limit) {
                            tracing::info!(
                                action = %name,
                                limit_secs = limit.as_secs_f64(),
                                "Action rate limited"
                            );
                            return Ok(RunOutcome::RateLimited);
                        }
                    }
                    ActionStep::Dispatch(dispatch) => {
                        self.dispatch(dispatch).await.inspect_err(|e| {
                            tracing::error!(
                                action = %name,
                                module = %dispatch.module,
                                target = %dispatch.target,
                                command = %dispatch.command,
                                error = %e,
                                "Action step failed"
                            );
                        })?;
                    }
                }
            }

            self.last_completed.lock().insert(name.to_string(), Instant::now());
            Ok(RunOutcome::Completed)
        })
    }

    async fn dispatch(&self, dispatch: &Dispatch) -> Result<()> {
        let module = self.modules.read().get(&dispatch.module).cloned();
        let module = module
            .ok_or_else(|| DispatchError::UnknownModule(dispatch.module.clone()))?
            .upgrade()
            .ok_or_else(|| DispatchError::ModuleDropped(dispatch.module.clone()))?;
        module
            .run(&dispatch.target, &dispatch.selector, &dispatch.command, &dispatch.args)
            .await
    }

    /// Returns a one-shot task running `action`.
    ///
    /// A failing action fails the task, and with it the scheduler.
    #[must_use]
    pub fn action_task(self: Arc<Self>, action: &str) -> Task {
        let action = action.to_string();
        Task::new(format!("action {action}"), async move {
            self.run_action(&action).await?;
            Ok(None)
        })
    }

    /// Returns the perpetual timer task.
    #[must_use]
    pub fn timer_task(self: Arc<Self>) -> Task {
        Task::new("brainstem timers", async move {
            let wake = self.timers.lock().next_deadline(Utc::now());
            match wake {
                Wake::Sleep(duration) => tokio::time::sleep(duration).await,
                Wake::Fire(fired) => {
                    for timer in fired {
                        self.run_action(&timer.action).await?;
                    }
                }
            }
            Ok(Some(self.timer_task()))
        })
    }

    /// Returns recent runs and observations, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history.lock().iter().cloned().collect()
    }

    /// Renders the history as gauges: 1 for runs, 0 for observations.
    ///
    /// Each family is named `event<n>` and described by its entry.
    #[must_use]
    pub fn collect(&self) -> Vec<MetricFamily> {
        let registry = Registry::new();
        for (n, entry) in self.history().iter().enumerate() {
            let registered = Gauge::with_opts(Opts::new(format!("event{n}"), entry.to_string()))
                .and_then(|gauge| {
                    gauge.set(if entry.direction == Direction::Run { 1.0 } else { 0.0 });
                    registry.register(Box::new(gauge))
                });
            if let Err(e) = registered {
                tracing::warn!(entry = %entry, error = %e, "Cannot render history entry");
            }
        }
        registry.gather()
    }

    fn record(&self, direction: Direction, name: &str, args: Vec<Value>) {
        self.history.lock().push(HistoryEntry {
            at: Utc::now(),
            direction,
            name: name.to_string(),
            args,
        });
    }
}

impl fmt::Debug for ReactionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactionEngine")
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .field("timers", &*self.timers.lock())
            .field("modules", &self.modules.read().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

fn known_action(
    actions: &BTreeMap<String, Vec<ActionStep>>,
    name: &str,
) -> std::result::Result<(), ConfigError> {
    if actions.contains_key(name) {
        Ok(())
    } else {
        Err(ConfigError::UnknownAction(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::error::Error;
    use crate::scheduler::Scheduler;

    /// Records every command it is asked to run.
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    impl Runnable for Recorder {
        fn run<'a>(
            &'a self,
            target: &'a str,
            selector: &'a Value,
            command: &'a str,
            args: &'a [Value],
        ) -> BoxFuture<'a, Result<()>> {
            Box::pin(async move {
                if self.fail_on == Some(command) {
                    return Err(DispatchError::UnknownCommand {
                        target: target.to_string(),
                        command: command.to_string(),
                    }
                    .into());
                }
                self.calls
                    .lock()
                    .push(format!("{target} {selector} {command} {}", Value::from(args.to_vec())));
                Ok(())
            })
        }
    }

    fn engine(config: Value) -> ReactionEngine {
        ReactionEngine::from_config(&serde_json::from_value(config).unwrap()).unwrap()
    }

    fn config_error(config: Value) -> ConfigError {
        match ReactionEngine::from_config(&serde_json::from_value(config).unwrap()) {
            Err(Error::Config(e)) => e,
            other => panic!("expected a config error, got {other:?}"),
        }
    }

    #[test]
    fn first_matching_reaction_wins() {
        let engine = engine(json!({
            "reactions": [
                ["lutron", "qs", [0, ["Goodnight", "Sleep"], "DEVICE", 1, 3], "bedtime"],
                ["lutron", "qs", [40, "", "DEVICE", 1, 3], "other"]
            ],
            "actions": {"bedtime": [["ratelimit", 1]], "other": [["ratelimit", 1]]}
        }));

        let pending = engine.observe_event("lutron", "qs", &json!([40, "Sleep", "DEVICE", 1, 3]));
        assert_eq!(pending.unwrap().action(), "bedtime");

        let pending = engine.observe_event("lutron", "qs", &json!([40, "Pico", "DEVICE", 1, 3]));
        assert_eq!(pending.unwrap().action(), "other");

        assert!(engine.observe_event("lutron", "hw", &json!([40, "Sleep", "DEVICE", 1, 3])).is_none());
        assert!(engine.observe_event("rinnai", "qs", &json!([40, "Sleep", "DEVICE", 1, 3])).is_none());
    }

    #[test]
    fn config_errors() {
        assert!(matches!(
            config_error(json!({"timers": [[40000, "missing"]]})),
            ConfigError::UnknownAction(_)
        ));
        assert!(matches!(
            config_error(json!({"timers": [[250000, "a"]], "actions": {"a": [["ratelimit", 1]]}})),
            ConfigError::InvalidTimer(_)
        ));
        assert!(matches!(
            config_error(json!({
                "reactions": [["m", "t", [1], "a"], ["m", "t", [1], "a"]],
                "actions": {"a": [["ratelimit", 1]]}
            })),
            ConfigError::DuplicateReaction { .. }
        ));
        assert!(matches!(
            config_error(json!({"reactions": [["m", "t", [1], "nope"]]})),
            ConfigError::UnknownAction(_)
        ));
    }

    #[test]
    fn verify_modules_reports_missing() {
        let engine = engine(json!({
            "actions": {"a": [["lutron", "qs", "Laundry", "setlevel", 0]]}
        }));
        assert!(matches!(
            engine.verify_modules(),
            Err(Error::Config(ConfigError::UnknownModule { ref module, .. })) if module == "lutron"
        ));

        let recorder = Arc::new(Recorder::default());
        engine.register_module("lutron", &recorder);
        assert!(engine.verify_modules().is_ok());
    }

    #[tokio::test]
    async fn steps_run_in_order_through_nested_actions() {
        let engine = engine(json!({
            "actions": {
                "bedtime": [["m", "t", "Laundry", "off"], "hall", ["m", "t", "Porch", "on", 5]],
                "hall": [["m", "t", "Hall", "dim", 10]]
            }
        }));
        let recorder = Arc::new(Recorder::default());
        engine.register_module("m", &recorder);

        let outcome = engine.run_action("bedtime").await.unwrap();

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(
            *recorder.calls.lock(),
            vec![
                r#"t "Laundry" off []"#,
                r#"t "Hall" dim [10]"#,
                r#"t "Porch" on [5]"#,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_skips_later_steps() {
        let engine = engine(json!({
            "actions": {"a": [["m", "t", "x", "before"], ["ratelimit", 10], ["m", "t", "x", "after"]]}
        }));
        let recorder = Arc::new(Recorder::default());
        engine.register_module("m", &recorder);

        assert_eq!(engine.run_action("a").await.unwrap(), RunOutcome::Completed);
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(engine.run_action("a").await.unwrap(), RunOutcome::RateLimited);

        let commands: Vec<_> = recorder
            .calls
            .lock()
            .iter()
            .map(|c| c.split(' ').nth(2).unwrap_or_default().to_string())
            .collect();
        assert_eq!(commands, vec!["before", "after", "before"]);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(engine.run_action("a").await.unwrap(), RunOutcome::Completed);
    }

    #[tokio::test]
    async fn failing_step_stops_the_run() {
        let engine = engine(json!({
            "actions": {"a": [["m", "t", "x", "explode"], ["m", "t", "x", "after"]]}
        }));
        let recorder = Arc::new(Recorder {
            fail_on: Some("explode"),
            ..Recorder::default()
        });
        engine.register_module("m", &recorder);

        let err = engine.run_action("a").await.unwrap_err();

        assert!(matches!(err, Error::Dispatch(DispatchError::UnknownCommand { .. })));
        assert!(recorder.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn dropped_and_missing_modules() {
        let engine = engine(json!({
            "actions": {"a": [["m", "t", "x", "on"]], "b": [["nobody", "t", "x", "on"]]}
        }));
        engine.register_module("m", &Arc::new(Recorder::default()));

        assert!(matches!(
            engine.run_action("a").await,
            Err(Error::Dispatch(DispatchError::ModuleDropped(_)))
        ));
        assert!(matches!(
            engine.run_action("b").await,
            Err(Error::Dispatch(DispatchError::UnknownModule(_)))
        ));
    }

    #[tokio::test]
    async fn history_is_bounded_and_collected() {
        let engine = engine(json!({"actions": {"a": [["ratelimit", 0]]}}));

        engine.observe_event("lutron", "qs", &json!([1, "", "DEVICE", 1, 3]));
        for _ in 0..12 {
            engine.run_action("a").await.unwrap();
        }

        let history = engine.history();
        assert_eq!(history.len(), 10);
        assert!(history.iter().all(|e| e.direction == Direction::Run));

        let families = engine.collect();
        assert_eq!(families.len(), 10);
        assert_eq!(families[0].get_name(), "event0");
        assert_eq!(families[0].get_metric()[0].get_gauge().get_value(), 1.0);
        assert!(families[0].get_help().contains("run a"));
    }

    // Timers follow the wall clock, so this one is really two seconds away.
    #[tokio::test]
    async fn due_timer_runs_its_action_and_rearms() {
        let due = (Utc::now() + chrono::TimeDelta::seconds(2)).time();
        let engine = Arc::new(engine(json!({
            "timers": [[due.format("%H:%M:%S").to_string(), "a"]],
            "actions": {"a": [["m", "t", "Porch", "setlevel", 0]]}
        })));
        let recorder = Arc::new(Recorder::default());
        engine.register_module("m", &recorder);

        let mut scheduler = Scheduler::new();
        scheduler.spawn(Arc::clone(&engine).timer_task());
        let started = std::time::Instant::now();
        while recorder.calls.lock().is_empty() {
            assert!(started.elapsed() < Duration::from_secs(5), "timer never fired");
            assert_eq!(scheduler.drive_once(Duration::from_secs(5)).await.unwrap(), 1);
        }

        assert_eq!(*recorder.calls.lock(), vec![r#"t "Porch" setlevel [0]"#]);
        assert_eq!(engine.timers.lock().pending(), 0);
        assert_eq!(scheduler.pending(), 1);
        assert!(engine.history().iter().any(|e| e.direction == Direction::Run && e.name == "a"));
    }

    #[tokio::test]
    async fn action_task_runs_under_the_scheduler() {
        let engine = Arc::new(engine(json!({"actions": {"a": [["m", "t", "x", "on"]]}})));
        let recorder = Arc::new(Recorder::default());
        engine.register_module("m", &recorder);

        let mut scheduler = Scheduler::new();
        let propagator = engine.propagator("m", scheduler.sender());
        assert_eq!(propagator.module(), "m");
        scheduler.spawn(Arc::clone(&engine).action_task("a"));
        scheduler.drive_once(Duration::from_secs(1)).await.unwrap();

        assert_eq!(recorder.calls.lock().len(), 1);
    }
}
