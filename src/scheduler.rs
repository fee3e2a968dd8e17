// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wait-for-any task scheduler.
//!
//! Every perpetual loop in the bridge (session polls, keepalives, the timer
//! loop, pending reactions) is a [`Task`]: a future that does one unit of
//! work and returns its continuation. [`Scheduler::drive_once`] waits for the
//! first task to finish, re-enqueues whatever continuations finished tasks
//! returned, and hands control back. The caller owns the outer loop.
//!
//! ```text
//!            submit()                     drive_once()
//! TaskSender ────────> inbox ──spawn──> JoinSet ──first done──> continuation
//!                                          ^                        │
//!                                          └────────── spawn ───────┘
//! ```
//!
//! A task that returns an error or panics makes `drive_once` fail with
//! [`Error::TaskFailed`]; the loop state is unknown after that and the
//! process is expected to exit.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};

use crate::error::{Error, Result};

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a task resolves to: its continuation, if any.
pub type TaskOutput = Result<Option<Task>>;

/// One unit of scheduled work.
pub struct Task {
    label: String,
    future: BoxFuture<'static, TaskOutput>,
}

impl Task {
    /// Creates a task from a future.
    pub fn new<F>(label: impl Into<String>, future: F) -> Self
    where
        F: Future<Output = TaskOutput> + Send + 'static,
    {
        Self {
            label: label.into(),
            future: Box::pin(future),
        }
    }

    /// Returns the label used in logs and errors.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Handle for submitting tasks from anywhere.
#[derive(Debug, Clone)]
pub struct TaskSender {
    tx: mpsc::UnboundedSender<Task>,
}

impl TaskSender {
    /// Queues a task; it starts on the next `drive_once`.
    ///
    /// Returns `false` if the scheduler has been dropped.
    pub fn submit(&self, task: Task) -> bool {
        let label = task.label.clone();
        if self.tx.send(task).is_err() {
            tracing::warn!(task = %label, "Scheduler is gone, dropping task");
            return false;
        }
        true
    }
}

/// Multiplexes tasks on the tokio runtime.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use porter_lib::scheduler::{Scheduler, Task};
///
/// # tokio_test::block_on(async {
/// let mut scheduler = Scheduler::new();
/// scheduler.spawn(Task::new("once", async { Ok(None) }));
///
/// let completed = scheduler.drive_once(Duration::from_secs(1)).await.unwrap();
/// assert_eq!(completed, 1);
/// assert_eq!(scheduler.pending(), 0);
/// # });
/// ```
pub struct Scheduler {
    tasks: JoinSet<(String, TaskOutput)>,
    inbox: mpsc::UnboundedReceiver<Task>,
    sender: TaskSender,
}

impl Scheduler {
    /// Creates an idle scheduler.
    #[must_use]
    pub fn new() -> Self {
        let (tx, inbox) = mpsc::unbounded_channel();
        Self {
            tasks: JoinSet::new(),
            inbox,
            sender: TaskSender { tx },
        }
    }

    /// Returns a submission handle.
    #[must_use]
    pub fn sender(&self) -> TaskSender {
        self.sender.clone()
    }

    /// Starts a task immediately.
    pub fn spawn(&mut self, task: Task) {
        let Task { label, future } = task;
        tracing::trace!(task = %label, "Starting task");
        self.tasks.spawn(async move { (label, future.await) });
    }

    /// Returns the number of running tasks, not counting the inbox.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Waits up to `timeout` for the first task to complete.
    ///
    /// Continuations of every finished task are started. With nothing
    /// running, waits up to `timeout` for a submission instead. Returns the
    /// number of tasks that completed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskFailed`] if a task returned an error or panicked.
    pub async fn drive_once(&mut self, timeout: Duration) -> Result<usize> {
        self.drain_inbox();

        if self.tasks.is_empty() {
            if let Ok(Some(task)) = tokio::time::timeout(timeout, self.inbox.recv()).await {
                self.spawn(task);
                self.drain_inbox();
            }
            return Ok(0);
        }

        let Ok(Some(first)) = tokio::time::timeout(timeout, self.tasks.join_next()).await else {
            return Ok(0);
        };
        self.complete(first)?;
        let mut completed = 1;
        while let Some(joined) = self.tasks.try_join_next() {
            self.complete(joined)?;
            completed += 1;
        }
        self.drain_inbox();
        Ok(completed)
    }

    fn drain_inbox(&mut self) {
        while let Ok(task) = self.inbox.try_recv() {
            self.spawn(task);
        }
    }

    fn complete(
        &mut self,
        joined: std::result::Result<(String, TaskOutput), JoinError>,
    ) -> Result<()> {
        match joined {
            Ok((_, Ok(Some(next)))) => {
                self.spawn(next);
                Ok(())
            }
            Ok((label, Ok(None))) => {
                tracing::trace!(task = %label, "Task finished");
                Ok(())
            }
            Ok((label, Err(e))) => {
                tracing::error!(task = %label, error = %e, "Scheduled task failed");
                Err(Error::TaskFailed {
                    task: label,
                    message: e.to_string(),
                })
            }
            Err(join_error) => {
                let message = panic_message(join_error);
                tracing::error!(message = %message, "Scheduled task panicked");
                Err(Error::TaskFailed {
                    task: "unknown".to_string(),
                    message,
                })
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

fn panic_message(join_error: JoinError) -> String {
    if !join_error.is_panic() {
        return join_error.to_string();
    }
    let payload = join_error.into_panic();
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "task panicked".to_string())
}
