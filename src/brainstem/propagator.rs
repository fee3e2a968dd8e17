// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Event delivery from modules to the engine.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::brainstem::ReactionEngine;
use crate::scheduler::TaskSender;

/// Receives events observed by a module.
pub trait EventSink: Send + Sync {
    /// Reports that `selector` happened on `target`.
    fn emit(&self, target: &str, selector: Value);
}

/// Forwards one module's events to the engine and schedules reactions.
pub struct EventPropagator {
    engine: Arc<ReactionEngine>,
    module: String,
    sender: TaskSender,
}

impl EventPropagator {
    /// Creates a propagator for `module`.
    pub fn new(engine: Arc<ReactionEngine>, module: impl Into<String>, sender: TaskSender) -> Self {
        Self {
            engine,
            module: module.into(),
            sender,
        }
    }

    /// Returns the module name events are reported under.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }
}

impl EventSink for EventPropagator {
    fn emit(&self, target: &str, selector: Value) {
        if let Some(pending) = self.engine.observe_event(&self.module, target, &selector) {
            tracing::debug!(
                module = %self.module,
                target = %target,
                action = %pending.action(),
                "Scheduling reaction"
            );
            self.sender
                .submit(Arc::clone(&self.engine).action_task(pending.action()));
        }
    }
}

impl fmt::Debug for EventPropagator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventPropagator")
            .field("module", &self.module)
            .finish_non_exhaustive()
    }
}
