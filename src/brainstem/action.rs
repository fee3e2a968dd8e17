// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed action steps.
//!
//! Actions are configured as lists of JSON values:
//!
//! | Configured step | Parsed step |
//! |---|---|
//! | `"bedtime"` | [`ActionStep::Nested`] |
//! | `["ratelimit", 10]` | [`ActionStep::RateLimit`] |
//! | `["lutron", "qs.local", "Laundry", "setlevel", 0]` | [`ActionStep::Dispatch`] |
//!
//! Steps are parsed and checked once, when the engine is built.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;

use crate::error::ConfigError;

/// Marker for rate-limit steps.
const RATE_LIMIT: &str = "ratelimit";

/// A command for a module.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    /// Registered module name.
    pub module: String,
    /// Target within the module.
    pub target: String,
    /// What to act on.
    pub selector: Value,
    /// Command name.
    pub command: String,
    /// Command arguments.
    pub args: Vec<Value>,
}

/// One step of an action sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionStep {
    /// Run another action.
    Nested(String),
    /// Stop here if this action completed less than this long ago.
    RateLimit(Duration),
    /// Send a command to a module.
    Dispatch(Dispatch),
}

impl ActionStep {
    /// Parses a configured step.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidStep`] if the value has no known shape.
    pub fn parse(action: &str, raw: &Value) -> Result<Self, ConfigError> {
        let invalid = |message: &str| ConfigError::InvalidStep {
            action: action.to_string(),
            message: format!("{message}: {raw}"),
        };

        match raw {
            Value::String(name) => Ok(Self::Nested(name.clone())),
            Value::Array(fields) if fields.first().and_then(Value::as_str) == Some(RATE_LIMIT) => {
                let [_, seconds] = fields.as_slice() else {
                    return Err(invalid("ratelimit takes one argument"));
                };
                let seconds = seconds
                    .as_f64()
                    .ok_or_else(|| invalid("ratelimit needs a number of seconds"))?;
                Duration::try_from_secs_f64(seconds)
                    .map(Self::RateLimit)
                    .map_err(|_| invalid("ratelimit needs a non-negative duration"))
            }
            Value::Array(fields) => {
                let [module, target, selector, command, args @ ..] = fields.as_slice() else {
                    return Err(invalid("expected [module, target, selector, command, args...]"));
                };
                let (Some(module), Some(target), Some(command)) =
                    (module.as_str(), target.as_str(), command.as_str())
                else {
                    return Err(invalid("module, target and command must be strings"));
                };
                Ok(Self::Dispatch(Dispatch {
                    module: module.to_string(),
                    target: target.to_string(),
                    selector: selector.clone(),
                    command: command.to_string(),
                    args: args.to_vec(),
                }))
            }
            _ => Err(invalid("unrecognized step")),
        }
    }
}

/// Parses every action and checks nested references.
///
/// # Errors
///
/// Returns a [`ConfigError`] for malformed steps, empty actions, references
/// to unknown actions, and cycles.
pub(crate) fn resolve(
    raw: &BTreeMap<String, Vec<Value>>,
) -> Result<BTreeMap<String, Vec<ActionStep>>, ConfigError> {
    let mut actions = BTreeMap::new();
    for (name, steps) in raw {
        if steps.is_empty() {
            return Err(ConfigError::InvalidStep {
                action: name.clone(),
                message: "action has no steps".to_string(),
            });
        }
        let steps = steps
            .iter()
            .map(|step| ActionStep::parse(name, step))
            .collect::<Result<Vec<_>, _>>()?;
        actions.insert(name.clone(), steps);
    }

    for steps in actions.values() {
        for step in steps {
            if let ActionStep::Nested(nested) = step
                && !actions.contains_key(nested)
            {
                return Err(ConfigError::UnknownAction(nested.clone()));
            }
        }
    }

    let mut visits = BTreeMap::new();
    for name in actions.keys() {
        check_cycles(&actions, name, &mut visits)?;
    }
    Ok(actions)
}

#[derive(Clone, Copy, PartialEq)]
enum Visit {
    InProgress,
    Done,
}

fn check_cycles<'a>(
    actions: &'a BTreeMap<String, Vec<ActionStep>>,
    name: &'a str,
    visits: &mut BTreeMap<&'a str, Visit>,
) -> Result<(), ConfigError> {
    match visits.get(name) {
        Some(Visit::Done) => return Ok(()),
        Some(Visit::InProgress) => return Err(ConfigError::ActionCycle(name.to_string())),
        None => {}
    }
    visits.insert(name, Visit::InProgress);
    for step in actions.get(name).into_iter().flatten() {
        if let ActionStep::Nested(nested) = step {
            check_cycles(actions, nested, visits)?;
        }
    }
    visits.insert(name, Visit::Done);
    Ok(())
}
