// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `porter_lib` crate.
//!
//! This module provides the error hierarchy for the bridge: value
//! validation, controller communication, frame and report parsing,
//! configuration loading, and action dispatch.

use thiserror::Error;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// Error occurred during value validation.
    #[error("value error: {0}")]
    Value(#[from] ValueError),

    /// Error occurred while talking to a controller.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Error occurred while parsing a frame or a report.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Configuration is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// An action step could not be delivered to its module.
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// The target is not configured.
    #[error("unknown target: {0}")]
    UnknownTarget(String),

    /// The controller connection is not open.
    #[error("controller is not connected")]
    NotConnected,

    /// A scheduled task failed; the scheduler cannot continue safely.
    #[error("task {task} failed: {message}")]
    TaskFailed {
        /// Label of the failing task.
        task: String,
        /// Description of the failure.
        message: String,
    },
}

/// Errors related to value validation and constraints.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValueError {
    /// A level is outside 0-100.
    #[error("level {0} is out of range [0, 100]")]
    LevelOutOfRange(f64),

    /// An argument has the wrong type or is missing.
    #[error("invalid argument for {command}: {message}")]
    InvalidArgument {
        /// The command that received the argument.
        command: String,
        /// What was wrong with it.
        message: String,
    },
}

/// Errors related to controller communication.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Socket I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection to the controller failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Connecting timed out.
    #[error("connect timed out after {0} ms")]
    Timeout(u64),

    /// The peer closed the connection.
    #[error("controller disconnected")]
    Disconnected,

    /// The login exchange did not complete.
    #[error("login failed: {0}")]
    LoginFailed(String),

    /// Invalid host or port.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

/// Errors related to parsing frames, reports and flat directories.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Expected field is missing.
    #[error("missing field: {0}")]
    MissingField(String),

    /// Unexpected input format.
    #[error("unexpected format: {0}")]
    UnexpectedFormat(String),

    /// Failed to parse a specific value.
    #[error("failed to parse {field}: {message}")]
    InvalidValue {
        /// The field that failed to parse.
        field: String,
        /// Description of the parsing failure.
        message: String,
    },
}

/// Errors detected while loading configuration.
///
/// These are fatal at startup and surfaced to the operator.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A timer spec could not be parsed.
    #[error("invalid timer {0}")]
    InvalidTimer(String),

    /// An action refers to an action that does not exist.
    #[error("unknown action {0}")]
    UnknownAction(String),

    /// An action step has an unrecognized shape.
    #[error("invalid step in action {action}: {message}")]
    InvalidStep {
        /// The action containing the step.
        action: String,
        /// Description of the problem.
        message: String,
    },

    /// Nested actions form a cycle.
    #[error("action {0} invokes itself")]
    ActionCycle(String),

    /// Two reactions share the same selector on the same target.
    #[error("duplicate reaction selector {selector} for {module}/{target}")]
    DuplicateReaction {
        /// Module name.
        module: String,
        /// Target name.
        target: String,
        /// The repeated selector.
        selector: String,
    },

    /// An action dispatches to a module nobody registered.
    #[error("action {action} dispatches to unregistered module {module}")]
    UnknownModule {
        /// The action containing the dispatch.
        action: String,
        /// The missing module.
        module: String,
    },

    /// An integration id appears twice in a directory.
    #[error("integration id {0} is defined more than once")]
    DuplicateDevice(u64),

    /// A flat directory entry is malformed.
    #[error("invalid directory entry: {0}")]
    InvalidDirectory(String),

    /// The target string is not `host[:port]`.
    #[error("invalid target {0}")]
    InvalidTarget(String),
}

/// Errors raised while delivering an action step to a module.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No module with this name was registered.
    #[error("no module registered as {0}")]
    UnknownModule(String),

    /// The module was registered but has since been dropped.
    #[error("module {0} is no longer available")]
    ModuleDropped(String),

    /// The module does not understand the command.
    #[error("unknown command {command} for {target}")]
    UnknownCommand {
        /// Target the command was sent to.
        target: String,
        /// The command name.
        command: String,
    },

    /// The selector matched nothing on the target.
    #[error("selector {selector} matches nothing on {target}")]
    NoMatch {
        /// Target the command was sent to.
        target: String,
        /// The selector, rendered as JSON.
        selector: String,
    },
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;
