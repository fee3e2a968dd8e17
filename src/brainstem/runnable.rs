// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The capability every device module offers the engine.

use serde_json::Value;

use crate::error::Result;
use crate::scheduler::BoxFuture;

/// A device module that can carry out dispatched commands.
///
/// # Examples
///
/// ```
/// use serde_json::Value;
/// use porter_lib::brainstem::Runnable;
/// use porter_lib::scheduler::BoxFuture;
///
/// struct Recirculation;
///
/// impl Runnable for Recirculation {
///     fn run<'a>(
///         &'a self,
///         target: &'a str,
///         _selector: &'a Value,
///         command: &'a str,
///         _args: &'a [Value],
///     ) -> BoxFuture<'a, porter_lib::Result<()>> {
///         Box::pin(async move {
///             println!("{command} on {target}");
///             Ok(())
///         })
///     }
/// }
/// ```
pub trait Runnable: Send + Sync {
    /// Runs `command` with `args` against whatever `selector` picks on
    /// `target`.
    ///
    /// # Errors
    ///
    /// Module-specific; errors propagate out of the running action.
    fn run<'a>(
        &'a self,
        target: &'a str,
        selector: &'a Value,
        command: &'a str,
        args: &'a [Value],
    ) -> BoxFuture<'a, Result<()>>;
}
