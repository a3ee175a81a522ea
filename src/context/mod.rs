/*!
 * Start-Method Context
 *
 * Selects how child processes are started and builds every wrapper's delegate.
 *
 * # Start Methods
 *
 * - `Fork`: child starts from a copy of the parent (unix only)
 * - `Spawn`: child starts a fresh program image (everywhere)
 * - `Forkserver`: children are forked from a helper server (unix only)
 *
 * The method is a plain parameter: nothing about it is process-global.
 */

mod factory;

pub use factory::*;

use crate::core::errors::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How child processes are started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartMethod {
    Fork,
    Spawn,
    Forkserver,
}

impl StartMethod {
    pub const ALL: [StartMethod; 3] =
        [StartMethod::Fork, StartMethod::Spawn, StartMethod::Forkserver];

    /// Fork on Linux, spawn elsewhere
    pub fn platform_default() -> Self {
        if cfg!(target_os = "linux") {
            StartMethod::Fork
        } else {
            StartMethod::Spawn
        }
    }

    pub fn is_available(self) -> bool {
        match self {
            StartMethod::Spawn => true,
            StartMethod::Fork | StartMethod::Forkserver => cfg!(unix),
        }
    }

    /// Methods usable on this platform
    pub fn available() -> Vec<StartMethod> {
        Self::ALL.into_iter().filter(|m| m.is_available()).collect()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StartMethod::Fork => "fork",
            StartMethod::Spawn => "spawn",
            StartMethod::Forkserver => "forkserver",
        }
    }
}

impl fmt::Display for StartMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StartMethod {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fork" => Ok(StartMethod::Fork),
            "spawn" => Ok(StartMethod::Spawn),
            "forkserver" => Ok(StartMethod::Forkserver),
            other => Err(BridgeError::Context(format!("unknown start method '{}'", other))),
        }
    }
}

/// Delegate factory bound to a start method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Context {
    method: StartMethod,
}

impl Context {
    #[inline]
    pub fn start_method(&self) -> StartMethod {
        self.method
    }
}

impl Default for Context {
    fn default() -> Self {
        Self {
            method: StartMethod::platform_default(),
        }
    }
}

/// Context for `method`, or the platform default
pub fn get_context(method: Option<StartMethod>) -> BridgeResult<Context> {
    let method = method.unwrap_or_else(StartMethod::platform_default);
    if !method.is_available() {
        return Err(BridgeError::Context(format!(
            "start method '{}' is not available on this platform",
            method
        )));
    }
    Ok(Context { method })
}

/// Construct a delegate from a context and its constructor arguments
pub trait FromContext<Args>: Sized {
    fn from_context(ctx: &Context, args: Args) -> BridgeResult<Self>;
}
