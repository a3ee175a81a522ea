/*!
 * Child Process Delegate
 * Spawns and supervises one OS process
 */

use crate::context::StartMethod;
use crate::core::backoff::poll_until;
use crate::core::errors::{BridgeResult, DelegateError};
use crate::sync::traits::Join;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;
use tracing::{debug, info, warn};

#[cfg(unix)]
use nix::sys::signal::{kill, Signal as UnixSignal};
#[cfg(unix)]
use nix::unistd::Pid as NixPid;

/// Environment variable telling the child which start method launched it
pub const START_METHOD_ENV: &str = "AIOBRIDGE_START_METHOD";

/// What to run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: Option<PathBuf>,
    pub name: Option<String>,
    /// Inherit stdout/stderr instead of discarding them
    pub inherit_output: bool,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
            working_dir: None,
            name: None,
            inherit_output: true,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn quiet(mut self) -> Self {
        self.inherit_output = false;
        self
    }
}

enum Status {
    NotStarted,
    Running(Child),
    Exited(ExitStatus),
}

/// One child process, started explicitly with `start`
pub struct ChildProcess {
    spec: ProcessSpec,
    method: StartMethod,
    pid: Mutex<Option<u32>>,
    status: Mutex<Status>,
}

impl ChildProcess {
    pub fn new(spec: ProcessSpec, method: StartMethod) -> Self {
        Self {
            spec,
            method,
            pid: Mutex::new(None),
            status: Mutex::new(Status::NotStarted),
        }
    }

    pub fn name(&self) -> &str {
        self.spec.name.as_deref().unwrap_or(&self.spec.program)
    }

    #[inline]
    pub fn start_method(&self) -> StartMethod {
        self.method
    }

    pub fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    /// Spawn the process; only valid once
    pub fn start(&self) -> BridgeResult<()> {
        let mut status = self.status.lock();
        if !matches!(*status, Status::NotStarted) {
            return Err(DelegateError::InvalidOperation("process already started".into()).into());
        }

        let mut cmd = Command::new(&self.spec.program);
        cmd.args(&self.spec.args)
            .envs(&self.spec.env)
            .env(START_METHOD_ENV, self.method.as_str())
            .stdin(Stdio::null());
        if let Some(dir) = &self.spec.working_dir {
            cmd.current_dir(dir);
        }
        if !self.spec.inherit_output {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }

        let child = cmd
            .spawn()
            .map_err(|e| DelegateError::Io(format!("{}: {}", self.spec.program, e)))?;
        let pid = child.id();
        info!(name = self.name(), pid, method = %self.method, "Started child process");

        *self.pid.lock() = Some(pid);
        *status = Status::Running(child);
        Ok(())
    }

    /// OS process id, once started
    pub fn pid(&self) -> Option<u32> {
        *self.pid.lock()
    }

    pub fn is_alive(&self) -> BridgeResult<bool> {
        Ok(matches!(*self.refresh()?, Status::Running(_)))
    }

    /// Exit code once finished
    ///
    /// A process ended by a signal reports the negated signal number.
    pub fn exitcode(&self) -> BridgeResult<Option<i32>> {
        Ok(match &*self.refresh()? {
            Status::Exited(status) => Some(exit_code(status)),
            _ => None,
        })
    }

    /// Ask the process to stop (SIGTERM on unix)
    pub fn terminate(&self) -> BridgeResult<()> {
        match self.running_pid()? {
            Some(pid) => self.send_terminate(pid),
            None => Ok(()),
        }
    }

    /// Stop the process unconditionally
    pub fn kill(&self) -> BridgeResult<()> {
        let mut status = self.status.lock();
        if let Status::Running(child) = &mut *status {
            child.kill().map_err(DelegateError::from)?;
        }
        Ok(())
    }

    #[cfg(unix)]
    fn send_terminate(&self, pid: u32) -> BridgeResult<()> {
        debug!(pid, "Sending SIGTERM");
        kill(NixPid::from_raw(pid as i32), UnixSignal::SIGTERM)
            .map_err(|e| DelegateError::Io(format!("SIGTERM to {}: {}", pid, e)).into())
    }

    #[cfg(not(unix))]
    fn send_terminate(&self, _pid: u32) -> BridgeResult<()> {
        self.kill()
    }

    fn running_pid(&self) -> BridgeResult<Option<u32>> {
        Ok(match &*self.refresh()? {
            Status::Running(child) => Some(child.id()),
            _ => None,
        })
    }

    /// Reap the child if it has exited
    fn refresh(&self) -> BridgeResult<parking_lot::MutexGuard<'_, Status>> {
        let mut status = self.status.lock();
        if let Status::Running(child) = &mut *status {
            if let Some(exit) = child.try_wait().map_err(DelegateError::from)? {
                info!(name = self.name(), code = exit_code(&exit), "Child process exited");
                *status = Status::Exited(exit);
            }
        }
        Ok(status)
    }
}

impl Join for ChildProcess {
    /// Wait for the process to exit; `Ok(false)` if `timeout` elapsed first
    fn join(&self, timeout: Option<Duration>) -> BridgeResult<bool> {
        if matches!(*self.status.lock(), Status::NotStarted) {
            return Err(
                DelegateError::InvalidOperation("can only join a started process".into()).into(),
            );
        }
        let exited = poll_until(timeout, || -> BridgeResult<Option<()>> {
            Ok(matches!(*self.refresh()?, Status::Exited(_)).then_some(()))
        })?;
        Ok(exited.is_some())
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        if let Status::Running(child) = self.status.get_mut() {
            if let Ok(None) = child.try_wait() {
                warn!(pid = child.id(), "Child process handle dropped while still running");
            }
        }
    }
}

impl fmt::Debug for ChildProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.status.lock() {
            Status::NotStarted => "initial".to_string(),
            Status::Running(_) => "started".to_string(),
            Status::Exited(status) => format!("stopped[{}]", exit_code(status)),
        };
        f.debug_struct("ChildProcess")
            .field("name", &self.name())
            .field("pid", &self.pid())
            .field("method", &self.method)
            .field("state", &state)
            .finish()
    }
}

fn exit_code(status: &ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> ChildProcess {
        ChildProcess::new(ProcessSpec::new("sh").args(["-c", script]).quiet(), StartMethod::Spawn)
    }

    #[test]
    fn test_exit_code_reported() {
        let process = sh("exit 3");
        assert_eq!(process.exitcode(), Ok(None));
        assert!(process.join(None).is_err());

        process.start().unwrap();
        assert!(process.pid().is_some());
        assert_eq!(process.join(Some(Duration::from_secs(5))), Ok(true));
        assert_eq!(process.exitcode(), Ok(Some(3)));
        assert_eq!(process.is_alive(), Ok(false));
        assert!(process.start().is_err());
    }

    #[test]
    fn test_join_timeout_then_terminate() {
        let process = sh("sleep 5");
        process.start().unwrap();

        assert_eq!(process.join(Some(Duration::from_millis(20))), Ok(false));
        assert_eq!(process.is_alive(), Ok(true));

        process.terminate().unwrap();
        assert_eq!(process.join(Some(Duration::from_secs(5))), Ok(true));
        assert_eq!(process.exitcode(), Ok(Some(-15)));
    }

    #[test]
    fn test_start_method_exported_to_child() {
        let process = ChildProcess::new(
            ProcessSpec::new("sh").args(["-c", "test \"$AIOBRIDGE_START_METHOD\" = fork"]),
            StartMethod::Fork,
        );
        process.start().unwrap();
        process.join(None).unwrap();
        assert_eq!(process.exitcode(), Ok(Some(0)));
    }
}
