//! Launched process handles and the registry that guarantees their
//! termination.

use std::path::{Path, PathBuf};

use tokio::process::Child;

use crate::address::Role;
use crate::env::EnvFile;
use crate::error::{LaunchError, Result};

/// One side of the io-demo pair as seen from the launching machine.
///
/// The child is the local fan-out process; the env file (if any) lives as
/// long as the handle does.
#[derive(Debug)]
pub struct LaunchedProcess {
    role: Role,
    pub(crate) child: Child,
    output: PathBuf,
    env_file: Option<EnvFile>,
    terminated: bool,
}

impl LaunchedProcess {
    /// Wrap a spawned child.
    pub fn new(role: Role, child: Child, output: impl Into<PathBuf>) -> Self {
        Self {
            role,
            child,
            output: output.into(),
            env_file: None,
            terminated: false,
        }
    }

    /// Tie an env file's lifetime to this process.
    pub fn with_env_file(mut self, env_file: EnvFile) -> Self {
        self.env_file = Some(env_file);
        self
    }

    /// Which side this is.
    pub fn role(&self) -> Role {
        self.role
    }

    /// OS process id, if the child has not been reaped yet.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// File receiving the combined output.
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Env script sourced by the remote side, while it still exists.
    pub fn env_file(&self) -> Option<&Path> {
        self.env_file.as_ref().map(EnvFile::path)
    }

    /// Whether [`terminate`](Self::terminate) has already run.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Request graceful termination with a single `SIGTERM`.
    ///
    /// Does not wait for the process to exit. Calling this again is a
    /// no-op. The env file is removed either way.
    pub fn terminate(&mut self) -> Result<()> {
        if self.terminated {
            return Ok(());
        }
        self.terminated = true;
        self.env_file.take();

        let Some(pid) = self.child.id() else {
            tracing::debug!(role = %self.role, "process already reaped, nothing to signal");
            return Ok(());
        };

        tracing::info!(role = %self.role, pid, "terminating");
        send_terminate(&mut self.child, self.role, pid)
    }
}

#[cfg(unix)]
fn send_terminate(_child: &mut Child, role: Role, pid: u32) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(LaunchError::Signal {
            role,
            pid,
            reason: e.to_string(),
        }),
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child, role: Role, pid: u32) -> Result<()> {
    child.start_kill().map_err(|e| LaunchError::Signal {
        role,
        pid,
        reason: e.to_string(),
    })
}

/// Owns every launched process for the run.
///
/// Whatever is still registered when the registry is dropped gets
/// terminated, so early failures never leave processes behind.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    processes: Vec<LaunchedProcess>,
}

impl ProcessRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a launched process.
    pub fn register(&mut self, process: LaunchedProcess) {
        tracing::debug!(role = %process.role(), pid = ?process.pid(), "registered process");
        self.processes.push(process);
    }

    /// Number of tracked processes.
    pub fn len(&self) -> usize {
        self.processes.len()
    }

    /// True when nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Look up the process launched for `role`.
    pub fn get(&self, role: Role) -> Option<&LaunchedProcess> {
        self.processes.iter().find(|p| p.role() == role)
    }

    /// Signal every tracked process in launch order and stop tracking them.
    ///
    /// Every process is signaled even if an earlier one fails; the first
    /// failure is returned.
    pub fn terminate_all(&mut self) -> Result<()> {
        let mut first_err = None;
        for mut process in self.processes.drain(..) {
            if let Err(e) = process.terminate() {
                tracing::warn!(error = %e, "termination failed");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl Drop for ProcessRegistry {
    fn drop(&mut self) {
        if !self.processes.is_empty() {
            tracing::debug!(count = self.processes.len(), "terminating processes left in registry");
            let _ = self.terminate_all();
        }
    }
}
