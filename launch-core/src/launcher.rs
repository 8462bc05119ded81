//! Launching one side of the io-demo pair.
//!
//! [`ProcessLauncher`] is the seam between the coordinator and the way
//! processes actually get started. [`FanOutLauncher`] is the production
//! implementation: it writes a per-launch env file, renders a
//! [`RemoteCommand`] and runs it through `sh -c` so the shell handles the
//! output redirection.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::address::{RendezvousAddress, Role};
use crate::config::LaunchConfig;
use crate::env::{EnvFile, EnvScope};
use crate::error::{LaunchError, Result};
use crate::process::LaunchedProcess;
use crate::remote::{FanOut, RemoteCommand, DEFAULT_ADDRESS_FLAG};

/// What to run for one side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Target host handed to the fan-out tool.
    pub host: String,
    /// Command line run on that host; the address flag is appended.
    pub command: String,
    /// Local file receiving combined stdout/stderr.
    pub output: PathBuf,
}

impl LaunchSpec {
    /// Describe a launch.
    pub fn new(host: impl Into<String>, command: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            host: host.into(),
            command: command.into(),
            output: output.into(),
        }
    }
}

/// Starts processes that will connect back to the rendezvous address.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Start `spec` as `role`, telling it to connect to `address`.
    ///
    /// Returns once the process is spawned and any settle delay elapsed.
    async fn launch(
        &self,
        role: Role,
        spec: &LaunchSpec,
        address: &RendezvousAddress,
    ) -> Result<LaunchedProcess>;
}

/// Launches through a remote shell fan-out tool such as `pdsh`.
#[derive(Debug, Clone)]
pub struct FanOutLauncher {
    fan_out: FanOut,
    address_flag: String,
    settle_delay: Duration,
    work_dir: PathBuf,
    env: EnvScope,
}

impl FanOutLauncher {
    /// Launcher with no settle delay and an empty env scope.
    ///
    /// `work_dir` should be absolute; env files are written there.
    pub fn new(fan_out: FanOut, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            fan_out,
            address_flag: DEFAULT_ADDRESS_FLAG.into(),
            settle_delay: Duration::ZERO,
            work_dir: work_dir.into(),
            env: EnvScope::new(),
        }
    }

    /// Build from configuration, capturing the current environment.
    pub fn from_config(config: &LaunchConfig) -> Result<Self> {
        let cwd = std::env::current_dir()?;
        let work_dir = match &config.work_dir {
            Some(dir) => cwd.join(dir),
            None => cwd,
        };

        Ok(Self::new(config.fan_out(), work_dir)
            .with_address_flag(config.address_flag.clone())
            .with_settle_delay(config.settle_delay())
            .with_env(EnvScope::capture(&config.env_allow)))
    }

    /// Override the address flag.
    pub fn with_address_flag(mut self, flag: impl Into<String>) -> Self {
        self.address_flag = flag.into();
        self
    }

    /// Pause after each launch.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Variables exported to the launched command.
    pub fn with_env(mut self, env: EnvScope) -> Self {
        self.env = env;
        self
    }

    /// Directory holding env files and relative output paths.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Render the command that `launch` would run, given its env file.
    pub fn command_for(
        &self,
        spec: &LaunchSpec,
        address: &RendezvousAddress,
        env_file: &Path,
    ) -> RemoteCommand {
        RemoteCommand::new(
            self.fan_out.clone(),
            spec.host.clone(),
            spec.command.clone(),
            *address,
            spec.output.clone(),
        )
        .with_work_dir(&self.work_dir)
        .with_env_file(env_file)
        .with_address_flag(self.address_flag.clone())
    }
}

#[async_trait]
impl ProcessLauncher for FanOutLauncher {
    async fn launch(
        &self,
        role: Role,
        spec: &LaunchSpec,
        address: &RendezvousAddress,
    ) -> Result<LaunchedProcess> {
        let env_file = EnvFile::write(&self.work_dir, &self.env).await?;
        let line = self.command_for(spec, address, env_file.path()).render();

        tracing::info!(%role, host = %spec.host, "launching: {}", line);
        let child = Command::new("sh")
            .arg("-c")
            .arg(format!("exec {line}"))
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                role,
                command: line.clone(),
                source,
            })?;

        if !self.settle_delay.is_zero() {
            tracing::debug!(%role, delay = ?self.settle_delay, "waiting for launch to settle");
            tokio::time::sleep(self.settle_delay).await;
        }

        let output = self.work_dir.join(&spec.output);
        Ok(LaunchedProcess::new(role, child, output).with_env_file(env_file))
    }
}
