//! Remote command construction.
//!
//! Builds the single shell line that launches one side of the io-demo pair
//! through the fan-out tool:
//!
//! ```text
//! pdsh -w <host> 'cd <work dir> && . <env file>; <command> -f <ip:port>' > <output> 2>&1
//! ```

use std::path::{Path, PathBuf};

use crate::address::RendezvousAddress;

/// Placeholder in [`FanOut::host_args`] replaced by the target host.
pub const HOST_PLACEHOLDER: &str = "{host}";

/// Flag io-demo uses to receive the rendezvous address.
pub const DEFAULT_ADDRESS_FLAG: &str = "-f";

/// Remote shell fan-out tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanOut {
    /// Program found on `PATH`, e.g. `pdsh`.
    pub program: String,
    /// Arguments selecting the host; `{host}` is substituted.
    pub host_args: Vec<String>,
}

impl FanOut {
    /// `pdsh -w <host>`.
    pub fn pdsh() -> Self {
        Self {
            program: "pdsh".into(),
            host_args: vec!["-w".into(), HOST_PLACEHOLDER.into()],
        }
    }

    /// Run on this machine through `sh -c`, ignoring the host.
    pub fn local() -> Self {
        Self {
            program: "sh".into(),
            host_args: vec!["-c".into()],
        }
    }

    fn args_for(&self, host: &str) -> Vec<String> {
        self.host_args
            .iter()
            .map(|a| a.replace(HOST_PLACEHOLDER, host))
            .collect()
    }
}

impl Default for FanOut {
    fn default() -> Self {
        Self::pdsh()
    }
}

/// Fully specified remote launch of one command.
#[derive(Debug, Clone)]
pub struct RemoteCommand {
    fan_out: FanOut,
    host: String,
    work_dir: Option<PathBuf>,
    env_file: Option<PathBuf>,
    command: String,
    address_flag: String,
    address: RendezvousAddress,
    output: PathBuf,
}

impl RemoteCommand {
    /// Launch `command` on `host`, passing `address` and logging to `output`.
    pub fn new(
        fan_out: FanOut,
        host: impl Into<String>,
        command: impl Into<String>,
        address: RendezvousAddress,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fan_out,
            host: host.into(),
            work_dir: None,
            env_file: None,
            command: command.into(),
            address_flag: DEFAULT_ADDRESS_FLAG.into(),
            address,
            output: output.into(),
        }
    }

    /// Change to this directory on the remote side first.
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    /// Source this script on the remote side before running the command.
    pub fn with_env_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.env_file = Some(path.into());
        self
    }

    /// Override the flag carrying the address (default `-f`).
    pub fn with_address_flag(mut self, flag: impl Into<String>) -> Self {
        self.address_flag = flag.into();
        self
    }

    /// Output file receiving combined stdout/stderr.
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// The script executed on the remote host.
    ///
    /// `cd <work dir> && . <env file>; <command> <flag> <address>`, with
    /// the `cd` and `.` parts present only when configured.
    pub fn remote_script(&self) -> String {
        let mut script = String::new();
        if let Some(dir) = &self.work_dir {
            script.push_str("cd ");
            script.push_str(&shell_quote(&dir.to_string_lossy()));
            script.push_str(" && ");
        }
        if let Some(env) = &self.env_file {
            script.push_str(". ");
            script.push_str(&shell_quote(&env.to_string_lossy()));
            script.push_str("; ");
        }
        script.push_str(&format!("{} {} {}", self.command, self.address_flag, self.address));
        script
    }

    /// Render the complete local shell line, including output redirection.
    pub fn render(&self) -> String {
        let mut parts = Vec::with_capacity(self.fan_out.host_args.len() + 2);
        parts.push(shell_quote(&self.fan_out.program));
        parts.extend(self.fan_out.args_for(&self.host).iter().map(|a| shell_quote(a)));
        parts.push(shell_quote(&self.remote_script()));

        format!(
            "{} > {} 2>&1",
            parts.join(" "),
            shell_quote(&self.output.to_string_lossy())
        )
    }
}

/// Quote `s` for POSIX `sh` when it contains anything beyond a safe set.
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty() && s.chars().all(is_shell_safe) {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '=' | '@' | ',' | '+' | '%')
}
