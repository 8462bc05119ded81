//! Environment propagation to remotely launched commands.
//!
//! The launching shell's environment is captured into an [`EnvScope`],
//! rendered as `export` lines and written to a per-launch [`EnvFile`] that
//! the remote side sources before running the io-demo command. Each launch
//! gets its own file name, so overlapping launches never share one.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::error::{LaunchError, Result};
use crate::remote::shell_quote;

/// Prefix of the per-launch environment script.
pub const ENV_FILE_PREFIX: &str = ".iodemo-env-";

/// Explicit set of variables to make available to a remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvScope {
    vars: BTreeMap<String, String>,
}

impl EnvScope {
    /// Empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture variables from the current process environment.
    ///
    /// An empty `allow` list captures everything. Variables that are not
    /// valid shell identifiers or not valid UTF-8 are skipped.
    pub fn capture(allow: &[String]) -> Self {
        let mut scope = Self::new();
        for (key, value) in std::env::vars_os() {
            let (Some(key), Some(value)) = (key.to_str(), value.to_str()) else {
                continue;
            };
            if allow.is_empty() || allow.iter().any(|a| a == key) {
                scope.set(key, value);
            }
        }
        scope
    }

    /// Add or replace a variable. Invalid names are ignored.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if !is_shell_identifier(&key) {
            tracing::debug!(%key, "skipping variable with non-shell name");
            return;
        }
        self.vars.insert(key, value.into());
    }

    /// Look up a variable.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Number of variables in scope.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// True when no variables are in scope.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Render as a sourceable shell script, one `export` per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.vars {
            out.push_str("export ");
            out.push_str(key);
            out.push('=');
            out.push_str(&shell_quote(value));
            out.push('\n');
        }
        out
    }
}

fn is_shell_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// A written environment script, removed when dropped.
#[derive(Debug)]
pub struct EnvFile {
    path: PathBuf,
}

impl EnvFile {
    /// Write `scope` to a uniquely named script in `dir`.
    ///
    /// `dir` should be absolute (and shared with the remote hosts) since
    /// the remote side sources the file by this path.
    pub async fn write(dir: &Path, scope: &EnvScope) -> Result<Self> {
        let name = format!("{}{}.sh", ENV_FILE_PREFIX, uuid::Uuid::new_v4().as_simple());
        let path = dir.join(name);

        let env_err = |source| LaunchError::EnvFile {
            path: path.clone(),
            source,
        };

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        // Owner-only from creation, never widened by the umask.
        #[cfg(unix)]
        options.mode(0o700);

        let mut file = options.open(&path).await.map_err(env_err)?;
        file.write_all(scope.render().as_bytes()).await.map_err(env_err)?;
        file.flush().await.map_err(env_err)?;

        tracing::debug!(path = %path.display(), vars = scope.len(), "wrote env file");
        Ok(Self { path })
    }

    /// Path of the script.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for EnvFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "removed env file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "failed to remove env file"),
        }
    }
}
