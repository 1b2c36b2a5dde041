//! Target-aware command execution.
//!
//! A deployment script is written once and runs against either the local
//! machine or a remote host; every operation carries a [`TargetSpec`] saying
//! where it applies, and operations whose spec does not match the session's
//! [`Target`] are *omitted*: reported to the user, never executed.

mod local;
mod project;
mod rsync;
mod session;
mod ssh;

pub mod fakes;

pub use local::LocalTransport;
pub use rsync::{is_rsync_available, SyncOptions};
pub use session::Session;
pub use ssh::SshTransport;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Where a session actually runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Local,
    Remote,
}

/// Where an individual operation is allowed to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TargetSpec {
    Local,
    Remote,
    Both,
}

impl TargetSpec {
    /// Whether an operation with this spec runs on the given target.
    pub fn matches(self, target: Target) -> bool {
        matches!(
            (self, target),
            (TargetSpec::Both, _)
                | (TargetSpec::Local, Target::Local)
                | (TargetSpec::Remote, Target::Remote)
        )
    }
}

/// Scope of an activated environment script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvScriptScope {
    /// Sourced only for operations that may touch the remote host.
    Remote,
    /// Sourced for every operation.
    Both,
}

impl EnvScriptScope {
    fn applies(self, spec: TargetSpec) -> bool {
        match self {
            EnvScriptScope::Both => true,
            EnvScriptScope::Remote => spec != TargetSpec::Local,
        }
    }
}

/// How a non-zero exit code is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorMode {
    /// Non-zero exit becomes a [`DeployError::CommandFailed`] carrying the
    /// command and its stderr. The result stays inspectable via
    /// [`Session::last_result`].
    ///
    /// [`DeployError::CommandFailed`]: crate::error::DeployError::CommandFailed
    #[default]
    Strict,
    /// Non-zero exit is returned as an ordinary [`ExecResult`].
    Tolerate,
}

/// Options for a single [`Session::run`] call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOptions {
    /// Run inside the session's remembered directory.
    pub use_dir: bool,

    /// Source the activated environment script (if any).
    pub use_env_script: bool,

    /// Suppress echoing of the command and its output.
    pub hide: bool,

    /// See [`ErrorMode`].
    pub error_mode: ErrorMode,

    /// Where this command is allowed to run.
    pub target_spec: TargetSpec,

    /// Print the composed command instead of executing it.
    pub dry_run: bool,

    /// Timeout in seconds, 0 for none. Local execution only.
    pub timeout_secs: u64,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            use_dir: true,
            use_env_script: true,
            hide: false,
            error_mode: ErrorMode::Strict,
            target_spec: TargetSpec::Remote,
            dry_run: false,
            timeout_secs: 0,
        }
    }
}

impl RunOptions {
    /// Options gated on the given spec.
    pub fn on(spec: TargetSpec) -> Self {
        Self {
            target_spec: spec,
            ..Self::default()
        }
    }

    /// Suppress command echo and output.
    pub fn hidden(mut self) -> Self {
        self.hide = true;
        self
    }

    /// Return non-zero exits instead of erroring.
    pub fn tolerant(mut self) -> Self {
        self.error_mode = ErrorMode::Tolerate;
        self
    }

    /// Print the command without executing it.
    pub fn dry(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// Ignore the session's remembered directory for this call.
    pub fn without_dir(mut self) -> Self {
        self.use_dir = false;
        self
    }

    /// Skip the activated environment script for this call.
    pub fn without_env_script(mut self) -> Self {
        self.use_env_script = false;
        self
    }

    /// Abort local execution after the given number of seconds.
    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// Outcome of one executed (or omitted) operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecResult {
    /// Exit code (0 = success, -1 = terminated without a code).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// The operation was skipped because its spec did not match the target.
    pub omitted: bool,
}

impl ExecResult {
    /// Whether the operation exited cleanly.
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }

    pub(crate) fn omitted() -> Self {
        Self {
            omitted: true,
            ..Self::default()
        }
    }

    pub(crate) fn failure(exit_code: i32) -> Self {
        Self {
            exit_code,
            ..Self::default()
        }
    }
}

/// Executes a composed shell script and captures its outcome.
///
/// Implementations: [`LocalTransport`] (bash on this machine),
/// [`SshTransport`] (a channel on an authenticated ssh session) and the
/// scripted fake in [`fakes`].
#[async_trait]
pub trait Transport: Send {
    async fn exec(&mut self, script: &str, timeout_secs: u64) -> Result<ExecResult>;
}

/// Compose the effective shell script for one command.
///
/// Order is fixed: environment script, exports, directory, command. Each
/// piece is joined with `;` so the composition matches what a user would
/// type; [`Session::chdir`] separately verifies that the directory part
/// actually lands where it should.
pub(crate) fn compose_script(
    env_script: Option<&str>,
    env_vars: &[(String, String)],
    dir: Option<&str>,
    cmd: &str,
) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(script) = env_script {
        parts.push(format!("source {script}"));
    }
    for (name, value) in env_vars {
        parts.push(format!("export {name}=\"{value}\""));
    }
    if let Some(dir) = dir {
        parts.push(format!("cd {dir}"));
    }
    parts.push(cmd.to_string());
    parts.join("; ")
}
