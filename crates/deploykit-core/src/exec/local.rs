//! Local execution through `bash -c`.

use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;

use super::{ExecResult, Transport};
use crate::error::{DeployError, Result};

/// Runs composed scripts on this machine.
///
/// Scripts go through `bash -c` because the composition may contain
/// `source`, `export` and `cd` pieces that need a real shell.
#[derive(Debug, Default)]
pub struct LocalTransport;

impl LocalTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn exec(&mut self, script: &str, timeout_secs: u64) -> Result<ExecResult> {
        let start = Instant::now();

        let child = Command::new("bash")
            .args(["-c", script])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let output = if timeout_secs > 0 {
            tokio::time::timeout(
                std::time::Duration::from_secs(timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| DeployError::CommandTimeout {
                command: script.to_string(),
                timeout_secs,
            })??
        } else {
            child.wait_with_output().await?
        };

        Ok(ExecResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
            omitted: false,
        })
    }
}
