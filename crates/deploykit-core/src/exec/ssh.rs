//! Remote execution over ssh2.
//!
//! Authentication goes through ssh-agent only; deployment scripts run on
//! operator machines where an agent is the norm, and password prompts would
//! stall unattended runs. The blocking ssh2 calls are made directly from
//! async fns since each deployment step is sequential anyway.

use std::io::Read;
use std::net::TcpStream;
use std::time::Instant;

use async_trait::async_trait;
use tracing::debug;

use super::{ExecResult, Transport};
use crate::error::{DeployError, Result};

/// An authenticated ssh session to one host.
pub struct SshTransport {
    session: ssh2::Session,
    host: String,
    user: String,
}

impl SshTransport {
    /// Connect and authenticate via ssh-agent.
    ///
    /// `host` may carry an explicit port (`host:2222`); port 22 otherwise.
    pub fn connect(host: &str, user: &str) -> Result<Self> {
        let addr = if host.contains(':') {
            host.to_string()
        } else {
            format!("{host}:22")
        };

        let tcp = TcpStream::connect(&addr).map_err(|e| DeployError::Connect {
            host: host.to_string(),
            reason: e.to_string(),
        })?;

        let mut session = ssh2::Session::new()?;
        session.set_tcp_stream(tcp);
        session.handshake()?;

        session
            .userauth_agent(user)
            .map_err(|_| DeployError::Auth {
                user: user.to_string(),
                host: host.to_string(),
            })?;
        if !session.authenticated() {
            return Err(DeployError::Auth {
                user: user.to_string(),
                host: host.to_string(),
            });
        }

        debug!(host, user, "ssh session established");
        Ok(Self {
            session,
            host: host.to_string(),
            user: user.to_string(),
        })
    }

    /// The remote host this transport talks to.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The authenticated user.
    pub fn user(&self) -> &str {
        &self.user
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn exec(&mut self, script: &str, _timeout_secs: u64) -> Result<ExecResult> {
        let start = Instant::now();

        let mut channel = self.session.channel_session()?;
        channel.exec(script)?;

        let mut stdout = String::new();
        channel.read_to_string(&mut stdout).map_err(|e| {
            DeployError::Ssh(format!("failed to read remote stdout: {e}"))
        })?;
        let mut stderr = String::new();
        channel.stderr().read_to_string(&mut stderr).map_err(|e| {
            DeployError::Ssh(format!("failed to read remote stderr: {e}"))
        })?;

        channel.wait_close()?;
        let exit_code = channel.exit_status()?;

        debug!(host = %self.host, exit_code, "remote command finished");
        Ok(ExecResult {
            exit_code,
            stdout,
            stderr,
            duration_ms: start.elapsed().as_millis() as u64,
            omitted: false,
        })
    }
}
