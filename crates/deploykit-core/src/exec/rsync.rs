//! File synchronisation through the system `rsync`.
//!
//! rsync always runs on the operator's machine; for remote sessions the far
//! side of the transfer is qualified as `user@host:path` and the transfer
//! rides on ssh.

use std::process::Stdio;
use std::time::Instant;

use tokio::process::Command;
use tracing::debug;

use super::{ExecResult, Session, Target, TargetSpec};
use crate::error::{DeployError, Result};
use crate::style;

/// Options for [`Session::upload`] and [`Session::download`].
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Extra rsync arguments, typically `--exclude=...` filters.
    pub filters: Vec<String>,

    /// Delete files on the receiving side that are gone from the source.
    pub delete: bool,

    /// Print the rsync invocation instead of running it.
    pub dry_run: bool,

    /// Return a non-zero exit as a result instead of an error.
    pub tolerate_exit: bool,

    /// Where this transfer applies.
    pub target_spec: TargetSpec,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            delete: false,
            dry_run: false,
            tolerate_exit: false,
            target_spec: TargetSpec::Both,
        }
    }
}

/// Whether the system rsync binary is present.
pub fn is_rsync_available() -> bool {
    std::process::Command::new("rsync")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn split_host_port(host: &str) -> (&str, u16) {
    match host.rsplit_once(':') {
        Some((h, p)) => match p.parse() {
            Ok(port) => (h, port),
            Err(_) => (host, 22),
        },
        None => (host, 22),
    }
}

fn rsync_args(
    remote_port: Option<u16>,
    opts: &SyncOptions,
    source: &str,
    dest: &str,
) -> Vec<String> {
    let mut args = vec!["-pthrvz".to_string()];
    if opts.delete {
        args.push("--delete".to_string());
    }
    if let Some(port) = remote_port {
        args.push(format!("--rsh=ssh -p {port}"));
    }
    args.extend(opts.filters.iter().cloned());
    args.push(source.to_string());
    args.push(dest.to_string());
    args
}

async fn run_rsync(args: &[String]) -> Result<ExecResult> {
    let start = Instant::now();
    let output = Command::new("rsync")
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    Ok(ExecResult {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        duration_ms: start.elapsed().as_millis() as u64,
        omitted: false,
    })
}

impl Session {
    /// rsync `source` (on this machine) to `dest` on the session target.
    pub async fn upload(
        &mut self,
        source: &str,
        dest: &str,
        opts: &SyncOptions,
    ) -> Result<ExecResult> {
        let (far, port) = self.qualify(dest);
        self.transfer(source.to_string(), far, port, opts).await
    }

    /// rsync `source` on the session target down to `dest` on this machine.
    pub async fn download(
        &mut self,
        source: &str,
        dest: &str,
        opts: &SyncOptions,
    ) -> Result<ExecResult> {
        let (far, port) = self.qualify(source);
        self.transfer(far, dest.to_string(), port, opts).await
    }

    /// Qualify the far side of a transfer for the session target.
    fn qualify(&self, path: &str) -> (String, Option<u16>) {
        match (self.target(), self.host(), self.user()) {
            (Target::Remote, Some(host), Some(user)) => {
                let (host, port) = split_host_port(host);
                (format!("{user}@{host}:{path}"), Some(port))
            }
            _ => (path.to_string(), None),
        }
    }

    async fn transfer(
        &mut self,
        source: String,
        dest: String,
        remote_port: Option<u16>,
        opts: &SyncOptions,
    ) -> Result<ExecResult> {
        let args = rsync_args(remote_port, opts, &source, &dest);
        let rendered = format!("rsync {}", args.join(" "));

        if !opts.target_spec.matches(self.target()) {
            println!(
                "{}",
                style::dim(&format!("> omitting `{rendered}` (not for this target)"))
            );
            return Ok(ExecResult::omitted());
        }
        if opts.dry_run {
            println!("{} {rendered}", style::dim("dry-run:"));
            return Ok(ExecResult::default());
        }

        debug!(%rendered, "syncing");
        let res = run_rsync(&args).await?;
        if !res.stdout.is_empty() {
            print!("{}", res.stdout);
        }
        if !res.passed() && !opts.tolerate_exit {
            return Err(DeployError::RsyncFailed(res.exit_code));
        }
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_host_port_defaults_to_22() {
        assert_eq!(split_host_port("example.org"), ("example.org", 22));
        assert_eq!(split_host_port("example.org:2222"), ("example.org", 2222));
        assert_eq!(split_host_port("host:nonsense"), ("host:nonsense", 22));
    }

    #[test]
    fn rsync_args_local_transfer() {
        let opts = SyncOptions::default();
        let args = rsync_args(None, &opts, "src/", "/tmp/dst");
        assert_eq!(args, vec!["-pthrvz", "src/", "/tmp/dst"]);
    }

    #[test]
    fn rsync_args_remote_with_delete_and_filters() {
        let opts = SyncOptions {
            delete: true,
            filters: vec!["--exclude=.git/".to_string()],
            ..SyncOptions::default()
        };
        let args = rsync_args(Some(2222), &opts, "dist/", "deploy@example.org:~/apps");
        assert_eq!(
            args,
            vec![
                "-pthrvz",
                "--delete",
                "--rsh=ssh -p 2222",
                "--exclude=.git/",
                "dist/",
                "deploy@example.org:~/apps",
            ]
        );
    }
}
