//! The stateful deployment session.

use tracing::debug;

use super::{
    compose_script, EnvScriptScope, ErrorMode, ExecResult, LocalTransport, RunOptions,
    SshTransport, Target, TargetSpec, Transport,
};
use crate::error::{DeployError, Result};
use crate::style;

/// A connection to a deployment target that remembers state between
/// commands: the working directory, exported environment variables and an
/// optional environment script sourced before every command.
///
/// The directory is remembered here rather than on the remote shell because
/// every remote command runs in a fresh ssh channel.
pub struct Session {
    target: Target,
    host: Option<String>,
    user: Option<String>,
    dir: Option<String>,
    env_vars: Vec<(String, String)>,
    env_script: Option<(String, EnvScriptScope)>,
    last_command: Option<String>,
    last_result: Option<ExecResult>,
    transport: Box<dyn Transport>,
}

impl Session {
    /// A session running commands on this machine.
    pub fn local() -> Self {
        Self::with_transport(Target::Local, Box::new(LocalTransport::new()), None, None)
    }

    /// Connect to a remote host over ssh and verify the connection works.
    pub async fn connect(host: &str, user: &str) -> Result<Self> {
        let transport = SshTransport::connect(host, user)?;
        let mut session = Self::with_transport(
            Target::Remote,
            Box::new(transport),
            Some(host.to_string()),
            Some(user.to_string()),
        );
        session
            .run("echo 'connection established'", RunOptions::default().hidden())
            .await
            .map_err(|e| DeployError::Connect {
                host: host.to_string(),
                reason: e.to_string(),
            })?;
        Ok(session)
    }

    /// Build a session over an arbitrary transport. Public so tests can use
    /// the scripted fake from [`super::fakes`].
    pub fn with_transport(
        target: Target,
        transport: Box<dyn Transport>,
        host: Option<String>,
        user: Option<String>,
    ) -> Self {
        Self {
            target,
            host,
            user,
            dir: None,
            env_vars: Vec::new(),
            env_script: None,
            last_command: None,
            last_result: None,
            transport,
        }
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// The remembered working directory, if any.
    pub fn dir(&self) -> Option<&str> {
        self.dir.as_deref()
    }

    /// The last composed script handed to the transport.
    pub fn last_command(&self) -> Option<&str> {
        self.last_command.as_deref()
    }

    /// The result of the last executed command.
    pub fn last_result(&self) -> Option<&ExecResult> {
        self.last_result.as_ref()
    }

    /// Export an environment variable for every subsequent command.
    pub fn set_env(&mut self, name: &str, value: &str) {
        if let Some(entry) = self.env_vars.iter_mut().find(|(n, _)| n == name) {
            entry.1 = value.to_string();
        } else {
            self.env_vars.push((name.to_string(), value.to_string()));
        }
    }

    /// Source a shell script (e.g. a virtualenv `activate`) before every
    /// subsequent command within `scope`. Runs a probe so a broken script
    /// surfaces here and not at the first real command.
    pub async fn activate_env_script(
        &mut self,
        path: &str,
        scope: EnvScriptScope,
    ) -> Result<ExecResult> {
        self.env_script = Some((path.to_string(), scope));
        self.run("true", RunOptions::on(TargetSpec::Both).hidden()).await
    }

    /// Stop sourcing the environment script.
    pub fn deactivate_env_script(&mut self) {
        self.env_script = None;
    }

    /// Forget the remembered working directory.
    pub fn clear_dir(&mut self) {
        self.dir = None;
    }

    /// Print a styled progress line, dimmed with a note when `spec` does not
    /// match this session's target.
    pub fn announce(&self, text: &str, spec: TargetSpec) {
        if spec.matches(self.target) {
            println!("{}", style::bright(text));
        } else {
            println!(
                "{}",
                style::dim(&format!("omitted (not for this target): {text}"))
            );
        }
    }

    /// Run a command on the session's target.
    ///
    /// The effective script is composed from the activated environment
    /// script, the exported variables, the remembered directory and `cmd`,
    /// in that order. Commands whose `target_spec` does not match the
    /// session target are omitted and report success.
    pub async fn run(&mut self, cmd: &str, opts: RunOptions) -> Result<ExecResult> {
        if !opts.hide {
            println!("{} {cmd}", style::dim("->"));
        }

        let env_script = match &self.env_script {
            Some((path, scope)) if opts.use_env_script && scope.applies(opts.target_spec) => {
                Some(path.as_str())
            }
            _ => None,
        };
        let dir = if opts.use_dir { self.dir.as_deref() } else { None };
        let script = compose_script(env_script, &self.env_vars, dir, cmd);
        self.last_command = Some(script.clone());

        if !opts.target_spec.matches(self.target) {
            if !opts.hide {
                println!(
                    "{}",
                    style::dim(&format!(
                        "> omitting `{cmd}` (not for this target)"
                    ))
                );
            }
            let res = ExecResult::omitted();
            self.last_result = Some(res.clone());
            return Ok(res);
        }

        if opts.dry_run {
            println!("{} {script}", style::dim("dry-run:"));
            return Ok(ExecResult::default());
        }

        debug!(on = ?self.target, %script, "executing");
        let res = self.transport.exec(&script, opts.timeout_secs).await?;
        self.last_result = Some(res.clone());

        if !opts.hide && !res.stdout.is_empty() {
            print!("{} {}", style::dim("<-"), res.stdout);
        }

        if opts.error_mode == ErrorMode::Strict && !res.passed() {
            return Err(DeployError::CommandFailed {
                command: cmd.to_string(),
                exit_code: res.exit_code,
                stderr: res.stderr.trim().to_string(),
            });
        }
        Ok(res)
    }

    /// Remember a working directory for subsequent commands.
    ///
    /// Absolute paths (and `~`/`$`-prefixed ones, which the remote shell
    /// expands) are taken as given; a relative path needs a previously set
    /// directory and is resolved against the live `pwd`. The candidate is
    /// verified with `cd <dir> && pwd` before it is remembered, so a failed
    /// change never poisons later commands. With `tolerate`, verification
    /// failure comes back as a non-zero [`ExecResult`] instead of an error.
    pub async fn chdir(
        &mut self,
        path: &str,
        spec: TargetSpec,
        tolerate: bool,
    ) -> Result<ExecResult> {
        if path.is_empty() {
            return Err(DeployError::ChdirFailed {
                path: path.to_string(),
                reason: "empty path".to_string(),
            });
        }

        let candidate = if path.starts_with(['/', '~', '$']) {
            path.to_string()
        } else {
            if self.dir.is_none() {
                return Err(DeployError::RelativePathWithoutBase(path.to_string()));
            }
            let pwd = self
                .run("pwd", RunOptions::on(spec).hidden().tolerant())
                .await?;
            if pwd.omitted {
                // Cannot ask a target we are not touching; compose textually.
                format!("{}/{path}", self.dir.as_deref().unwrap_or_default())
            } else if !pwd.passed() {
                return Err(DeployError::ChdirFailed {
                    path: path.to_string(),
                    reason: format!(
                        "could not resolve current directory: {}",
                        pwd.stderr.trim()
                    ),
                });
            } else {
                format!("{}/{path}", pwd.stdout.trim())
            }
        };

        let res = self
            .run(
                &format!("cd {candidate} && pwd"),
                RunOptions::on(spec).hidden().tolerant().without_dir(),
            )
            .await?;

        if res.omitted {
            self.dir = Some(candidate);
            return Ok(res);
        }

        if !res.passed() {
            if tolerate {
                return Ok(ExecResult::failure(res.exit_code.max(1)));
            }
            return Err(DeployError::ChdirFailed {
                path: candidate,
                reason: res.stderr.trim().to_string(),
            });
        }

        // Symlinks and `~` expansion may rewrite the prefix; require only the
        // last path component to match what `pwd` reports.
        let pwd_txt = res.stdout.trim().to_string();
        let last_component = std::path::Path::new(path)
            .file_name()
            .map(|c| c.to_string_lossy().into_owned());
        let verified = path.starts_with(['~', '$'])
            || last_component
                .map(|l| pwd_txt.ends_with(&l))
                .unwrap_or(true);
        if !verified {
            if tolerate {
                return Ok(ExecResult::failure(1));
            }
            return Err(DeployError::ChdirFailed {
                path: candidate,
                reason: format!("`pwd` reported `{pwd_txt}`"),
            });
        }

        debug!(dir = %candidate, "working directory set");
        self.dir = Some(candidate);
        Ok(res)
    }
}
