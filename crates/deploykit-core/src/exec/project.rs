//! Pushing the current project to the remote host.

use std::path::Path;

use super::{RunOptions, Session, SyncOptions, Target, TargetSpec};
use crate::error::{DeployError, Result};

/// Directories never worth shipping to a staging area.
const DEFAULT_EXCLUDES: &[&str] = &[
    ".git/",
    ".idea/",
    "__pycache__/",
    "target/",
    "node_modules/",
];

impl Session {
    /// Push the working tree at `project_dir` to `staging_dir` on the remote
    /// host and run `install_cmd` there. `{path}` in the install command is
    /// replaced with the uploaded project path.
    ///
    /// This exists so development versions can be deployed without
    /// publishing them to a registry first. Remote sessions only.
    pub async fn deploy_project(
        &mut self,
        project_dir: &Path,
        staging_dir: &str,
        install_cmd: &str,
    ) -> Result<super::ExecResult> {
        if self.target() != Target::Remote {
            return Err(DeployError::WrongTarget {
                operation: "deploy_project".to_string(),
                required: Target::Remote,
            });
        }

        let project_dir = project_dir.canonicalize()?;
        let dir_name = project_dir
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                DeployError::InvalidArguments("project directory has no name".to_string())
            })?
            .to_string();

        let opts = SyncOptions {
            filters: DEFAULT_EXCLUDES
                .iter()
                .map(|e| format!("--exclude={e}"))
                .collect(),
            target_spec: TargetSpec::Remote,
            ..SyncOptions::default()
        };
        let source = project_dir.to_string_lossy().into_owned();
        self.upload(&source, staging_dir, &opts).await?;

        let cmd = install_cmd.replace("{path}", &format!("{staging_dir}/{dir_name}"));
        self.run(&cmd, RunOptions::default()).await
    }
}
