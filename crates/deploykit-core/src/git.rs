//! Release tagging through the `git` CLI.

use std::path::Path;
use std::process::Command;

use chrono::Utc;
use tracing::info;

use crate::error::{DeployError, Result};
use crate::style;

/// Options for [`tag_release`].
#[derive(Debug, Clone, Default)]
pub struct TagOptions {
    /// Tag name; defaults to `deploy/<UTC timestamp>`.
    pub name: Option<String>,

    /// Optional tag message (makes the tag annotated).
    pub message: Option<String>,

    /// Ask before tagging.
    pub confirm: bool,
}

/// Check whether a directory is inside a git work tree.
pub fn is_git_repo(dir: &Path) -> bool {
    Command::new("git")
        .args(["rev-parse", "--is-inside-work-tree"])
        .current_dir(dir)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// The HEAD commit SHA of the repository at `dir`.
pub fn head_sha(dir: &Path) -> Result<String> {
    let sha = run_git(dir, &["rev-parse", "HEAD"])?.trim().to_string();
    if sha.is_empty() {
        return Err(DeployError::Git(
            "git rev-parse HEAD returned empty output".to_string(),
        ));
    }
    Ok(sha)
}

/// Tag the repository at `repo_dir` to mark a deployment.
///
/// A dirty work tree is auto-committed first so the tag points at exactly
/// what was deployed. Returns the created tag name, or `None` when the user
/// declined or no repository was found (a reported no-op, not an error,
/// since tagging is an optional nicety of deployment runs).
pub fn tag_release(repo_dir: &Path, opts: &TagOptions) -> Result<Option<String>> {
    if opts.confirm
        && !crate::args::prompt_yes("should a deployment tag be created for the repo (y/N)? ")?
    {
        return Ok(None);
    }

    if !is_git_repo(repo_dir) {
        println!(
            "{}",
            style::yellow("could not find a git repository, omitting tag")
        );
        return Ok(None);
    }

    let name = opts
        .name
        .clone()
        .unwrap_or_else(|| format!("deploy/{}", Utc::now().format("%Y-%m-%d__%H-%M-%S")));

    if is_dirty(repo_dir)? {
        run_git(repo_dir, &["commit", "-a", "-m", "autocommit during deployment"])?;
    }

    match &opts.message {
        Some(message) => run_git(repo_dir, &["tag", "-m", message, &name])?,
        None => run_git(repo_dir, &["tag", &name])?,
    };

    info!(tag = %name, "deployment tag created");
    println!("created tag `{}`", name);
    Ok(Some(name))
}

fn is_dirty(repo_dir: &Path) -> Result<bool> {
    let status = run_git(repo_dir, &["status", "--porcelain"])?;
    Ok(!status.trim().is_empty())
}

fn run_git(repo_dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_dir)
        .output()
        .map_err(|e| DeployError::Git(format!("failed to run git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DeployError::Git(format!(
            "git {} failed: {}",
            args.join(" "),
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
