//! Argument and confirmation conventions shared by deployment scripts.
//!
//! Every deployment script takes the same leading arguments; scripts embed
//! [`DeployArgs`] with `#[command(flatten)]` (or parse it directly) instead
//! of re-declaring them.

use std::io::Write;

use clap::Parser;

use crate::error::{DeployError, Result};
use crate::exec::Target;
use crate::style;

/// The argument set every deployment script understands.
#[derive(Debug, Clone, Parser)]
pub struct DeployArgs {
    /// Deployment target.
    #[arg(value_enum)]
    pub target: Target,

    /// Skip the safety confirmation.
    #[arg(short = 'u', long = "unsafe")]
    pub unsafe_mode: bool,

    /// First deployment of this app (run one-time setup steps).
    #[arg(short, long)]
    pub initial: bool,

    /// Symlink into place instead of copying (local target only).
    #[arg(short = 'l', long)]
    pub symlink: bool,
}

impl DeployArgs {
    /// Parse from the process arguments and validate.
    pub fn from_cli() -> Result<Self> {
        Self::parse().validated()
    }

    /// Reject option combinations that cannot work together.
    pub fn validated(self) -> Result<Self> {
        if self.symlink && self.target != Target::Local {
            return Err(DeployError::InvalidArguments(
                "--symlink is only available for local deployments".to_string(),
            ));
        }
        Ok(self)
    }
}

/// What [`confirm_deployment`] tells the user before they commit.
#[derive(Debug, Clone)]
pub struct DeploymentSummary<'a> {
    pub app: &'a str,
    pub target: Target,
    pub user: &'a str,
    pub host: &'a str,
    pub deploy_path: &'a str,
}

/// Show what is about to happen and ask for confirmation.
///
/// Returns `false` when the user declines; the caller decides whether that
/// aborts the whole run. `unsafe_flag` skips the prompt.
pub fn confirm_deployment(summary: &DeploymentSummary<'_>, unsafe_flag: bool) -> Result<bool> {
    println!(
        "\n  deploying {} with target {:?} to {}\n  deployment path: `{}`\n",
        style::bright(summary.app),
        summary.target,
        style::bright(&format!("{}@{}", summary.user, summary.host)),
        summary.deploy_path,
    );
    println!(
        "  {} existing user data of the app and any other changes in the\n  \
         deployment directory will likely be replaced by predefined data and fixtures.\n",
        style::yellow("caution:")
    );

    if unsafe_flag {
        return Ok(true);
    }

    let confirmed = prompt_yes("continue (N/y)? ")?;
    if !confirmed {
        println!("{}", style::bred("aborted."));
    }
    Ok(confirmed)
}

/// Ask a yes/no question on stdin; only an explicit `y`/`yes` counts as yes.
pub fn prompt_yes(question: &str) -> Result<bool> {
    print!("{question}");
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    let answer = answer.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> std::result::Result<DeployArgs, clap::Error> {
        DeployArgs::try_parse_from(std::iter::once("deploy").chain(args.iter().copied()))
    }

    #[test]
    fn parses_target_and_flags() {
        let args = parse(&["-u", "local"]).unwrap().validated().unwrap();
        assert_eq!(args.target, Target::Local);
        assert!(args.unsafe_mode);
        assert!(!args.initial);

        let args = parse(&["local"]).unwrap().validated().unwrap();
        assert!(!args.unsafe_mode);
    }

    #[test]
    fn target_is_required() {
        assert!(parse(&[]).is_err());
    }

    #[test]
    fn rejects_unknown_target() {
        assert!(parse(&["staging"]).is_err());
    }

    #[test]
    fn symlink_needs_local_target() {
        let err = parse(&["-l", "remote"]).unwrap().validated().unwrap_err();
        assert!(err.to_string().contains("--symlink"));

        let args = parse(&["-l", "local"]).unwrap().validated().unwrap();
        assert!(args.symlink);
    }
}
