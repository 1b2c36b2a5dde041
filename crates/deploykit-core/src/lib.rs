//! deploykit core library
//!
//! Building blocks for deployment scripts: a stateful [`Session`] that runs
//! commands locally or on a remote host over ssh, rsync-backed file
//! transfer, layered config discovery, template rendering, git release
//! tagging and HTTP verification probes.
//!
//! A script picks its target from the command line, opens a session and
//! drives it; operations carry a [`TargetSpec`] so one script serves both
//! local and remote deployments.

pub mod args;
pub mod config;
pub mod error;
pub mod exec;
pub mod git;
pub mod http;
pub mod style;
pub mod telemetry;
pub mod template;

pub use args::{confirm_deployment, prompt_yes, DeployArgs, DeploymentSummary};
pub use config::{ConfigOptions, DeployConfig};
pub use error::{DeployError, Result};
pub use exec::{
    is_rsync_available, EnvScriptScope, ErrorMode, ExecResult, RunOptions, Session, SyncOptions,
    Target, TargetSpec,
};
pub use git::{head_sha, is_git_repo, tag_release, TagOptions};
pub use http::{HttpProbe, ProbeOutcome};
pub use telemetry::init_tracing;
pub use template::{render_json_template, render_str, render_template};

/// deploykit version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
