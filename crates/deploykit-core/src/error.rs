//! Error taxonomy for deploykit.

use thiserror::Error;

/// Errors produced by deployment operations.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("could not connect to {host}: {reason}")]
    Connect { host: String, reason: String },

    #[error("ssh authentication failed for {user}@{host}: ensure ssh-agent is running and a key is loaded")]
    Auth { user: String, host: String },

    #[error("ssh error: {0}")]
    Ssh(String),

    #[error("command `{command}` failed with exit code {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("command `{command}` timed out after {timeout_secs} seconds")]
    CommandTimeout { command: String, timeout_secs: u64 },

    #[error("relative path `{0}` requires a working directory to be set first")]
    RelativePathWithoutBase(String),

    #[error("could not change directory to `{path}`: {reason}")]
    ChdirFailed { path: String, reason: String },

    #[error("rsync exited with code {0}")]
    RsyncFailed(i32),

    #[error("operation `{operation}` requires a {required:?} session")]
    WrongTarget {
        operation: String,
        required: crate::exec::Target,
    },

    #[error("config file `{name}` not found in `{start_dir}` or {limit} parent directories")]
    ConfigNotFound {
        name: String,
        start_dir: String,
        limit: usize,
    },

    #[error("config key not found: {0}")]
    ConfigKeyMissing(String),

    #[error("config key `{key}` has invalid value `{value}`: {reason}")]
    ConfigInvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("template error: {0}")]
    Template(String),

    #[error("git error: {0}")]
    Git(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl From<reqwest::Error> for DeployError {
    fn from(err: reqwest::Error) -> Self {
        DeployError::Http(err.to_string())
    }
}

impl From<ssh2::Error> for DeployError {
    fn from(err: ssh2::Error) -> Self {
        DeployError::Ssh(err.to_string())
    }
}

/// Result type for deployment operations.
pub type Result<T> = std::result::Result<T, DeployError>;
