//! Layered configuration discovery.
//!
//! Deployment scripts live somewhere inside a project tree while their
//! config (often holding host names and secrets kept out of the repo) lives
//! somewhere above them. [`DeployConfig::discover`] walks up the parent
//! chain looking for the file, so the same script works from any checkout
//! depth.
//!
//! Config files are TOML with a `[settings]` table:
//!
//! ```toml
//! [settings]
//! remote_server = "example.org"
//! deploy_path = "~/apps/site"
//! debug = "false"
//! debug__devmode = "true"
//! ```
//!
//! Keys suffixed `__devmode` shadow their base key when the config is loaded
//! with `devmode` set, letting one file carry both production values and
//! development overrides.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::debug;

use crate::error::{DeployError, Result};

/// The suffix marking a development-mode override.
const DEVMODE_SUFFIX: &str = "__devmode";

/// How far up the parent chain to look by default.
const DEFAULT_SEARCH_LIMIT: usize = 4;

/// Options for [`DeployConfig::discover`].
#[derive(Debug, Clone, Default)]
pub struct ConfigOptions {
    /// Maximum number of parent directories to climb (default 4).
    pub limit: Option<usize>,

    /// Apply `__devmode` overrides.
    pub devmode: bool,

    /// Directory to start the search from (default: the current directory).
    pub start_dir: Option<PathBuf>,
}

/// A discovered and parsed configuration file.
#[derive(Debug, Clone)]
pub struct DeployConfig {
    settings: toml::Table,
    path: PathBuf,
}

impl DeployConfig {
    /// Find and load a config file.
    ///
    /// `name` is usually a bare file name like `deploy.toml`, searched for
    /// in the start directory and then up the tree. A `name` with a
    /// directory component pins the search to that location and ignores
    /// `limit` and `start_dir`.
    pub fn discover(name: &str, opts: &ConfigOptions) -> Result<Self> {
        let given = Path::new(name);
        let (search_dir, file_name, limit) = match given.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                let file = given
                    .file_name()
                    .ok_or_else(|| {
                        DeployError::InvalidArguments(format!("`{name}` has no file name"))
                    })?
                    .to_string_lossy()
                    .into_owned();
                (parent.to_path_buf(), file, 0)
            }
            _ => {
                let start = match &opts.start_dir {
                    Some(dir) => dir.clone(),
                    None => std::env::current_dir()?,
                };
                (
                    start,
                    name.to_string(),
                    opts.limit.unwrap_or(DEFAULT_SEARCH_LIMIT),
                )
            }
        };

        let path = Self::search_upwards(&search_dir, &file_name, limit).ok_or_else(|| {
            DeployError::ConfigNotFound {
                name: file_name.clone(),
                start_dir: search_dir.display().to_string(),
                limit,
            }
        })?;

        Self::load(&path, opts.devmode)
    }

    /// Load a config file from an exact path.
    pub fn load(path: &Path, devmode: bool) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let doc: toml::Table = text.parse()?;
        let settings = doc
            .get("settings")
            .and_then(|v| v.as_table())
            .cloned()
            .ok_or_else(|| {
                DeployError::ConfigInvalidValue {
                    key: "settings".to_string(),
                    value: String::new(),
                    reason: format!("`{}` has no [settings] table", path.display()),
                }
            })?;

        let settings = if devmode {
            apply_devmode(settings)
        } else {
            settings
        };

        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        debug!(path = %path.display(), devmode, "config loaded");
        Ok(Self { settings, path })
    }

    fn search_upwards(start: &Path, file_name: &str, limit: usize) -> Option<PathBuf> {
        let mut dir = start.to_path_buf();
        for _ in 0..=limit {
            let candidate = dir.join(file_name);
            if candidate.is_file() {
                return Some(candidate);
            }
            if !dir.pop() {
                break;
            }
        }
        None
    }

    /// Absolute path of the file this config came from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A required value, rendered as a string.
    pub fn get(&self, key: &str) -> Result<String> {
        let value = self
            .settings
            .get(key)
            .ok_or_else(|| DeployError::ConfigKeyMissing(key.to_string()))?;
        Ok(match value {
            toml::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// A required value parsed into `T`.
    pub fn get_as<T>(&self, key: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.get(key)?;
        raw.parse().map_err(|e: T::Err| DeployError::ConfigInvalidValue {
            key: key.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        })
    }

    /// A required comma-separated list, trimmed. An empty string is an empty
    /// list.
    pub fn get_csv(&self, key: &str) -> Result<Vec<String>> {
        let raw = self.get(key)?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(raw.split(',').map(|s| s.trim().to_string()).collect())
    }
}

/// Replace every base key that has a `<key>__devmode` sibling with the
/// sibling's value. The suffixed keys stay readable either way.
fn apply_devmode(settings: toml::Table) -> toml::Table {
    let mut effective = settings.clone();
    for (key, value) in &settings {
        if let Some(base) = key.strip_suffix(DEVMODE_SUFFIX) {
            if effective.contains_key(base) {
                effective.insert(base.to_string(), value.clone());
            }
        }
    }
    effective
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[settings]
remote_server = "example.org"
deploy_path = "~/apps/site"
threads = "4"
timeout = 2.5
allowed_hosts = "alpha.example.org, beta.example.org,gamma.example.org"
empty_list = ""
mode = "production"
mode__devmode = "development"
extra__devmode = "only for development"
"#;

    fn write_sample(dir: &Path) -> PathBuf {
        let path = dir.join("deploy.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        path
    }

    #[test]
    fn load_reads_settings_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(dir.path());

        let config = DeployConfig::load(&path, false).unwrap();
        assert_eq!(config.get("remote_server").unwrap(), "example.org");
        assert_eq!(config.get("deploy_path").unwrap(), "~/apps/site");
        // non-string values render through their TOML form
        assert_eq!(config.get("timeout").unwrap(), "2.5");
        assert_eq!(config.get_as::<f64>("timeout").unwrap(), 2.5);
        assert_eq!(config.get_as::<u32>("threads").unwrap(), 4);
    }

    #[test]
    fn missing_key_is_an_error_naming_the_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(dir.path());

        let config = DeployConfig::load(&path, false).unwrap();
        let err = config.get("no_such_key").unwrap_err();
        assert!(err.to_string().contains("no_such_key"));
    }

    #[test]
    fn get_csv_trims_and_handles_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(dir.path());

        let config = DeployConfig::load(&path, false).unwrap();
        assert_eq!(
            config.get_csv("allowed_hosts").unwrap(),
            vec![
                "alpha.example.org",
                "beta.example.org",
                "gamma.example.org"
            ]
        );
        assert!(config.get_csv("empty_list").unwrap().is_empty());
    }

    #[test]
    fn devmode_shadows_base_keys_only_when_requested() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(dir.path());

        let prod = DeployConfig::load(&path, false).unwrap();
        assert_eq!(prod.get("mode").unwrap(), "production");
        assert_eq!(prod.get("mode__devmode").unwrap(), "development");

        let dev = DeployConfig::load(&path, true).unwrap();
        assert_eq!(dev.get("mode").unwrap(), "development");
        // a suffixed key without a base key shadows nothing
        assert!(dev.get("extra").is_err());
        assert_eq!(dev.get("extra__devmode").unwrap(), "only for development");
    }

    #[test]
    fn discover_walks_up_within_the_limit() {
        let dir = tempfile::tempdir().unwrap();
        write_sample(dir.path());
        let nested = dir.path().join("scripts").join("deploy");
        std::fs::create_dir_all(&nested).unwrap();

        let opts = ConfigOptions {
            start_dir: Some(nested.clone()),
            ..ConfigOptions::default()
        };
        let config = DeployConfig::discover("deploy.toml", &opts).unwrap();
        assert_eq!(config.get("remote_server").unwrap(), "example.org");
        assert!(config.path().ends_with("deploy.toml"));

        // one step is not enough to climb two directories
        let opts = ConfigOptions {
            start_dir: Some(nested),
            limit: Some(1),
            ..ConfigOptions::default()
        };
        let err = DeployConfig::discover("deploy.toml", &opts).unwrap_err();
        assert!(matches!(err, DeployError::ConfigNotFound { .. }));
    }

    #[test]
    fn discover_with_a_path_pins_the_location() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(dir.path());

        let config =
            DeployConfig::discover(path.to_str().unwrap(), &ConfigOptions::default()).unwrap();
        assert_eq!(config.get("remote_server").unwrap(), "example.org");

        let missing = dir.path().join("nope.toml");
        let err = DeployConfig::discover(missing.to_str().unwrap(), &ConfigOptions::default())
            .unwrap_err();
        assert!(matches!(err, DeployError::ConfigNotFound { .. }));
    }

    #[test]
    fn missing_settings_table_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deploy.toml");
        std::fs::write(&path, "[other]\nkey = \"value\"\n").unwrap();

        let err = DeployConfig::load(&path, false).unwrap_err();
        assert!(err.to_string().contains("[settings]"));
    }
}
