//! Client configuration.
//!
//! Precedence, lowest first: built-in defaults, `config.json` in the data
//! directory, `SPARSIFY_*` environment variables, command-line flags.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

pub const ENV_API_URL: &str = "SPARSIFY_API_URL";
pub const ENV_POLL_INTERVAL_MS: &str = "SPARSIFY_POLL_INTERVAL_MS";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "SPARSIFY_REQUEST_TIMEOUT_MS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine data directory")]
    NoDataDir,

    #[error("{path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{var}={value:?} is not a valid number of milliseconds")]
    BadEnv { var: &'static str, value: String },
}

fn default_api_url() -> String {
    "http://localhost:5543".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// See [`crate::store::StoreOptions::discard_superseded`].
    #[serde(default)]
    pub discard_superseded: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            request_timeout_ms: default_request_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            discard_superseded: false,
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Read `path`; a missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let cfg = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded config from {:?}", path);
        Ok(cfg)
    }

    /// Apply overrides from a variable lookup (normally `std::env::var`).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.api_url = url.trim().to_string();
        }
        if let Some(ms) = parse_ms(&lookup, ENV_POLL_INTERVAL_MS)? {
            self.poll_interval_ms = ms;
        }
        if let Some(ms) = parse_ms(&lookup, ENV_REQUEST_TIMEOUT_MS)? {
            self.request_timeout_ms = ms;
        }
        Ok(())
    }

    /// Defaults, then `path`, then the process environment.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut cfg = Self::from_file(path)?;
        cfg.apply_env(|k| std::env::var(k).ok())?;
        Ok(cfg)
    }
}

fn parse_ms<F>(lookup: &F, var: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var).filter(|v| !v.trim().is_empty()) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::BadEnv { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashbrown::HashMap;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ClientConfig::from_file(&dir.path().join("config.json")).unwrap();
        assert_eq!(cfg, ClientConfig::default());
        assert_eq!(cfg.api_url, "http://localhost:5543");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "api_url": "http://10.0.0.2:5543", "discard_superseded": true }"#)
            .unwrap();

        let cfg = ClientConfig::from_file(&path).unwrap();
        assert_eq!(cfg.api_url, "http://10.0.0.2:5543");
        assert!(cfg.discard_superseded);
        assert_eq!(cfg.poll_interval_ms, 5_000);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "api_url = nope").unwrap();
        assert!(matches!(
            ClientConfig::from_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn environment_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            (ENV_API_URL, "http://remote:8080"),
            (ENV_POLL_INTERVAL_MS, "250"),
        ]
        .into_iter()
        .collect();

        let mut cfg = ClientConfig::default();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.api_url, "http://remote:8080");
        assert_eq!(cfg.poll_interval(), Duration::from_millis(250));
        assert_eq!(cfg.request_timeout_ms, 10_000);
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut cfg = ClientConfig::default();
        cfg.apply_env(|k| match k {
            ENV_API_URL => Some("  ".to_string()),
            ENV_POLL_INTERVAL_MS | ENV_REQUEST_TIMEOUT_MS => Some(String::new()),
            _ => None,
        })
        .unwrap();
        assert_eq!(cfg, ClientConfig::default());
    }

    #[test]
    fn bad_env_number_is_rejected() {
        let mut cfg = ClientConfig::default();
        let err = cfg
            .apply_env(|k| (k == ENV_REQUEST_TIMEOUT_MS).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::BadEnv { var: ENV_REQUEST_TIMEOUT_MS, .. }));
    }
}
