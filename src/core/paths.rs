//! Cross-platform application paths
//!
//! - Linux: ~/.local/share/sparsify/
//! - Windows: %APPDATA%\sparsify\
//! - MacOS: ~/Library/Application Support/sparsify/

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ConfigError;

#[derive(Debug, Clone)]
pub struct AppPaths {
    data_dir: PathBuf,
}

impl AppPaths {
    /// Resolve the OS data directory and make sure it exists.
    pub fn new() -> Result<Self, ConfigError> {
        let base = dirs::data_dir().ok_or(ConfigError::NoDataDir)?;
        Self::at(base.join("sparsify"))
    }

    pub fn at(data_dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir).map_err(|source| ConfigError::Io {
            path: data_dir.clone(),
            source,
        })?;
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }

    pub fn prefs_file(&self) -> PathBuf {
        self.data_dir.join("prefs.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_directory_and_derives_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("sparsify");
        let paths = AppPaths::at(&root).unwrap();

        assert!(root.is_dir());
        assert_eq!(paths.config_file(), root.join("config.json"));
        assert_eq!(paths.prefs_file(), root.join("prefs.json"));
    }
}
