//! "Getting started" dialog preferences.
//!
//! Two flags:
//! - `do_not_show` lives in persistent storage and survives restarts. It is
//!   written as `true` the first time the dialog opens, so a fresh install
//!   sees the dialog exactly once unless the user opts back in.
//! - `shown` lives in session storage and keeps the dialog from reopening
//!   within one session.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use hashbrown::HashMap;
use thiserror::Error;
use tracing::warn;

pub const DO_NOT_SHOW_KEY: &str = "sparsify.getting_started.do_not_show";
pub const SHOWN_THIS_SESSION_KEY: &str = "sparsify.getting_started.shown";

#[derive(Debug, Error)]
pub enum PrefsError {
    #[error("prefs io ({path:?}): {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("prefs encode: {0}")]
    Encode(#[from] serde_json::Error),
}

/// String key/value storage, in the shape of browser local/session storage.
pub trait KeyValueStore: Send {
    fn get_string(&self, key: &str) -> Option<String>;
    fn set_string(&mut self, key: &str, value: &str) -> Result<(), PrefsError>;
    fn remove(&mut self, key: &str) -> Result<(), PrefsError>;
}

/// Process-lifetime storage; stands in for session storage.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    items: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_string(&self, key: &str) -> Option<String> {
        self.items.get(key).cloned()
    }

    fn set_string(&mut self, key: &str, value: &str) -> Result<(), PrefsError> {
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), PrefsError> {
        self.items.remove(key);
        Ok(())
    }
}

/// JSON-file backed storage; stands in for local storage.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    items: HashMap<String, String>,
}

impl FileStore {
    /// Open `path`, starting empty if it is missing or unreadable.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let items = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Ignoring unreadable prefs file {:?}: {}", path, e);
                HashMap::new()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                warn!("Could not read prefs file {:?}: {}", path, e);
                HashMap::new()
            }
        };
        Self { path, items }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), PrefsError> {
        let raw = serde_json::to_string_pretty(&self.items)?;
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|source| PrefsError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        fs::write(&self.path, raw).map_err(|source| PrefsError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl KeyValueStore for FileStore {
    fn get_string(&self, key: &str) -> Option<String> {
        self.items.get(key).cloned()
    }

    fn set_string(&mut self, key: &str, value: &str) -> Result<(), PrefsError> {
        self.items.insert(key.to_string(), value.to_string());
        self.flush()
    }

    fn remove(&mut self, key: &str) -> Result<(), PrefsError> {
        if self.items.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub struct GettingStarted<L, S> {
    local: L,
    session: S,
}

impl<L: KeyValueStore, S: KeyValueStore> GettingStarted<L, S> {
    pub fn new(local: L, session: S) -> Self {
        Self { local, session }
    }

    /// Stored "do not show again" flag; `None` on a first run.
    pub fn do_not_show(&self) -> Option<bool> {
        self.local
            .get_string(DO_NOT_SHOW_KEY)
            .as_deref()
            .and_then(parse_bool)
    }

    pub fn shown_this_session(&self) -> bool {
        self.session
            .get_string(SHOWN_THIS_SESSION_KEY)
            .as_deref()
            .and_then(parse_bool)
            .unwrap_or(false)
    }

    pub fn should_open(&self) -> bool {
        !self.shown_this_session() && !self.do_not_show().unwrap_or(false)
    }

    /// Decide whether the dialog opens now, recording that it did.
    pub fn open_if_needed(&mut self) -> bool {
        if !self.should_open() {
            return false;
        }
        if let Err(e) = self.session.set_string(SHOWN_THIS_SESSION_KEY, "true") {
            warn!("Could not record getting-started session flag: {}", e);
        }
        if self.do_not_show().is_none() {
            if let Err(e) = self.local.set_string(DO_NOT_SHOW_KEY, "true") {
                warn!("Could not persist getting-started flag: {}", e);
            }
        }
        true
    }

    pub fn set_do_not_show(&mut self, value: bool) -> Result<(), PrefsError> {
        self.local
            .set_string(DO_NOT_SHOW_KEY, if value { "true" } else { "false" })
    }

    pub fn into_parts(self) -> (L, S) {
        (self.local, self.session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_run_opens_once_per_session() {
        let mut gs = GettingStarted::new(MemoryStore::new(), MemoryStore::new());
        assert_eq!(gs.do_not_show(), None);
        assert!(gs.open_if_needed());
        assert!(!gs.open_if_needed());
        assert_eq!(gs.do_not_show(), Some(true));
    }

    #[test]
    fn second_session_with_flag_never_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");

        let mut first = GettingStarted::new(FileStore::open(&path), MemoryStore::new());
        assert!(first.open_if_needed());

        let mut second = GettingStarted::new(FileStore::open(&path), MemoryStore::new());
        assert!(!second.open_if_needed());
        assert!(!second.open_if_needed());
    }

    #[test]
    fn opting_back_in_reopens_next_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("prefs.json");

        let mut gs = GettingStarted::new(FileStore::open(&path), MemoryStore::new());
        assert!(gs.open_if_needed());
        gs.set_do_not_show(false).unwrap();
        // Same session: still suppressed.
        assert!(!gs.open_if_needed());

        let mut next = GettingStarted::new(FileStore::open(&path), MemoryStore::new());
        assert!(next.open_if_needed());
    }

    #[test]
    fn corrupt_prefs_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        fs::write(&path, "{not json").unwrap();

        let store = FileStore::open(&path);
        assert_eq!(store.get_string(DO_NOT_SHOW_KEY), None);
    }
}
