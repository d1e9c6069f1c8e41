//! Persistent storage for the API credential.
//!
//! The store is a plain key/value interface so the session can be handed an
//! in-memory stub in tests. Values are kept in plaintext; anything running as
//! the same user can read them.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{Config, ConfigError};

/// Key the API credential is stored under
pub const CREDENTIAL_KEY: &str = "PERPLEXITY_API_KEY";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("API key must not be empty")]
    Empty,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt credential file: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub trait CredentialStore: Send {
    /// Write `value` under `key`, replacing whatever was there.
    fn save(&mut self, key: &str, value: &str) -> Result<(), CredentialError>;

    fn read(&self, key: &str) -> Result<Option<String>, CredentialError>;
}

/// JSON-file backed store, one object of key/value pairs.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<config_dir>/ai-chat/credentials.json`
    pub fn default_location() -> Result<Self, CredentialError> {
        Ok(Self::new(Config::app_dir()?.join("credentials.json")))
    }

    fn load_entries(&self) -> Result<BTreeMap<String, String>, CredentialError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&content)?)
    }
}

impl CredentialStore for FileCredentialStore {
    fn save(&mut self, key: &str, value: &str) -> Result<(), CredentialError> {
        // An unreadable file must not block writing a fresh key
        let mut entries = match self.load_entries() {
            Ok(entries) => entries,
            Err(CredentialError::Serialization(e)) => {
                warn!(error = %e, path = %self.path.display(), "discarding corrupt credential file");
                BTreeMap::new()
            }
            Err(e) => return Err(e),
        };
        entries.insert(key.to_string(), value.to_string());

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&entries)?)?;

        debug!(key, path = %self.path.display(), "credential saved");
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<String>, CredentialError> {
        Ok(self.load_entries()?.remove(key))
    }
}

impl fmt::Debug for FileCredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileCredentialStore")
            .field("path", &self.path)
            .finish()
    }
}

#[derive(Default, Clone)]
pub struct MemoryCredentialStore {
    entries: HashMap<String, String>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: &str, value: &str) -> Self {
        let mut store = Self::new();
        store.entries.insert(key.to_string(), value.to_string());
        store
    }

    /// Drop a key behind the session's back. Only used to simulate a
    /// credential vanishing from the underlying storage.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn save(&mut self, key: &str, value: &str) -> Result<(), CredentialError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<String>, CredentialError> {
        Ok(self.entries.get(key).cloned())
    }
}

impl fmt::Debug for MemoryCredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCredentialStore")
            .field("keys", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_round_trip() {
        let mut store = MemoryCredentialStore::new();
        store.save(CREDENTIAL_KEY, "sk-test123").unwrap();
        assert_eq!(store.read(CREDENTIAL_KEY).unwrap().as_deref(), Some("sk-test123"));
    }

    #[test]
    fn test_memory_read_absent() {
        let store = MemoryCredentialStore::new();
        assert_eq!(store.read(CREDENTIAL_KEY).unwrap(), None);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut store = FileCredentialStore::new(dir.path().join("credentials.json"));
        store.save(CREDENTIAL_KEY, "sk-test123").unwrap();

        // A fresh handle on the same file sees the value
        let reopened = FileCredentialStore::new(dir.path().join("credentials.json"));
        assert_eq!(reopened.read(CREDENTIAL_KEY).unwrap().as_deref(), Some("sk-test123"));
    }

    #[test]
    fn test_file_missing_reads_absent() {
        let dir = TempDir::new().unwrap();
        let store = FileCredentialStore::new(dir.path().join("nope").join("credentials.json"));
        assert_eq!(store.read(CREDENTIAL_KEY).unwrap(), None);
    }

    #[test]
    fn test_file_overwrite_keeps_other_keys() {
        let dir = TempDir::new().unwrap();
        let mut store = FileCredentialStore::new(dir.path().join("credentials.json"));
        store.save("OTHER", "keep-me").unwrap();
        store.save(CREDENTIAL_KEY, "sk-old").unwrap();
        store.save(CREDENTIAL_KEY, "sk-new").unwrap();

        assert_eq!(store.read(CREDENTIAL_KEY).unwrap().as_deref(), Some("sk-new"));
        assert_eq!(store.read("OTHER").unwrap().as_deref(), Some("keep-me"));
    }

    #[test]
    fn test_save_replaces_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials.json");
        fs::write(&path, "{ truncated").unwrap();

        let mut store = FileCredentialStore::new(&path);
        assert!(matches!(store.read(CREDENTIAL_KEY), Err(CredentialError::Serialization(_))));

        store.save(CREDENTIAL_KEY, "sk-test123").unwrap();
        assert_eq!(store.read(CREDENTIAL_KEY).unwrap().as_deref(), Some("sk-test123"));
    }

    #[test]
    fn test_values_are_not_transformed() {
        let mut store = MemoryCredentialStore::new();
        let odd = "  pplx-ключ \"quoted\"  ";
        store.save(CREDENTIAL_KEY, odd).unwrap();
        assert_eq!(store.read(CREDENTIAL_KEY).unwrap().as_deref(), Some(odd));
    }

    #[test]
    fn test_debug_does_not_leak_value() {
        let store = MemoryCredentialStore::with_entry(CREDENTIAL_KEY, "sk-secret");
        assert!(!format!("{:?}", store).contains("sk-secret"));
    }
}
