//! Opaque key-value persistence.
//!
//! The session registry treats storage as a string-keyed document store; the
//! engine behind it is deliberately not its concern. `DirKv` is the shipping
//! implementation (one file per key, atomic replace); `MemoryKv` backs tests.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use tempfile::NamedTempFile;

#[derive(Debug)]
pub enum KvError {
    /// Disk access failed for a key.
    Io {
        key: String,
        source: std::io::Error,
    },

    /// A stored document failed to (de)serialize.
    Serde {
        key: String,
        source: serde_json::Error,
    },
}

impl KvError {
    pub fn io(key: &str, source: std::io::Error) -> Self {
        KvError::Io {
            key: key.to_string(),
            source,
        }
    }

    pub fn serde(key: &str, source: serde_json::Error) -> Self {
        KvError::Serde {
            key: key.to_string(),
            source,
        }
    }
}

impl fmt::Display for KvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KvError::Io { key, source } => {
                write!(f, "Storage access failed for key '{key}': {source}")
            }
            KvError::Serde { key, source } => {
                write!(f, "Stored document for key '{key}' is invalid: {source}")
            }
        }
    }
}

impl StdError for KvError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            KvError::Io { source, .. } => Some(source),
            KvError::Serde { source, .. } => Some(source),
        }
    }
}

/// String-keyed document storage.
pub trait KvStore {
    fn get(&self, key: &str) -> Result<Option<String>, KvError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), KvError>;
    fn remove(&mut self, key: &str) -> Result<(), KvError>;
}

/// In-memory store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryKv {
    entries: HashMap<String, String>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), KvError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), KvError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// One-file-per-key store rooted in a directory. Writes go through a temp
/// file in the same directory and are renamed into place, so readers never
/// observe a torn document.
pub struct DirKv {
    root: PathBuf,
}

impl DirKv {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The platform data directory for this application.
    pub fn default_data_dir() -> Option<Self> {
        ProjectDirs::from("org", "permacommons", "parley")
            .map(|dirs| Self::new(dirs.data_dir().to_path_buf()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

impl KvStore for DirKv {
    fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(&path)
            .map(Some)
            .map_err(|source| KvError::io(key, source))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), KvError> {
        fs::create_dir_all(&self.root).map_err(|source| KvError::io(key, source))?;

        let mut temp_file =
            NamedTempFile::new_in(&self.root).map_err(|source| KvError::io(key, source))?;
        temp_file
            .write_all(value.as_bytes())
            .map_err(|source| KvError::io(key, source))?;
        temp_file
            .as_file_mut()
            .sync_all()
            .map_err(|source| KvError::io(key, source))?;
        temp_file
            .persist(self.path_for(key))
            .map_err(|err| KvError::io(key, err.error))?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), KvError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(());
        }
        fs::remove_file(&path).map_err(|source| KvError::io(key, source))
    }
}
