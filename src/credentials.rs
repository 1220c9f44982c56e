use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::error::{RelayError, Result};
use crate::models::CredentialPair;

/// Owns the credential pair. Readers get an `Arc` snapshot; writers replace
/// the whole pair, so a reader never sees half an update.
pub struct CredentialStore {
    path: PathBuf,
    current: RwLock<Arc<CredentialPair>>,
}

impl CredentialStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let mut store = Self {
            path: path.into(),
            current: RwLock::new(Arc::default()),
        };
        let pair = store.load()?;
        store.current = RwLock::new(Arc::new(pair));
        tracing::debug!(path = %store.path.display(), "Loaded credentials");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<CredentialPair> {
        read_blob(&self.path)
    }

    pub fn current(&self) -> Arc<CredentialPair> {
        let guard = self.current.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&*guard)
    }

    /// Swaps the in-memory pair, then persists it. If the write fails the new
    /// pair stays live in memory and the error is returned.
    pub fn save(&self, pair: CredentialPair) -> Result<()> {
        let pair = Arc::new(pair);
        {
            let mut guard = self.current.write().unwrap_or_else(|poisoned| poisoned.into_inner());
            *guard = Arc::clone(&pair);
        }
        write_blob(&self.path, &pair)
    }
}

fn read_blob(path: &Path) -> Result<CredentialPair> {
    let data = fs::read_to_string(path).map_err(|err| RelayError::storage(path, err))?;
    serde_json::from_str(&data).map_err(|err| RelayError::storage(path, format!("malformed blob: {}", err)))
}

fn write_blob(path: &Path, pair: &CredentialPair) -> Result<()> {
    let json = serde_json::to_string_pretty(pair).map_err(|err| RelayError::storage(path, err))?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|err| RelayError::storage(dir, err))?;

    let mut temp_file = tempfile::NamedTempFile::new_in(dir).map_err(|err| RelayError::storage(path, err))?;
    temp_file
        .write_all(json.as_bytes())
        .map_err(|err| RelayError::storage(path, err))?;
    temp_file.flush().map_err(|err| RelayError::storage(path, err))?;
    temp_file
        .persist(path)
        .map_err(|err| RelayError::storage(path, err.error))?;

    Ok(())
}
