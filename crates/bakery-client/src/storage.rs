//! Key/value persistence behind the credential store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::error::{BakeryError, Result};

/// Default file name for [`FileStorage`].
pub const STORAGE_FILE: &str = "macaroons.json";

/// String key/value storage.
pub trait Storage: Send + Sync + std::fmt::Debug {
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    fn clear(&self) -> Result<()>;
}

// ============================================================================
// InMemoryStorage
// ============================================================================

/// Storage that lives as long as the value does.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    items: RwLock<HashMap<String, String>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

impl Storage for InMemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.read().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.items.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.items.write().clear();
        Ok(())
    }
}

// ============================================================================
// FileStorage
// ============================================================================

/// Storage persisted as a JSON object in a single file.
///
/// Entries are cached in memory after the first read; every write goes
/// through to disk.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    cache: RwLock<Option<HashMap<String, String>>>,
}

impl FileStorage {
    /// Store credentials in [`STORAGE_FILE`] inside `data_dir`.
    pub fn new(data_dir: &Path) -> Self {
        Self::with_path(data_dir.join(STORAGE_FILE))
    }

    /// Store credentials in an explicit file.
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            path,
            cache: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<HashMap<String, String>> {
        if let Some(items) = self.cache.read().as_ref() {
            return Ok(items.clone());
        }

        let items = if self.path.exists() {
            let content = std::fs::read_to_string(&self.path).map_err(|e| {
                BakeryError::Storage(format!("failed to read {}: {}", self.path.display(), e))
            })?;
            serde_json::from_str(&content)?
        } else {
            HashMap::new()
        };

        *self.cache.write() = Some(items.clone());
        Ok(items)
    }

    fn persist(&self, items: HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                BakeryError::Storage(format!("failed to create storage directory: {}", e))
            })?;
        }

        let json = serde_json::to_string_pretty(&items)?;
        std::fs::write(&self.path, json).map_err(|e| {
            BakeryError::Storage(format!("failed to write {}: {}", self.path.display(), e))
        })?;

        *self.cache.write() = Some(items);
        tracing::debug!(path = %self.path.display(), "Credential storage saved");
        Ok(())
    }
}

impl Storage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load()?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut items = self.load()?;
        items.insert(key.to_string(), value.to_string());
        self.persist(items)
    }

    fn clear(&self) -> Result<()> {
        self.persist(HashMap::new())
    }
}
