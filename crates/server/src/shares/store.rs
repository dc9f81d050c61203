//! Share link persistence.
//!
//! [`JsonShareStore`] keeps links in a `RwLock<BTreeMap>` keyed by hash and
//! writes the whole set back to JSON after every mutation. Without a backing
//! file it is purely in-memory.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use model::ShareLink;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from a share store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("share store I/O error: {0}")]
    Io(#[from] io::Error),

    /// The backing file could not be encoded or decoded.
    #[error("share store format error: {0}")]
    Format(#[from] serde_json::Error),

    /// A writer panicked while holding the lock.
    #[error("share store lock poisoned")]
    Poisoned,
}

/// Key-addressed storage of share links.
pub trait ShareStore: Send + Sync {
    /// The link with token `hash`.
    fn get_by_hash(&self, hash: &str) -> Result<Option<ShareLink>, StoreError>;

    /// All links for an absolute path.
    fn get_by_path(&self, path: &str) -> Result<Vec<ShareLink>, StoreError>;

    /// The permanent link for an absolute path, if any.
    fn get_permanent(&self, path: &str) -> Result<Option<ShareLink>, StoreError>;

    /// Insert or replace a link.
    fn save(&self, link: ShareLink) -> Result<(), StoreError>;

    /// Delete the link with token `hash`. Missing tokens are not an error.
    fn delete(&self, hash: &str) -> Result<(), StoreError>;

    /// Every stored link.
    fn list(&self) -> Result<Vec<ShareLink>, StoreError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct ShareStoreData {
    version: u32,
    links: Vec<ShareLink>,
}

/// JSON-file share store.
#[derive(Debug)]
pub struct JsonShareStore {
    path: Option<PathBuf>,
    links: RwLock<BTreeMap<String, ShareLink>>,
}

impl JsonShareStore {
    /// A store with no backing file.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            links: RwLock::new(BTreeMap::new()),
        }
    }

    /// Open the store at `path`, loading it if the file exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut links = BTreeMap::new();

        if path.exists() {
            let contents = fs::read_to_string(&path)?;
            let data: ShareStoreData = serde_json::from_str(&contents)?;
            for link in data.links {
                links.insert(link.hash.clone(), link);
            }
            tracing::info!(count = links.len(), path = %path.display(), "Loaded share links");
        } else {
            tracing::debug!(path = %path.display(), "Share store not found, starting empty");
        }

        Ok(Self {
            path: Some(path),
            links: RwLock::new(links),
        })
    }

    /// The backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn persist(&self, links: &BTreeMap<String, ShareLink>) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let data = ShareStoreData {
            version: 1,
            links: links.values().cloned().collect(),
        };
        let contents = serde_json::to_string_pretty(&data)?;

        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, contents)?;
        fs::rename(&temp_path, path)?;

        tracing::debug!(count = links.len(), path = %path.display(), "Saved share links");
        Ok(())
    }
}

impl ShareStore for JsonShareStore {
    fn get_by_hash(&self, hash: &str) -> Result<Option<ShareLink>, StoreError> {
        let links = self.links.read().map_err(|_| StoreError::Poisoned)?;
        Ok(links.get(hash).cloned())
    }

    fn get_by_path(&self, path: &str) -> Result<Vec<ShareLink>, StoreError> {
        let links = self.links.read().map_err(|_| StoreError::Poisoned)?;
        Ok(links.values().filter(|l| l.path == path).cloned().collect())
    }

    fn get_permanent(&self, path: &str) -> Result<Option<ShareLink>, StoreError> {
        let links = self.links.read().map_err(|_| StoreError::Poisoned)?;
        Ok(links
            .values()
            .find(|l| l.path == path && l.is_permanent())
            .cloned())
    }

    fn save(&self, link: ShareLink) -> Result<(), StoreError> {
        let mut links = self.links.write().map_err(|_| StoreError::Poisoned)?;
        let hash = link.hash.clone();
        let previous = links.insert(hash.clone(), link);

        if let Err(e) = self.persist(&links) {
            // Roll back so memory never holds a link the file does not
            match previous {
                Some(old) => links.insert(hash, old),
                None => links.remove(&hash),
            };
            tracing::error!(error = %e, "Failed to persist share link");
            return Err(e);
        }
        Ok(())
    }

    fn delete(&self, hash: &str) -> Result<(), StoreError> {
        let mut links = self.links.write().map_err(|_| StoreError::Poisoned)?;
        let Some(removed) = links.remove(hash) else {
            return Ok(());
        };

        if let Err(e) = self.persist(&links) {
            links.insert(removed.hash.clone(), removed);
            tracing::error!(error = %e, hash, "Failed to persist share link removal");
            return Err(e);
        }
        Ok(())
    }

    fn list(&self) -> Result<Vec<ShareLink>, StoreError> {
        let links = self.links.read().map_err(|_| StoreError::Poisoned)?;
        Ok(links.values().cloned().collect())
    }
}
