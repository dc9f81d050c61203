//! Persistent user storage.
//!
//! Users are kept in a `RwLock<HashMap>` keyed by username and persisted to
//! JSON at `<data_dir>/users.json` by default.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::User;

/// Maps a request identity to a user.
pub trait UserResolver: Send + Sync {
    /// Look up a user by name. `None` means the identity is unknown.
    fn resolve(&self, username: &str) -> Option<Arc<User>>;
}

/// Wrapper for serializing the user store.
#[derive(Debug, Serialize, Deserialize)]
struct UserStoreData {
    /// Version of the store format.
    version: u32,
    users: Vec<User>,
}

impl Default for UserStoreData {
    fn default() -> Self {
        Self {
            version: 1,
            users: Vec::new(),
        }
    }
}

/// Thread-safe user store persisted to JSON.
pub struct UserStore {
    path: PathBuf,
    users: RwLock<HashMap<String, Arc<User>>>,
}

impl UserStore {
    /// Creates a store that persists to `path`.
    ///
    /// This does not load the file; call `load()` to read existing data.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            users: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the path to the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads users from the JSON file. A missing file leaves the store empty.
    pub fn load(&self) -> Result<()> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "User store not found, starting empty");
            return Ok(());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read user store: {}", self.path.display()))?;

        let data: UserStoreData = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse user store: {}", self.path.display()))?;

        let mut users = self
            .users
            .write()
            .map_err(|_| anyhow::anyhow!("Failed to acquire write lock on user store"))?;

        users.clear();
        for user in data.users {
            users.insert(user.username.clone(), Arc::new(user));
        }

        tracing::info!(count = users.len(), path = %self.path.display(), "Loaded users");
        Ok(())
    }

    /// Saves users to the JSON file via a temp file and rename.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create user store directory: {}", parent.display())
            })?;
        }

        let users = self
            .users
            .read()
            .map_err(|_| anyhow::anyhow!("Failed to acquire read lock on user store"))?;

        let mut list: Vec<User> = users.values().map(|u| User::clone(u)).collect();
        list.sort_by_key(|u| u.id);

        let data = UserStoreData {
            users: list,
            ..UserStoreData::default()
        };

        let contents =
            serde_json::to_string_pretty(&data).context("Failed to serialize user store")?;

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &contents)
            .with_context(|| format!("Failed to write temp user store: {}", temp_path.display()))?;

        fs::rename(&temp_path, &self.path).with_context(|| {
            format!(
                "Failed to rename temp user store {} to {}",
                temp_path.display(),
                self.path.display()
            )
        })?;

        tracing::debug!(count = users.len(), path = %self.path.display(), "Saved users");
        Ok(())
    }

    /// Adds a new user, assigning the next free id.
    ///
    /// Fails if the username is empty or already taken.
    pub fn add(&self, mut user: User) -> Result<Arc<User>> {
        if user.username.is_empty() {
            anyhow::bail!("Username must not be empty");
        }

        let mut users = self
            .users
            .write()
            .map_err(|_| anyhow::anyhow!("Failed to acquire write lock on user store"))?;

        if users.contains_key(&user.username) {
            anyhow::bail!("User {} already exists", user.username);
        }

        user.id = users.values().map(|u| u.id).max().unwrap_or(0) + 1;
        tracing::info!(user = %user.username, id = user.id, "Adding user");

        let user = Arc::new(user);
        users.insert(user.username.clone(), Arc::clone(&user));
        Ok(user)
    }

    /// Gets a user by name.
    pub fn get(&self, username: &str) -> Result<Option<Arc<User>>> {
        let users = self
            .users
            .read()
            .map_err(|_| anyhow::anyhow!("Failed to acquire read lock on user store"))?;

        Ok(users.get(username).cloned())
    }

    /// Replaces an existing user.
    ///
    /// The cached filesystem handle survives when the scope is unchanged.
    pub fn update(&self, mut user: User) -> Result<Arc<User>> {
        let mut users = self
            .users
            .write()
            .map_err(|_| anyhow::anyhow!("Failed to acquire write lock on user store"))?;

        let previous = users
            .get(&user.username)
            .ok_or_else(|| anyhow::anyhow!("User {} not found", user.username))?;

        user.id = previous.id;
        user.inherit_fs(previous);
        tracing::info!(user = %user.username, "Updating user");

        let user = Arc::new(user);
        users.insert(user.username.clone(), Arc::clone(&user));
        Ok(user)
    }

    /// Removes a user, returning it if it existed.
    pub fn remove(&self, username: &str) -> Result<Option<Arc<User>>> {
        let mut users = self
            .users
            .write()
            .map_err(|_| anyhow::anyhow!("Failed to acquire write lock on user store"))?;

        let removed = users.remove(username);
        if removed.is_some() {
            tracing::info!(user = %username, "Removed user");
        }
        Ok(removed)
    }

    /// Lists all users ordered by id.
    pub fn list(&self) -> Result<Vec<Arc<User>>> {
        let users = self
            .users
            .read()
            .map_err(|_| anyhow::anyhow!("Failed to acquire read lock on user store"))?;

        let mut list: Vec<Arc<User>> = users.values().cloned().collect();
        list.sort_by_key(|u| u.id);
        Ok(list)
    }

    /// Returns the number of users.
    pub fn len(&self) -> Result<usize> {
        let users = self
            .users
            .read()
            .map_err(|_| anyhow::anyhow!("Failed to acquire read lock on user store"))?;
        Ok(users.len())
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl UserResolver for UserStore {
    fn resolve(&self, username: &str) -> Option<Arc<User>> {
        match self.get(username) {
            Ok(user) => user,
            Err(e) => {
                tracing::error!(error = %e, "User lookup failed");
                None
            }
        }
    }
}
