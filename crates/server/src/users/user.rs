//! Users: identity plus authorization state.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use model::{is_allowed, Permissions, Rule, Sorting, ViewMode};
use serde::{Deserialize, Serialize};

use crate::fs::{OsFs, ScopedFs};

/// A user of the file service.
///
/// The scoped filesystem handle is built lazily from `scope` on first use and
/// cached for the lifetime of this value; changing the scope through
/// [`User::set_scope`] discards it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct User {
    pub id: u32,
    pub username: String,
    /// Argon2 PHC string.
    pub password: String,
    /// Absolute directory every operation is confined to.
    pub scope: PathBuf,
    pub locale: String,
    pub lock_password: bool,
    pub view_mode: ViewMode,
    pub perm: Permissions,
    pub sorting: Sorting,
    pub rules: Vec<Rule>,
    #[serde(skip)]
    fs: OnceLock<Arc<dyn ScopedFs>>,
}

impl Default for User {
    fn default() -> Self {
        Self {
            id: 0,
            username: String::new(),
            password: String::new(),
            scope: PathBuf::from("."),
            locale: "en".to_string(),
            lock_password: false,
            view_mode: ViewMode::default(),
            perm: Permissions::default(),
            sorting: Sorting::default(),
            rules: Vec::new(),
            fs: OnceLock::new(),
        }
    }
}

impl User {
    /// Create a user confined to `scope`.
    pub fn new(username: impl Into<String>, scope: impl Into<PathBuf>) -> Self {
        Self {
            username: username.into(),
            scope: scope.into(),
            ..Self::default()
        }
    }

    /// Set the permissions.
    pub fn with_permissions(mut self, perm: Permissions) -> Self {
        self.perm = perm;
        self
    }

    /// Set the path rules.
    pub fn with_rules(mut self, rules: Vec<Rule>) -> Self {
        self.rules = rules;
        self
    }

    /// Use `fs` instead of building an on-disk handle from the scope.
    pub fn with_fs(self, fs: Arc<dyn ScopedFs>) -> Self {
        let _ = self.fs.set(fs);
        self
    }

    /// The user's scoped filesystem, built on first access.
    pub fn fs(&self) -> &Arc<dyn ScopedFs> {
        self.fs.get_or_init(|| {
            tracing::debug!(user = %self.username, scope = %self.scope.display(), "Building scoped filesystem");
            Arc::new(OsFs::new(&self.scope))
        })
    }

    /// Whether a filesystem handle has been built.
    pub fn has_fs(&self) -> bool {
        self.fs.get().is_some()
    }

    /// Change the scope, discarding the cached filesystem handle.
    pub fn set_scope(&mut self, scope: impl Into<PathBuf>) {
        let scope = scope.into();
        if scope != self.scope {
            self.scope = scope;
            self.fs = OnceLock::new();
        }
    }

    /// Carry the cached filesystem handle over from `previous` when the scope
    /// is unchanged.
    pub(crate) fn inherit_fs(&mut self, previous: &User) {
        if previous.scope == self.scope {
            if let Some(fs) = previous.fs.get() {
                let _ = self.fs.set(Arc::clone(fs));
            }
        }
    }

    /// Whether the user's rules allow reaching `path`.
    pub fn is_allowed(&self, path: &str) -> bool {
        is_allowed(path, &self.rules)
    }

    /// Absolute path of a scope-relative path.
    pub fn full_path(&self, rel: &str) -> String {
        let rel = rel.trim_start_matches('/');
        let full = if rel.is_empty() {
            self.scope.clone()
        } else {
            self.scope.join(rel)
        };
        full.to_string_lossy().to_string()
    }

    /// Whether an absolute path lies inside this user's scope.
    pub fn owns_path(&self, full: &str) -> bool {
        Path::new(full).starts_with(&self.scope)
    }

    /// Hash and store a new password.
    pub fn set_password(&mut self, password: &str) -> Result<(), argon2::password_hash::Error> {
        self.password = hash_password(password)?;
        Ok(())
    }

    /// Check a candidate password against the stored hash.
    pub fn check_password(&self, password: &str) -> bool {
        check_password(password, &self.password)
    }
}

/// Hash a password into an argon2 PHC string.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

/// Verify a password against an argon2 PHC string.
pub fn check_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}
