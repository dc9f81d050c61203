//! Request path resolution and authorization.
//!
//! Every operation starts here: the routing prefix is stripped, the path is
//! cleaned lexically and then checked against the user's rules. Nothing in
//! this module touches the filesystem, so a denial always happens before
//! any storage access.

use crate::error::{ResourceError, Result};
use crate::fs::path;
use crate::users::User;

/// A request path after cleaning and authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Clean scope-relative path (`/` is the scope root).
    pub path: String,
    /// The raw path ended with a separator, i.e. the client named a directory.
    pub is_dir_hint: bool,
}

impl ResolvedPath {
    /// Whether this is the scope root.
    pub fn is_root(&self) -> bool {
        path::is_root(&self.path)
    }
}

/// Strip `prefix` from `raw`, clean the remainder and check the user's rules.
pub fn resolve(user: &User, raw: &str, prefix: &str) -> Result<ResolvedPath> {
    let stripped = raw.strip_prefix(prefix).unwrap_or(raw);
    let is_dir_hint = stripped.len() > 1 && stripped.ends_with('/');
    let trimmed = stripped.trim_end_matches('/');
    let trimmed = if trimmed.is_empty() { "/" } else { trimmed };

    let clean = path::clean(trimmed).map_err(|e| {
        tracing::warn!(user = %user.username, path = %raw, error = %e, "Rejected request path");
        ResourceError::Forbidden
    })?;

    authorize(user, &clean)?;

    Ok(ResolvedPath {
        path: clean,
        is_dir_hint,
    })
}

/// Like [`resolve`], but additionally requires the `share` permission.
pub fn resolve_for_share(user: &User, raw: &str, prefix: &str) -> Result<ResolvedPath> {
    if !user.perm.share {
        tracing::warn!(user = %user.username, "Share permission required");
        return Err(ResourceError::Forbidden);
    }
    resolve(user, raw, prefix)
}

/// Check an already clean path against the user's rules.
pub fn authorize(user: &User, clean: &str) -> Result<()> {
    if user.is_allowed(clean) {
        Ok(())
    } else {
        tracing::warn!(user = %user.username, path = %clean, "Path denied by rules");
        Err(ResourceError::Forbidden)
    }
}
