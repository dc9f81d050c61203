//! Lexical handling of scope-relative paths.
//!
//! Scope-relative paths are always absolute (`/` is the scope root), use `/`
//! as the only separator, and contain no `.` or `..` segments once cleaned.

use thiserror::Error;

/// Errors produced while canonicalizing an untrusted path.
#[derive(Debug, Error, PartialEq)]
pub enum PathError {
    /// A `..` segment would climb above the scope root.
    #[error("path traversal detected: {0}")]
    Traversal(String),

    /// The path contains a NUL byte.
    #[error("path contains a NUL byte")]
    NulByte,
}

/// Canonicalize an untrusted path into a scope-relative one.
///
/// Empty and `.` segments are dropped, `..` removes the previous segment.
/// Climbing above the root is rejected rather than clamped.
pub fn clean(raw: &str) -> Result<String, PathError> {
    if raw.contains('\0') {
        return Err(PathError::NulByte);
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in raw.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(PathError::Traversal(raw.to_string()));
                }
            }
            name => segments.push(name),
        }
    }

    Ok(format!("/{}", segments.join("/")))
}

/// Whether `path` is the scope root.
pub fn is_root(path: &str) -> bool {
    path == "/"
}

/// Join a clean directory path with a single child name.
pub fn join(dir: &str, name: &str) -> String {
    if is_root(dir) {
        format!("/{}", name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Parent of a clean path. The root is its own parent.
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

/// Final segment of a clean path. The root's name is `/`.
pub fn base_name(path: &str) -> &str {
    if is_root(path) {
        return "/";
    }
    path.rsplit('/').next().unwrap_or(path)
}

/// Whether `path` equals `ancestor` or lies below it.
pub fn is_within(path: &str, ancestor: &str) -> bool {
    if is_root(ancestor) {
        return true;
    }
    match path.strip_prefix(ancestor) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Split a clean path into its segments.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}
