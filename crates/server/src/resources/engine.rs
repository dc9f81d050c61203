//! Resource operations: read, delete, write, rename and copy.
//!
//! Each operation resolves and authorizes its path before touching the
//! user's filesystem, checks the permission flag it needs, and runs
//! mutations through the [`Runner`].

use std::collections::HashMap;
use std::io::{self, Read};
use std::time::UNIX_EPOCH;

use model::{FileInfo, FileType};

use crate::authz::{self, ResolvedPath};
use crate::error::{ResourceError, Result};
use crate::fs::{copy_all, FsMetadata};
use crate::runner::{RunOutcome, Runner};
use crate::users::User;

use super::checksum::{checksum, ChecksumAlgo};
use super::info;
use super::preference::{choose_sorting, PreferenceCookie};

/// Default cap on embedded text content: 10 MiB.
pub const DEFAULT_MAX_TEXT_SIZE: u64 = 10 * 1024 * 1024;

/// Cookie path for sort preferences.
const PREFERENCE_PATH: &str = "/";

/// Parameters of a read.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Raw query parameters (`sort`, `order`, `checksum`).
    pub query: HashMap<String, String>,
    /// Cookies sent by the client.
    pub cookies: HashMap<String, String>,
    /// The request arrived over an encrypted connection.
    pub secure: bool,
}

impl ReadOptions {
    fn checksum(&self) -> Option<&str> {
        self.query
            .get("checksum")
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// Result of a read.
#[derive(Debug, Clone)]
pub struct ReadOutcome {
    pub info: FileInfo,
    /// Preference cookies to hand back to the client.
    pub cookies: Vec<PreferenceCookie>,
}

/// Write method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMethod {
    /// Create; requires `create`.
    Post,
    /// Overwrite; requires `modify`.
    Put,
}

/// What a write produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Written {
    /// A directory was created or already existed.
    Directory,
    /// A file was written; carries its integrity tag.
    File { etag: String },
}

/// Move action selected by a PATCH.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchAction {
    Rename,
    Copy,
}

impl PatchAction {
    /// Parse the `action` parameter. Anything but `copy` is a rename.
    pub fn parse(action: Option<&str>) -> Self {
        match action {
            Some("copy") => PatchAction::Copy,
            _ => PatchAction::Rename,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PatchAction::Rename => "rename",
            PatchAction::Copy => "copy",
        }
    }
}

/// Integrity tag of a file: modification time in nanoseconds and size, in hex.
pub fn etag(meta: &FsMetadata) -> String {
    let nanos = meta
        .modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("\"{:x}{:x}\"", nanos, meta.size)
}

/// Executes resource operations for a user.
#[derive(Debug, Clone)]
pub struct ResourceEngine {
    runner: Runner,
    max_text_size: u64,
}

impl Default for ResourceEngine {
    fn default() -> Self {
        Self::new(Runner::default())
    }
}

impl ResourceEngine {
    pub fn new(runner: Runner) -> Self {
        Self {
            runner,
            max_text_size: DEFAULT_MAX_TEXT_SIZE,
        }
    }

    /// Set the largest text file whose content is embedded in a read.
    pub fn with_max_text_size(mut self, max_text_size: u64) -> Self {
        self.max_text_size = max_text_size;
        self
    }

    /// Describe a file, or list a directory.
    pub fn get(&self, user: &User, raw: &str, opts: &ReadOptions) -> Result<ReadOutcome> {
        let resolved = authz::resolve(user, raw, "")?;
        let fs = user.fs();

        let meta = fs.stat(&resolved.path)?;
        let mut file = info::from_metadata(&resolved.path, &meta);

        if file.is_dir {
            let choice = choose_sorting(
                &opts.query,
                &opts.cookies,
                user.sorting,
                PREFERENCE_PATH,
                opts.secure,
            );
            file.listing = Some(info::build_listing(
                fs.as_ref(),
                &resolved.path,
                choice.sorting,
            )?);
            tracing::debug!(user = %user.username, path = %resolved.path, "Listed directory");
            return Ok(ReadOutcome {
                info: file,
                cookies: choice.cookies,
            });
        }

        info::detect_type(fs.as_ref(), &mut file)?;
        if file.file_type == FileType::Video {
            info::detect_subtitles(fs.as_ref(), &mut file)?;
        }
        if file.file_type == FileType::Text && !user.perm.modify {
            file.file_type = FileType::TextImmutable;
        }

        match opts.checksum() {
            Some(name) => {
                let algo: ChecksumAlgo = name.parse()?;
                let digest = checksum(fs.as_ref(), &resolved.path, algo)?;
                file.checksums.insert(algo.as_str().to_string(), digest);
            }
            None => info::load_content(fs.as_ref(), &mut file, self.max_text_size)?,
        }

        Ok(ReadOutcome {
            info: file,
            cookies: Vec::new(),
        })
    }

    /// Remove a file or directory tree.
    pub fn delete(&self, user: &User, raw: &str) -> Result<RunOutcome<()>> {
        let resolved = authz::resolve(user, raw, "")?;
        if resolved.is_root() {
            tracing::warn!(user = %user.username, "Refusing to delete scope root");
            return Err(ResourceError::Forbidden);
        }
        if !user.perm.delete {
            return Err(ResourceError::Forbidden);
        }

        let fs = user.fs();
        let full = user.full_path(&resolved.path);
        Ok(self.runner.run("delete", &full, "", user, || {
            fs.stat(&resolved.path)?;
            fs.remove_all(&resolved.path)?;
            Ok(())
        }))
    }

    /// Create a directory or write a file from `body`.
    ///
    /// A trailing separator in `raw` names a directory; only POST may create
    /// one and doing so twice is not an error. POST refuses to replace an
    /// existing file unless `override_existing` is set; PUT always replaces.
    pub fn write(
        &self,
        user: &User,
        raw: &str,
        method: WriteMethod,
        override_existing: bool,
        body: &mut dyn Read,
    ) -> Result<RunOutcome<Written>> {
        let resolved = authz::resolve(user, raw, "")?;
        match method {
            WriteMethod::Post if !user.perm.create => return Err(ResourceError::Forbidden),
            WriteMethod::Put if !user.perm.modify => return Err(ResourceError::Forbidden),
            _ => {}
        }

        let fs = user.fs();

        if resolved.is_dir_hint {
            if method == WriteMethod::Put {
                return Err(ResourceError::MethodNotAllowed);
            }
            fs.mkdir_all(&resolved.path)?;
            tracing::info!(user = %user.username, path = %resolved.path, "Created directory");
            return Ok(RunOutcome {
                result: Ok(Written::Directory),
                hook_errors: Vec::new(),
            });
        }

        self.check_write_target(&resolved, method, override_existing, user)?;

        let replace = method == WriteMethod::Put || override_existing;
        let full = user.full_path(&resolved.path);
        Ok(self.runner.run("upload", &full, "", user, || {
            let meta = if replace {
                fs.write(&resolved.path, body)?
            } else {
                fs.create_new(&resolved.path, body)?
            };
            Ok(Written::File { etag: etag(&meta) })
        }))
    }

    fn check_write_target(
        &self,
        resolved: &ResolvedPath,
        method: WriteMethod,
        override_existing: bool,
        user: &User,
    ) -> Result<()> {
        match user.fs().stat(&resolved.path) {
            Ok(meta) if meta.is_dir => Err(ResourceError::Conflict),
            Ok(_) if method == WriteMethod::Post && !override_existing => {
                tracing::debug!(user = %user.username, path = %resolved.path, "Target exists");
                Err(ResourceError::Conflict)
            }
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Rename or copy `raw` to `destination`.
    pub fn patch(
        &self,
        user: &User,
        raw: &str,
        destination: &str,
        action: PatchAction,
    ) -> Result<RunOutcome<()>> {
        let src = authz::resolve(user, raw, "")?;
        let dst = authz::resolve(user, destination, "")?;

        if src.is_root() || dst.is_root() {
            tracing::warn!(user = %user.username, "Refusing to move scope root");
            return Err(ResourceError::Forbidden);
        }

        let permitted = match action {
            PatchAction::Copy => user.perm.create,
            PatchAction::Rename => user.perm.rename,
        };
        if !permitted {
            return Err(ResourceError::Forbidden);
        }

        let fs = user.fs();
        let full_src = user.full_path(&src.path);
        let full_dst = user.full_path(&dst.path);

        Ok(self
            .runner
            .run(action.as_str(), &full_src, &full_dst, user, || {
                let outcome = match action {
                    PatchAction::Rename => fs.rename(&src.path, &dst.path),
                    PatchAction::Copy => copy_all(fs.as_ref(), &src.path, &dst.path),
                };
                outcome.map_err(move_error)
            }))
    }
}

/// Moving a directory into itself is a conflict, not a server failure.
fn move_error(err: io::Error) -> ResourceError {
    if err.kind() == io::ErrorKind::InvalidInput {
        ResourceError::Conflict
    } else {
        err.into()
    }
}
