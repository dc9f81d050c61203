//! Scope-confined filesystem capability.
//!
//! Every user gets one [`ScopedFs`] handle rooted at their scope. Handles
//! accept scope-relative paths only (`/` is the scope root) and never reach
//! outside it:
//! - [`OsFs`] maps paths beneath a directory on disk and refuses anything
//!   that resolves through a symlink to outside that directory
//! - [`MemoryFs`] keeps the whole tree in memory, for tests and ephemeral use

pub mod memory;
pub mod os;
pub mod path;

use std::fmt;
use std::io::{self, Read};
use std::time::SystemTime;

pub use memory::MemoryFs;
pub use os::OsFs;
pub use path::PathError;

/// Metadata for one entry.
#[derive(Debug, Clone, PartialEq)]
pub struct FsMetadata {
    /// Final path segment (`/` for the root).
    pub name: String,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Last modification time.
    pub modified: SystemTime,
    /// Unix permission bits.
    pub mode: u32,
    pub is_dir: bool,
    pub is_symlink: bool,
}

/// Filesystem operations confined to one scope.
///
/// Paths are scope-relative and expected to be clean; implementations clean
/// them again and treat an escaping path as `PermissionDenied`.
pub trait ScopedFs: Send + Sync + fmt::Debug {
    /// Metadata for `path`. `NotFound` if it does not exist.
    fn stat(&self, path: &str) -> io::Result<FsMetadata>;

    /// Entries directly inside the directory at `path`, in no particular order.
    fn read_dir(&self, path: &str) -> io::Result<Vec<FsMetadata>>;

    /// Open the file at `path` for reading.
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>>;

    /// Create or truncate the file at `path` and fill it from `data`.
    ///
    /// Missing parent directories are created. Returns the metadata of the
    /// written file.
    fn write(&self, path: &str, data: &mut dyn Read) -> io::Result<FsMetadata>;

    /// Like [`ScopedFs::write`], but fails with `AlreadyExists` instead of
    /// replacing a file. The existence check and the creation are atomic.
    fn create_new(&self, path: &str, data: &mut dyn Read) -> io::Result<FsMetadata>;

    /// Remove `path` and everything below it. Removing a missing path succeeds.
    fn remove_all(&self, path: &str) -> io::Result<()>;

    /// Move `from` to `to`. The parent of `to` must exist.
    fn rename(&self, from: &str, to: &str) -> io::Result<()>;

    /// Create `path` and any missing parents.
    ///
    /// Succeeds if `path` is already a directory; `AlreadyExists` if it, or
    /// one of its parents, is a file.
    fn mkdir_all(&self, path: &str) -> io::Result<()>;
}

/// Recursively copy `src` to `dst` within one scope.
pub fn copy_all(fs: &dyn ScopedFs, src: &str, dst: &str) -> io::Result<()> {
    if path::is_within(dst, src) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("cannot copy {} into itself", src),
        ));
    }

    let meta = fs.stat(src)?;
    if meta.is_dir {
        fs.mkdir_all(dst)?;
        for child in fs.read_dir(src)? {
            copy_all(
                fs,
                &path::join(src, &child.name),
                &path::join(dst, &child.name),
            )?;
        }
        Ok(())
    } else {
        let mut reader = fs.open(src)?;
        fs.write(dst, &mut reader)?;
        Ok(())
    }
}

/// Map a path cleaning failure onto the filesystem error space.
pub(crate) fn denied(err: PathError) -> io::Error {
    io::Error::new(io::ErrorKind::PermissionDenied, err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_copy_all_file() {
        let fs = MemoryFs::new();
        fs.write("/a.txt", &mut Cursor::new(b"hello".to_vec())).unwrap();

        copy_all(&fs, "/a.txt", "/b.txt").unwrap();

        let mut content = String::new();
        fs.open("/b.txt").unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "hello");
        assert!(fs.stat("/a.txt").is_ok());
    }

    #[test]
    fn test_copy_all_directory() {
        let fs = MemoryFs::new();
        fs.write("/src/one.txt", &mut Cursor::new(b"1".to_vec())).unwrap();
        fs.write("/src/nested/two.txt", &mut Cursor::new(b"22".to_vec()))
            .unwrap();

        copy_all(&fs, "/src", "/dst").unwrap();

        assert!(fs.stat("/dst").unwrap().is_dir);
        assert_eq!(fs.stat("/dst/one.txt").unwrap().size, 1);
        assert_eq!(fs.stat("/dst/nested/two.txt").unwrap().size, 2);
    }

    #[test]
    fn test_copy_all_into_itself() {
        let fs = MemoryFs::new();
        fs.mkdir_all("/src").unwrap();

        let err = copy_all(&fs, "/src", "/src/inner").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_copy_all_missing_source() {
        let fs = MemoryFs::new();
        let err = copy_all(&fs, "/missing", "/dst").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
