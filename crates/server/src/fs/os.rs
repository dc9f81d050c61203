//! Scoped filesystem backed by a directory on disk.
//!
//! Scope-relative paths are joined beneath the root directory. Before any
//! access the deepest existing ancestor of the target is canonicalized; if it
//! resolves outside the canonical root (a symlink pointing out of the scope)
//! the access fails with `PermissionDenied`.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::path;
use super::{denied, FsMetadata, ScopedFs};

/// Scoped filesystem rooted at a directory on disk.
#[derive(Debug, Clone)]
pub struct OsFs {
    root: PathBuf,
}

impl OsFs {
    /// Create a handle rooted at `root`. The directory is not created.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// The directory this handle is confined to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a scope-relative path to an absolute one and check confinement.
    fn resolve(&self, rel: &str) -> io::Result<PathBuf> {
        let clean = path::clean(rel).map_err(denied)?;

        let mut full = self.root.clone();
        for segment in path::segments(&clean) {
            full.push(segment);
        }

        self.check_confined(&full)?;
        Ok(full)
    }

    fn store_file(
        &self,
        rel: &str,
        data: &mut dyn Read,
        options: &OpenOptions,
    ) -> io::Result<FsMetadata> {
        let full = self.resolve(rel)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = options.open(&full)?;
        io::copy(data, &mut file)?;
        file.sync_all()?;
        drop(file);

        let clean = path::clean(rel).map_err(denied)?;
        metadata_for(&full, path::base_name(&clean).to_string())
    }

    /// Ensure the deepest existing ancestor of `full` stays inside the root.
    fn check_confined(&self, full: &Path) -> io::Result<()> {
        let root = fs::canonicalize(&self.root)?;

        let mut probe = full;
        loop {
            match fs::canonicalize(probe) {
                Ok(canonical) => {
                    if canonical.starts_with(&root) {
                        return Ok(());
                    }
                    tracing::warn!(
                        path = %full.display(),
                        resolved = %canonical.display(),
                        "Path resolves outside scope"
                    );
                    return Err(io::Error::new(
                        io::ErrorKind::PermissionDenied,
                        "path resolves outside scope",
                    ));
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => match probe.parent() {
                    Some(parent) if parent.starts_with(&self.root) => probe = parent,
                    _ => return Ok(()),
                },
                Err(e) => return Err(e),
            }
        }
    }
}

fn metadata_for(full: &Path, name: String) -> io::Result<FsMetadata> {
    let link_meta = fs::symlink_metadata(full)?;
    let is_symlink = link_meta.file_type().is_symlink();

    // Follow links for size/type; dangling links fall back to the link itself.
    let meta = if is_symlink {
        fs::metadata(full).unwrap_or(link_meta)
    } else {
        link_meta
    };

    Ok(FsMetadata {
        name,
        size: if meta.is_file() { meta.len() } else { 0 },
        modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        mode: mode_of(&meta),
        is_dir: meta.is_dir(),
        is_symlink,
    })
}

#[cfg(unix)]
fn mode_of(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    meta.mode()
}

#[cfg(not(unix))]
fn mode_of(meta: &fs::Metadata) -> u32 {
    if meta.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

impl ScopedFs for OsFs {
    fn stat(&self, rel: &str) -> io::Result<FsMetadata> {
        let full = self.resolve(rel)?;
        let clean = path::clean(rel).map_err(denied)?;
        metadata_for(&full, path::base_name(&clean).to_string())
    }

    fn read_dir(&self, rel: &str) -> io::Result<Vec<FsMetadata>> {
        let full = self.resolve(rel)?;

        let mut entries = Vec::new();
        for entry in fs::read_dir(&full)? {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            let name = entry.file_name().to_string_lossy().to_string();
            match metadata_for(&entry.path(), name) {
                Ok(meta) => entries.push(meta),
                Err(e) => {
                    tracing::debug!(path = ?entry.path(), error = %e, "Skipping unreadable entry");
                }
            }
        }

        Ok(entries)
    }

    fn open(&self, rel: &str) -> io::Result<Box<dyn Read + Send>> {
        let full = self.resolve(rel)?;
        let file = File::open(full)?;
        Ok(Box::new(file))
    }

    fn write(&self, rel: &str, data: &mut dyn Read) -> io::Result<FsMetadata> {
        self.store_file(rel, data, OpenOptions::new().write(true).create(true).truncate(true))
    }

    fn create_new(&self, rel: &str, data: &mut dyn Read) -> io::Result<FsMetadata> {
        self.store_file(rel, data, OpenOptions::new().write(true).create_new(true))
    }

    fn remove_all(&self, rel: &str) -> io::Result<()> {
        let full = self.resolve(rel)?;
        let meta = match fs::symlink_metadata(&full) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };

        if meta.is_dir() {
            fs::remove_dir_all(&full)
        } else {
            fs::remove_file(&full)
        }
    }

    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        let src = self.resolve(from)?;
        let dst = self.resolve(to)?;
        fs::rename(src, dst)
    }

    fn mkdir_all(&self, rel: &str) -> io::Result<()> {
        let full = self.resolve(rel)?;
        fs::create_dir_all(full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn setup() -> (TempDir, OsFs) {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("docs")).unwrap();
        fs::write(temp_dir.path().join("docs/readme.txt"), "Hello").unwrap();
        let scoped = OsFs::new(temp_dir.path());
        (temp_dir, scoped)
    }

    #[test]
    fn test_stat_file_and_dir() {
        let (_temp_dir, scoped) = setup();

        let file = scoped.stat("/docs/readme.txt").unwrap();
        assert_eq!(file.name, "readme.txt");
        assert_eq!(file.size, 5);
        assert!(!file.is_dir);

        let dir = scoped.stat("/docs").unwrap();
        assert!(dir.is_dir);
        assert_eq!(dir.size, 0);

        let root = scoped.stat("/").unwrap();
        assert!(root.is_dir);
        assert_eq!(root.name, "/");
    }

    #[test]
    fn test_stat_missing() {
        let (_temp_dir, scoped) = setup();
        let err = scoped.stat("/nope").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_read_dir() {
        let (temp_dir, scoped) = setup();
        fs::write(temp_dir.path().join("top.txt"), "x").unwrap();

        let mut names: Vec<String> = scoped
            .read_dir("/")
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["docs", "top.txt"]);
    }

    #[test]
    fn test_write_creates_parents() {
        let (temp_dir, scoped) = setup();

        let meta = scoped
            .write("/new/deep/file.txt", &mut Cursor::new(b"abc".to_vec()))
            .unwrap();
        assert_eq!(meta.size, 3);
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("new/deep/file.txt")).unwrap(),
            "abc"
        );
    }

    #[test]
    fn test_write_truncates() {
        let (temp_dir, scoped) = setup();
        scoped
            .write("/docs/readme.txt", &mut Cursor::new(b"Hi".to_vec()))
            .unwrap();
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("docs/readme.txt")).unwrap(),
            "Hi"
        );
    }

    #[test]
    fn test_create_new_refuses_existing() {
        let (temp_dir, scoped) = setup();

        let err = scoped
            .create_new("/docs/readme.txt", &mut Cursor::new(b"Hi".to_vec()))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("docs/readme.txt")).unwrap(),
            "Hello"
        );

        let meta = scoped
            .create_new("/fresh/file.txt", &mut Cursor::new(b"new".to_vec()))
            .unwrap();
        assert_eq!(meta.size, 3);
    }

    #[test]
    fn test_open_reads_content() {
        let (_temp_dir, scoped) = setup();
        let mut content = String::new();
        scoped
            .open("/docs/readme.txt")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "Hello");
    }

    #[test]
    fn test_remove_all() {
        let (temp_dir, scoped) = setup();
        scoped.remove_all("/docs").unwrap();
        assert!(!temp_dir.path().join("docs").exists());

        // Removing again is not an error.
        scoped.remove_all("/docs").unwrap();
    }

    #[test]
    fn test_rename() {
        let (temp_dir, scoped) = setup();
        scoped.rename("/docs/readme.txt", "/readme.md").unwrap();
        assert!(temp_dir.path().join("readme.md").exists());
        assert!(!temp_dir.path().join("docs/readme.txt").exists());
    }

    #[test]
    fn test_mkdir_all_idempotent() {
        let (temp_dir, scoped) = setup();
        scoped.mkdir_all("/a/b").unwrap();
        scoped.mkdir_all("/a/b").unwrap();
        assert!(temp_dir.path().join("a/b").is_dir());
    }

    #[test]
    fn test_mkdir_all_over_file() {
        let (_temp_dir, scoped) = setup();
        let err = scoped.mkdir_all("/docs/readme.txt").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_traversal_denied() {
        let (_temp_dir, scoped) = setup();
        let err = scoped.stat("/../etc/passwd").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    #[cfg(unix)]
    fn test_symlink_outside_scope_denied() {
        use std::os::unix::fs::symlink;

        let (temp_dir, scoped) = setup();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret.txt"), "secret").unwrap();
        symlink(outside.path(), temp_dir.path().join("escape")).unwrap();

        let err = scoped.stat("/escape/secret.txt").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);

        let err = scoped
            .write("/escape/planted.txt", &mut Cursor::new(b"x".to_vec()))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        assert!(!outside.path().join("planted.txt").exists());
    }

    #[test]
    #[cfg(unix)]
    fn test_symlink_inside_scope_allowed() {
        use std::os::unix::fs::symlink;

        let (temp_dir, scoped) = setup();
        symlink(
            temp_dir.path().join("docs/readme.txt"),
            temp_dir.path().join("link.txt"),
        )
        .unwrap();

        let meta = scoped.stat("/link.txt").unwrap();
        assert!(meta.is_symlink);
        assert_eq!(meta.size, 5);
    }
}
