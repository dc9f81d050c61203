//! In-memory scoped filesystem.
//!
//! Holds the whole tree in a `RwLock<BTreeMap>` keyed by clean path. Nothing
//! is persisted; the tree is dropped with the handle. Modification times are
//! strictly increasing across writes so integrity tags always change.

use std::collections::BTreeMap;
use std::io::{self, Cursor, Read};
use std::sync::{Mutex, RwLock};
use std::time::{Duration, SystemTime};

use super::path;
use super::{denied, FsMetadata, ScopedFs};

#[derive(Debug, Clone)]
enum NodeKind {
    Dir,
    File(Vec<u8>),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    modified: SystemTime,
}

impl Node {
    fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Dir)
    }

    fn metadata(&self, path: &str) -> FsMetadata {
        let (size, mode) = match &self.kind {
            NodeKind::Dir => (0, 0o755),
            NodeKind::File(data) => (data.len() as u64, 0o644),
        };
        FsMetadata {
            name: path::base_name(path).to_string(),
            size,
            modified: self.modified,
            mode,
            is_dir: self.is_dir(),
            is_symlink: false,
        }
    }
}

/// Scoped filesystem kept entirely in memory.
#[derive(Debug)]
pub struct MemoryFs {
    nodes: RwLock<BTreeMap<String, Node>>,
    last_tick: Mutex<SystemTime>,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    /// Create an empty tree containing only the root directory.
    pub fn new() -> Self {
        let now = SystemTime::now();
        let mut nodes = BTreeMap::new();
        nodes.insert(
            "/".to_string(),
            Node {
                kind: NodeKind::Dir,
                modified: now,
            },
        );
        Self {
            nodes: RwLock::new(nodes),
            last_tick: Mutex::new(now),
        }
    }

    /// Current time, strictly later than any previously returned time.
    fn tick(&self) -> SystemTime {
        let mut last = self
            .last_tick
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = SystemTime::now();
        let next = if now > *last {
            now
        } else {
            *last + Duration::from_micros(1)
        };
        *last = next;
        next
    }

    fn read_nodes(&self) -> io::Result<std::sync::RwLockReadGuard<'_, BTreeMap<String, Node>>> {
        self.nodes
            .read()
            .map_err(|_| io::Error::other("memory filesystem lock poisoned"))
    }

    fn write_nodes(&self) -> io::Result<std::sync::RwLockWriteGuard<'_, BTreeMap<String, Node>>> {
        self.nodes
            .write()
            .map_err(|_| io::Error::other("memory filesystem lock poisoned"))
    }

    /// Keys strictly below `dir`.
    fn descendants(nodes: &BTreeMap<String, Node>, dir: &str) -> Vec<String> {
        let prefix = if path::is_root(dir) {
            "/".to_string()
        } else {
            format!("{}/", dir)
        };
        nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter(|(k, _)| k.as_str() != "/")
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Write a file, refusing to replace an existing one unless `replace`.
    fn store_file(&self, rel: &str, data: &mut dyn Read, replace: bool) -> io::Result<FsMetadata> {
        let clean = path::clean(rel).map_err(denied)?;
        if path::is_root(&clean) {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                "cannot write to the root",
            ));
        }

        let mut buf = Vec::new();
        data.read_to_end(&mut buf)?;

        let now = self.tick();
        let mut nodes = self.write_nodes()?;
        match nodes.get(&clean) {
            Some(node) if node.is_dir() => {
                return Err(io::Error::new(
                    io::ErrorKind::IsADirectory,
                    format!("{} is a directory", clean),
                ));
            }
            Some(_) if !replace => {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} already exists", clean),
                ));
            }
            _ => {}
        }
        Self::ensure_dirs(&mut nodes, path::parent(&clean), now)?;

        let node = Node {
            kind: NodeKind::File(buf),
            modified: now,
        };
        let meta = node.metadata(&clean);
        nodes.insert(clean, node);
        Ok(meta)
    }

    fn ensure_dirs(
        nodes: &mut BTreeMap<String, Node>,
        dir: &str,
        now: SystemTime,
    ) -> io::Result<()> {
        let mut current = String::from("/");
        for segment in path::segments(dir) {
            current = path::join(&current, segment);
            match nodes.get(&current) {
                Some(node) if node.is_dir() => {}
                Some(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("{} is a file", current),
                    ))
                }
                None => {
                    nodes.insert(
                        current.clone(),
                        Node {
                            kind: NodeKind::Dir,
                            modified: now,
                        },
                    );
                }
            }
        }
        Ok(())
    }
}

fn not_found(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{} not found", path))
}

impl ScopedFs for MemoryFs {
    fn stat(&self, rel: &str) -> io::Result<FsMetadata> {
        let clean = path::clean(rel).map_err(denied)?;
        let nodes = self.read_nodes()?;
        nodes
            .get(&clean)
            .map(|node| node.metadata(&clean))
            .ok_or_else(|| not_found(&clean))
    }

    fn read_dir(&self, rel: &str) -> io::Result<Vec<FsMetadata>> {
        let clean = path::clean(rel).map_err(denied)?;
        let nodes = self.read_nodes()?;

        match nodes.get(&clean) {
            Some(node) if node.is_dir() => {}
            Some(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::NotADirectory,
                    format!("{} is not a directory", clean),
                ))
            }
            None => return Err(not_found(&clean)),
        }

        Ok(Self::descendants(&nodes, &clean)
            .into_iter()
            .filter(|key| path::parent(key) == clean)
            .filter_map(|key| nodes.get(&key).map(|node| node.metadata(&key)))
            .collect())
    }

    fn open(&self, rel: &str) -> io::Result<Box<dyn Read + Send>> {
        let clean = path::clean(rel).map_err(denied)?;
        let nodes = self.read_nodes()?;
        match nodes.get(&clean) {
            Some(Node {
                kind: NodeKind::File(data),
                ..
            }) => Ok(Box::new(Cursor::new(data.clone()))),
            Some(_) => Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("{} is a directory", clean),
            )),
            None => Err(not_found(&clean)),
        }
    }

    fn write(&self, rel: &str, data: &mut dyn Read) -> io::Result<FsMetadata> {
        self.store_file(rel, data, true)
    }

    fn create_new(&self, rel: &str, data: &mut dyn Read) -> io::Result<FsMetadata> {
        self.store_file(rel, data, false)
    }

    fn remove_all(&self, rel: &str) -> io::Result<()> {
        let clean = path::clean(rel).map_err(denied)?;
        let mut nodes = self.write_nodes()?;

        for key in Self::descendants(&nodes, &clean) {
            nodes.remove(&key);
        }
        if !path::is_root(&clean) {
            nodes.remove(&clean);
        }
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        let src = path::clean(from).map_err(denied)?;
        let dst = path::clean(to).map_err(denied)?;
        if path::is_root(&src) || path::is_root(&dst) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "cannot rename the root",
            ));
        }
        if src == dst {
            return Ok(());
        }
        if path::is_within(&dst, &src) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot move {} into itself", src),
            ));
        }

        let mut nodes = self.write_nodes()?;
        let src_is_dir = match nodes.get(&src) {
            Some(node) => node.is_dir(),
            None => return Err(not_found(&src)),
        };
        match nodes.get(path::parent(&dst)) {
            Some(node) if node.is_dir() => {}
            _ => return Err(not_found(path::parent(&dst))),
        }
        if let Some(existing) = nodes.get(&dst) {
            if existing.is_dir() != src_is_dir || existing.is_dir() {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} already exists", dst),
                ));
            }
        }

        let mut moved = vec![src.clone()];
        moved.extend(Self::descendants(&nodes, &src));
        for key in moved {
            if let Some(node) = nodes.remove(&key) {
                let new_key = format!("{}{}", dst, &key[src.len()..]);
                nodes.insert(new_key, node);
            }
        }
        Ok(())
    }

    fn mkdir_all(&self, rel: &str) -> io::Result<()> {
        let clean = path::clean(rel).map_err(denied)?;
        let now = self.tick();
        let mut nodes = self.write_nodes()?;
        Self::ensure_dirs(&mut nodes, &clean, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(fs: &MemoryFs, path: &str, content: &str) -> FsMetadata {
        fs.write(path, &mut Cursor::new(content.as_bytes().to_vec()))
            .unwrap()
    }

    fn read(fs: &MemoryFs, path: &str) -> String {
        let mut content = String::new();
        fs.open(path).unwrap().read_to_string(&mut content).unwrap();
        content
    }

    #[test]
    fn test_root_exists() {
        let fs = MemoryFs::new();
        let root = fs.stat("/").unwrap();
        assert!(root.is_dir);
        assert!(fs.read_dir("/").unwrap().is_empty());
    }

    #[test]
    fn test_create_new_refuses_existing() {
        let fs = MemoryFs::new();
        write(&fs, "/a.txt", "first");

        let err = fs
            .create_new("/a.txt", &mut Cursor::new(b"second".to_vec()))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(read(&fs, "/a.txt"), "first");

        fs.create_new("/dir/b.txt", &mut Cursor::new(b"b".to_vec()))
            .unwrap();
        assert_eq!(read(&fs, "/dir/b.txt"), "b");
    }

    #[test]
    fn test_write_and_read() {
        let fs = MemoryFs::new();
        let meta = write(&fs, "/a/b.txt", "hello");
        assert_eq!(meta.size, 5);
        assert_eq!(meta.name, "b.txt");
        assert_eq!(read(&fs, "/a/b.txt"), "hello");
        assert!(fs.stat("/a").unwrap().is_dir);
    }

    #[test]
    fn test_modified_strictly_increases() {
        let fs = MemoryFs::new();
        let first = write(&fs, "/f", "x");
        let second = write(&fs, "/f", "x");
        assert!(second.modified > first.modified);
    }

    #[test]
    fn test_read_dir_direct_children_only() {
        let fs = MemoryFs::new();
        write(&fs, "/a/one.txt", "1");
        write(&fs, "/a/sub/two.txt", "2");
        write(&fs, "/ab.txt", "3");

        let mut names: Vec<String> = fs.read_dir("/a").unwrap().into_iter().map(|m| m.name).collect();
        names.sort();
        assert_eq!(names, vec!["one.txt", "sub"]);

        let mut names: Vec<String> = fs.read_dir("/").unwrap().into_iter().map(|m| m.name).collect();
        names.sort();
        assert_eq!(names, vec!["a", "ab.txt"]);
    }

    #[test]
    fn test_read_dir_on_file() {
        let fs = MemoryFs::new();
        write(&fs, "/f.txt", "x");
        let err = fs.read_dir("/f.txt").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotADirectory);
    }

    #[test]
    fn test_write_over_directory() {
        let fs = MemoryFs::new();
        fs.mkdir_all("/d").unwrap();
        let err = fs.write("/d", &mut Cursor::new(Vec::new())).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::IsADirectory);
    }

    #[test]
    fn test_remove_all_subtree() {
        let fs = MemoryFs::new();
        write(&fs, "/a/one.txt", "1");
        write(&fs, "/a/sub/two.txt", "2");
        write(&fs, "/ab.txt", "3");

        fs.remove_all("/a").unwrap();

        assert_eq!(fs.stat("/a").unwrap_err().kind(), io::ErrorKind::NotFound);
        assert_eq!(
            fs.stat("/a/sub/two.txt").unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
        assert!(fs.stat("/ab.txt").is_ok());
        fs.remove_all("/a").unwrap();
    }

    #[test]
    fn test_rename_directory() {
        let fs = MemoryFs::new();
        write(&fs, "/a/one.txt", "1");
        write(&fs, "/a/sub/two.txt", "2");

        fs.rename("/a", "/b").unwrap();

        assert_eq!(read(&fs, "/b/one.txt"), "1");
        assert_eq!(read(&fs, "/b/sub/two.txt"), "2");
        assert!(fs.stat("/a").is_err());
    }

    #[test]
    fn test_rename_missing_parent() {
        let fs = MemoryFs::new();
        write(&fs, "/f.txt", "1");
        let err = fs.rename("/f.txt", "/missing/f.txt").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_rename_overwrites_file() {
        let fs = MemoryFs::new();
        write(&fs, "/a.txt", "new");
        write(&fs, "/b.txt", "old");
        fs.rename("/a.txt", "/b.txt").unwrap();
        assert_eq!(read(&fs, "/b.txt"), "new");
    }

    #[test]
    fn test_rename_into_itself() {
        let fs = MemoryFs::new();
        fs.mkdir_all("/a").unwrap();
        let err = fs.rename("/a", "/a/b").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_mkdir_all() {
        let fs = MemoryFs::new();
        fs.mkdir_all("/x/y/z").unwrap();
        fs.mkdir_all("/x/y/z").unwrap();
        assert!(fs.stat("/x/y").unwrap().is_dir);

        write(&fs, "/file", "1");
        let err = fs.mkdir_all("/file/sub").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_traversal_denied() {
        let fs = MemoryFs::new();
        let err = fs.stat("/../x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }
}
