//! Request-scoped views of files and directories.
//!
//! A [`FileInfo`] is rebuilt from the filesystem for every request and never
//! persisted.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::preferences::{SortBy, Sorting};

/// Coarse classification of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum FileType {
    Directory,
    Video,
    Audio,
    Image,
    Pdf,
    /// Editable text.
    Text,
    /// Text the caller may read but not modify.
    TextImmutable,
    /// Anything else.
    #[default]
    Blob,
}

impl FileType {
    /// Whether the type carries readable text content.
    pub fn is_text(&self) -> bool {
        matches!(self, FileType::Text | FileType::TextImmutable)
    }
}

/// A file or directory as seen by one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    /// Scope-relative path.
    pub path: String,
    /// Final path segment.
    pub name: String,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Extension including the leading dot, or empty.
    pub extension: String,
    /// Last modification time.
    pub modified: DateTime<Utc>,
    /// Unix permission bits.
    pub mode: u32,
    pub is_dir: bool,
    pub is_symlink: bool,
    #[serde(rename = "type")]
    pub file_type: FileType,
    /// Embedded text content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Digests keyed by algorithm name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub checksums: BTreeMap<String, String>,
    /// Subtitle tracks found next to a video, as scope-relative paths.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtitles: Vec<String>,
    /// Directory contents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listing: Option<Listing>,
}

impl FileInfo {
    /// Extension of `name`, including the leading dot.
    ///
    /// Dotfiles without a further dot have no extension.
    pub fn extension_of(name: &str) -> String {
        match name.rfind('.') {
            Some(0) | None => String::new(),
            Some(idx) => name[idx..].to_string(),
        }
    }
}

/// Ordered contents of a directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub items: Vec<FileInfo>,
    pub num_dirs: usize,
    pub num_files: usize,
    pub sorting: Sorting,
}

impl Listing {
    /// Build a listing from unsorted items.
    pub fn new(items: Vec<FileInfo>, sorting: Sorting) -> Self {
        let num_dirs = items.iter().filter(|i| i.is_dir).count();
        let num_files = items.len() - num_dirs;
        let mut listing = Self {
            items,
            num_dirs,
            num_files,
            sorting,
        };
        listing.apply_sort();
        listing
    }

    /// Replace the active sorting and re-sort.
    pub fn set_sorting(&mut self, sorting: Sorting) {
        self.sorting = sorting;
        self.apply_sort();
    }

    /// Sort items by the active key and order.
    ///
    /// Names compare case-insensitively; ties fall back to the exact name so
    /// the order is total.
    pub fn apply_sort(&mut self) {
        let sorting = self.sorting;
        self.items.sort_by(|a, b| {
            let ord = match sorting.by {
                SortBy::Name => compare_names(&a.name, &b.name),
                SortBy::Size => a
                    .size
                    .cmp(&b.size)
                    .then_with(|| compare_names(&a.name, &b.name)),
            };
            if sorting.order.is_asc() {
                ord
            } else {
                ord.reverse()
            }
        });
    }
}

fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preferences::SortOrder;

    fn item(name: &str, size: u64, is_dir: bool) -> FileInfo {
        FileInfo {
            path: format!("/{}", name),
            name: name.to_string(),
            size,
            extension: FileInfo::extension_of(name),
            modified: DateTime::<Utc>::UNIX_EPOCH,
            mode: 0o644,
            is_dir,
            is_symlink: false,
            file_type: if is_dir { FileType::Directory } else { FileType::Blob },
            content: None,
            checksums: BTreeMap::new(),
            subtitles: Vec::new(),
            listing: None,
        }
    }

    fn names(listing: &Listing) -> Vec<&str> {
        listing.items.iter().map(|i| i.name.as_str()).collect()
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(FileInfo::extension_of("a.txt"), ".txt");
        assert_eq!(FileInfo::extension_of("archive.tar.gz"), ".gz");
        assert_eq!(FileInfo::extension_of(".bashrc"), "");
        assert_eq!(FileInfo::extension_of("Makefile"), "");
    }

    #[test]
    fn test_listing_counts() {
        let listing = Listing::new(
            vec![item("a", 0, true), item("b.txt", 3, false), item("c.txt", 1, false)],
            Sorting::default(),
        );
        assert_eq!(listing.num_dirs, 1);
        assert_eq!(listing.num_files, 2);
    }

    #[test]
    fn test_sort_by_name_case_insensitive() {
        let listing = Listing::new(
            vec![item("beta", 1, false), item("Alpha", 2, false), item("gamma", 0, false)],
            Sorting::default(),
        );
        assert_eq!(names(&listing), vec!["Alpha", "beta", "gamma"]);
    }

    #[test]
    fn test_sort_by_name_desc() {
        let listing = Listing::new(
            vec![item("b", 1, false), item("a", 2, false), item("c", 0, false)],
            Sorting::new(SortBy::Name, SortOrder::Desc),
        );
        assert_eq!(names(&listing), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_sort_by_size() {
        let mut listing = Listing::new(
            vec![item("big", 100, false), item("small", 1, false), item("mid", 10, false)],
            Sorting::new(SortBy::Size, SortOrder::Asc),
        );
        assert_eq!(names(&listing), vec!["small", "mid", "big"]);

        listing.set_sorting(Sorting::new(SortBy::Size, SortOrder::Desc));
        assert_eq!(names(&listing), vec!["big", "mid", "small"]);
    }

    #[test]
    fn test_file_type_serialization() {
        assert_eq!(
            serde_json::to_string(&FileType::TextImmutable).unwrap(),
            "\"textImmutable\""
        );
        assert!(FileType::TextImmutable.is_text());
        assert!(!FileType::Blob.is_text());
    }

    #[test]
    fn test_file_info_serialization_skips_empty() {
        let info = item("a.txt", 3, false);
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["type"], "blob");
        assert_eq!(json["isDir"], false);
        assert!(json.get("content").is_none());
        assert!(json.get("checksums").is_none());
        assert!(json.get("listing").is_none());
    }
}
