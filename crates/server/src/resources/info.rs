//! Building [`FileInfo`] views from a scoped filesystem.

use std::io::{self, Read};

use chrono::{DateTime, Utc};
use model::{FileInfo, FileType, Listing, Sorting};

use crate::fs::{path, FsMetadata, ScopedFs};

/// Bytes inspected when sniffing a file's type.
const SNIFF_LEN: u64 = 512;

const SUBTITLE_EXTENSIONS: &[&str] = &[".vtt", ".srt"];

/// Classify a file by extension alone.
///
/// Returns `None` for extensions that need a look at the content.
pub fn type_for_extension(extension: &str) -> Option<FileType> {
    let ext = extension.trim_start_matches('.').to_ascii_lowercase();
    let file_type = match ext.as_str() {
        "mp4" | "mkv" | "webm" | "mov" | "avi" | "m4v" | "ogv" => FileType::Video,
        "mp3" | "flac" | "wav" | "ogg" | "oga" | "m4a" | "aac" | "opus" => FileType::Audio,
        "png" | "jpg" | "jpeg" | "gif" | "bmp" | "webp" | "svg" | "ico" | "tif" | "tiff" => {
            FileType::Image
        }
        "pdf" => FileType::Pdf,
        "zip" | "gz" | "tgz" | "xz" | "bz2" | "7z" | "rar" | "tar" | "iso" | "exe" | "bin"
        | "so" | "dll" | "dmg" => FileType::Blob,
        "txt" | "md" | "markdown" | "rs" | "go" | "py" | "js" | "ts" | "json" | "toml"
        | "yaml" | "yml" | "xml" | "html" | "htm" | "css" | "sh" | "c" | "h" | "cpp" | "java"
        | "ini" | "conf" | "csv" | "log" | "vtt" | "srt" => FileType::Text,
        _ => return None,
    };
    Some(file_type)
}

/// Classify content by its first bytes: NUL or invalid UTF-8 means binary.
///
/// A multi-byte character cut off at the end of the header is not invalid.
pub fn sniff(header: &[u8]) -> FileType {
    if header.contains(&0) {
        return FileType::Blob;
    }
    match std::str::from_utf8(header) {
        Ok(_) => FileType::Text,
        Err(e) if e.error_len().is_none() => FileType::Text,
        Err(_) => FileType::Blob,
    }
}

/// Basic view of an entry, typed by extension only.
pub fn from_metadata(file_path: &str, meta: &FsMetadata) -> FileInfo {
    let extension = if meta.is_dir {
        String::new()
    } else {
        FileInfo::extension_of(&meta.name)
    };
    let file_type = if meta.is_dir {
        FileType::Directory
    } else {
        type_for_extension(&extension).unwrap_or_default()
    };

    FileInfo {
        path: file_path.to_string(),
        name: meta.name.clone(),
        size: meta.size,
        extension,
        modified: DateTime::<Utc>::from(meta.modified),
        mode: meta.mode,
        is_dir: meta.is_dir,
        is_symlink: meta.is_symlink,
        file_type,
        content: None,
        checksums: Default::default(),
        subtitles: Vec::new(),
        listing: None,
    }
}

/// Refine the type of a file by sniffing its header when the extension
/// was not conclusive.
pub fn detect_type(fs: &dyn ScopedFs, info: &mut FileInfo) -> io::Result<()> {
    if info.is_dir || type_for_extension(&info.extension).is_some() {
        return Ok(());
    }

    let mut header = Vec::with_capacity(SNIFF_LEN as usize);
    fs.open(&info.path)?.take(SNIFF_LEN).read_to_end(&mut header)?;
    info.file_type = sniff(&header);
    Ok(())
}

/// Embed the content of a text file no larger than `max_size`.
pub fn load_content(fs: &dyn ScopedFs, info: &mut FileInfo, max_size: u64) -> io::Result<()> {
    if !info.file_type.is_text() || info.size > max_size {
        return Ok(());
    }

    let mut bytes = Vec::with_capacity(info.size as usize);
    fs.open(&info.path)?.take(max_size).read_to_end(&mut bytes)?;
    info.content = Some(String::from_utf8_lossy(&bytes).into_owned());
    Ok(())
}

/// Collect subtitle files next to a video that share its stem.
pub fn detect_subtitles(fs: &dyn ScopedFs, info: &mut FileInfo) -> io::Result<()> {
    if info.file_type != FileType::Video {
        return Ok(());
    }

    let stem = info
        .name
        .strip_suffix(info.extension.as_str())
        .unwrap_or(&info.name);
    let dir = path::parent(&info.path);

    let mut subtitles: Vec<String> = fs
        .read_dir(dir)?
        .into_iter()
        .filter(|entry| !entry.is_dir)
        .filter(|entry| {
            let ext = FileInfo::extension_of(&entry.name).to_ascii_lowercase();
            SUBTITLE_EXTENSIONS.contains(&ext.as_str())
                && entry.name.starts_with(stem)
                && entry.name[stem.len()..].starts_with('.')
        })
        .map(|entry| path::join(dir, &entry.name))
        .collect();
    subtitles.sort();

    info.subtitles = subtitles;
    Ok(())
}

/// Read a directory into a sorted listing.
pub fn build_listing(fs: &dyn ScopedFs, dir: &str, sorting: Sorting) -> io::Result<Listing> {
    let items = fs
        .read_dir(dir)?
        .iter()
        .map(|meta| from_metadata(&path::join(dir, &meta.name), meta))
        .collect();
    Ok(Listing::new(items, sorting))
}
