//! Path inspection and misc shared helpers.

use std::fs::{self, FileType, Metadata};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{Error, Result};

/// Coarse file type used by the exclusion matcher and the archive builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
    /// Devices, sockets, FIFOs.
    Special,
}

impl From<FileType> for EntryKind {
    fn from(ft: FileType) -> Self {
        if ft.is_symlink() {
            Self::Symlink
        } else if ft.is_dir() {
            Self::Dir
        } else if ft.is_file() {
            Self::File
        } else {
            Self::Special
        }
    }
}

/// Result of [`inspect`].
#[derive(Debug, Clone)]
pub struct PathInfo {
    pub path: PathBuf,
    pub kind: EntryKind,
    pub size: u64,
    pub mode: u32,
    pub modified: SystemTime,
}

impl PathInfo {
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }
}

/// Stat `path` (following symlinks).
///
/// A missing path yields [`Error::NotFound`], anything else the OS refuses
/// yields [`Error::Access`]. No side effects.
pub fn inspect<P: AsRef<Path>>(path: P) -> Result<PathInfo> {
    let path = path.as_ref();
    let meta = fs::metadata(path).map_err(|e| Error::from_io(path, e))?;
    Ok(PathInfo {
        path: path.to_path_buf(),
        kind: meta.file_type().into(),
        size: meta.len(),
        mode: mode_of(&meta),
        modified: meta.modified().map_err(|e| Error::from_io(path, e))?,
    })
}

/// Permission bits (plus file-type bits on Unix).
#[cfg(unix)]
pub fn mode_of(meta: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode()
}

#[cfg(not(unix))]
pub fn mode_of(meta: &Metadata) -> u32 {
    match (meta.is_dir(), meta.permissions().readonly()) {
        (true, _) => 0o755,
        (false, true) => 0o444,
        (false, false) => 0o644,
    }
}

/// Create `path` and any missing parents. Succeeds if it already is a
/// directory, fails if something else occupies the path.
pub fn ensure_directory<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    if let Err(e) = fs::create_dir_all(path) {
        if !path.is_dir() {
            return Err(Error::from_io(path, e));
        }
    }
    Ok(())
}

/// Make `path` absolute against the current directory without touching the
/// filesystem (symlinks are left unresolved).
pub fn absolutize<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let path = path.as_ref();
    std::path::absolute(path).map_err(|e| Error::from_io(path, e))
}

const FORBIDDEN_NAME_CHARS: &[char] = &[
    '<', '>', '"', '\'', '\\', '`', ';', '%', '$', '#', '@', '&', '*', '(', ')', '{', '}', '[',
    ']', '|', '!', '^', '~', '=', '+', '-', '.', ',', '/', '?', ':', '，', '。', '？', '！', '；',
    '：', '‘', '’', '“', '”', '（', '）', '【', '】', '《', '》', '…', '—', '～', '￥', '·', '、',
];

/// True if `name` contains shell or path punctuation that is not allowed in
/// a task name.
pub fn contains_special_chars(name: &str) -> bool {
    name.chars().any(|c| FORBIDDEN_NAME_CHARS.contains(&c))
}
