//! Archive builder: serialise a directory tree (or a single file) into a zip.
//!
//! Entry names are relative to the *parent* of the source, so the source's
//! own name is the first path segment of every entry and restoring the
//! archive recreates the original folder. Separators are always `/`.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};
use zip::result::{ZipError, ZipResult};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{Error, Result};
use crate::exclude::ExclusionSet;
use crate::utils::{self, mode_of, EntryKind};

/// Extension appended to every archive the builder writes.
pub const ARCHIVE_EXT: &str = "zip";

const COPY_BUF_SIZE: usize = 512 * 1024;

/// What [`build`] produced.
#[derive(Debug, Clone)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    /// Entries written, directories and links included.
    pub entries: usize,
    /// Bytes of regular-file payload (before compression).
    pub payload_bytes: u64,
}

/// Archive `source_root/entry_name` into `dest_stem` + `.zip`.
///
/// The tree is walked twice in file-name order: once to size the payload,
/// once to write it. Excluded directories are pruned, never descended into.
/// Regular files use deflate unless `compress` is false; directories,
/// symlinks and special files are always stored.
///
/// An existing file at the archive path is never touched:
/// [`Error::AlreadyExists`] is returned instead. On failure part-way
/// through, the partially written archive is left on disk and
/// [`Error::Build`] is returned.
pub fn build(
    source_root: &Path,
    entry_name: &str,
    dest_stem: &Path,
    compress: bool,
    exclude: &ExclusionSet,
) -> Result<ArchiveSummary> {
    let source_root = utils::absolutize(source_root)?;
    let archive = with_archive_ext(&utils::absolutize(dest_stem)?);
    let top = source_root.join(entry_name);

    // the root itself must exist even if a rule would exclude it
    fs::symlink_metadata(&top).map_err(|e| Error::from_io(&top, e))?;
    // archives are never overwritten
    if fs::symlink_metadata(&archive).is_ok() {
        return Err(Error::AlreadyExists(archive));
    }

    let mut payload_bytes = 0u64;
    for entry in walk(&top, exclude, &archive) {
        let entry = entry.map_err(|e| walk_error(&top, e))?;
        if entry.file_type().is_file() {
            let meta = entry.metadata().map_err(|e| walk_error(entry.path(), e))?;
            payload_bytes += meta.len();
        }
    }
    debug!(
        "{} bytes of file payload under {}",
        payload_bytes,
        top.display()
    );

    let method = if compress {
        CompressionMethod::Deflated
    } else {
        CompressionMethod::Stored
    };

    let entries = write_archive(&archive, &source_root, &top, method, exclude).map_err(|e| {
        Error::Build {
            path: archive.clone(),
            source: e,
        }
    })?;

    info!("wrote {} ({} entries)", archive.display(), entries);
    Ok(ArchiveSummary {
        path: archive,
        entries,
        payload_bytes,
    })
}

/// Archive an arbitrary `source` into the explicit file `dest`, which must
/// end in `.zip` and must not exist yet.
pub fn zip_path(
    source: &Path,
    dest: &Path,
    compress: bool,
    exclude: &ExclusionSet,
) -> Result<ArchiveSummary> {
    if dest.extension().map_or(true, |e| e != ARCHIVE_EXT) {
        return Err(Error::Policy(format!(
            "archive name {} must end in .{ARCHIVE_EXT}",
            dest.display()
        )));
    }
    let source = utils::absolutize(source)?;
    let entry_name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::Policy(format!("{} has no file name", source.display())))?;
    let root = source.parent().unwrap_or(&source);
    build(root, &entry_name, &dest.with_extension(""), compress, exclude)
}

fn with_archive_ext(stem: &Path) -> PathBuf {
    let mut s = stem.as_os_str().to_os_string();
    s.push(".");
    s.push(ARCHIVE_EXT);
    PathBuf::from(s)
}

/// Depth-first walk that prunes excluded nodes and never yields the archive
/// being written.
fn walk<'a>(
    top: &Path,
    exclude: &'a ExclusionSet,
    archive: &'a Path,
) -> impl Iterator<Item = walkdir::Result<DirEntry>> + 'a {
    WalkDir::new(top)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |e| {
            e.path() != archive && !exclude.is_excluded(e.path(), e.file_type().into())
        })
}

fn walk_error(path: &Path, err: walkdir::Error) -> Error {
    let path = err.path().map_or_else(|| path.to_path_buf(), Path::to_path_buf);
    Error::from_io(path, io::Error::from(err))
}

/// Name of `path` inside the archive: relative to `root`, `/`-separated.
fn entry_name(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn stored(mode: u32) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .unix_permissions(mode)
}

fn write_archive(
    archive: &Path,
    source_root: &Path,
    top: &Path,
    method: CompressionMethod,
    exclude: &ExclusionSet,
) -> ZipResult<usize> {
    let file = OpenOptions::new().write(true).create_new(true).open(archive)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let mut count = 0usize;

    for entry in walk(top, exclude, archive) {
        let entry = entry.map_err(io::Error::from)?;
        let path = entry.path();
        let name = entry_name(source_root, path);
        let meta = entry.metadata().map_err(io::Error::from)?;
        let mode = mode_of(&meta);

        match EntryKind::from(entry.file_type()) {
            EntryKind::File => {
                let opts = SimpleFileOptions::default()
                    .compression_method(method)
                    .unix_permissions(mode)
                    .large_file(meta.len() >= u64::from(u32::MAX));
                zip.start_file(name, opts)?;
                let mut reader = BufReader::with_capacity(COPY_BUF_SIZE, File::open(path)?);
                io::copy(&mut reader, &mut zip)?;
            }
            EntryKind::Dir => {
                zip.add_directory(format!("{name}/"), stored(mode))?;
            }
            EntryKind::Symlink => {
                let target = fs::read_link(path)?;
                zip.add_symlink(name, target.to_string_lossy(), stored(mode))?;
            }
            EntryKind::Special => {
                debug!("{}: special file, storing metadata only", path.display());
                zip.start_file(name, stored(mode))?;
            }
        }
        count += 1;
    }

    let mut out = zip.finish()?;
    out.flush().map_err(ZipError::from)?;
    Ok(count)
}
