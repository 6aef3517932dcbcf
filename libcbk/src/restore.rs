//! Re-hydrate archives written by [`crate::archive`].

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::{Error, Result};
use crate::fingerprint;
use crate::utils::{self, ensure_directory};

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// Verify `archive` against `expected_fingerprint`, then unpack it into
/// `output`. Nothing is written unless the fingerprint matches.
pub fn restore(archive: &Path, expected_fingerprint: &str, output: &Path) -> Result<Vec<PathBuf>> {
    require_output_dir(output)?;
    fingerprint::verify(archive, expected_fingerprint)?;
    unpack(archive, output)
}

/// Unpack `archive` into the existing directory `output` without any
/// fingerprint check. Refuses if a top-level entry already exists there.
///
/// Returns the top-level paths created under `output`.
pub fn unpack(archive: &Path, output: &Path) -> Result<Vec<PathBuf>> {
    require_output_dir(output)?;
    let mut zip = open(archive)?;

    let tops = top_level_names(&mut zip);
    for name in &tops {
        let dest = output.join(name);
        if fs::symlink_metadata(&dest).is_ok() {
            return Err(Error::AlreadyExists(dest));
        }
    }

    extract_all(&mut zip, archive, output)?;
    info!("unpacked {} into {}", archive.display(), output.display());
    Ok(tops.into_iter().map(|n| output.join(n)).collect())
}

fn require_output_dir(output: &Path) -> Result<()> {
    let info = utils::inspect(output)?;
    if info.is_dir() {
        Ok(())
    } else {
        Err(Error::Access {
            path: output.to_path_buf(),
            source: io::Error::new(io::ErrorKind::Other, "output path is not a directory"),
        })
    }
}

fn open(archive: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(archive).map_err(|e| Error::from_io(archive, e))?;
    ZipArchive::new(file).map_err(|source| Error::Extract {
        path: archive.to_path_buf(),
        source,
    })
}

/// First path segment of every entry.
fn top_level_names(zip: &mut ZipArchive<File>) -> BTreeSet<String> {
    zip.file_names()
        .filter_map(|n| n.split('/').find(|s| !s.is_empty()))
        .map(str::to_string)
        .collect()
}

fn extract_all(zip: &mut ZipArchive<File>, archive: &Path, output: &Path) -> Result<()> {
    let fail = |source| Error::Extract {
        path: archive.to_path_buf(),
        source,
    };
    let refuse = |name: &str, why: &str| {
        fail(ZipError::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("entry `{name}` {why}"),
        )))
    };

    // directory modes are applied last so read-only dirs can still be filled
    let mut dirs: Vec<(PathBuf, u32)> = Vec::new();

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(fail)?;
        let rel = entry
            .enclosed_name()
            .ok_or_else(|| refuse(entry.name(), "escapes the output directory"))?;
        if passes_through_symlink(output, &rel) {
            return Err(refuse(entry.name(), "passes through a symlink"));
        }
        let dest = output.join(&rel);
        let mode = entry.unix_mode();

        if entry.is_dir() {
            ensure_directory(&dest)?;
            if let Some(m) = mode {
                dirs.push((dest, m));
            }
            continue;
        }
        if let Some(parent) = dest.parent() {
            ensure_directory(parent)?;
        }

        if mode.is_some_and(|m| m & S_IFMT == S_IFLNK) {
            let mut target = String::new();
            entry
                .read_to_string(&mut target)
                .map_err(|e| fail(ZipError::Io(e)))?;
            debug!("symlink {} -> {}", dest.display(), target);
            make_symlink(&target, &dest)?;
            continue;
        }

        let mut out = File::create(&dest).map_err(|e| Error::from_io(&dest, e))?;
        io::copy(&mut entry, &mut out).map_err(|e| fail(ZipError::Io(e)))?;
        if let Some(m) = mode {
            set_mode(&dest, m)?;
        }
    }

    for (dir, m) in dirs.iter().rev() {
        set_mode(dir, *m)?;
    }
    Ok(())
}

/// True if `rel` itself or any of its ancestors below `output` is a symlink
/// already present on disk.
fn passes_through_symlink(output: &Path, rel: &Path) -> bool {
    rel.ancestors()
        .filter(|a| !a.as_os_str().is_empty())
        .any(|a| {
            fs::symlink_metadata(output.join(a)).is_ok_and(|m| m.file_type().is_symlink())
        })
}

#[cfg(unix)]
fn make_symlink(target: &str, dest: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, dest).map_err(|e| Error::from_io(dest, e))
}

#[cfg(not(unix))]
fn make_symlink(target: &str, dest: &Path) -> Result<()> {
    fs::write(dest, target).map_err(|e| Error::from_io(dest, e))
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
        .map_err(|e| Error::from_io(path, e))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
