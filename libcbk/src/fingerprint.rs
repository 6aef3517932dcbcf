//! Archive fingerprints and human-readable sizes.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Number of hex characters kept from the digest.
pub const FINGERPRINT_LEN: usize = 8;

const CHUNK_SIZE: usize = 32 * 1024;

/// Stream `path` through SHA-256 and return the last
/// [`FINGERPRINT_LEN`] lowercase hex characters of the digest.
pub fn fingerprint<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    let fail = |source| Error::Fingerprint {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = BufReader::with_capacity(CHUNK_SIZE, File::open(path).map_err(fail)?);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(fail(e)),
        };
        hasher.update(&buf[..n]);
    }

    let hex = format!("{:x}", hasher.finalize());
    Ok(hex[hex.len() - FINGERPRINT_LEN..].to_string())
}

/// Recompute the fingerprint of `path` and compare it with `expected`.
///
/// A mismatch is [`Error::IntegrityMismatch`]; callers must not restore
/// from an archive that fails this check.
pub fn verify<P: AsRef<Path>>(path: P, expected: &str) -> Result<()> {
    let path = path.as_ref();
    let actual = fingerprint(path)?;
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(Error::IntegrityMismatch {
            path: path.to_path_buf(),
            expected: expected.to_string(),
            actual,
        })
    }
}

/// Size of the file at `path`, formatted with [`format_size`].
pub fn human_size<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    let meta = std::fs::metadata(path).map_err(|e| Error::from_io(path, e))?;
    Ok(format_size(meta.len()))
}

/// `1536` → `"1.50KB"`. Binary units, two decimals, no space.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.2}{}", UNITS[unit])
}
