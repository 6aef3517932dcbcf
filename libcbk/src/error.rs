//! Error types for the archive & retention engine.
//!
//! Engine components return [`Result`]; the registry, the façade and the
//! CLI wrap these in `anyhow::Error`, from which they can be recovered with
//! `downcast_ref::<Error>()`.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Path does not exist. Callers decide whether this is fatal.
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Permission or other I/O failure while touching a path.
    #[error("cannot access {}", path.display())]
    Access {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Archive serialization failed part-way.
    #[error("failed to build archive {}", path.display())]
    Build {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    /// An existing archive could not be read back.
    #[error("failed to extract archive {}", path.display())]
    Extract {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("failed to fingerprint {}", path.display())]
    Fingerprint {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Retention pass could not run to completion.
    #[error("reclaim failed: {0}")]
    Reclaim(String),

    #[error(
        "archive {} may be corrupted or tampered with: expected fingerprint {expected}, got {actual}",
        path.display()
    )]
    IntegrityMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Malformed exclusion expression or retention parameters.
    #[error("invalid policy: {0}")]
    Policy(String),

    #[error("refusing to overwrite existing {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("registry error")]
    Registry(#[from] rusqlite::Error),
}

impl Error {
    /// Map an `io::Error` on `path` to `NotFound` or `Access`.
    pub fn from_io(path: impl Into<PathBuf>, err: io::Error) -> Self {
        let path = path.into();
        if err.kind() == io::ErrorKind::NotFound {
            Self::NotFound(path)
        } else {
            Self::Access { path, source: err }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alternate_chain_names_the_cause_once() {
        let err = anyhow::Error::from(Error::Fingerprint {
            path: PathBuf::from("/tmp/x.zip"),
            source: io::Error::new(io::ErrorKind::NotFound, "gone missing"),
        });
        let chain = format!("{err:#}");
        assert_eq!(chain.matches("gone missing").count(), 1, "{chain}");
        assert!(chain.starts_with("failed to fingerprint /tmp/x.zip"));
    }

    #[test]
    fn from_io_splits_not_found_from_access() {
        let nf = Error::from_io("/a", io::Error::from(io::ErrorKind::NotFound));
        assert!(nf.is_not_found());
        let denied = Error::from_io("/a", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(denied, Error::Access { .. }));
    }
}
