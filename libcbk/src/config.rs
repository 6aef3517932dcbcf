use anyhow::{Context, Result};
use directories::UserDirs;
use std::path::{Path, PathBuf};

/// Directory under the home directory holding the registry and archives.
pub const HOME_DIR_NAME: &str = ".cbk";
pub const DB_FILE_NAME: &str = "cbk.db";
pub const DATA_DIR_NAME: &str = "data";

/// Runtime configuration: where the registry lives and where archives go
/// when a task does not name its own destination root.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
}

impl Config {
    /// Resolve configuration from the environment.
    ///
    /// Priority:
    /// 1. `CBK_DB_PATH` / `CBK_DATA_DIR` env-vars (explicit overrides)
    /// 2. `CBK_HOME`, else the user's home directory, joined with `.cbk`
    ///    (`~/.cbk/cbk.db`, `~/.cbk/data`)
    /// 3. Fallback to `./.cbk` when no home directory can be located
    pub fn load() -> Result<Self> {
        let base = match std::env::var_os("CBK_HOME") {
            Some(home) => PathBuf::from(home),
            None => UserDirs::new()
                .map(|d| d.home_dir().join(HOME_DIR_NAME))
                .unwrap_or_else(|| Path::new(".").join(HOME_DIR_NAME)),
        };

        let db_path = std::env::var_os("CBK_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| base.join(DB_FILE_NAME));
        let data_dir = std::env::var_os("CBK_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| base.join(DATA_DIR_NAME));

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating registry directory {}", parent.display()))?;
        }

        Ok(Self { db_path, data_dir })
    }

    /// Explicit paths, bypassing the environment.
    pub fn at<P: AsRef<Path>, D: AsRef<Path>>(db_path: P, data_dir: D) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }
}
