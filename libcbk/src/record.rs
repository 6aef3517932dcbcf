//! Backup records: one audit row per run attempt.

use std::fmt;
use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use rusqlite::Connection;

use crate::db;
use crate::retention::RecordStore;
use crate::task::Task;

/// Placeholder stored in the archive columns of a failed run.
pub const SENTINEL: &str = "-";

const VERSION_SUFFIX_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Succeeded,
    Failed,
}

impl RecordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// Anything other than `succeeded` reads back as failed.
    pub fn from_db(s: &str) -> Self {
        if s == "succeeded" {
            Self::Succeeded
        } else {
            Self::Failed
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    pub version_id: String,
    pub task_id: i64,
    /// `YYYYMMDDhhmmss`, local time.
    pub timestamp: String,
    pub task_name: String,
    pub status: RecordStatus,
    pub file_name: String,
    /// Human-readable size, e.g. `1.50KB`.
    pub size: String,
    /// Directory holding the archive.
    pub path: PathBuf,
    pub fingerprint: String,
    /// False once retention has reclaimed the archive.
    pub live: bool,
}

impl BackupRecord {
    /// Full path of the archive this record points at.
    pub fn archive_path(&self) -> PathBuf {
        self.path.join(&self.file_name)
    }

    /// `timestamp` as `YYYY-MM-DD hh:mm:ss`, or verbatim if unparsable.
    pub fn display_time(&self) -> String {
        chrono::NaiveDateTime::parse_from_str(&self.timestamp, crate::retention::TIMESTAMP_FORMAT)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|_| self.timestamp.clone())
    }
}

/// Time-ordered, locally unique id: millisecond Unix time followed by a
/// short random alphanumeric suffix.
pub fn generate_version_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(VERSION_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{:013}{suffix}", Utc::now().timestamp_millis())
}

/// Persist a successful run.
pub fn record_success(
    conn: &Connection,
    task: &Task,
    version_id: &str,
    timestamp: &str,
    file_name: &str,
    size: &str,
    fingerprint: &str,
) -> Result<BackupRecord> {
    let rec = BackupRecord {
        version_id: version_id.to_string(),
        task_id: task.id,
        timestamp: timestamp.to_string(),
        task_name: task.name.clone(),
        status: RecordStatus::Succeeded,
        file_name: file_name.to_string(),
        size: size.to_string(),
        path: task.destination.clone(),
        fingerprint: fingerprint.to_string(),
        live: true,
    };
    db::insert_record(conn, &rec)?;
    Ok(rec)
}

/// Persist a failed run with sentinel archive fields.
pub fn record_failure(
    conn: &Connection,
    task: &Task,
    version_id: &str,
    timestamp: &str,
) -> Result<BackupRecord> {
    let rec = BackupRecord {
        version_id: version_id.to_string(),
        task_id: task.id,
        timestamp: timestamp.to_string(),
        task_name: task.name.clone(),
        status: RecordStatus::Failed,
        file_name: SENTINEL.to_string(),
        size: SENTINEL.to_string(),
        path: PathBuf::from(SENTINEL),
        fingerprint: SENTINEL.to_string(),
        live: true,
    };
    db::insert_record(conn, &rec)?;
    Ok(rec)
}

impl RecordStore for Connection {
    fn mark_reclaimed(&self, task_name: &str, timestamp: &str) -> rusqlite::Result<usize> {
        db::mark_reclaimed(self, task_name, timestamp)
    }
}
