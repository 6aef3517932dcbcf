//! One backup run: inspect → build → fingerprint → record → reclaim.
//!
//! Each step commits on its own; there is no transaction spanning the
//! pipeline, so a crash between steps can leave an archive without a
//! record or a reclaimed record whose file still exists.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Local};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::archive::{self, ArchiveSummary, ARCHIVE_EXT};
use crate::db;
use crate::fingerprint;
use crate::record::{self, BackupRecord};
use crate::report::Reporter;
use crate::retention::{self, ReclaimReport, TIMESTAMP_FORMAT};
use crate::task::Task;
use crate::utils::{self, ensure_directory};

/// Result of a successful [`run_task`].
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub record: BackupRecord,
    pub archive: ArchiveSummary,
    pub reclaim: ReclaimReport,
}

pub fn run_task(conn: &Connection, task: &Task, reporter: &dyn Reporter) -> Result<RunOutcome> {
    utils::inspect(&task.target)
        .with_context(|| format!("target of task `{}`", task.name))?;
    ensure_directory(&task.destination)?;
    let exclude = task.exclusions()?;
    let policy = task.policy()?;

    let now = free_slot(&task.destination, &task.name, Local::now());
    let timestamp = now.format(TIMESTAMP_FORMAT).to_string();
    let version_id = record::generate_version_id();

    let source_root = task.target.parent().unwrap_or(&task.target);
    let entry_name = task
        .target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("target {} has no file name", task.target.display()))?;
    let stem = task
        .destination
        .join(retention::archive_stem(&task.name, &now));

    reporter.info(&format!("backup task [{}] started", task.name));

    let summary = match archive::build(source_root, &entry_name, &stem, task.compress, &exclude) {
        Ok(s) => s,
        Err(e) => return Err(fail(conn, task, &version_id, &timestamp, e.into())),
    };
    let hash = match fingerprint::fingerprint(&summary.path) {
        Ok(h) => h,
        Err(e) => return Err(fail(conn, task, &version_id, &timestamp, e.into())),
    };
    let size = match fingerprint::human_size(&summary.path) {
        Ok(s) => s,
        Err(e) => return Err(fail(conn, task, &version_id, &timestamp, e.into())),
    };

    let file_name = summary
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let rec = record::record_success(conn, task, &version_id, &timestamp, &file_name, &size, &hash)?;
    info!(
        "task {} → {} ({}, {})",
        task.name,
        summary.path.display(),
        size,
        hash
    );

    // archives written before a rename still carry the old name
    let mut names = db::record_task_names(conn, task.id)?;
    if !names.contains(&task.name) {
        names.push(task.name.clone());
    }
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    let archives = retention::list_archives(&task.destination, &names)?;
    debug!("{} archive(s) on disk for {}", archives.len(), task.name);
    let reclaim = retention::reclaim(&archives, &policy, Local::now(), conn, reporter)?;

    reporter.ok(&format!("backup task [{}] succeeded: {}", task.name, file_name));
    Ok(RunOutcome {
        record: rec,
        archive: summary,
        reclaim,
    })
}

/// First second at or after `at` whose archive name is still free.
fn free_slot(dir: &Path, task_name: &str, mut at: DateTime<Local>) -> DateTime<Local> {
    let taken = |at: &DateTime<Local>| {
        let name = format!("{}.{ARCHIVE_EXT}", retention::archive_stem(task_name, at));
        fs::symlink_metadata(dir.join(name)).is_ok()
    };
    while taken(&at) {
        debug!(
            "{task_name}: archive for {} exists, trying the next second",
            at.format(TIMESTAMP_FORMAT)
        );
        at += Duration::seconds(1);
    }
    at
}

/// Write the failed-run record and hand back the original error. If even
/// the record cannot be written, that failure is attached as context.
fn fail(
    conn: &Connection,
    task: &Task,
    version_id: &str,
    timestamp: &str,
    err: anyhow::Error,
) -> anyhow::Error {
    match record::record_failure(conn, task, version_id, timestamp) {
        Ok(_) => err.context(format!("backup task `{}` failed", task.name)),
        Err(db_err) => err.context(format!(
            "backup task `{}` failed and its failure record could not be written: {db_err:#}",
            task.name
        )),
    }
}
