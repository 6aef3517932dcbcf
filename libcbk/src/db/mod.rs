//! Central DB helper – connection bootstrap, migrations **and** the
//! data-access helpers for tasks and backup records.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use tracing::{debug, info};

use crate::record::{BackupRecord, RecordStatus};
use crate::task::Task;

/* ─── schema version ───────────────────────────────────────────────── */

/// Current library schema version.
pub const SCHEMA_VERSION: i32 = MIGRATIONS.len() as i32;

/* ─── embedded migrations ─────────────────────────────────────────── */

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "0001_initial_schema.sql",
        include_str!("migrations/0001_initial_schema.sql"),
    ),
    (
        "0002_reclaim_lookup_index.sql",
        include_str!("migrations/0002_reclaim_lookup_index.sql"),
    ),
];

/* ─── schema helpers ─────────────────────────────────────────────── */

/// Fetch the highest version recorded in the `schema_version` table.
pub fn current_schema_version(conn: &Connection) -> Result<i32> {
    let version: i32 = conn.query_row(
        "SELECT IFNULL(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;
    Ok(version)
}

/* ─── connection bootstrap ────────────────────────────────────────── */

pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Connection> {
    let db_path_ref = db_path.as_ref();
    let mut conn = Connection::open(db_path_ref)
        .with_context(|| format!("failed to open DB at {}", db_path_ref.display()))?;

    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // Wait up to 30 s for a competing writer before giving up
    conn.busy_timeout(std::time::Duration::from_secs(30))?;

    apply_migrations(&mut conn)?;
    Ok(conn)
}

/* ─── migration runner ────────────────────────────────────────────── */

fn migration_version(fname: &str) -> Result<i64> {
    fname
        .split('_')
        .next()
        .and_then(|s| s.parse().ok())
        .with_context(|| format!("migration file name `{fname}` must start with a number"))
}

pub(crate) fn apply_migrations(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
             version     INTEGER PRIMARY KEY,
             applied_on  TEXT NOT NULL
         );",
    )?;

    // Grab the write-lock up-front so migrations can run uninterrupted
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    for (fname, sql) in MIGRATIONS {
        let version = migration_version(fname)?;

        let already: Option<i64> = tx
            .query_row(
                "SELECT version FROM schema_version WHERE version = ?1",
                [version],
                |r| r.get(0),
            )
            .optional()?;

        if already.is_some() {
            debug!("migration {} already applied", fname);
            continue;
        }

        info!("applying migration {}", fname);
        tx.execute_batch(sql)
            .with_context(|| format!("could not apply migration {}", fname))?;

        tx.execute(
            "INSERT INTO schema_version (version, applied_on) VALUES (?1, ?2)",
            params![version, Local::now().to_rfc3339()],
        )?;
    }

    tx.commit()?;

    let current = current_schema_version(conn)?;
    if current != SCHEMA_VERSION {
        anyhow::bail!(
            "database schema version {} does not match library version {}",
            current,
            SCHEMA_VERSION
        );
    }

    Ok(())
}

/* ─── tasks ───────────────────────────────────────────────────────── */

const TASK_COLUMNS: &str = "task_id, task_name, target_directory, backup_directory, \
                            retention_count, retention_days, no_compression, exclude_rules";

fn task_from_row(r: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: r.get(0)?,
        name: r.get(1)?,
        target: PathBuf::from(r.get::<_, String>(2)?),
        destination: PathBuf::from(r.get::<_, String>(3)?),
        retention_count: r.get(4)?,
        retention_days: r.get(5)?,
        compress: r.get::<_, i64>(6)? == 0,
        exclude: r.get(7)?,
    })
}

/// Insert a task row and return its id. `task.id` is ignored.
pub fn insert_task(conn: &Connection, task: &Task) -> Result<i64> {
    conn.execute(
        "INSERT INTO backup_tasks
             (task_name, target_directory, backup_directory,
              retention_count, retention_days, no_compression, exclude_rules)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            task.name,
            task.target.to_string_lossy(),
            task.destination.to_string_lossy(),
            task.retention_count,
            task.retention_days,
            i64::from(!task.compress),
            task.exclude,
        ],
    )
    .with_context(|| format!("inserting task `{}`", task.name))?;
    Ok(conn.last_insert_rowid())
}

pub fn get_task(conn: &Connection, id: i64) -> Result<Task> {
    conn.query_row(
        &format!("SELECT {TASK_COLUMNS} FROM backup_tasks WHERE task_id = ?1"),
        [id],
        task_from_row,
    )
    .optional()?
    .with_context(|| format!("task id {id} does not exist"))
}

pub fn find_task_by_name(conn: &Connection, name: &str) -> Result<Option<Task>> {
    Ok(conn
        .query_row(
            &format!("SELECT {TASK_COLUMNS} FROM backup_tasks WHERE task_name = ?1"),
            [name],
            task_from_row,
        )
        .optional()?)
}

pub fn list_tasks(conn: &Connection) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TASK_COLUMNS} FROM backup_tasks ORDER BY task_id"
    ))?;
    let rows = stmt
        .query_map([], task_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Overwrite every mutable column of task `task.id`.
pub fn update_task(conn: &Connection, task: &Task) -> Result<()> {
    let changed = conn.execute(
        "UPDATE backup_tasks
            SET task_name = ?2, backup_directory = ?3, retention_count = ?4,
                retention_days = ?5, no_compression = ?6, exclude_rules = ?7
          WHERE task_id = ?1",
        params![
            task.id,
            task.name,
            task.destination.to_string_lossy(),
            task.retention_count,
            task.retention_days,
            i64::from(!task.compress),
            task.exclude,
        ],
    )?;
    if changed == 0 {
        anyhow::bail!("task id {} does not exist", task.id);
    }
    Ok(())
}

/// Delete a task; its records go with it (`ON DELETE CASCADE`).
pub fn delete_task(conn: &Connection, id: i64) -> Result<()> {
    conn.execute("DELETE FROM backup_tasks WHERE task_id = ?1", [id])?;
    Ok(())
}

/// Drop every task and record.
pub fn clear(conn: &Connection) -> Result<usize> {
    let n = conn.execute("DELETE FROM backup_tasks", [])?;
    conn.execute("DELETE FROM backup_records", [])?;
    Ok(n)
}

/* ─── records ─────────────────────────────────────────────────────── */

const RECORD_COLUMNS: &str = "version_id, task_id, timestamp, task_name, backup_status, \
                              backup_file_name, backup_size, backup_path, version_hash, data_status";

fn record_from_row(r: &Row<'_>) -> rusqlite::Result<BackupRecord> {
    let status: String = r.get(4)?;
    Ok(BackupRecord {
        version_id: r.get(0)?,
        task_id: r.get(1)?,
        timestamp: r.get(2)?,
        task_name: r.get(3)?,
        status: RecordStatus::from_db(&status),
        file_name: r.get(5)?,
        size: r.get(6)?,
        path: PathBuf::from(r.get::<_, String>(7)?),
        fingerprint: r.get(8)?,
        live: r.get::<_, i64>(9)? == 1,
    })
}

pub fn insert_record(conn: &Connection, rec: &BackupRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO backup_records
             (version_id, task_id, timestamp, task_name, backup_status,
              backup_file_name, backup_size, backup_path, version_hash, data_status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            rec.version_id,
            rec.task_id,
            rec.timestamp,
            rec.task_name,
            rec.status.as_str(),
            rec.file_name,
            rec.size,
            rec.path.to_string_lossy(),
            rec.fingerprint,
            i64::from(rec.live),
        ],
    )
    .with_context(|| format!("inserting backup record {}", rec.version_id))?;
    Ok(())
}

/// A page of records across all tasks, newest first.
pub fn list_records(conn: &Connection, limit: u32, offset: u32) -> Result<Vec<BackupRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RECORD_COLUMNS} FROM backup_records
          ORDER BY timestamp DESC, version_id DESC
          LIMIT ?1 OFFSET ?2"
    ))?;
    let rows = stmt
        .query_map(params![limit, offset], record_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Every record of one task, newest first.
pub fn task_records(conn: &Connection, task_id: i64) -> Result<Vec<BackupRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RECORD_COLUMNS} FROM backup_records
          WHERE task_id = ?1
          ORDER BY timestamp DESC, version_id DESC"
    ))?;
    let rows = stmt
        .query_map([task_id], record_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Distinct task names the records of `task_id` were written under.
pub fn record_task_names(conn: &Connection, task_id: i64) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT DISTINCT task_name FROM backup_records WHERE task_id = ?1")?;
    let names = stmt
        .query_map([task_id], |r| r.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(names)
}

/// Point the records of `task_id` stored under `old` at `new`.
pub fn move_record_paths(conn: &Connection, task_id: i64, old: &Path, new: &Path) -> Result<usize> {
    Ok(conn.execute(
        "UPDATE backup_records SET backup_path = ?3
          WHERE task_id = ?1 AND backup_path = ?2",
        params![task_id, old.to_string_lossy(), new.to_string_lossy()],
    )?)
}

pub fn get_record(conn: &Connection, version_id: &str) -> Result<Option<BackupRecord>> {
    Ok(conn
        .query_row(
            &format!("SELECT {RECORD_COLUMNS} FROM backup_records WHERE version_id = ?1"),
            [version_id],
            record_from_row,
        )
        .optional()?)
}

pub fn delete_record(conn: &Connection, version_id: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM backup_records WHERE version_id = ?1",
        [version_id],
    )?;
    Ok(())
}

/// Flip live records for `(task_name, timestamp)` to reclaimed.
pub fn mark_reclaimed(
    conn: &Connection,
    task_name: &str,
    timestamp: &str,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE backup_records SET data_status = 0
          WHERE task_name = ?1 AND timestamp = ?2 AND data_status = 1",
        params![task_name, timestamp],
    )
}
