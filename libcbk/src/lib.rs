//! libcbk – public API surface for the cbk backup engine.
//!
//! Down-stream crates (`cli-bin`, tests) should go through the [`Cbk`]
//! façade or the engine modules re-exported here.

pub mod archive;
pub mod config;
pub mod db;
pub mod error;
pub mod exclude;
pub mod fingerprint;
pub mod logging;
pub mod record;
pub mod report;
pub mod restore;
pub mod retention;
pub mod runner;
pub mod task;
pub mod utils;

#[cfg(test)]
mod test_utils;
#[cfg(test)]
mod logging_tests;

use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};

use record::{BackupRecord, RecordStatus};
use report::Reporter;
use runner::RunOutcome;
use task::{NewTask, Task, TaskEdit};

/// Primary façade – open a registry then call helper methods.
pub struct Cbk {
    cfg: config::Config,
    conn: Connection,
}

impl Cbk {
    /// Load configuration from env and open (or create) the registry.
    pub fn open_default() -> Result<Self> {
        let cfg = config::Config::load()?;
        let conn = db::open(&cfg.db_path)?;
        Ok(Self { cfg, conn })
    }

    /// Open an explicit registry and data dir – handy for tests or embedding.
    pub fn open_at<P: AsRef<Path>, D: AsRef<Path>>(db_path: P, data_dir: D) -> Result<Self> {
        let cfg = config::Config::at(db_path, data_dir);
        let conn = db::open(&cfg.db_path)?;
        Ok(Self { cfg, conn })
    }

    pub fn config(&self) -> &config::Config {
        &self.cfg
    }

    /* ── tasks ─────────────────────────────────────────────────── */

    pub fn add_task(&self, spec: &NewTask) -> Result<Task> {
        task::add(&self.conn, &self.cfg.data_dir, spec)
    }

    pub fn tasks(&self) -> Result<Vec<Task>> {
        db::list_tasks(&self.conn)
    }

    pub fn task(&self, id: i64) -> Result<Task> {
        db::get_task(&self.conn, id)
    }

    pub fn task_by_name(&self, name: &str) -> Result<Task> {
        db::find_task_by_name(&self.conn, name)?
            .with_context(|| format!("no task named `{name}`"))
    }

    pub fn edit_task(&self, id: i64, changes: &TaskEdit) -> Result<Task> {
        task::edit(&self.conn, id, changes)
    }

    pub fn delete_task(&self, id: i64, purge: bool, reporter: &dyn Reporter) -> Result<Task> {
        task::delete(&self.conn, id, purge, reporter)
    }

    pub fn delete_version(
        &self,
        task_id: i64,
        version_id: &str,
        reporter: &dyn Reporter,
    ) -> Result<BackupRecord> {
        task::delete_version(&self.conn, task_id, version_id, reporter)
    }

    /// `cbk add …` lines recreating the selected task, or all of them.
    pub fn export(&self, id: Option<i64>) -> Result<Vec<String>> {
        let tasks = match id {
            Some(id) => vec![self.task(id)?],
            None => self.tasks()?,
        };
        Ok(tasks.iter().map(Task::export_command).collect())
    }

    /// Remove every destination directory and empty the registry.
    pub fn clear(&self, reporter: &dyn Reporter) -> Result<usize> {
        task::clear(&self.conn, reporter)
    }

    /* ── runs ──────────────────────────────────────────────────── */

    pub fn run(&self, task_id: i64, reporter: &dyn Reporter) -> Result<RunOutcome> {
        let task = self.task(task_id)?;
        runner::run_task(&self.conn, &task, reporter)
    }

    /// Run several tasks one after another. A failing task is reported and
    /// does not stop the others.
    pub fn run_batch(
        &self,
        task_ids: &[i64],
        reporter: &dyn Reporter,
    ) -> Vec<(i64, Result<RunOutcome>)> {
        task_ids
            .iter()
            .map(|&id| {
                let res = self.run(id, reporter);
                if let Err(e) = &res {
                    reporter.error(&format!("task {id}: {e:#}"));
                }
                (id, res)
            })
            .collect()
    }

    /* ── records ───────────────────────────────────────────────── */

    /// One page of the run log, newest first. Pages start at 1.
    pub fn records(&self, page: u32, page_size: u32) -> Result<Vec<BackupRecord>> {
        if page == 0 {
            return Err(error::Error::Policy("page numbers start at 1".into()).into());
        }
        if page_size == 0 {
            return Err(error::Error::Policy("page size must be at least 1".into()).into());
        }
        db::list_records(&self.conn, page_size, (page - 1).saturating_mul(page_size))
    }

    pub fn task_records(&self, task_id: i64) -> Result<Vec<BackupRecord>> {
        db::task_records(&self.conn, task_id)
    }

    /// Verify and unpack one backup version into `output`.
    pub fn unpack<P: AsRef<Path>>(&self, version_id: &str, output: P) -> Result<Vec<PathBuf>> {
        let rec = db::get_record(&self.conn, version_id)?
            .with_context(|| format!("no backup version `{version_id}`"))?;
        if rec.status != RecordStatus::Succeeded {
            bail!("version `{version_id}` belongs to a failed run and has no archive");
        }
        if !rec.live {
            bail!("version `{version_id}` has been reclaimed by retention");
        }
        let paths = restore::restore(&rec.archive_path(), &rec.fingerprint, output.as_ref())?;
        Ok(paths)
    }

    /// Borrow the underlying SQLite connection (read-only).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}
