//! Backup tasks: registration, editing, deletion and export.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::db;
use crate::exclude::{self, ExclusionSet};
use crate::record::{BackupRecord, SENTINEL};
use crate::report::Reporter;
use crate::retention::RetentionPolicy;
use crate::utils::{self, contains_special_chars, ensure_directory};

pub const DEFAULT_RETENTION_COUNT: u32 = 3;

/// A registered backup task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: i64,
    pub name: String,
    /// Absolute path archived on every run.
    pub target: PathBuf,
    /// Absolute directory the archives are written to.
    pub destination: PathBuf,
    pub retention_count: u32,
    pub retention_days: u32,
    pub compress: bool,
    /// Exclusion expression as entered, `none` for no exclusion.
    pub exclude: String,
}

impl Task {
    pub fn policy(&self) -> crate::error::Result<RetentionPolicy> {
        RetentionPolicy::new(self.retention_count, self.retention_days)
    }

    pub fn exclusions(&self) -> crate::error::Result<ExclusionSet> {
        ExclusionSet::parse(&self.exclude)
    }

    /// The `cbk add …` invocation that recreates this task.
    pub fn export_command(&self) -> String {
        let dir_name = self
            .destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let root = self
            .destination
            .parent()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let mut cmd = format!(
            "cbk add --name {} --target '{}' --dest-root '{}' --dest-name {} --count {} --days {}",
            self.name,
            self.target.display(),
            root,
            dir_name,
            self.retention_count,
            self.retention_days,
        );
        if !self.compress {
            cmd.push_str(" --no-compression");
        }
        cmd.push_str(&format!(" --exclude '{}'", self.exclude));
        cmd
    }
}

/// Input for [`add`].
#[derive(Debug, Clone)]
pub struct NewTask {
    pub name: String,
    pub target: PathBuf,
    /// Parent of the destination; the configured data dir when `None`.
    pub destination_root: Option<PathBuf>,
    /// Destination directory name; the target's base name when `None`.
    pub destination_name: Option<String>,
    pub retention_count: u32,
    pub retention_days: u32,
    pub compress: bool,
    pub exclude: String,
}

impl NewTask {
    pub fn new(name: impl Into<String>, target: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            destination_root: None,
            destination_name: None,
            retention_count: DEFAULT_RETENTION_COUNT,
            retention_days: 0,
            compress: true,
            exclude: exclude::NONE.to_string(),
        }
    }
}

/// Changes for [`edit`]; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct TaskEdit {
    pub name: Option<String>,
    pub retention_count: Option<u32>,
    pub retention_days: Option<u32>,
    pub compress: Option<bool>,
    pub exclude: Option<String>,
    /// Rename the destination directory within its parent.
    pub destination_name: Option<String>,
}

impl TaskEdit {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.retention_count.is_none()
            && self.retention_days.is_none()
            && self.compress.is_none()
            && self.exclude.is_none()
            && self.destination_name.is_none()
    }
}

fn validate_name(conn: &Connection, name: &str, own_id: Option<i64>) -> Result<()> {
    if name.is_empty() {
        bail!("task name must not be empty");
    }
    if contains_special_chars(name) {
        bail!("task name `{name}` contains forbidden characters");
    }
    if let Some(existing) = db::find_task_by_name(conn, name)? {
        if Some(existing.id) != own_id {
            bail!("task name `{name}` is already used by task {}", existing.id);
        }
    }
    Ok(())
}

fn validate_dir_name(name: &str) -> Result<()> {
    if name.is_empty() || contains_special_chars(name) {
        bail!("invalid destination directory name `{name}`");
    }
    Ok(())
}

/// Register a new task and create its destination directory.
pub fn add(conn: &Connection, data_dir: &Path, spec: &NewTask) -> Result<Task> {
    validate_name(conn, &spec.name, None)?;
    RetentionPolicy::new(spec.retention_count, spec.retention_days)?;
    ExclusionSet::parse(&spec.exclude)?;

    let target = utils::absolutize(&spec.target)?;
    utils::inspect(&target).with_context(|| format!("target {}", target.display()))?;

    let dir_name = match &spec.destination_name {
        Some(n) => {
            validate_dir_name(n)?;
            n.clone()
        }
        None => target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("cannot derive a directory name from {}", target.display()))?,
    };
    let root = match &spec.destination_root {
        Some(r) => utils::absolutize(r)?,
        None => utils::absolutize(data_dir)?,
    };
    let destination = root.join(dir_name);

    if destination == target || destination.starts_with(&target) {
        bail!(
            "destination {} must not be the target or lie inside it",
            destination.display()
        );
    }
    ensure_directory(&destination)?;

    let mut task = Task {
        id: 0,
        name: spec.name.clone(),
        target,
        destination,
        retention_count: spec.retention_count,
        retention_days: spec.retention_days,
        compress: spec.compress,
        exclude: spec.exclude.clone(),
    };
    task.id = db::insert_task(conn, &task)?;
    info!("registered task {} ({})", task.id, task.name);
    Ok(task)
}

/// Apply `changes` to task `id`.
///
/// A destination rename happens on disk first. The task row and the paths
/// of its records are then updated in one transaction; if that fails the
/// directory is moved back.
pub fn edit(conn: &Connection, id: i64, changes: &TaskEdit) -> Result<Task> {
    let mut task = db::get_task(conn, id)?;
    if changes.is_empty() {
        return Ok(task);
    }

    if let Some(name) = &changes.name {
        validate_name(conn, name, Some(id))?;
        task.name = name.clone();
    }
    if let Some(count) = changes.retention_count {
        task.retention_count = count;
    }
    if let Some(days) = changes.retention_days {
        task.retention_days = days;
    }
    task.policy()?;
    if let Some(compress) = changes.compress {
        task.compress = compress;
    }
    if let Some(expr) = &changes.exclude {
        ExclusionSet::parse(expr)?;
        task.exclude = expr.clone();
    }

    let mut renamed: Option<(PathBuf, PathBuf)> = None;
    if let Some(new_name) = &changes.destination_name {
        validate_dir_name(new_name)?;
        let old = task.destination.clone();
        let new = old
            .parent()
            .map(|p| p.join(new_name))
            .ok_or_else(|| anyhow!("destination {} has no parent", old.display()))?;
        if new != old {
            if new.exists() {
                bail!("{} already exists", new.display());
            }
            if old.exists() {
                fs::rename(&old, &new).with_context(|| {
                    format!("renaming {} to {}", old.display(), new.display())
                })?;
            }
            renamed = Some((old, new.clone()));
            task.destination = new;
        }
    }

    let commit = || -> Result<()> {
        let tx = conn.unchecked_transaction()?;
        db::update_task(&tx, &task)?;
        if let Some((old, new)) = &renamed {
            let moved = db::move_record_paths(&tx, id, old, new)?;
            info!("task {id}: {moved} record(s) now point at {}", new.display());
        }
        tx.commit()?;
        Ok(())
    };

    if let Err(e) = commit() {
        if let Some((old, new)) = renamed {
            if new.exists() {
                if let Err(undo) = fs::rename(&new, &old) {
                    warn!(
                        "could not move {} back to {}: {undo}",
                        new.display(),
                        old.display()
                    );
                }
            }
        }
        return Err(e.context(format!("updating task {id}")));
    }
    Ok(task)
}

/// Delete task `id` and, when `purge` is set, its destination directory.
pub fn delete(conn: &Connection, id: i64, purge: bool, reporter: &dyn Reporter) -> Result<Task> {
    let task = db::get_task(conn, id)?;
    if purge && task.destination.exists() {
        fs::remove_dir_all(&task.destination)
            .with_context(|| format!("removing {}", task.destination.display()))?;
        reporter.ok(&format!("removed {}", task.destination.display()));
    }
    db::delete_task(conn, id)?;
    reporter.ok(&format!("deleted task {} ({})", task.id, task.name));
    Ok(task)
}

/// Delete one backup version: its archive (if still on disk) and its row.
pub fn delete_version(
    conn: &Connection,
    task_id: i64,
    version_id: &str,
    reporter: &dyn Reporter,
) -> Result<BackupRecord> {
    let rec = db::get_record(conn, version_id)?
        .filter(|r| r.task_id == task_id)
        .with_context(|| format!("task {task_id} has no version `{version_id}`"))?;

    if rec.file_name != SENTINEL {
        let archive = rec.archive_path();
        match fs::remove_file(&archive) {
            Ok(()) => reporter.ok(&format!("removed {}", archive.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                reporter.warn(&format!("{} was already gone", archive.display()))
            }
            Err(e) => {
                return Err(e).with_context(|| format!("removing {}", archive.display()));
            }
        }
    }
    db::delete_record(conn, version_id)?;
    Ok(rec)
}

/// Remove every task's destination directory and empty the registry.
/// Directories that cannot be removed are reported and left behind.
pub fn clear(conn: &Connection, reporter: &dyn Reporter) -> Result<usize> {
    for task in db::list_tasks(conn)? {
        if !task.destination.exists() {
            continue;
        }
        match fs::remove_dir_all(&task.destination) {
            Ok(()) => reporter.ok(&format!("removed {}", task.destination.display())),
            Err(e) => reporter.warn(&format!(
                "could not remove {} ({e}); delete it manually",
                task.destination.display()
            )),
        }
    }
    db::clear(conn)
}
