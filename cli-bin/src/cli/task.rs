//! `cbk add | list | show | edit | delete | export | clear`

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::Args;
use libcbk::task::{NewTask, Task, TaskEdit, DEFAULT_RETENTION_COUNT};
use libcbk::Cbk;

use super::{resolve_task, task_file, ConsoleReporter};

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Read the task from a YAML file (see `cbk init addtask`)
    #[arg(short = 'f', long = "file", conflicts_with_all = ["name", "target"])]
    pub file: Option<PathBuf>,
    /// Unique task name
    #[arg(long, required_unless_present = "file")]
    pub name: Option<String>,
    /// File or directory to back up
    #[arg(long, required_unless_present = "file")]
    pub target: Option<PathBuf>,
    /// Parent directory for the archives (defaults to the data dir)
    #[arg(long)]
    pub dest_root: Option<PathBuf>,
    /// Archive directory name (defaults to the target's name)
    #[arg(long)]
    pub dest_name: Option<String>,
    /// Number of archives to keep
    #[arg(long, default_value_t = DEFAULT_RETENTION_COUNT)]
    pub count: u32,
    /// Keep one archive per day for this many days (0 = count only)
    #[arg(long, default_value_t = 0)]
    pub days: u32,
    /// Store files without deflate
    #[arg(long)]
    pub no_compression: bool,
    /// Exclusion expression, e.g. "build/|*.tmp|.log"
    #[arg(long, default_value = "none")]
    pub exclude: String,
}

#[derive(Args, Debug)]
pub struct EditArgs {
    /// Task id or name
    pub task: String,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub count: Option<u32>,
    #[arg(long)]
    pub days: Option<u32>,
    /// Turn deflate on
    #[arg(long, conflicts_with = "no_compression")]
    pub compression: bool,
    /// Turn deflate off
    #[arg(long)]
    pub no_compression: bool,
    #[arg(long)]
    pub exclude: Option<String>,
    /// Rename the archive directory in place
    #[arg(long)]
    pub dest_name: Option<String>,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Task id or name
    pub task: String,
    /// Also remove the archive directory
    #[arg(long, conflicts_with = "versions")]
    pub purge: bool,
    /// Delete only these backup versions
    #[arg(long, num_args = 1..)]
    pub versions: Vec<String>,
}

pub fn add(cbk: &Cbk, a: &AddArgs) -> Result<()> {
    let spec = match (&a.file, &a.name, &a.target) {
        (Some(file), _, _) => task_file::load(file)?,
        (None, Some(name), Some(target)) => from_flags(a, name, target),
        _ => bail!("pass --file, or both --name and --target"),
    };
    let t = cbk.add_task(&spec)?;
    println!("Added task {} ({}) → {}", t.id, t.name, t.destination.display());
    Ok(())
}

fn from_flags(a: &AddArgs, name: &str, target: &Path) -> NewTask {
    NewTask {
        name: name.to_string(),
        target: target.to_path_buf(),
        destination_root: a.dest_root.clone(),
        destination_name: a.dest_name.clone(),
        retention_count: a.count,
        retention_days: a.days,
        compress: !a.no_compression,
        exclude: a.exclude.clone(),
    }
}

pub fn list(cbk: &Cbk) -> Result<()> {
    let tasks = cbk.tasks()?;
    if tasks.is_empty() {
        println!("No tasks registered.");
        return Ok(());
    }
    for t in &tasks {
        print_task(t);
    }
    Ok(())
}

fn print_task(t: &Task) {
    println!(
        "{:>4}  {:<16} {} → {}  keep {} / {}d  {}  exclude: {}",
        t.id,
        t.name,
        t.target.display(),
        t.destination.display(),
        t.retention_count,
        t.retention_days,
        if t.compress { "deflate" } else { "stored" },
        t.exclude,
    );
}

pub fn show(cbk: &Cbk, key: &str) -> Result<()> {
    let t = resolve_task(cbk, key)?;
    print_task(&t);
    let records = cbk.task_records(t.id)?;
    if records.is_empty() {
        println!("  (no backups yet)");
    }
    for r in records {
        println!(
            "  {}  {}  {:<9}  {:>9}  {}  {}{}",
            r.version_id,
            r.display_time(),
            r.status,
            r.size,
            r.fingerprint,
            r.file_name,
            if r.live { "" } else { "  (reclaimed)" },
        );
    }
    Ok(())
}

pub fn edit(cbk: &Cbk, a: &EditArgs) -> Result<()> {
    let t = resolve_task(cbk, &a.task)?;
    let compress = match (a.compression, a.no_compression) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    };
    let changes = TaskEdit {
        name: a.name.clone(),
        retention_count: a.count,
        retention_days: a.days,
        compress,
        exclude: a.exclude.clone(),
        destination_name: a.dest_name.clone(),
    };
    if changes.is_empty() {
        bail!("nothing to change – pass at least one option");
    }
    let t = cbk.edit_task(t.id, &changes)?;
    println!("Updated task {} ({})", t.id, t.name);
    Ok(())
}

pub fn delete(cbk: &Cbk, a: &DeleteArgs) -> Result<()> {
    let t = resolve_task(cbk, &a.task)?;
    if a.versions.is_empty() {
        cbk.delete_task(t.id, a.purge, &ConsoleReporter)?;
        return Ok(());
    }

    let mut failed = 0usize;
    for v in &a.versions {
        match cbk.delete_version(t.id, v, &ConsoleReporter) {
            Ok(_) => println!("Deleted version {v}"),
            Err(e) => {
                tracing::error!("version {v}: {e:#}");
                failed += 1;
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {} version(s) could not be deleted", a.versions.len());
    }
    Ok(())
}

pub fn export(cbk: &Cbk, key: Option<&str>) -> Result<()> {
    let id = key.map(|k| resolve_task(cbk, k)).transpose()?.map(|t| t.id);
    for line in cbk.export(id)? {
        println!("{line}");
    }
    Ok(())
}

pub fn clear(cbk: &Cbk, yes: bool) -> Result<()> {
    if !yes {
        eprint!("This removes every task, record and archive directory. Type `yes` to continue: ");
        io::stderr().flush()?;
        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        if answer.trim() != "yes" {
            bail!("aborted");
        }
    }
    let n = cbk.clear(&ConsoleReporter)?;
    println!("Cleared {n} task(s).");
    Ok(())
}
