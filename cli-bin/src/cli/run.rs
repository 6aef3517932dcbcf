// src/cli/run.rs
use std::path::Path;

use anyhow::{bail, Result};
use clap::Args;
use libcbk::Cbk;

use super::{resolve_task, ConsoleReporter};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Task ids or names
    #[arg(required_unless_present = "all")]
    pub tasks: Vec<String>,
    /// Run every registered task
    #[arg(long, conflicts_with = "tasks")]
    pub all: bool,
}

#[derive(Args, Debug)]
pub struct LogArgs {
    /// Page number, starting at 1
    #[arg(long, default_value_t = 1)]
    pub page: u32,
    /// Records per page
    #[arg(long, default_value_t = 20)]
    pub page_size: u32,
}

pub fn run(cbk: &Cbk, a: &RunArgs) -> Result<()> {
    // an unknown key is counted as a failure; the rest still run
    let mut unresolved = 0usize;
    let ids: Vec<i64> = if a.all {
        cbk.tasks()?.into_iter().map(|t| t.id).collect()
    } else {
        a.tasks
            .iter()
            .filter_map(|k| match resolve_task(cbk, k) {
                Ok(t) => Some(t.id),
                Err(e) => {
                    tracing::error!("task {k}: {e:#}");
                    unresolved += 1;
                    None
                }
            })
            .collect()
    };
    if ids.is_empty() && unresolved == 0 {
        println!("No tasks to run.");
        return Ok(());
    }

    let results = cbk.run_batch(&ids, &ConsoleReporter);
    let failed = unresolved + results.iter().filter(|(_, r)| r.is_err()).count();
    for (_, res) in &results {
        if let Ok(out) = res {
            for f in &out.reclaim.failed {
                println!("  not reclaimed: {} ({})", f.path.display(), f.reason);
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {} task(s) failed", results.len() + unresolved);
    }
    Ok(())
}

pub fn log(cbk: &Cbk, a: &LogArgs) -> Result<()> {
    let records = cbk.records(a.page, a.page_size)?;
    if records.is_empty() {
        println!("No records on page {}.", a.page);
        return Ok(());
    }
    for r in records {
        println!(
            "{}  {}  {:<16} {:<9}  {:>9}  {}{}",
            r.version_id,
            r.display_time(),
            r.task_name,
            r.status,
            r.size,
            r.file_name,
            if r.live { "" } else { "  (reclaimed)" },
        );
    }
    Ok(())
}

pub fn unpack(cbk: &Cbk, version_id: &str, output: &Path) -> Result<()> {
    for p in cbk.unpack(version_id, output)? {
        println!("Restored {}", p.display());
    }
    Ok(())
}
