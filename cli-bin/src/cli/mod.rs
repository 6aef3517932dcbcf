// src/cli/mod.rs
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use libcbk::report::Reporter;
use libcbk::task::Task;
use libcbk::Cbk;
use tracing::{error, warn};

pub mod archive;
pub mod run;
pub mod task;
pub mod task_file;

/// cbk – task-based directory backups with retention
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Register a new backup task
    ///
    /// Example:
    ///     cbk add --name docs --target ~/Documents --count 5 --exclude "build/|*.tmp"
    Add(task::AddArgs),

    /// List every registered task
    List,

    /// Show one task and its backup versions
    Show {
        /// Task id or name
        task: String,
    },

    /// Change a task's settings
    Edit(task::EditArgs),

    /// Delete a task, or selected versions of it
    Delete(task::DeleteArgs),

    /// Run one or more backup tasks
    Run(run::RunArgs),

    /// Page through the backup log, newest first
    Log(run::LogArgs),

    /// Verify a backup version and unpack it into a directory
    Unpack {
        version_id: String,
        /// Existing directory to unpack into
        output: PathBuf,
    },

    /// Archive any path into a .zip file
    Zip(archive::ZipArgs),

    /// Extract any .zip file (no fingerprint check)
    Unzip {
        archive: PathBuf,
        /// Existing directory to extract into
        output: PathBuf,
    },

    /// Print the `cbk add` commands that recreate tasks
    Export {
        /// Task id or name; every task when omitted
        task: Option<String>,
    },

    /// Remove every task, record and destination directory
    Clear {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Write a starter file into the current directory
    ///
    /// Example:
    ///     cbk init addtask && cbk add -f add_task.yaml
    Init {
        #[arg(value_enum)]
        kind: task_file::InitKind,
    },

    /// Generate shell completions (hidden)
    #[command(hide = true)]
    Completions {
        /// Which shell to generate for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Look a task up by numeric id first, then by name.
pub fn resolve_task(cbk: &Cbk, key: &str) -> Result<Task> {
    if let Ok(id) = key.parse::<i64>() {
        if let Ok(t) = cbk.task(id) {
            return Ok(t);
        }
    }
    cbk.task_by_name(key)
}

/// Progress on stdout, problems through `tracing` (stderr).
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn info(&self, msg: &str) {
        println!("{msg}");
    }

    fn ok(&self, msg: &str) {
        println!("✔ {msg}");
    }

    fn warn(&self, msg: &str) {
        warn!("{msg}");
    }

    fn error(&self, msg: &str) {
        error!("{msg}");
    }
}
