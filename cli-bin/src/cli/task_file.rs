//! YAML task files for `cbk add -f` and the `cbk init addtask` template.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use libcbk::task::{NewTask, DEFAULT_RETENTION_COUNT};
use serde::Deserialize;

/// Name `cbk init addtask` writes into the working directory.
pub const TEMPLATE_NAME: &str = "add_task.yaml";

const TEMPLATE: &str = r#"# Edit, then register with: cbk add -f add_task.yaml
task:
  # unique task name; no spaces, dots or slashes
  name: docs
  # file or directory to back up
  target: /path/to/docs
  # parent directory for the archives; empty uses the cbk data dir
  backup: ""
  # archive directory name; empty uses the target's name
  backup_dir_name: ""
  retention:
    # number of archives to keep
    count: 3
    # keep one archive per day for this many days (0 = count only)
    days: 0
  # 1 stores files without deflate
  no_compression: 0
  # e.g. "build/|*.tmp|.log"; none turns exclusion off
  exclude_rules: none
"#;

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum InitKind {
    /// Task file for `cbk add -f`
    #[value(name = "addtask")]
    AddTask,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct TaskFile {
    task: TaskEntry,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct TaskEntry {
    name: String,
    target: PathBuf,
    #[serde(default)]
    backup: Option<PathBuf>,
    #[serde(default, alias = "backupdirname")]
    backup_dir_name: Option<String>,
    #[serde(default)]
    retention: Retention,
    #[serde(default, alias = "nocompression")]
    no_compression: u8,
    #[serde(default = "no_rules", alias = "excluderules")]
    exclude_rules: String,
}

#[derive(Deserialize, Debug)]
#[serde(default, deny_unknown_fields)]
struct Retention {
    count: u32,
    days: u32,
}

impl Default for Retention {
    fn default() -> Self {
        Self { count: DEFAULT_RETENTION_COUNT, days: 0 }
    }
}

fn no_rules() -> String {
    libcbk::exclude::NONE.to_string()
}

/// Read a task file and turn it into a [`NewTask`]. Empty strings count as
/// unset.
pub fn load(path: &Path) -> Result<NewTask> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading task file {}", path.display()))?;
    let file: TaskFile = serde_yaml::from_str(&text)
        .with_context(|| format!("parsing task file {}", path.display()))?;
    let t = file.task;

    let compress = match t.no_compression {
        0 => true,
        1 => false,
        n => bail!("no_compression must be 0 or 1, got {n}"),
    };
    Ok(NewTask {
        name: t.name,
        target: t.target,
        destination_root: t.backup.filter(|p| !p.as_os_str().is_empty()),
        destination_name: t.backup_dir_name.filter(|n| !n.is_empty()),
        retention_count: t.retention.count,
        retention_days: t.retention.days,
        compress,
        exclude: t.exclude_rules,
    })
}

/// Write the template into `dir`; an existing file is left alone.
pub fn write_template(kind: InitKind, dir: &Path) -> Result<PathBuf> {
    let InitKind::AddTask = kind;
    let path = dir.join(TEMPLATE_NAME);
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    let mut f = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .with_context(|| format!("creating {}", path.display()))?;
    f.write_all(TEMPLATE.as_bytes())?;
    Ok(path)
}
