//! `cbk zip` / `cbk unzip` – ad hoc archives outside any task.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use libcbk::exclude::ExclusionSet;
use libcbk::{archive, fingerprint, restore};

#[derive(Args, Debug)]
pub struct ZipArgs {
    /// File or directory to archive
    pub source: PathBuf,
    /// Archive to create; must end in .zip and must not exist
    pub dest: PathBuf,
    /// Store files without deflate
    #[arg(long)]
    pub no_compression: bool,
    /// Exclusion expression, e.g. "build/|*.tmp|.log"
    #[arg(long, default_value = "none")]
    pub exclude: String,
}

pub fn zip(a: &ZipArgs) -> Result<()> {
    let exclude = ExclusionSet::parse(&a.exclude)?;
    let summary = archive::zip_path(&a.source, &a.dest, !a.no_compression, &exclude)
        .with_context(|| format!("archiving {}", a.source.display()))?;
    println!(
        "Wrote {} ({} entries, {}, fingerprint {})",
        summary.path.display(),
        summary.entries,
        fingerprint::human_size(&summary.path)?,
        fingerprint::fingerprint(&summary.path)?,
    );
    Ok(())
}

pub fn unzip(archive: &Path, output: &Path) -> Result<()> {
    for p in restore::unpack(archive, output)? {
        println!("Extracted {}", p.display());
    }
    Ok(())
}
