//! tests/util.rs
//! Small helpers shared across integration tests.

#![allow(dead_code)]

use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Absolute path to the freshly-built `cbk` binary.
pub fn bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_cbk"))
}

/// Build a `Command` for `cbk` whose registry is `<tmp>/cbk.db` and whose
/// default archive root is `<tmp>/data`.
pub fn cbk(tmp: &TempDir) -> Command {
    let mut cmd = Command::new(bin());
    cmd.env("CBK_DB_PATH", tmp.path().join("cbk.db"));
    cmd.env("CBK_DATA_DIR", tmp.path().join("data"));
    cmd.env_remove("RUST_LOG");
    cmd
}

/// A small project tree under `<tmp>/proj`.
pub fn sample_tree(tmp: &TempDir) -> PathBuf {
    let root = tmp.path().join("proj");
    fs::create_dir_all(root.join("src")).unwrap();
    fs::create_dir_all(root.join("build")).unwrap();
    fs::write(root.join("src/main.rs"), "fn main() {}").unwrap();
    fs::write(root.join("build/out.bin"), "binary").unwrap();
    fs::write(root.join("notes.tmp"), "scratch").unwrap();
    root
}

/// Register `proj` as task `name` with the given extra `cbk add` flags.
pub fn add_task(tmp: &TempDir, name: &str, target: &Path, extra: &[&str]) {
    cbk(tmp)
        .args(["add", "--name", name, "--target"])
        .arg(target)
        .args(extra)
        .assert()
        .success();
}

/// Version ids (first column) of every `cbk log` line.
pub fn logged_versions(tmp: &TempDir) -> Vec<String> {
    let out = cbk(tmp).arg("log").output().unwrap();
    String::from_utf8_lossy(&out.stdout)
        .lines()
        .filter_map(|l| l.split_whitespace().next().map(str::to_string))
        .filter(|v| v.len() == 19)
        .collect()
}
