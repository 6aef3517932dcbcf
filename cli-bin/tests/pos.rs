//! tests pos.rs
//! Happy-path integration tests.

use predicates::prelude::*;
use predicates::str;
use std::fs;
use tempfile::tempdir;

mod util;
use util::{add_task, cbk, logged_versions, sample_tree};

/* ───────────────────────── TASKS ─────────────────────────────── */

#[test]
fn add_then_list_and_export() {
    let tmp = tempdir().unwrap();
    let proj = sample_tree(&tmp);
    add_task(&tmp, "proj", &proj, &["--count", "2", "--exclude", "build/|*.tmp"]);

    assert!(tmp.path().join("data/proj").is_dir());

    cbk(&tmp)
        .arg("list")
        .assert()
        .success()
        .stdout(str::contains("proj").and(str::contains("keep 2 / 0d")));

    cbk(&tmp)
        .args(["export", "proj"])
        .assert()
        .success()
        .stdout(str::starts_with("cbk add --name proj").and(str::contains("--exclude 'build/|*.tmp'")));
}

#[test]
fn edit_renames_destination() {
    let tmp = tempdir().unwrap();
    let proj = sample_tree(&tmp);
    add_task(&tmp, "proj", &proj, &[]);

    cbk(&tmp)
        .args(["edit", "proj", "--name", "code", "--dest-name", "code_bak", "--no-compression"])
        .assert()
        .success()
        .stdout(str::contains("Updated task 1 (code)"));

    assert!(tmp.path().join("data/code_bak").is_dir());
    assert!(!tmp.path().join("data/proj").exists());
    cbk(&tmp)
        .arg("list")
        .assert()
        .success()
        .stdout(str::contains("stored"));
}

/* ───────────────────────── RUNS ──────────────────────────────── */

#[test]
fn init_template_then_add_from_file() {
    let tmp = tempdir().unwrap();
    let proj = sample_tree(&tmp);

    cbk(&tmp)
        .current_dir(tmp.path())
        .args(["init", "addtask"])
        .assert()
        .success()
        .stdout(str::contains("cbk add -f add_task.yaml"));

    let file = tmp.path().join("add_task.yaml");
    let yaml = fs::read_to_string(&file)
        .unwrap()
        .replace("name: docs", "name: fromfile")
        .replace("/path/to/docs", &proj.display().to_string())
        .replace("count: 3", "count: 4")
        .replace("exclude_rules: none", "exclude_rules: \"build/|*.tmp\"");
    fs::write(&file, yaml).unwrap();

    cbk(&tmp)
        .current_dir(tmp.path())
        .args(["add", "-f", "add_task.yaml"])
        .assert()
        .success()
        .stdout(str::contains("fromfile"));

    cbk(&tmp)
        .arg("list")
        .assert()
        .success()
        .stdout(str::contains("fromfile").and(str::contains("keep 4 / 0d")))
        .stdout(str::contains("build/|*.tmp"));
    assert!(tmp.path().join("data/proj").is_dir());
}

#[test]
fn run_show_and_unpack() {
    let tmp = tempdir().unwrap();
    let proj = sample_tree(&tmp);
    add_task(&tmp, "proj", &proj, &["--exclude", "build/|*.tmp"]);

    cbk(&tmp)
        .args(["run", "proj"])
        .assert()
        .success()
        .stdout(str::contains("backup task [proj] succeeded"));

    let archives: Vec<_> = fs::read_dir(tmp.path().join("data/proj"))
        .unwrap()
        .filter_map(Result::ok)
        .collect();
    assert_eq!(archives.len(), 1);
    let name = archives[0].file_name().to_string_lossy().into_owned();
    assert!(name.starts_with("proj_") && name.ends_with(".zip"), "{name}");

    cbk(&tmp)
        .args(["show", "1"])
        .assert()
        .success()
        .stdout(str::contains("succeeded").and(str::contains(name.as_str())));

    let versions = logged_versions(&tmp);
    assert_eq!(versions.len(), 1);

    let out = tmp.path().join("restore");
    fs::create_dir(&out).unwrap();
    cbk(&tmp)
        .arg("unpack")
        .arg(&versions[0])
        .arg(&out)
        .assert()
        .success();
    assert_eq!(
        fs::read_to_string(out.join("proj/src/main.rs")).unwrap(),
        "fn main() {}"
    );
    assert!(!out.join("proj/build").exists());
    assert!(!out.join("proj/notes.tmp").exists());
}

#[test]
fn run_all_then_delete_version() {
    let tmp = tempdir().unwrap();
    let proj = sample_tree(&tmp);
    add_task(&tmp, "proj", &proj, &[]);

    cbk(&tmp).args(["run", "--all"]).assert().success();
    let versions = logged_versions(&tmp);
    assert_eq!(versions.len(), 1);

    cbk(&tmp)
        .args(["delete", "proj", "--versions", &versions[0]])
        .assert()
        .success()
        .stdout(str::contains("Deleted version"));
    assert!(logged_versions(&tmp).is_empty());
    assert_eq!(
        fs::read_dir(tmp.path().join("data/proj")).unwrap().count(),
        0
    );
}

#[test]
fn delete_with_purge_and_clear() {
    let tmp = tempdir().unwrap();
    let proj = sample_tree(&tmp);
    add_task(&tmp, "proj", &proj, &[]);
    add_task(&tmp, "other", &proj, &["--dest-name", "other"]);

    cbk(&tmp).args(["delete", "proj", "--purge"]).assert().success();
    assert!(!tmp.path().join("data/proj").exists());

    cbk(&tmp)
        .args(["clear", "--yes"])
        .assert()
        .success()
        .stdout(str::contains("Cleared 1 task(s)."));
    assert!(!tmp.path().join("data/other").exists());
    cbk(&tmp)
        .arg("list")
        .assert()
        .success()
        .stdout(str::contains("No tasks registered."));
}

/* ───────────────────────── ZIP / UNZIP ───────────────────────── */

#[test]
fn zip_and_unzip_round_trip() {
    let tmp = tempdir().unwrap();
    let proj = sample_tree(&tmp);
    let archive = tmp.path().join("proj.zip");

    cbk(&tmp)
        .arg("zip")
        .arg(&proj)
        .arg(&archive)
        .args(["--exclude", "*.tmp"])
        .assert()
        .success()
        .stdout(str::contains("fingerprint"));
    assert!(archive.is_file());

    let out = tmp.path().join("out");
    fs::create_dir(&out).unwrap();
    cbk(&tmp)
        .arg("unzip")
        .arg(&archive)
        .arg(&out)
        .assert()
        .success();
    assert_eq!(fs::read_to_string(out.join("proj/build/out.bin")).unwrap(), "binary");
    assert!(!out.join("proj/notes.tmp").exists());
}

#[test]
fn completions_need_no_registry() {
    let tmp = tempdir().unwrap();
    cbk(&tmp)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(str::contains("cbk"));
    assert!(!tmp.path().join("cbk.db").exists());
}
