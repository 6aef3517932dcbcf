//! Retention: decide which archives of a task are obsolete, delete them and
//! demote their records.
//!
//! Two policies share one type:
//!
//! * **count only** (`days == 0`): keep the newest `count` archives.
//! * **count and days** (`days > 0`): archives newer than `now - days` are
//!   always kept. Older ones are bucketed by local calendar day and each
//!   bucket keeps its newest `count`.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Local, NaiveDate};
use rusqlite::ErrorCode;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::archive::ARCHIVE_EXT;
use crate::error::{Error, Result};
use crate::report::Reporter;

/// `strftime` layout of the timestamp embedded in archive names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub count: u32,
    /// `0` disables the age axis.
    pub days: u32,
}

impl RetentionPolicy {
    pub fn new(count: u32, days: u32) -> Result<Self> {
        if count == 0 {
            return Err(Error::Policy("retention count must be at least 1".into()));
        }
        Ok(Self { count, days })
    }
}

/// An archive on disk together with its last-modified time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveFile {
    pub path: PathBuf,
    pub modified: DateTime<Local>,
}

/// Task name and timestamp recovered from `{task}_{YYYYMMDDhhmmss}.zip`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveName {
    pub task_name: String,
    pub timestamp: String,
}

/// `{task}_{timestamp}`, without extension.
pub fn archive_stem(task_name: &str, at: &DateTime<Local>) -> String {
    format!("{task_name}_{}", at.format(TIMESTAMP_FORMAT))
}

/// Parse an archive file name. Everything from the first `.` is ignored
/// and the task name is what precedes the *last* `_`, so task names may
/// contain underscores.
pub fn parse_archive_name(path: &Path) -> Option<ArchiveName> {
    let file_name = path.file_name()?.to_str()?;
    let stem = file_name.split('.').next()?;
    let (task_name, timestamp) = stem.rsplit_once('_')?;
    if task_name.is_empty()
        || timestamp.len() != 14
        || !timestamp.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    Some(ArchiveName {
        task_name: task_name.to_string(),
        timestamp: timestamp.to_string(),
    })
}

/// Every `*.zip` below `dir` (recursively). When `task_names` is non-empty
/// only archives whose name parses to one of them are returned. A missing
/// `dir` yields an empty list.
pub fn list_archives(dir: &Path, task_names: &[&str]) -> Result<Vec<ArchiveFile>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let suffix = format!(".{ARCHIVE_EXT}");

    let mut out = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::from_io(dir, e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if !path.to_string_lossy().ends_with(&suffix) {
            continue;
        }
        if !task_names.is_empty() {
            match parse_archive_name(path) {
                Some(n) if task_names.contains(&n.task_name.as_str()) => {}
                _ => continue,
            }
        }
        let modified = entry
            .metadata()
            .map_err(|e| Error::from_io(path, e.into()))?
            .modified()
            .map_err(|e| Error::from_io(path, e))?;
        out.push(ArchiveFile {
            path: path.to_path_buf(),
            modified: DateTime::<Local>::from(modified),
        });
    }
    Ok(out)
}

/// Pure policy evaluation: which of `archives` must go, oldest first.
pub fn plan(archives: &[ArchiveFile], policy: &RetentionPolicy, now: DateTime<Local>) -> Vec<PathBuf> {
    let keep = policy.count as usize;
    let mut sorted: Vec<&ArchiveFile> = archives.iter().collect();
    sorted.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));

    let mut victims: Vec<&ArchiveFile> = Vec::new();
    if policy.days == 0 {
        if sorted.len() > keep {
            victims.extend(&sorted[..sorted.len() - keep]);
        }
    } else {
        let cutoff = now - Duration::days(i64::from(policy.days));
        let mut by_day: BTreeMap<NaiveDate, Vec<&ArchiveFile>> = BTreeMap::new();
        for a in sorted.iter().copied().filter(|a| a.modified < cutoff) {
            by_day.entry(a.modified.date_naive()).or_default().push(a);
        }
        for (day, bucket) in by_day {
            if bucket.len() > keep {
                debug!("{day}: {} archives, keeping {keep}", bucket.len());
                victims.extend(&bucket[..bucket.len() - keep]);
            }
        }
        victims.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));
    }

    victims.into_iter().map(|a| a.path.clone()).collect()
}

/// Where reclaim bookkeeping is written.
pub trait RecordStore {
    /// Flip the live record for `(task_name, timestamp)` to reclaimed and
    /// return how many rows changed.
    fn mark_reclaimed(&self, task_name: &str, timestamp: &str) -> rusqlite::Result<usize>;
}

/// An archive that could not be fully reclaimed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReclaimFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of [`reclaim`].
#[derive(Debug, Default, Clone)]
pub struct ReclaimReport {
    /// Archives gone from disk whose record is now reclaimed.
    pub deleted: Vec<PathBuf>,
    pub failed: Vec<ReclaimFailure>,
}

impl ReclaimReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Apply `policy` to `archives`: delete every planned victim and demote its
/// record through `store`.
///
/// Per-archive problems are reported and collected in
/// [`ReclaimReport::failed`]. A file already missing from disk still gets
/// its record demoted. Only a registry that is unusable as a whole aborts
/// the pass with [`Error::Reclaim`].
pub fn reclaim<S: RecordStore + ?Sized>(
    archives: &[ArchiveFile],
    policy: &RetentionPolicy,
    now: DateTime<Local>,
    store: &S,
    reporter: &dyn Reporter,
) -> Result<ReclaimReport> {
    let mut report = ReclaimReport::default();

    for path in plan(archives, policy, now) {
        let Some(name) = parse_archive_name(&path) else {
            reporter.warn(&format!(
                "skipping {}: not a `task_timestamp` archive name",
                path.display()
            ));
            report.failed.push(ReclaimFailure {
                path,
                reason: "unrecognised archive name".into(),
            });
            continue;
        };

        match fs::remove_file(&path) {
            Ok(()) => debug!("removed {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                reporter.warn(&format!("{} is already gone", path.display()));
            }
            Err(e) => {
                reporter.warn(&format!("could not remove {}: {e}", path.display()));
                report.failed.push(ReclaimFailure {
                    path,
                    reason: e.to_string(),
                });
                continue;
            }
        }

        match store.mark_reclaimed(&name.task_name, &name.timestamp) {
            Ok(0) => {
                debug!(
                    "no live record for {} @ {}",
                    name.task_name, name.timestamp
                );
                report.deleted.push(path);
            }
            Ok(_) => report.deleted.push(path),
            Err(e) if is_systemic(&e) => {
                return Err(Error::Reclaim(format!(
                    "registry unavailable while reclaiming {}: {e}",
                    path.display()
                )));
            }
            Err(e) => {
                warn!("record update failed for {}: {e}", path.display());
                reporter.warn(&format!(
                    "{} removed but its record could not be updated: {e}",
                    path.display()
                ));
                report.failed.push(ReclaimFailure {
                    path,
                    reason: e.to_string(),
                });
            }
        }
    }

    if !report.deleted.is_empty() {
        reporter.info(&format!("reclaimed {} old archive(s)", report.deleted.len()));
    }
    Ok(report)
}

/// Errors that mean the registry as a whole is unusable, as opposed to a
/// single statement failing.
fn is_systemic(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(
            ErrorCode::CannotOpen
                | ErrorCode::NotADatabase
                | ErrorCode::DatabaseCorrupt
                | ErrorCode::SystemIoFailure
                | ErrorCode::DiskFull
                | ErrorCode::ReadOnly
                | ErrorCode::PermissionDenied
                | ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
        )
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::SilentReporter;
    use chrono::TimeZone;
    use std::cell::RefCell;
    use tempfile::tempdir;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, m, d, h, 0, 0).single().unwrap()
    }

    fn archive(task: &str, when: DateTime<Local>) -> ArchiveFile {
        ArchiveFile {
            path: PathBuf::from(format!("/backups/{}.zip", archive_stem(task, &when))),
            modified: when,
        }
    }

    #[test]
    fn count_only_drops_oldest() {
        let now = at(2024, 5, 10, 12);
        let days: Vec<_> = (1..=5).map(|d| archive("T", at(2024, 5, d, 12))).collect();
        // feed them shuffled; plan must sort by mtime
        let shuffled = vec![
            days[3].clone(),
            days[0].clone(),
            days[4].clone(),
            days[2].clone(),
            days[1].clone(),
        ];
        let policy = RetentionPolicy::new(2, 0).unwrap();

        let victims = plan(&shuffled, &policy, now);
        assert_eq!(
            victims,
            vec![days[0].path.clone(), days[1].path.clone(), days[2].path.clone()]
        );
    }

    #[test]
    fn count_only_under_limit_keeps_everything() {
        let now = at(2024, 5, 10, 12);
        let list = vec![archive("T", at(2024, 1, 1, 12)), archive("T", at(2024, 1, 2, 12))];
        let policy = RetentionPolicy::new(3, 0).unwrap();
        assert!(plan(&list, &policy, now).is_empty());
    }

    #[test]
    fn count_and_days_buckets_old_archives_per_day() {
        let now = at(2024, 5, 20, 12);
        // three on an old day, one on another old day
        let old_a1 = archive("T", at(2024, 5, 1, 8));
        let old_a2 = archive("T", at(2024, 5, 1, 12));
        let old_a3 = archive("T", at(2024, 5, 1, 16));
        let old_b = archive("T", at(2024, 5, 2, 12));
        // plenty of recent ones, all inside the window
        let recent: Vec<_> = (15..=19).map(|d| archive("T", at(2024, 5, d, 12))).collect();

        let mut all = vec![old_a3.clone(), old_b.clone(), old_a1.clone(), old_a2.clone()];
        all.extend(recent.iter().cloned());

        let policy = RetentionPolicy::new(2, 7).unwrap();
        let victims = plan(&all, &policy, now);
        assert_eq!(victims, vec![old_a1.path.clone()]);
    }

    #[test]
    fn count_and_days_never_touches_recent_archives() {
        let now = at(2024, 5, 20, 12);
        let recent: Vec<_> = (0..10)
            .map(|h| archive("T", at(2024, 5, 19, h + 8)))
            .collect();
        let policy = RetentionPolicy::new(1, 3).unwrap();
        assert!(plan(&recent, &policy, now).is_empty());
    }

    #[test]
    fn zero_count_is_rejected() {
        assert!(matches!(RetentionPolicy::new(0, 5), Err(Error::Policy(_))));
    }

    #[test]
    fn archive_names_parse_with_underscored_tasks() {
        let n = parse_archive_name(Path::new("/x/my_docs_20240102030405.zip")).unwrap();
        assert_eq!(n.task_name, "my_docs");
        assert_eq!(n.timestamp, "20240102030405");

        assert!(parse_archive_name(Path::new("notes.zip")).is_none());
        assert!(parse_archive_name(Path::new("T_2024.zip")).is_none());
        assert!(parse_archive_name(Path::new("_20240102030405.zip")).is_none());
    }

    #[test]
    fn list_archives_filters_by_task() {
        let tmp = tempdir().unwrap();
        let nested = tmp.path().join("nested");
        fs::create_dir_all(&nested).unwrap();
        fs::write(tmp.path().join("docs_20240101000000.zip"), b"a").unwrap();
        fs::write(nested.join("docs_20240102000000.zip"), b"b").unwrap();
        fs::write(tmp.path().join("photos_20240101000000.zip"), b"c").unwrap();
        fs::write(tmp.path().join("docs_20240103000000.txt"), b"d").unwrap();

        let all = list_archives(tmp.path(), &[]).unwrap();
        assert_eq!(all.len(), 3);

        let docs = list_archives(tmp.path(), &["docs"]).unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs
            .iter()
            .all(|a| parse_archive_name(&a.path).unwrap().task_name == "docs"));
        assert_eq!(list_archives(tmp.path(), &["docs", "photos"]).unwrap().len(), 3);

        assert!(list_archives(&tmp.path().join("missing"), &[])
            .unwrap()
            .is_empty());
    }

    /// Store that records calls and fails for selected timestamps.
    #[derive(Default)]
    struct FakeStore {
        calls: RefCell<Vec<(String, String)>>,
        row_failure: Option<String>,
        systemic_failure: bool,
    }

    impl RecordStore for FakeStore {
        fn mark_reclaimed(&self, task_name: &str, timestamp: &str) -> rusqlite::Result<usize> {
            self.calls
                .borrow_mut()
                .push((task_name.to_string(), timestamp.to_string()));
            if self.systemic_failure {
                return Err(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
                    None,
                ));
            }
            if self.row_failure.as_deref() == Some(timestamp) {
                return Err(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
                    None,
                ));
            }
            Ok(1)
        }
    }

    fn on_disk(dir: &Path, task: &str, when: DateTime<Local>) -> ArchiveFile {
        let path = dir.join(format!("{}.zip", archive_stem(task, &when)));
        fs::write(&path, b"zip").unwrap();
        ArchiveFile {
            path,
            modified: when,
        }
    }

    #[test]
    fn reclaim_deletes_and_demotes() {
        let tmp = tempdir().unwrap();
        let now = at(2024, 5, 10, 12);
        let list: Vec<_> = (1..=5)
            .map(|d| on_disk(tmp.path(), "T", at(2024, 5, d, 12)))
            .collect();
        let store = FakeStore::default();
        let policy = RetentionPolicy::new(2, 0).unwrap();

        let report = reclaim(&list, &policy, now, &store, &SilentReporter).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.deleted.len(), 3);
        for a in &list[..3] {
            assert!(!a.path.exists());
        }
        for a in &list[3..] {
            assert!(a.path.exists());
        }
        let calls = store.calls.borrow();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0], ("T".to_string(), "20240501120000".to_string()));
    }

    #[test]
    fn reclaim_demotes_records_of_missing_files() {
        let tmp = tempdir().unwrap();
        let now = at(2024, 5, 10, 12);
        let list: Vec<_> = (1..=3)
            .map(|d| on_disk(tmp.path(), "T", at(2024, 5, d, 12)))
            .collect();
        fs::remove_file(&list[0].path).unwrap();

        let store = FakeStore::default();
        let policy = RetentionPolicy::new(1, 0).unwrap();
        let report = reclaim(&list, &policy, now, &store, &SilentReporter).unwrap();

        assert!(report.is_clean());
        assert_eq!(report.deleted, vec![list[0].path.clone(), list[1].path.clone()]);
        assert_eq!(store.calls.borrow().len(), 2);
    }

    #[test]
    fn reclaim_collects_row_failures_and_continues() {
        let tmp = tempdir().unwrap();
        let now = at(2024, 5, 10, 12);
        let list: Vec<_> = (1..=4)
            .map(|d| on_disk(tmp.path(), "T", at(2024, 5, d, 12)))
            .collect();
        let store = FakeStore {
            row_failure: Some("20240501120000".into()),
            ..Default::default()
        };
        let policy = RetentionPolicy::new(1, 0).unwrap();

        let report = reclaim(&list, &policy, now, &store, &SilentReporter).unwrap();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].path, list[0].path);
        assert_eq!(report.deleted, vec![list[1].path.clone(), list[2].path.clone()]);
        assert_eq!(store.calls.borrow().len(), 3);
    }

    #[test]
    fn reclaim_aborts_when_registry_is_unreachable() {
        let tmp = tempdir().unwrap();
        let now = at(2024, 5, 10, 12);
        let list: Vec<_> = (1..=3)
            .map(|d| on_disk(tmp.path(), "T", at(2024, 5, d, 12)))
            .collect();
        let store = FakeStore {
            systemic_failure: true,
            ..Default::default()
        };
        let policy = RetentionPolicy::new(1, 0).unwrap();

        let err = reclaim(&list, &policy, now, &store, &SilentReporter).unwrap_err();
        assert!(matches!(err, Error::Reclaim(_)));
        assert_eq!(store.calls.borrow().len(), 1);
    }
}
