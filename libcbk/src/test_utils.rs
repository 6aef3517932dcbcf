use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use lazy_static::lazy_static;

use crate::report::Reporter;

lazy_static! {
    /// Global mutex to serialize environment-variable modifications in tests.
    pub static ref ENV_MUTEX: Mutex<()> = Mutex::new(());
}

/// Create `files` (relative paths, `/`-separated) under `root`. A trailing
/// `/` makes an empty directory.
pub fn make_tree(root: &Path, files: &[(&str, &str)]) {
    for (rel, contents) in files {
        let p = root.join(rel);
        if rel.ends_with('/') {
            fs::create_dir_all(&p).unwrap();
        } else {
            fs::create_dir_all(p.parent().unwrap()).unwrap();
            fs::write(&p, contents).unwrap();
        }
    }
}

/// Keeps every message so tests can assert on them.
#[derive(Default)]
pub struct RecordingReporter {
    pub messages: RefCell<Vec<(&'static str, String)>>,
}

impl RecordingReporter {
    pub fn has(&self, level: &str, needle: &str) -> bool {
        self.messages
            .borrow()
            .iter()
            .any(|(l, m)| *l == level && m.contains(needle))
    }
}

impl Reporter for RecordingReporter {
    fn info(&self, msg: &str) {
        self.messages.borrow_mut().push(("info", msg.to_string()));
    }
    fn ok(&self, msg: &str) {
        self.messages.borrow_mut().push(("ok", msg.to_string()));
    }
    fn warn(&self, msg: &str) {
        self.messages.borrow_mut().push(("warn", msg.to_string()));
    }
    fn error(&self, msg: &str) {
        self.messages.borrow_mut().push(("error", msg.to_string()));
    }
}
