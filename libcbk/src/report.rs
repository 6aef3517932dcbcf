//! Progress reporting handed to engine components.
//!
//! Components never print; they talk to whatever [`Reporter`] the caller
//! supplies. The CLI passes one that writes to the terminal, tests pass
//! [`SilentReporter`].

use tracing::{error, info, warn};

pub trait Reporter {
    /// Neutral progress message.
    fn info(&self, msg: &str);
    /// A step finished successfully.
    fn ok(&self, msg: &str);
    /// Recoverable problem; processing continues.
    fn warn(&self, msg: &str);
    /// A step failed.
    fn error(&self, msg: &str);
}

/// Forwards every message to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn info(&self, msg: &str) {
        info!("{msg}");
    }

    fn ok(&self, msg: &str) {
        info!("{msg}");
    }

    fn warn(&self, msg: &str) {
        warn!("{msg}");
    }

    fn error(&self, msg: &str) {
        error!("{msg}");
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl Reporter for SilentReporter {
    fn info(&self, _msg: &str) {}
    fn ok(&self, _msg: &str) {}
    fn warn(&self, _msg: &str) {}
    fn error(&self, _msg: &str) {}
}
