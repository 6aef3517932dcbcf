// libcbk/src/logging_tests.rs

use super::logging;
use tracing::Level;

#[test]
fn init_is_idempotent() {
    logging::init();
    logging::init();
    tracing::event!(Level::INFO, "this is a test log");
}
