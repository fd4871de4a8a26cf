//! Shared helpers for integration tests.

use tracing_subscriber::EnvFilter;

/// Route crate logs to the test harness.
///
/// Honors `RUST_LOG`, e.g. `RUST_LOG=agentask=debug` shows discarded frames
/// and connection closes for a failing test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
