//! Shared integration-test setup.

use tracing_subscriber::{fmt, EnvFilter};

/// Route pass logs to the test harness.
///
/// Quiet unless `RUST_LOG` asks for more, e.g. `RUST_LOG=lumen_opt=debug`.
/// Safe to call from every test; only the first call installs a subscriber.
pub fn init_tracing() {
    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}
