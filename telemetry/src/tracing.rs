use std::sync::Once;

use tracing_subscriber::{EnvFilter, filter::LevelFilter};

static INIT_TEST_TRACING: Once = Once::new();

/// Installs the global fmt subscriber for a service.
///
/// The filter is read from `RUST_LOG` and defaults to `info`. Fails when a global subscriber
/// is already installed.
pub fn init_tracing(service_name: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    use tracing_subscriber::util::SubscriberInitExt;

    let log_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter)
        .with_target(false)
        .finish()
        .try_init()?;

    tracing::info!(service = service_name, "tracing initialized");

    Ok(())
}

/// Installs a test-writer subscriber once per process.
///
/// Output is captured by the test harness and only shown for failing tests. Set `RUST_LOG`
/// to raise verbosity.
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        let log_filter = EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .from_env_lossy();

        // Another harness may have installed a subscriber already.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(log_filter)
            .with_test_writer()
            .try_init();
    });
}
