pub mod builders;
pub mod fake_process;
pub mod flaky_store;

use std::sync::Once;
use std::time::Duration;

use taskpool::engine::PoolOptions;
use taskpool::types::WhenQueueFull;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Pool options for tests: `workers` workers, a roomy queue and a 1ms retry
/// backoff so failure paths stay fast.
pub fn test_pool_options(workers: usize) -> PoolOptions {
    PoolOptions {
        workers,
        queue_capacity: 64,
        when_full: WhenQueueFull::Wait,
        status_write_retries: 2,
        retry_backoff: Duration::from_millis(1),
    }
}
