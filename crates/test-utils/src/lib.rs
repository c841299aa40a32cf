// crates/test-utils/src/lib.rs

pub mod recorder;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use anyhow::{Context, Result};
use opqueue::Operation;
use tokio::sync::oneshot;
use tokio::task::LocalSet;
use tracing_subscriber::{fmt, EnvFilter};

pub use recorder::{EventLog, RecordingObserver};

static INIT: Once = Once::new();

/// Install a test subscriber once per test binary.
///
/// Output goes through the test writer, so it only shows up for failing
/// tests. Filter with `RUST_LOG`, e.g. `RUST_LOG=opqueue=trace`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("opqueue=info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Drive `f` to completion inside a fresh `LocalSet`, so queues using the
/// default `TokioScheduler` can spawn their deferred steps.
pub async fn run_local<F>(f: F) -> F::Output
where
    F: Future,
{
    LocalSet::new().run_until(f).await
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Receiver that resolves once `operation`'s completion callback ran.
///
/// Must be called while the operation is still `Initialized`, since it
/// installs the completion callback.
pub fn completion_signal(operation: &Operation) -> Result<oneshot::Receiver<()>> {
    let (tx, rx) = oneshot::channel();
    operation
        .set_on_completion(move || {
            let _ = tx.send(());
        })
        .with_context(|| format!("installing completion signal on '{}'", operation.name()))?;
    Ok(rx)
}

/// Wait for a signal from [`completion_signal`].
pub async fn wait_for_completion(rx: oneshot::Receiver<()>) -> Result<()> {
    with_timeout(rx)
        .await
        .context("completion callback dropped without firing")
}
