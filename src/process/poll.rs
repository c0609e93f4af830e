//! Readiness polling
//!
//! These loops never give up: they wait for an external system that is
//! expected to come up eventually. Sleeps go through the tokio clock so
//! tests can run them with time paused.

use super::{Invocation, ProcessError, ProcessRunner};
use std::future::Future;
use std::time::Duration;
use tracing::info;

/// Repeat `check` every `interval` until it reports `true`
///
/// An `Err` from `check` ends the loop and is returned as-is.
pub async fn poll_until<F, Fut, E>(
    interval: Duration,
    waiting_message: &str,
    mut check: F,
) -> Result<(), E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    while !check().await? {
        info!("{}", waiting_message);
        tokio::time::sleep(interval).await;
    }
    Ok(())
}

/// Re-run `invocation` every `interval` until it exits 0
///
/// Nonzero exits are expected while waiting. Failing to spawn the
/// command at all is not, and is propagated.
pub async fn wait_for_success(
    runner: &ProcessRunner,
    invocation: Invocation,
    interval: Duration,
    waiting_message: &str,
) -> Result<(), ProcessError> {
    let probe = invocation.allow_failure().capture_output();
    poll_until(interval, waiting_message, || {
        let probe = probe.clone();
        async move { Ok::<bool, ProcessError>(runner.run(probe).await?.success()) }
    })
    .await
}
