//! Polling waits for asynchronous delivery.
//!
//! Deliveries reach listeners on background workers; tests poll for the
//! expected state instead of sleeping a fixed time.

use std::time::Duration;

/// Default deadline of [`wait_until`].
pub const DEFAULT_WAIT: Duration = Duration::from_secs(5);

const POLL_STEP: Duration = Duration::from_millis(5);

/// Poll `condition` until it holds or `timeout` elapses.
///
/// Returns whether the condition held.
pub async fn eventually<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_STEP).await;
    }
}

/// Poll `condition` for up to [`DEFAULT_WAIT`], panicking if it never holds.
///
/// # Panics
///
/// Panics with `what` if the condition does not hold in time.
pub async fn wait_until<F>(what: &str, condition: F)
where
    F: FnMut() -> bool,
{
    if !eventually(DEFAULT_WAIT, condition).await {
        panic!("wait_until: timed out waiting for {what}");
    }
}

/// Give background workers a chance to run a delivery that must not happen.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
