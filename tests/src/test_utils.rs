//! Logging, polling and timeout helpers shared by the scenario tests

use std::future::Future;
use std::time::Duration;

use simamf_amf::{Dispatcher, DispatcherState};
use tokio::time::{sleep, timeout};
use tracing_subscriber::{fmt, EnvFilter};

/// Result type for integration tests
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Default timeout for waiting on a single engine reaction
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Default poll interval for condition checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Installs a test-writer subscriber. `RUST_LOG` overrides the "info" default.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt().with_env_filter(filter).with_test_writer().try_init();
}

/// Polls `condition` every `poll_interval` until it holds or
/// `timeout_duration` elapses.
pub async fn wait_for_condition<F, Fut>(
    mut condition: F,
    timeout_duration: Duration,
    poll_interval: Duration,
) -> TestResult
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let result = timeout(timeout_duration, async {
        loop {
            if condition().await {
                return;
            }
            sleep(poll_interval).await;
        }
    })
    .await;

    match result {
        Ok(()) => Ok(()),
        Err(_) => Err("Condition not met within timeout".into()),
    }
}

/// Waits until the dispatcher reports `expected`.
pub async fn wait_for_state(
    dispatcher: &Dispatcher,
    expected: DispatcherState,
    timeout_duration: Duration,
) -> TestResult {
    let mut rx = dispatcher.subscribe_state();
    timeout(timeout_duration, rx.wait_for(|state| *state == expected))
        .await
        .map_err(|_| format!("dispatcher never reached {expected}"))?
        .map_err(|_| "dispatcher dropped")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_wait_for_condition_success() {
        let flag = Arc::new(AtomicBool::new(false));
        let flag_clone = flag.clone();

        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            flag_clone.store(true, Ordering::SeqCst);
        });

        let result = wait_for_condition(
            || async { flag.load(Ordering::SeqCst) },
            Duration::from_secs(1),
            Duration::from_millis(10),
        )
        .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_wait_for_condition_timeout() {
        let result = wait_for_condition(
            || async { false },
            Duration::from_millis(100),
            Duration::from_millis(10),
        )
        .await;

        assert!(result.is_err());
    }
}
