//! Timeout helpers.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::SluiceError;

/// Wrap a future with a timeout.
pub async fn with_timeout<T>(
    duration: Duration,
    future: impl Future<Output = Result<T, SluiceError>>,
) -> Result<T, SluiceError> {
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(SluiceError::Timeout(duration.as_millis() as u64)),
    }
}

/// Time left until `deadline`, or `None` once it has passed.
pub fn remaining(deadline: Instant) -> Option<Duration> {
    let left = deadline.saturating_duration_since(Instant::now());
    if left.is_zero() {
        None
    } else {
        Some(left)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn with_timeout_reports_elapsed_budget() {
        let result: Result<(), _> = with_timeout(Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(SluiceError::Timeout(50))));
    }

    #[tokio::test(start_paused = true)]
    async fn remaining_is_none_after_deadline() {
        let deadline = Instant::now() + Duration::from_millis(10);
        assert!(remaining(deadline).is_some());
        tokio::time::advance(Duration::from_millis(11)).await;
        assert!(remaining(deadline).is_none());
    }
}
