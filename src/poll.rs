//! Bounded poll-until-ready primitive.
//!
//! Every readiness wait (workload rollouts, certificate reissue, rollback
//! restarts) goes through [`poll_until`] so that all waits share the same
//! attempt accounting and timeout error.

use crate::{Result, RotorError};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// How often and how many times to probe a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between consecutive probes
    pub interval: Duration,

    /// Total number of probes before giving up (at least 1)
    pub max_attempts: u32,
}

impl PollPolicy {
    /// Creates a policy with explicit parameters.
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Derives a policy that probes every `interval` until `timeout` elapses.
    ///
    /// # Example
    ///
    /// ```
    /// use keyrotor::poll::PollPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = PollPolicy::for_timeout(Duration::from_secs(300), Duration::from_secs(5));
    /// assert_eq!(policy.max_attempts, 61);
    /// ```
    pub fn for_timeout(timeout: Duration, interval: Duration) -> Self {
        let attempts = if interval.is_zero() {
            1
        } else {
            (timeout.as_millis() / interval.as_millis()).min(u32::MAX as u128 - 1) as u32 + 1
        };
        Self::new(interval, attempts)
    }
}

/// Probes `probe` until it returns `Ok(true)`.
///
/// Returns `Ok(())` on the first successful probe. A probe error is
/// propagated immediately (it is a failure, not "not ready yet"). After
/// `max_attempts` negative probes, returns [`RotorError::Timeout`].
pub async fn poll_until<F, Fut>(policy: PollPolicy, what: &str, mut probe: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    for attempt in 1..=policy.max_attempts {
        if probe().await? {
            tracing::debug!(what, attempt, "condition reached");
            return Ok(());
        }

        if attempt < policy.max_attempts {
            sleep(policy.interval).await;
        }
    }

    Err(RotorError::Timeout {
        what: what.to_string(),
        attempts: policy.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_for_timeout() {
        let policy = PollPolicy::for_timeout(Duration::from_secs(10), Duration::from_secs(2));
        assert_eq!(policy.max_attempts, 6);
        assert_eq!(policy.interval, Duration::from_secs(2));

        let zero = PollPolicy::for_timeout(Duration::from_secs(10), Duration::ZERO);
        assert_eq!(zero.max_attempts, 1);
    }

    #[test]
    fn test_new_clamps_attempts() {
        assert_eq!(PollPolicy::new(Duration::ZERO, 0).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_poll_succeeds_after_attempts() {
        let calls = AtomicU32::new(0);
        let policy = PollPolicy::new(Duration::from_millis(1), 5);

        poll_until(policy, "ready", || async {
            Ok(calls.fetch_add(1, Ordering::SeqCst) >= 2)
        })
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_poll_times_out() {
        let calls = AtomicU32::new(0);
        let policy = PollPolicy::new(Duration::from_millis(1), 4);

        let result = poll_until(policy, "deployment/n8n", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(false)
        })
        .await;

        assert!(matches!(
            result,
            Err(RotorError::Timeout { attempts: 4, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_poll_propagates_probe_error() {
        let policy = PollPolicy::new(Duration::from_millis(1), 10);

        let result = poll_until(policy, "x", || async {
            Err(RotorError::CommandFailed("kubectl down".into()))
        })
        .await;

        assert!(matches!(result, Err(RotorError::CommandFailed(_))));
    }
}
