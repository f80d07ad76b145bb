//! Retry policies for remote calls.
//!
//! Policies are plain values constructed by the application and handed to
//! each provider. Two flavours are needed:
//!
//! - `transient`: bounded attempts with exponential backoff, used around every
//!   remote call for server-side hiccups (500/503/timeouts);
//! - `slow_instantiation`: a longer, linear policy for re-creating a
//!   container/queue/table that was deleted moments ago.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::{ConfigSnapshot, RemoteError};

/// How the delay grows between attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// delay = base * multiplier^(attempt - 1), capped at `max`
    Exponential {
        base: Duration,
        multiplier: f64,
        max: Duration,
    },
    /// delay = step * attempt, capped at `max`
    Linear { step: Duration, max: Duration },
    /// No waiting at all (tests).
    Immediate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Default policy for transient server errors.
    pub fn transient() -> Self {
        Self {
            max_attempts: 5,
            backoff: Backoff::Exponential {
                base: Duration::from_millis(100),
                multiplier: 2.0,
                max: Duration::from_secs(8),
            },
        }
    }

    /// Default policy for "just deleted, not yet instantiable" races.
    ///
    /// The platform may take well over 30 seconds to release a deleted name.
    pub fn slow_instantiation() -> Self {
        Self {
            max_attempts: 30,
            backoff: Backoff::Linear {
                step: Duration::from_millis(500),
                max: Duration::from_secs(5),
            },
        }
    }

    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Immediate,
        }
    }

    /// Delay to wait after the given failed attempt (1-indexed).
    pub fn next_delay(&self, attempt: u32) -> Duration {
        match &self.backoff {
            Backoff::Exponential {
                base,
                multiplier,
                max,
            } => {
                let exponent = attempt.saturating_sub(1).min(30) as i32;
                let secs = base.as_secs_f64() * multiplier.powi(exponent);
                Duration::from_secs_f64(secs).min(*max)
            }
            Backoff::Linear { step, max } => step.saturating_mul(attempt.max(1)).min(*max),
            Backoff::Immediate => Duration::ZERO,
        }
    }

    /// Run `op` until it succeeds, fails with an error `should_retry` rejects,
    /// or attempts are exhausted. The last error is returned on exhaustion.
    pub async fn run<T, F, Fut, P>(&self, op_name: &str, should_retry: P, mut op: F) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
        P: Fn(&RemoteError) -> bool,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_attempts && should_retry(&err) => {
                    let delay = self.next_delay(attempt);
                    warn!(
                        operation = op_name,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "retrying remote call: {}",
                        err
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(err) => {
                    if attempt > 1 {
                        debug!(operation = op_name, attempt, "giving up on remote call: {}", err);
                    }
                    return Err(err);
                }
            }
        }
    }
}

/// The pair of policies every provider is built with.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicies {
    pub transient: RetryPolicy,
    pub slow_instantiation: RetryPolicy,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            transient: RetryPolicy::transient(),
            slow_instantiation: RetryPolicy::slow_instantiation(),
        }
    }
}

impl RetryPolicies {
    /// Zero-delay policies for deterministic tests.
    pub fn immediate() -> Self {
        Self {
            transient: RetryPolicy::immediate(3),
            slow_instantiation: RetryPolicy::immediate(3),
        }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self {
            transient: RetryPolicy::immediate(1),
            slow_instantiation: RetryPolicy::immediate(1),
        }
    }

    /// Read overrides from `retry.*` keys, keeping defaults for missing ones.
    pub fn from_snapshot(snapshot: &ConfigSnapshot) -> Self {
        let mut policies = Self::default();
        if let Some(attempts) = snapshot.get_u64("retry.transient.max_attempts") {
            policies.transient.max_attempts = attempts.max(1) as u32;
        }
        if let Some(base_ms) = snapshot.get_u64("retry.transient.base_delay_ms") {
            if let Backoff::Exponential { base, .. } = &mut policies.transient.backoff {
                *base = Duration::from_millis(base_ms);
            }
        }
        if let Some(attempts) = snapshot.get_u64("retry.slow.max_attempts") {
            policies.slow_instantiation.max_attempts = attempts.max(1) as u32;
        }
        if let Some(step_ms) = snapshot.get_u64("retry.slow.delay_ms") {
            if let Backoff::Linear { step, .. } = &mut policies.slow_instantiation.backoff {
                *step = Duration::from_millis(step_ms);
            }
        }
        policies
    }

    /// Retry on transient server errors only.
    pub async fn transient<T, F, Fut>(&self, op_name: &str, op: F) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        self.transient
            .run(op_name, RemoteError::is_transient, op)
            .await
    }

    /// Retry while the resource is still being deleted, and on transient errors.
    pub async fn slow_instantiation<T, F, Fut>(&self, op_name: &str, op: F) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        self.slow_instantiation
            .run(
                op_name,
                |err: &RemoteError| err.is_being_deleted() || err.is_transient(),
                op,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RemoteErrorKind, StorageConfig};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn exponential_backoff_increases_and_caps() {
        let policy = RetryPolicy::transient();
        assert_eq!(policy.next_delay(1), Duration::from_millis(100));
        assert_eq!(policy.next_delay(2), Duration::from_millis(200));
        assert_eq!(policy.next_delay(3), Duration::from_millis(400));
        assert_eq!(policy.next_delay(20), Duration::from_secs(8));
    }

    #[test]
    fn linear_backoff_is_patient() {
        let policy = RetryPolicy::slow_instantiation();
        assert_eq!(policy.next_delay(1), Duration::from_millis(500));
        assert_eq!(policy.next_delay(4), Duration::from_secs(2));
        assert_eq!(policy.next_delay(100), Duration::from_secs(5));
        assert!(policy.max_attempts > RetryPolicy::transient().max_attempts);
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let policies = RetryPolicies::immediate();
        let calls = AtomicU32::new(0);

        let result = policies
            .transient("flaky", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(RemoteError::new(RemoteErrorKind::ServerBusy, "busy"))
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let policies = RetryPolicies::immediate();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policies
            .transient("always-busy", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RemoteError::new(RemoteErrorKind::Timeout, "slow"))
            })
            .await;

        assert_eq!(result.unwrap_err().kind, RemoteErrorKind::Timeout);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_errors_are_not_retried() {
        let policies = RetryPolicies::immediate();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policies
            .transient("conflict", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RemoteError::precondition_failed("etag mismatch"))
            })
            .await;

        assert!(result.unwrap_err().is_conflict());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_instantiation_waits_out_deletion() {
        let policies = RetryPolicies::immediate();
        let calls = AtomicU32::new(0);

        let result = policies
            .slow_instantiation("create-queue", || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(RemoteError::new(RemoteErrorKind::BeingDeleted, "queue is being deleted"))
                } else {
                    Ok(true)
                }
            })
            .await;

        assert_eq!(result, Ok(true));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_sleeps_between_attempts() {
        let policy = RetryPolicy::transient();
        let started = tokio::time::Instant::now();
        let calls = AtomicU32::new(0);

        let _ = policy
            .run("timed", RemoteError::is_transient, || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(RemoteError::new(RemoteErrorKind::Internal, "oops"))
                } else {
                    Ok(())
                }
            })
            .await;

        // 100ms + 200ms of backoff
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[test]
    fn policies_read_overrides_from_config() {
        let mut config = StorageConfig::new();
        config.set("retry.transient.max_attempts", "7");
        config.set("retry.slow.delay_ms", "1000");

        let policies = RetryPolicies::from_snapshot(&config.snapshot());
        assert_eq!(policies.transient.max_attempts, 7);
        assert_eq!(
            policies.slow_instantiation.next_delay(1),
            Duration::from_secs(1)
        );
    }
}
