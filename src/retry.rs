//! Fixed-delay retry for calls to external services.
//!
//! Every external step (listing projects, listing experiments, processing one
//! experiment, delivering one message) goes through [`with_retry`] with its
//! own attempt budget, so only the smallest failing unit is repeated.

use crate::config::RetryConfig;
use crate::error::{PipelineError, Stage};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// How many times to try a step and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: Duration::from_secs(config.delay_seconds),
        }
    }
}

/// Run `op` until it succeeds or the policy's attempts are used up.
///
/// Waits `policy.delay` between attempts (never after the last one). On
/// exhaustion the last error is returned as a [`PipelineError::StageFailure`]
/// tagged with `stage` and `key`.
pub async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    stage: Stage,
    key: &str,
    mut op: F,
) -> Result<T, PipelineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<anyhow::Error>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{} for {} succeeded on attempt {}", stage, key, attempt);
                }
                return Ok(value);
            }
            Err(e) => {
                let e: anyhow::Error = e.into();

                if attempt >= max_attempts {
                    return Err(PipelineError::StageFailure {
                        stage,
                        key: key.to_string(),
                        attempts: attempt,
                        source: e,
                    });
                }

                warn!(
                    %stage,
                    key,
                    attempt,
                    max_attempts,
                    "Attempt failed, retrying in {}s: {:#}",
                    policy.delay.as_secs(),
                    e
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tokio::time::Instant;
    use tokio_test::{assert_err, assert_ok};

    fn flaky(calls: &Cell<u32>, failures: u32) -> impl Future<Output = anyhow::Result<&'static str>> {
        calls.set(calls.get() + 1);
        let n = calls.get();
        async move {
            if n <= failures {
                Err(anyhow::anyhow!("transient failure {}", n))
            } else {
                Ok("done")
            }
        }
    }

    /// Paused-clock timers resolve to the millisecond, so allow one tick of slack.
    fn assert_delays(start: Instant, count: u32) {
        let elapsed = start.elapsed();
        let expected = RetryPolicy::default().delay * count;
        assert!(
            elapsed >= expected && elapsed <= expected + Duration::from_millis(1),
            "expected {:?} of delay, got {:?}",
            expected,
            elapsed
        );
    }

    #[test]
    fn test_default_policy_matches_reference_constants() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay, Duration::from_secs(5));
    }

    #[test]
    fn test_policy_from_config_never_zero_attempts() {
        let config = RetryConfig {
            max_attempts: 0,
            delay_seconds: 2,
        };
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.delay, Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt_after_two_delays() {
        let calls = Cell::new(0);
        let start = Instant::now();

        let result = with_retry(&RetryPolicy::default(), Stage::ProjectList, "target 0", || {
            flaky(&calls, 2)
        })
        .await;

        assert_eq!(assert_ok!(result), "done");
        assert_eq!(calls.get(), 3);
        assert_delays(start, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_stage_failure() {
        let calls = Cell::new(0);
        let start = Instant::now();

        let result = with_retry(
            &RetryPolicy::default(),
            Stage::Experiment,
            "experiment 99",
            || flaky(&calls, u32::MAX),
        )
        .await;

        let err = assert_err!(result);
        assert_eq!(calls.get(), 3);
        assert_delays(start, 2);
        match err {
            PipelineError::StageFailure {
                stage,
                key,
                attempts,
                source,
            } => {
                assert_eq!(stage, Stage::Experiment);
                assert_eq!(key, "experiment 99");
                assert_eq!(attempts, 3);
                assert!(source.to_string().contains("transient failure 3"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_success_does_not_sleep() {
        let calls = Cell::new(0);
        let start = Instant::now();

        let result = with_retry(&RetryPolicy::default(), Stage::Delivery, "#ab", || {
            flaky(&calls, 0)
        })
        .await;

        assert_ok!(result);
        assert_eq!(calls.get(), 1);
        assert_delays(start, 0);
    }
}
