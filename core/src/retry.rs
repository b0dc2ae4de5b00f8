//! Exponential backoff with jitter for retriable database errors (spec.md
//! §7). Mirrors the shape of the teacher's query helpers: a thin wrapper
//! that retries the closure, not a generic retry-anything combinator.

use std::time::Duration;

use pgschema_diff_types::RetryPolicy;
use rand::Rng;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Runs `op` up to `policy.max_attempts` times, sleeping with jittered
/// exponential backoff between attempts, but only while the error reports
/// itself retriable. The first successful result or the last error wins.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation_name: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retriable() && attempt + 1 < policy.max_attempts => {
                let delay = jittered_delay(policy, attempt);
                warn!(
                    operation = operation_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retriable error, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                debug!(operation = operation_name, attempts = attempt + 1, "giving up retrying");
                return Err(err);
            }
        }
    }
}

/// `delay_for(attempt)` scaled by a uniform ±jitter_ratio factor.
fn jittered_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let base = policy.delay_for(attempt).as_secs_f64();
    let jitter = rand::thread_rng().gen_range(-policy.jitter_ratio..=policy.jitter_ratio);
    let scaled = (base * (1.0 + jitter)).max(0.0);
    Duration::from_secs_f64(scaled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry_when_first_attempt_ok() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let result = with_retry(&policy, "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Error>(42)
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_immediately_on_non_retriable_error() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&policy, "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::InvalidConfig {
                key: "x".into(),
                value: "y".into(),
                expected: "z".into(),
            })
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_up_to_max_attempts_on_retriable_error() {
        let policy = RetryPolicy {
            base: Duration::from_millis(1),
            cap: Duration::from_millis(5),
            factor: 2.0,
            jitter_ratio: 0.0,
            max_attempts: 3,
        };
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&policy, "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::ConnectionFailed("refused".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
