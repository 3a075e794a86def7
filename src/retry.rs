//! Bounded retry for optimistic-concurrency conflicts.
//!
//! Every read-modify-write against the document store runs inside
//! [`Retry::run`]: a lost compare-and-swap re-runs the whole operation after
//! a backoff delay, and gives up with
//! [`Error::ConflictRetriesExhausted`](crate::Error::ConflictRetriesExhausted)
//! once `max_attempts` runs have all conflicted.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Retry policy for conflicting writes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Retry {
    /// Total runs, including the first. Zero behaves like one.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

/// Delay between runs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Backoff {
    #[default]
    None,
    Fixed { delay: Duration },
    /// `initial * 2^attempt`, capped at `max`, scaled by a factor in
    /// `[1 - jitter, 1 + jitter]`.
    Exponential {
        initial: Duration,
        max: Duration,
        jitter: f64,
    },
}

impl Default for Retry {
    /// Five runs, 10 ms doubling to at most 200 ms, 25% jitter.
    fn default() -> Self {
        Retry::exponential(5).build()
    }
}

impl Retry {
    /// A single run, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Backoff::None,
        }
    }

    pub fn fixed(attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: attempts,
            backoff: Backoff::Fixed { delay },
        }
    }

    pub fn exponential(attempts: u32) -> RetryBuilder {
        RetryBuilder {
            max_attempts: attempts,
            ..Default::default()
        }
    }

    /// Delay after failed run number `attempt` (zero-based).
    pub fn compute_delay(&self, attempt: u32) -> Duration {
        match &self.backoff {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed { delay } => *delay,
            Backoff::Exponential { initial, max, jitter } => {
                let multiplier = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
                let capped = initial.saturating_mul(multiplier).min(*max);
                Duration::from_secs_f64(capped.as_secs_f64() * jitter_factor(*jitter))
            }
        }
    }

    /// Run `op` until it succeeds, fails with something other than a
    /// conflict, or conflicts `max_attempts` times. `key` names the
    /// contended document in logs and in the terminal error.
    pub async fn run<T, F, Fut>(&self, key: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match op().await {
                Err(err) if err.is_conflict() => {
                    attempt += 1;
                    if attempt >= attempts {
                        tracing::warn!(target: "netloc::store", { store.key = key, attempts }, "conflict retries exhausted");
                        return Err(Error::ConflictRetriesExhausted {
                            key: key.to_string(),
                            attempts,
                        }
                        .boxed());
                    }
                    let delay = self.compute_delay(attempt - 1);
                    tracing::debug!(target: "netloc::store", { store.key = key, attempt, ?delay }, "write conflict, retrying");
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                other => return other,
            }
        }
    }
}

/// Builder for exponential backoff.
#[derive(Debug)]
pub struct RetryBuilder {
    max_attempts: u32,
    initial: Duration,
    max: Duration,
    jitter: f64,
}

impl Default for RetryBuilder {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial: Duration::from_millis(10),
            max: Duration::from_millis(200),
            jitter: 0.25,
        }
    }
}

impl RetryBuilder {
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max = delay;
        self
    }

    /// Clamped to `0.0..=1.0`.
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    pub fn build(self) -> Retry {
        Retry {
            max_attempts: self.max_attempts,
            backoff: Backoff::Exponential {
                initial: self.initial,
                max: self.max,
                jitter: self.jitter,
            },
        }
    }
}

impl From<RetryBuilder> for Retry {
    fn from(builder: RetryBuilder) -> Self {
        builder.build()
    }
}

static JITTER_COUNTER: AtomicU64 = AtomicU64::new(0);

// Hash-based spread, not cryptographic randomness.
fn jitter_factor(jitter: f64) -> f64 {
    if jitter <= 0.0 {
        return 1.0;
    }
    let counter = JITTER_COUNTER.fetch_add(1, Ordering::Relaxed);
    let hash = counter.wrapping_mul(0x5851f42d4c957f2d);
    let random = (hash >> 11) as f64 / ((1u64 << 53) as f64);
    1.0 + (random - 0.5) * 2.0 * jitter
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn conflict() -> Box<Error> {
        Error::Conflict { key: "k".into() }.boxed()
    }

    #[test]
    fn test_default_policy() {
        let retry = Retry::default();
        assert_eq!(retry.max_attempts, 5);
        assert_eq!(
            retry.backoff,
            Backoff::Exponential {
                initial: Duration::from_millis(10),
                max: Duration::from_millis(200),
                jitter: 0.25
            }
        );
    }

    #[test]
    fn test_exponential_delays_capped() {
        let retry = Retry::exponential(10)
            .initial_delay(Duration::from_millis(100))
            .max_delay(Duration::from_millis(500))
            .jitter(0.0)
            .build();
        assert_eq!(retry.compute_delay(0), Duration::from_millis(100));
        assert_eq!(retry.compute_delay(2), Duration::from_millis(400));
        assert_eq!(retry.compute_delay(3), Duration::from_millis(500));
        assert_eq!(retry.compute_delay(40), Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let retry = Retry::exponential(3)
            .initial_delay(Duration::from_millis(100))
            .jitter(0.25)
            .build();
        for _ in 0..100 {
            let delay = retry.compute_delay(0);
            assert!(delay >= Duration::from_millis(74) && delay <= Duration::from_millis(126));
        }
        assert_eq!(Retry::exponential(1).jitter(7.0).build().backoff, Retry::exponential(1).jitter(1.0).build().backoff);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_retries_conflicts_then_succeeds() {
        let calls = &AtomicU32::new(0);
        let result = Retry::default()
            .run("k", || async move {
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0 | 1 => Err(conflict()),
                    n => Ok(n),
                }
            })
            .await
            .unwrap();
        assert_eq!(result, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_gives_up_after_max_attempts() {
        let calls = &AtomicU32::new(0);
        let err = Retry::fixed(4, Duration::from_millis(5))
            .run("swport-10.0.0.1-Gi1/0/1", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(conflict())
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(matches!(*err, Error::ConflictRetriesExhausted { attempts: 4, .. }));
    }

    #[tokio::test]
    async fn test_run_passes_other_errors_through() {
        let calls = &AtomicU32::new(0);
        let err = Retry::default()
            .run("k", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::validation("mac", "bad"))
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(*err, Error::Validation { .. }));
    }
}
