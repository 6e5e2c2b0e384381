use crate::executor::Cancellation;
use crate::types::WriteOp;
use crate::{Error, Result};

use rand::Rng;
use serde::Deserialize;
use std::future::Future;
use tokio::time::{sleep, Duration};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    #[serde(rename = "base_delay_ms", with = "millis")]
    pub base_delay: Duration,
    #[serde(rename = "max_delay_ms", with = "millis")]
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(20),
            max_attempts: 10,
        }
    }
}

impl RetryPolicy {
    /// `min(base * 2^attempt, max)`, before jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as u64;
        let delay = base.saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_millis(delay.min(self.max_delay.as_millis() as u64))
    }

    /// Adds up to half the delay again so concurrent workers spread their resubmissions.
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay(attempt);
        let spread = delay.as_millis() as u64 / 2;
        let jitter = rand::rng().random_range(0..=spread);
        delay + Duration::from_millis(jitter)
    }
}

/// Result of one submission: whatever the store did not take.
#[derive(Debug, Default)]
pub struct Attempt {
    pub unprocessed: Vec<WriteOp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryOutcome {
    pub processed: usize,
    pub attempts: u32,
}

#[derive(Debug)]
struct RetryState {
    attempt: u32,
    elapsed: Duration,
    pending: Vec<WriteOp>,
}

#[derive(Debug, Clone, Default)]
pub struct BackoffRetrier {
    policy: RetryPolicy,
    cancellation: Cancellation,
}

impl BackoffRetrier {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            cancellation: Cancellation::none(),
        }
    }

    pub fn set_cancellation(self, cancellation: Cancellation) -> Self {
        Self {
            cancellation,
            ..self
        }
    }

    /// Submits `entries` and resubmits the unprocessed remainder until none is left.
    ///
    /// Transient remote errors count as an attempt that processed nothing. Any other
    /// error is returned at once.
    pub async fn execute<F, Fut>(
        &self,
        entries: Vec<WriteOp>,
        mut operation: F,
    ) -> Result<RetryOutcome>
    where
        F: FnMut(Vec<WriteOp>) -> Fut,
        Fut: Future<Output = Result<Attempt>>,
    {
        let submitted = entries.len();
        let mut state = RetryState {
            attempt: 0,
            elapsed: Duration::ZERO,
            pending: entries,
        };

        while !state.pending.is_empty() {
            if state.attempt >= self.policy.max_attempts {
                return Err(Error::ThrottleExhausted {
                    attempts: state.attempt,
                    unprocessed: state.pending,
                });
            }

            if state.attempt > 0 {
                let delay = self.policy.jittered_delay(state.attempt - 1);
                warn!(
                    "{} unprocessed entries, retrying in {:?} (attempt {})",
                    state.pending.len(),
                    delay,
                    state.attempt + 1
                );

                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = self.cancellation.cancelled() => {
                        return Err(Error::Cancelled { unprocessed: state.pending });
                    }
                }

                state.elapsed += delay;
            }

            state.attempt += 1;

            match operation(state.pending.clone()).await {
                Ok(attempt) => state.pending = attempt.unprocessed,
                Err(err) if err.is_transient() => warn!("{err}"),
                Err(err) => return Err(err),
            }
        }

        if state.attempt > 1 {
            warn!(
                "Processed {submitted} entries after {} attempts and {:?} of backoff",
                state.attempt, state.elapsed
            );
        }

        Ok(RetryOutcome {
            processed: submitted,
            attempts: state.attempt,
        })
    }
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
