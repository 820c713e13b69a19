use std::time::Duration;

use tokio::time::sleep;

use crate::prelude::*;

/// Lock contention did not go away after all the attempts.
#[derive(Debug, thiserror::Error)]
#[error("lock contention persisted after {attempts} attempts")]
pub struct Contention {
    pub attempts: u32,
}

/// Exponential backoff for transient write failures.
#[must_use]
#[derive(Copy, Clone, Debug)]
pub struct Backoff {
    pub n_attempts: u32,

    /// Delay before the second attempt, doubled for each next one.
    pub base_delay: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self { n_attempts: 6, base_delay: Duration::from_millis(500) }
    }
}

impl Backoff {
    pub fn delay(&self, n_failed_attempts: u32) -> Duration {
        self.base_delay * 2_u32.saturating_pow(n_failed_attempts.saturating_sub(1))
    }

    /// Run the operation until it succeeds, fails permanently, or the attempts are exhausted.
    ///
    /// Exhaustion is reported with [`Contention`] attached to the last error.
    pub async fn retry<T, F, Fut>(
        &self,
        is_transient: impl Fn(&Error) -> bool,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut n_failed_attempts = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if is_transient(&error) => {
                    n_failed_attempts += 1;
                    if n_failed_attempts >= self.n_attempts {
                        return Err(error.context(Contention { attempts: n_failed_attempts }));
                    }
                    let delay = self.delay(n_failed_attempts);
                    warn!(n_failed_attempts, ?delay, "transient failure, retrying: {error:#}");
                    sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
