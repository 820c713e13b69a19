use std::time::Duration;

use tokio::time::{Instant, sleep, timeout_at};

use crate::prelude::*;

/// Bounded poll for a backend that may not be ready yet.
#[must_use]
#[derive(Copy, Clone, Debug)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(60), interval: Duration::from_secs(2) }
    }
}

impl WaitPolicy {
    /// Probe until it succeeds or the timeout elapses, whichever comes first.
    ///
    /// Returns `None` on timeout.
    pub async fn poll<T, F, Fut>(&self, mut probe: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let deadline = Instant::now() + self.timeout;
        let mut n_attempts = 0_u32;
        loop {
            n_attempts += 1;
            match timeout_at(deadline, probe()).await {
                Ok(Ok(value)) => return Some(value),
                Ok(Err(error)) => {
                    debug!(n_attempts, "not ready yet: {error:#}");
                }
                Err(_) => {
                    warn!(n_attempts, timeout = ?self.timeout, "gave up waiting");
                    return None;
                }
            }
            if Instant::now() + self.interval >= deadline {
                warn!(n_attempts, timeout = ?self.timeout, "gave up waiting");
                return None;
            }
            sleep(self.interval).await;
        }
    }
}
