use std::future::Future;
use std::time::Duration;

use tracing::info;

/// Fixed-count, fixed-delay retry of a failed batch send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// The `retries`-th retry succeeded.
    Recovered { retries: u32 },
    /// Every retry failed. The caller decides what that means for the process.
    Exhausted { retries: u32 },
}

impl RetryPolicy {
    /// Sleeps `delay` before each attempt and stops at the first success.
    ///
    /// `attempt` receives the 1-based retry number and reports success.
    pub async fn run<F, Fut>(&self, mut attempt: F) -> RetryOutcome
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = bool>,
    {
        for n in 1..=self.retries {
            tokio::time::sleep(self.delay).await;
            info!(retry_attempt = n, "retrying batch");
            if attempt(n).await {
                return RetryOutcome::Recovered { retries: n };
            }
        }
        RetryOutcome::Exhausted {
            retries: self.retries,
        }
    }
}
