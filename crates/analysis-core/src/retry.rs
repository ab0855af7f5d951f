use std::future::Future;
use std::time::Duration;

use crate::AnalysisError;

/// Bounded retry with exponential backoff for external calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero is treated as one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(2),
            multiplier: 1.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, multiplier: f64) -> Self {
        Self { max_attempts, initial_backoff, multiplier }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, 1.0)
    }

    /// Delay slept after the failed attempt `attempt` (0-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(0.0).powi(attempt as i32);
        self.initial_backoff.mul_f64(factor)
    }

    /// Run `op` until it succeeds or the attempts are used up, returning the last error.
    pub async fn run<T, F, Fut>(&self, label: &str, op: F) -> Result<T, AnalysisError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AnalysisError>>,
    {
        self.run_if(label, |_| true, op).await
    }

    /// Like `run`, but an error for which `retryable` is false is returned at once.
    pub async fn run_if<T, F, Fut, P>(&self, label: &str, retryable: P, mut op: F) -> Result<T, AnalysisError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AnalysisError>>,
        P: Fn(&AnalysisError) -> bool,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt + 1 >= attempts || !retryable(&e) => return Err(e),
                Err(e) => {
                    let wait = self.backoff_for(attempt);
                    tracing::debug!(
                        "{} failed (attempt {}/{}): {}, retrying in {:.1}s",
                        label,
                        attempt + 1,
                        attempts,
                        e,
                        wait.as_secs_f64()
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }
}
