use std::thread;
use std::time::Duration;

use crate::error::RemoteError;

/// Bounded retry with exponential backoff for transient remote failures.
/// Rate limits (429), transport errors and 5xx are retried; everything else
/// fails immediately.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    pub fn run<T>(
        &self,
        mut op: impl FnMut() -> Result<T, RemoteError>,
    ) -> Result<T, RemoteError> {
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_attempts.max(1) || !err.is_retryable() {
                        return Err(err);
                    }
                    let delay = self.base_delay * 2u32.saturating_pow(attempt - 1);
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                }
            }
        }
    }
}
