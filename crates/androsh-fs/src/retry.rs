//! Bounded retry with exponential backoff.

use std::fmt::Display;
use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::backend::HashAlgorithm;
use crate::error::FsError;
use crate::selector::BackendSelector;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first; `0` is treated as `1`.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// `attempts` tries with no waiting in between.
    pub fn immediate(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay after failed attempt `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let scaled = self.initial_backoff.as_nanos() as f64 * self.multiplier.max(1.0).powi(exponent);
        if scaled >= self.max_backoff.as_nanos() as f64 {
            return self.max_backoff;
        }
        Duration::from_nanos(scaled.round() as u64)
    }

    /// Call `op` with the 1-based attempt number until it succeeds or the
    /// attempts run out; the last error is returned.
    pub fn run<T, E: Display>(&self, mut op: impl FnMut(u32) -> Result<T, E>) -> Result<T, E> {
        let total = self.attempts();
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= total => return Err(err),
                Err(err) => {
                    let delay = self.backoff(attempt);
                    warn!("attempt {attempt}/{total} failed: {err}; retrying in {delay:?}");
                    thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}

/// Check `path` against `expected`; on mismatch call `refetch` and check
/// again, within `policy`'s attempt budget.
pub fn verify_with_retry<F, E>(
    selector: &BackendSelector,
    path: &str,
    expected: &str,
    algorithm: HashAlgorithm,
    policy: &RetryPolicy,
    mut refetch: F,
) -> Result<(), FsError>
where
    F: FnMut(u32) -> Result<(), E>,
    E: Display,
{
    policy.run(|attempt| {
        if attempt > 1 {
            refetch(attempt).map_err(|err| FsError::Refetch(err.to_string()))?;
        }
        match selector.checksum(path, algorithm) {
            Some(actual) if actual.eq_ignore_ascii_case(expected.trim()) => Ok(()),
            actual => Err(FsError::ChecksumMismatch {
                path: path.to_string(),
                expected: expected.trim().to_ascii_lowercase(),
                actual,
                attempts: attempt,
            }),
        }
    })
}
