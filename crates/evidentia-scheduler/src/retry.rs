//! Retry convention for scheduled units of work.
//!
//! Each unit (one chain reseal, one tier move) is retried on retryable
//! errors with a fixed backoff schedule, within an overall time budget.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tracing::warn;

use evidentia_contracts::error::{EvResult, EvidentiaError};
use evidentia_core::config::JobSettings;

/// How the runner waits between attempts.
pub type Sleeper = Arc<dyn Fn(Duration) + Send + Sync>;

#[derive(Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,

    /// Delay before each retry; the last value repeats.
    pub backoff: Vec<Duration>,

    pub timeout: Duration,
    sleeper: Sleeper,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for RetryPolicy {
    /// Three attempts, 1m / 5m / 15m apart, five minutes overall.
    fn default() -> Self {
        Self::from_settings(&JobSettings::default())
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Vec<Duration>, timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            timeout,
            sleeper: Arc::new(std::thread::sleep),
        }
    }

    pub fn from_settings(settings: &JobSettings) -> Self {
        Self::new(
            settings.max_attempts,
            settings.backoff_secs.iter().map(|s| Duration::from_secs(*s)).collect(),
            Duration::from_secs(settings.timeout_secs),
        )
    }

    /// `max_attempts` tries with no waiting in between.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Vec::new(), Duration::from_secs(300))
    }

    pub fn with_sleeper(mut self, sleeper: Sleeper) -> Self {
        self.sleeper = sleeper;
        self
    }

    fn delay_for(&self, retry: usize) -> Duration {
        self.backoff
            .get(retry)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or_default()
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts or time budget run out.  The last error is returned.
    pub fn run<T, F>(&self, unit: &str, mut op: F) -> EvResult<T>
    where
        F: FnMut() -> EvResult<T>,
    {
        let started = Instant::now();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err: EvidentiaError = match op() {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            let delay = self.delay_for((attempt - 1) as usize);
            if !err.is_retryable()
                || attempt >= self.max_attempts
                || started.elapsed() + delay > self.timeout
            {
                return Err(err);
            }
            warn!(unit, attempt, ?delay, error = %err, "job unit failed, retrying");
            (self.sleeper)(delay);
        }
    }
}
