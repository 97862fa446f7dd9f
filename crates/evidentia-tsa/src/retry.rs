//! Bounded retries around any `TsaClient`.
//!
//! Only `TsaUnavailable` is retried.  Everything else (a malformed hash, for
//! instance) fails on the first attempt.  The wrapper gives up early if the
//! next backoff would overrun the request's time budget.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use evidentia_contracts::{
    entity::TenantId,
    error::{EvResult, EvidentiaError},
    tsa::TsaToken,
};
use evidentia_core::{config::TsaSettings, hashing, traits::TsaClient};

/// How the wrapper waits between attempts.
pub type Sleeper = Arc<dyn Fn(Duration) + Send + Sync>;

pub struct RetryingTsaClient<C> {
    inner: C,
    max_attempts: u32,
    backoff: Vec<Duration>,
    timeout: Duration,
    sleeper: Sleeper,
}

impl<C: TsaClient> RetryingTsaClient<C> {
    pub fn new(inner: C, max_attempts: u32, backoff: Vec<Duration>, timeout: Duration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            backoff,
            timeout,
            sleeper: Arc::new(std::thread::sleep),
        }
    }

    pub fn from_settings(inner: C, settings: &TsaSettings) -> Self {
        Self::new(
            inner,
            settings.max_attempts,
            settings.backoff(),
            Duration::from_secs(settings.timeout_secs),
        )
    }

    /// Replace the sleeping strategy (tests use a no-op).
    pub fn with_sleeper(mut self, sleeper: Sleeper) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Delay before retry number `retry` (0-based); the last entry repeats.
    fn delay_for(&self, retry: usize) -> Duration {
        self.backoff
            .get(retry)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or_default()
    }
}

impl<C: TsaClient> TsaClient for RetryingTsaClient<C> {
    fn authority(&self) -> &str {
        self.inner.authority()
    }

    fn request_timestamp(&self, tenant_id: TenantId, data_hash: &str) -> EvResult<TsaToken> {
        hashing::require_valid_hash(data_hash)?;

        let started = Instant::now();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.inner.request_timestamp(tenant_id, data_hash) {
                Ok(token) => {
                    if attempt > 1 {
                        debug!(attempt, authority = %self.authority(), "TSA request succeeded after retry");
                    }
                    return Ok(token);
                }
                Err(EvidentiaError::TsaUnavailable { reason, .. }) => {
                    let delay = self.delay_for((attempt - 1) as usize);
                    let out_of_attempts = attempt >= self.max_attempts;
                    let out_of_time = started.elapsed() + delay > self.timeout;
                    if out_of_attempts || out_of_time {
                        warn!(attempt, %reason, "TSA request failed, giving up");
                        return Err(EvidentiaError::TsaUnavailable {
                            attempts: attempt,
                            reason,
                        });
                    }
                    warn!(attempt, ?delay, %reason, "TSA request failed, retrying");
                    (self.sleeper)(delay);
                }
                Err(other) => return Err(other),
            }
        }
    }

    fn verify_timestamp(&self, token: &TsaToken, now: DateTime<Utc>) -> bool {
        self.inner.verify_timestamp(token, now)
    }
}
