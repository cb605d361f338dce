//! Bounded exponential backoff for game-server calls.
//!
//! Only [`GameError::is_transient`] failures are retried. Each wait goes
//! through [`ShutdownSignal::pause`], so a shutdown request ends the retry
//! loop immediately with the last error.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::config::GameConfig;
use crate::game::GameError;
use crate::shutdown::ShutdownSignal;

/// Retry limits for one kind of call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Delay before the second attempt.
    pub base: Duration,
    /// Upper bound on any single delay.
    pub max: Duration,
}

impl RetryPolicy {
    /// Policy from the game-server section of the configuration.
    pub const fn from_config(config: &GameConfig) -> Self {
        Self {
            attempts: config.retry_attempts,
            base: Duration::from_millis(config.retry_base_ms),
            max: Duration::from_millis(config.retry_max_ms),
        }
    }

    /// Delay after failed attempt number `attempt` (1-based), with jitter in
    /// the upper half of the exponential step.
    pub fn delay_for(&self, attempt: u32, rng: &mut impl Rng) -> Duration {
        let base_ms = u64::try_from(self.base.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.max.as_millis()).unwrap_or(u64::MAX);
        let step = 2_u64.saturating_pow(attempt.saturating_sub(1));
        let delay_ms = base_ms.saturating_mul(step).min(max_ms);
        let floor_ms = delay_ms.saturating_div(2);
        Duration::from_millis(rng.random_range(floor_ms..=delay_ms))
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        shutdown: &ShutdownSignal,
        mut op: F,
    ) -> Result<T, GameError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GameError>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1_u32;
        loop {
            let error = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            if !error.is_transient() || attempt >= attempts {
                return Err(error);
            }
            let delay = self.delay_for(attempt, &mut rand::rng());
            warn!(
                operation,
                attempt,
                max_attempts = attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "game server call failed, retrying"
            );
            if !shutdown.pause(delay).await {
                return Err(error);
            }
            attempt = attempt.saturating_add(1);
        }
    }
}
