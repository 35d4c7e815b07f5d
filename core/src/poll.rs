//! Bounded, cancellable polling.

use std::time::Duration;

use securevault_config::RelayerConfig;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Fixed-interval retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn from_config(config: &RelayerConfig) -> Self {
        Self::new(
            Duration::from_millis(config.poll_interval_ms),
            config.poll_max_attempts,
        )
    }

    /// Longest time a poll can run before giving up. Saturates.
    pub fn ceiling(&self) -> Duration {
        self.interval
            .checked_mul(self.max_attempts)
            .unwrap_or(Duration::MAX)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from_config(&RelayerConfig::default())
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollError {
    #[error("poll cancelled")]
    Cancelled,

    #[error("gave up after {attempts} attempts")]
    Exhausted { attempts: u32 },
}

/// Probe until it yields a value, waiting `interval` between attempts.
///
/// The probe runs immediately, then at most `max_attempts - 1` more times.
/// Cancellation is observed before every probe and during every wait.
pub async fn poll_until<T, F>(
    cancel: &CancellationToken,
    policy: PollPolicy,
    mut probe: F,
) -> Result<T, PollError>
where
    F: FnMut() -> Option<T>,
{
    let mut attempts = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(PollError::Cancelled);
        }
        if let Some(value) = probe() {
            return Ok(value);
        }
        attempts += 1;
        if attempts >= policy.max_attempts {
            return Err(PollError::Exhausted { attempts });
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            _ = tokio::time::sleep(policy.interval) => {}
        }
    }
}
