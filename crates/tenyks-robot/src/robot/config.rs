//! Orchestrator timing configuration.

use std::time::Duration;

use tenyks_core::config::{ReconnectSettings, RobotSettings};

/// Timings and shutdown behaviour of the [`Robot`](super::Robot).
#[derive(Debug, Clone)]
pub struct RobotConfig {
    /// How long to wait for the first bytes after a (re)connect.
    pub greeting_timeout: Duration,
    /// Silence after which a connection is re-established.
    pub stale_after: Duration,
    /// Bounded wait on a connection's inbound queue per loop iteration.
    pub read_wait: Duration,
    /// How long shutdown waits for supervising tasks before aborting them.
    pub shutdown_grace: Duration,
    /// Sent with `QUIT` on every connection at shutdown.
    pub quit_message: String,
    /// Backoff between failed re-establishment attempts.
    pub reconnect: ReconnectPolicy,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self::from(&RobotSettings::default())
    }
}

impl From<&RobotSettings> for RobotConfig {
    fn from(settings: &RobotSettings) -> Self {
        Self {
            greeting_timeout: Duration::from_secs(settings.greeting_timeout_secs),
            stale_after: Duration::from_secs(settings.stale_after_secs),
            read_wait: Duration::from_secs(settings.read_wait_secs),
            shutdown_grace: Duration::from_secs(settings.shutdown_grace_secs),
            quit_message: settings.quit_message.clone(),
            reconnect: ReconnectPolicy::from(&settings.reconnect),
        }
    }
}

/// Exponential backoff. There is no attempt limit: a connection is retried
/// for as long as the process runs.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each failed attempt.
    pub multiplier: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from(&ReconnectSettings::default())
    }
}

impl From<&ReconnectSettings> for ReconnectPolicy {
    fn from(settings: &ReconnectSettings) -> Self {
        Self {
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            multiplier: settings.multiplier,
        }
    }
}

impl ReconnectPolicy {
    /// Calculate the delay for a given attempt number (0-indexed).
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap
    )]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let exponent = attempt.min(64) as i32;
        let delay_ms = base_ms * self.multiplier.powi(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms.max(0.0) as u64)
    }
}
