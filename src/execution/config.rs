//! Runner tuning knobs.

use std::time::Duration;

/// Retry and checkpoint policy for one runner instance.
///
/// The retry delay is fixed, not exponential: agent failures here are
/// dominated by transient tool flakes where waiting longer buys nothing.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Retries after the first attempt, so a step runs at most
    /// `max_retries + 1` times.
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Upper bound on a single agent invocation. A timeout counts as an
    /// ordinary failed attempt.
    pub step_timeout: Option<Duration>,
    /// Stop at Review instead of completing directly.
    pub review_checkpoint: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_delay: Duration::from_secs(1),
            step_timeout: None,
            review_checkpoint: false,
        }
    }
}
