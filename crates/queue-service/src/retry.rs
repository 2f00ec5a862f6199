//! # Retry Policy Module
//!
//! Computes how long a failed message stays hidden before the transport
//! redelivers it.
//!
//! The default policy uses a fixed delay. An exponential policy can be used
//! instead; it is keyed on the receive count the transport reports, so no state
//! is kept between deliveries. Neither policy caps the number of attempts: the
//! queue's own redrive policy decides when a message is moved to a dead-letter
//! queue.

use serde::{Deserialize, Serialize};

/// Default delay before a failed message becomes visible again
pub const DEFAULT_RETRY_SECONDS: u32 = 120;

/// Longest visibility timeout SQS accepts (12 hours)
pub const MAX_VISIBILITY_SECONDS: u32 = 43_200;

/// Retry policy for messages whose processing failed
///
/// # Examples
///
/// ```rust
/// use queue_service::retry::RetryPolicy;
///
/// // Default policy: fixed 120 second delay
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.calculate_delay(Some(5)), 120);
///
/// // Exponential policy: 30s, 60s, 120s, ... capped at 900s
/// let policy = RetryPolicy::exponential(30, 900, 2.0);
/// assert_eq!(policy.calculate_delay(Some(3)), 120);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Delay after the first failed delivery
    pub initial_delay_seconds: u32,

    /// Maximum delay between deliveries
    pub max_delay_seconds: u32,

    /// Growth factor per delivery; 1.0 gives a fixed delay
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_RETRY_SECONDS)
    }
}

impl RetryPolicy {
    /// Same delay after every failure
    pub fn fixed(delay_seconds: u32) -> Self {
        Self {
            initial_delay_seconds: delay_seconds,
            max_delay_seconds: delay_seconds,
            backoff_multiplier: 1.0,
        }
    }

    /// Delay growing by `backoff_multiplier` with each delivery
    pub fn exponential(
        initial_delay_seconds: u32,
        max_delay_seconds: u32,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            initial_delay_seconds,
            max_delay_seconds,
            backoff_multiplier,
        }
    }

    /// A multiplier of at most 1.0, or NaN, gives a fixed delay
    pub fn is_fixed(&self) -> bool {
        self.backoff_multiplier.is_nan() || self.backoff_multiplier <= 1.0
    }

    /// Calculate the visibility delay for a failed delivery
    ///
    /// `receive_count` is the transport's delivery counter (1 on the first
    /// delivery). A missing count is treated as a first delivery.
    ///
    /// Formula: `initial * multiplier^(receive_count - 1)`, capped at the
    /// policy maximum and at [`MAX_VISIBILITY_SECONDS`].
    pub fn calculate_delay(&self, receive_count: Option<u32>) -> u32 {
        if self.is_fixed() {
            return self.initial_delay_seconds.min(MAX_VISIBILITY_SECONDS);
        }

        let cap = self.max_delay_seconds.min(MAX_VISIBILITY_SECONDS);

        let attempt = receive_count.unwrap_or(1).saturating_sub(1).min(64);
        let delay = f64::from(self.initial_delay_seconds)
            * self.backoff_multiplier.powi(attempt as i32);

        if delay.is_nan() {
            return self.initial_delay_seconds.min(cap);
        }
        if delay >= f64::from(cap) {
            cap
        } else {
            delay.round() as u32
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
