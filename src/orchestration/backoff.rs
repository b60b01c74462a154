//! # Backoff Calculator
//!
//! Delay between a failed attempt and the step's return to `ready`.
//!
//! A server-requested delay (`ProviderError::RateLimited { retry_after }`) takes precedence
//! over exponential backoff; both are capped by the configured maximum.

use crate::config::BackoffConfig;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffCalculator {
    base_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
}

impl BackoffCalculator {
    pub fn new(config: &BackoffConfig) -> Self {
        Self {
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
            multiplier: config.multiplier,
        }
    }

    /// Delay after the given (1-based) failed attempt
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(requested) = retry_after {
            return requested.min(self.max_delay);
        }
        self.exponential_delay(attempt)
    }

    /// `base * multiplier^(attempt - 1)`, capped
    pub fn exponential_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.multiplier.powi(exponent);
        let millis = self.base_delay.as_millis() as f64 * factor;
        let max_millis = self.max_delay.as_millis() as f64;

        if !millis.is_finite() || millis >= max_millis {
            self.max_delay
        } else {
            Duration::from_millis(millis as u64)
        }
    }
}

impl Default for BackoffCalculator {
    fn default() -> Self {
        Self::new(&BackoffConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_growth_is_capped() {
        let calculator = BackoffCalculator::default();
        assert_eq!(calculator.delay_for(1, None), Duration::from_secs(1));
        assert_eq!(calculator.delay_for(2, None), Duration::from_secs(2));
        assert_eq!(calculator.delay_for(4, None), Duration::from_secs(8));
        assert_eq!(calculator.delay_for(40, None), Duration::from_secs(300));
        assert_eq!(calculator.delay_for(u32::MAX, None), Duration::from_secs(300));
    }

    #[test]
    fn test_server_requested_delay_overrides() {
        let calculator = BackoffCalculator::default();
        assert_eq!(
            calculator.delay_for(3, Some(Duration::from_secs(12))),
            Duration::from_secs(12)
        );
        assert_eq!(
            calculator.delay_for(1, Some(Duration::from_secs(3600))),
            Duration::from_secs(300)
        );
    }
}
