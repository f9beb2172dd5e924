//! Per-simulation protocol configuration.
//!
//! Every node receives its own copy of [`ProtocolConfig`] at construction, so
//! simulations with different feature toggles can run side by side (for
//! example in parallel tests) without sharing any global switch.
//!
//! # Example
//!
//! ```
//! use desync::ProtocolConfig;
//!
//! let config = ProtocolConfig::default()
//!     .with_period(2000)
//!     .with_alpha(30)
//!     .with_clamping(false);
//! assert!(config.validate().is_ok());
//!
//! let bad = ProtocolConfig::default().with_alpha(120);
//! assert!(bad.validate().is_err());
//! ```

use thiserror::Error;

use crate::time::Duration;
use crate::types::{
    DEFAULT_ALPHA, DEFAULT_JITTER_BOUND, DEFAULT_PERIOD, DEFAULT_TOLERANCE_PER_MILLE, MAX_ALPHA,
    MAX_PERIOD, PER_MILLE,
};

/// Invalid protocol constants, detected before the simulation starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("period must be positive")]
    ZeroPeriod,
    #[error("period {0} does not fit signed tick arithmetic")]
    PeriodTooLarge(u64),
    #[error("alpha must be within 0..=100, got {0}")]
    AlphaOutOfRange(u8),
    #[error("jitter bound {jitter} must be smaller than the period {period}")]
    JitterTooLarge { jitter: u64, period: u64 },
    #[error("tolerance must be within 0..=1000 per mille, got {0}")]
    ToleranceOutOfRange(u32),
}

/// Protocol constants and feature toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// Nominal broadcast interval in ticks.
    pub period: u64,
    /// Maximum magnitude of the random perturbation added to every timer.
    pub jitter_bound: u64,
    /// Blend weight toward the rebalance target, in percent.
    pub alpha: u8,
    /// Toggles path-vector propagation and loop detection.
    pub path_vector_enabled: bool,
    /// Toggles the successor-based upper bound on rebalance targets.
    pub clamping_enabled: bool,
    /// Slack (per mille of `period`) under which a share shortfall is ignored.
    pub tolerance_per_mille: u32,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD,
            jitter_bound: DEFAULT_JITTER_BOUND,
            alpha: DEFAULT_ALPHA,
            path_vector_enabled: true,
            clamping_enabled: true,
            tolerance_per_mille: DEFAULT_TOLERANCE_PER_MILLE,
        }
    }
}

impl ProtocolConfig {
    pub fn with_period(mut self, period: u64) -> Self {
        self.period = period;
        self
    }

    pub fn with_jitter_bound(mut self, jitter_bound: u64) -> Self {
        self.jitter_bound = jitter_bound;
        self
    }

    pub fn with_alpha(mut self, alpha: u8) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_path_vector(mut self, enabled: bool) -> Self {
        self.path_vector_enabled = enabled;
        self
    }

    pub fn with_clamping(mut self, enabled: bool) -> Self {
        self.clamping_enabled = enabled;
        self
    }

    pub fn with_tolerance_per_mille(mut self, tolerance: u32) -> Self {
        self.tolerance_per_mille = tolerance;
        self
    }

    /// Period as a [`Duration`].
    pub fn period(&self) -> Duration {
        Duration::from_ticks(self.period)
    }

    /// Check every constant. Must pass before any node is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.period == 0 {
            return Err(ConfigError::ZeroPeriod);
        }
        if self.period > MAX_PERIOD {
            return Err(ConfigError::PeriodTooLarge(self.period));
        }
        if self.alpha > MAX_ALPHA {
            return Err(ConfigError::AlphaOutOfRange(self.alpha));
        }
        // Jitter as large as the period could schedule a timer in the past.
        if self.jitter_bound >= self.period {
            return Err(ConfigError::JitterTooLarge {
                jitter: self.jitter_bound,
                period: self.period,
            });
        }
        if self.tolerance_per_mille > PER_MILLE {
            return Err(ConfigError::ToleranceOutOfRange(self.tolerance_per_mille));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = ProtocolConfig::default();
        assert_eq!(config.period, 1000);
        assert_eq!(config.jitter_bound, 10);
        assert_eq!(config.alpha, 50);
        assert!(config.path_vector_enabled);
        assert!(config.clamping_enabled);
        assert_eq!(config.tolerance_per_mille, 1);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_zero_period_rejected() {
        let config = ProtocolConfig::default().with_period(0).with_jitter_bound(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroPeriod));
    }

    #[test]
    fn test_period_must_fit_signed_ticks() {
        let config = ProtocolConfig::default().with_period(u64::MAX);
        assert_eq!(
            config.validate(),
            Err(ConfigError::PeriodTooLarge(u64::MAX))
        );
        let config = ProtocolConfig::default().with_period(i64::MAX as u64 + 1);
        assert!(config.validate().is_err());
        assert!(config.with_period(i64::MAX as u64).validate().is_ok());
    }

    #[test]
    fn test_alpha_bounds() {
        assert!(ProtocolConfig::default().with_alpha(0).validate().is_ok());
        assert!(ProtocolConfig::default().with_alpha(100).validate().is_ok());
        assert_eq!(
            ProtocolConfig::default().with_alpha(101).validate(),
            Err(ConfigError::AlphaOutOfRange(101))
        );
    }

    #[test]
    fn test_jitter_must_be_below_period() {
        let config = ProtocolConfig::default()
            .with_period(50)
            .with_jitter_bound(50);
        assert_eq!(
            config.validate(),
            Err(ConfigError::JitterTooLarge {
                jitter: 50,
                period: 50
            })
        );
        assert!(config.with_jitter_bound(49).validate().is_ok());
    }

    #[test]
    fn test_tolerance_bounds() {
        let config = ProtocolConfig::default().with_tolerance_per_mille(1001);
        assert_eq!(
            config.validate(),
            Err(ConfigError::ToleranceOutOfRange(1001))
        );
    }
}
