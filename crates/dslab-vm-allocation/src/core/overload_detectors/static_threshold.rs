//! Static threshold detector.

use crate::core::errors::ConfigError;
use crate::core::host::Host;
use crate::core::overload_detection::OverloadDetector;

/// Uses fixed utilization thresholds.
#[derive(Clone, Debug)]
pub struct StaticThreshold {
    over: f64,
    under: f64,
}

impl StaticThreshold {
    pub const DEFAULT_OVER: f64 = 0.9;
    pub const DEFAULT_UNDER: f64 = 0.35;

    /// Creates detector, both thresholds must be within (0, 1) and `under` must be below `over`.
    pub fn new(over: f64, under: f64) -> Result<Self, ConfigError> {
        if !(over > 0. && over < 1.) {
            return Err(ConfigError::InvalidThreshold {
                name: "over-utilization",
                value: over,
            });
        }
        if !(under > 0. && under < 1.) {
            return Err(ConfigError::InvalidThreshold {
                name: "under-utilization",
                value: under,
            });
        }
        if under >= over {
            return Err(ConfigError::InconsistentThresholds { under, over });
        }
        Ok(Self { over, under })
    }
}

impl Default for StaticThreshold {
    fn default() -> Self {
        Self {
            over: Self::DEFAULT_OVER,
            under: Self::DEFAULT_UNDER,
        }
    }
}

impl OverloadDetector for StaticThreshold {
    fn over_utilization_threshold(&self, _host: &Host) -> f64 {
        self.over
    }

    fn under_utilization_threshold(&self) -> f64 {
        self.under
    }
}
