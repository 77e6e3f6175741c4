//! Dynamic threshold detector.

use crate::core::common::HostId;
use crate::core::errors::ConfigError;
use crate::core::host::Host;
use crate::core::overload_detection::OverloadDetector;
use crate::core::resource_pool::ResourcePool;
use crate::core::statistics::{non_zero_samples, DispersionMeasure};

/// Adapts the over-utilization threshold to the variability of host load:
/// `threshold = 1 - safety * dispersion(history)`.
///
/// Only non-zero history samples are taken into account. Until a host has collected enough of them the threshold is
/// infinite and the decision is made by the fallback detector, which also provides the under-utilization threshold.
#[derive(Clone)]
pub struct DynamicThreshold {
    safety: f64,
    min_samples: usize,
    measure: Box<dyn DispersionMeasure>,
    fallback: Box<dyn OverloadDetector>,
}

impl DynamicThreshold {
    pub const DEFAULT_MIN_SAMPLES: usize = 12;

    pub fn new(
        safety: f64,
        measure: Box<dyn DispersionMeasure>,
        fallback: Box<dyn OverloadDetector>,
    ) -> Result<Self, ConfigError> {
        if !(safety.is_finite() && safety >= 0.) {
            return Err(ConfigError::InvalidValue {
                name: "safety".to_string(),
                value: safety.to_string(),
            });
        }
        Ok(Self {
            safety,
            min_samples: Self::DEFAULT_MIN_SAMPLES,
            measure,
            fallback,
        })
    }

    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples.max(1);
        self
    }

    pub fn safety(&self) -> f64 {
        self.safety
    }

    pub fn fallback(&self) -> &dyn OverloadDetector {
        self.fallback.as_ref()
    }
}

impl OverloadDetector for DynamicThreshold {
    fn over_utilization_threshold(&self, host: &Host) -> f64 {
        let samples = non_zero_samples(host.utilization_history());
        if samples.len() < self.min_samples {
            return f64::INFINITY;
        }
        1. - self.safety * self.measure.dispersion(&samples)
    }

    fn under_utilization_threshold(&self) -> f64 {
        self.fallback.under_utilization_threshold()
    }

    fn is_host_overloaded(&self, pool: &ResourcePool, host_id: HostId) -> bool {
        let threshold = self.over_utilization_threshold(pool.host(host_id));
        if threshold.is_infinite() {
            return self.fallback.is_host_overloaded(pool, host_id);
        }
        pool.host_cpu_utilization(host_id) > threshold
    }

    fn is_host_underloaded(&self, pool: &ResourcePool, host_id: HostId) -> bool {
        self.fallback.is_host_underloaded(pool, host_id)
    }
}
