//! Detection of overloaded and underloaded hosts.

use dyn_clone::{clone_trait_object, DynClone};

use crate::core::common::HostId;
use crate::core::config::{parse_config_value, ComponentOptions};
use crate::core::errors::ConfigError;
use crate::core::host::Host;
use crate::core::overload_detectors::dynamic_threshold::DynamicThreshold;
use crate::core::overload_detectors::static_threshold::StaticThreshold;
use crate::core::resource_pool::ResourcePool;
use crate::core::statistics::{DispersionMeasure, InterQuartileRange, MedianAbsoluteDeviation};

/// Trait for implementation of host overload detectors.
///
/// The detector provides the utilization thresholds, the classification itself compares the current CPU utilization
/// of a host (requested MIPS of all VMs placed on it, temporary ones and incoming migrations included) with them.
pub trait OverloadDetector: DynClone {
    /// Returns the utilization above which the host is considered overloaded.
    fn over_utilization_threshold(&self, host: &Host) -> f64;

    /// Returns the utilization below which the host is considered underloaded.
    fn under_utilization_threshold(&self) -> f64;

    fn is_host_overloaded(&self, pool: &ResourcePool, host_id: HostId) -> bool {
        pool.host_cpu_utilization(host_id) > self.over_utilization_threshold(pool.host(host_id))
    }

    /// Checks if the host can be switched off by migrating all its VMs away.
    ///
    /// Hosts receiving VMs and hosts whose VMs are all migrating out already are never underloaded.
    fn is_host_underloaded(&self, pool: &ResourcePool, host_id: HostId) -> bool {
        let host = pool.host(host_id);
        if !host.vms_migrating_in().is_empty() {
            return false;
        }
        if !host.vms().is_empty() && host.vms().iter().all(|vm_id| host.vms_migrating_out().contains(vm_id)) {
            return false;
        }
        pool.host_cpu_utilization(host_id) < self.under_utilization_threshold()
    }
}

clone_trait_object!(OverloadDetector);

/// Creates overload detector from config string, e.g. `DynamicThreshold[statistic=iqr,safety=1.5]`.
pub fn overload_detector_resolver(config_str: &str) -> Result<Box<dyn OverloadDetector>, ConfigError> {
    let (name, options_str) = parse_config_value(config_str);
    let options = ComponentOptions::new(&name, options_str.as_deref());
    match name.as_str() {
        "StaticThreshold" => Ok(Box::new(static_threshold_from_options(&options)?)),
        "DynamicThreshold" => {
            let statistic: String = options.get_or("statistic", "mad".to_string())?;
            let measure: Box<dyn DispersionMeasure> = match statistic.as_str() {
                "mad" => Box::new(MedianAbsoluteDeviation),
                "iqr" => Box::new(InterQuartileRange),
                _ => {
                    return Err(ConfigError::UnknownComponent {
                        kind: "dispersion statistic",
                        name: statistic,
                    })
                }
            };
            let fallback = static_threshold_from_options(&options)?;
            let detector = DynamicThreshold::new(options.get_or("safety", 2.5)?, measure, Box::new(fallback))?
                .with_min_samples(options.get_or("min_samples", DynamicThreshold::DEFAULT_MIN_SAMPLES)?);
            Ok(Box::new(detector))
        }
        _ => Err(ConfigError::UnknownComponent {
            kind: "overload detector",
            name,
        }),
    }
}

fn static_threshold_from_options(options: &ComponentOptions) -> Result<StaticThreshold, ConfigError> {
    StaticThreshold::new(
        options.get_or("over", StaticThreshold::DEFAULT_OVER)?,
        options.get_or("under", StaticThreshold::DEFAULT_UNDER)?,
    )
}
