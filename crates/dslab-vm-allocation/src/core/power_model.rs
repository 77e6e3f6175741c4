//! Physical host power consumption models.

use dyn_clone::{clone_trait_object, DynClone};

/// Power model is a function, which computes the power consumption of a physical host
/// based on its current CPU utilization and simulation time.
///
/// A host with zero utilization is assumed to be switched off, so all models return zero power in this case.
pub trait PowerModel: DynClone {
    /// Returns the current power consumption of a physical host.
    ///
    /// * `time` - current simulation time.
    /// * `utilization` - current host CPU utilization (0-1).
    fn get_power(&self, time: f64, utilization: f64) -> f64;
}

clone_trait_object!(PowerModel);

/// A power model with constant power consumption value.
#[derive(Clone)]
pub struct ConstantPowerModel {
    power: f64,
}

impl ConstantPowerModel {
    pub fn new(power: f64) -> Self {
        Self { power }
    }
}

impl PowerModel for ConstantPowerModel {
    fn get_power(&self, _time: f64, utilization: f64) -> f64 {
        if utilization == 0. {
            return 0.;
        }
        self.power
    }
}

/// A power model based on linear interpolation between the idle and maximum power consumption values.
#[derive(Clone)]
pub struct LinearPowerModel {
    idle_power: f64,
    factor: f64,
}

impl LinearPowerModel {
    /// Creates linear power model with specified parameters.
    ///
    /// * `max_power` - The maximum power consumption (at 100% utilization).
    /// * `idle_power` - The power consumption of switched on but idle host.
    pub fn new(max_power: f64, idle_power: f64) -> Self {
        Self {
            idle_power,
            factor: max_power - idle_power,
        }
    }
}

impl PowerModel for LinearPowerModel {
    fn get_power(&self, _time: f64, utilization: f64) -> f64 {
        if utilization == 0. {
            return 0.;
        }
        self.idle_power + self.factor * utilization.min(1.)
    }
}

/// A power model based on non-linear interpolation between the idle and maximum power consumption values.
/// Current power consumption is computed as P_curr = P_idle + (P_full - P_idle) * (2 * u - u ^ 1.4)
///
/// Priya, B., Pilli, E. S., & Joshi, R. C. (2013).
/// A survey on energy and power consumption models for Greener Cloud.
/// 2013 3rd IEEE International Advance Computing Conference (IACC).
#[derive(Clone)]
pub struct UtilizationAwarePowerModel {
    idle_power: f64,
    factor: f64,
}

impl UtilizationAwarePowerModel {
    pub fn new(max_power: f64, idle_power: f64) -> Self {
        Self {
            idle_power,
            factor: max_power - idle_power,
        }
    }
}

impl PowerModel for UtilizationAwarePowerModel {
    fn get_power(&self, _time: f64, utilization: f64) -> f64 {
        if utilization == 0. {
            return 0.;
        }
        let u = utilization.min(1.);
        self.idle_power + self.factor * (2. * u - u.powf(1.4))
    }
}
