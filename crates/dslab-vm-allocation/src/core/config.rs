//! Policy configuration.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::errors::ConfigError;
use crate::core::host::DEFAULT_HISTORY_LENGTH;

/// Holds raw policy config parsed from YAML file.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone, Default)]
struct RawPolicyConfig {
    pub overload_detector: Option<String>,
    pub vm_selection: Option<String>,
    pub host_selection: Option<String>,
    pub group_packing: Option<String>,
    pub hosts_per_switch: Option<u32>,
    pub host_search_retry_delay: Option<f64>,
    pub datacenters: Option<Vec<u32>>,
    pub utilization_history_length: Option<usize>,
    pub scheduling_interval: Option<f64>,
    pub migration_bandwidth_share: Option<f64>,
}

/// Represents configuration of VM allocation policy and of the simulation driving it.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct PolicyConfig {
    /// Overload detector, e.g. `StaticThreshold[over=0.9,under=0.35]`.
    pub overload_detector: String,
    /// Policy selecting VMs to migrate away from overloaded hosts.
    pub vm_selection: String,
    /// Strategy selecting host for a VM.
    pub host_selection: String,
    /// Heuristic used to spread best-effort placement groups across switches.
    pub group_packing: String,
    /// Number of hosts connected to a single switch.
    pub hosts_per_switch: u32,
    /// Delay in seconds before the next reoptimization attempt if no migration plan was found.
    pub host_search_retry_delay: f64,
    /// Datacenters to retry the host search in (round-robin). Empty means the current datacenter.
    pub datacenters: Vec<u32>,
    /// Number of utilization samples kept per host.
    pub utilization_history_length: usize,
    /// Duration in seconds between simulation steps.
    pub scheduling_interval: f64,
    /// Fraction of host bandwidth used for VM migration.
    pub migration_bandwidth_share: f64,
}

impl PolicyConfig {
    /// Creates policy config by reading parameter values from YAML file
    /// (uses default values if some parameters are absent).
    pub fn from_file(file_name: &str) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(file_name).map_err(|source| ConfigError::Io {
            path: file_name.to_string(),
            source,
        })?;
        Self::from_yaml_str(&data)
    }

    /// Creates policy config from YAML string.
    pub fn from_yaml_str(data: &str) -> Result<Self, ConfigError> {
        let raw: RawPolicyConfig = serde_yaml::from_str(data)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawPolicyConfig) -> Result<Self, ConfigError> {
        let config = Self {
            overload_detector: raw
                .overload_detector
                .unwrap_or_else(|| "StaticThreshold[over=0.9,under=0.35]".to_string()),
            vm_selection: raw.vm_selection.unwrap_or_else(|| "MinimumUtilization".to_string()),
            host_selection: raw.host_selection.unwrap_or_else(|| "PowerAware".to_string()),
            group_packing: raw.group_packing.unwrap_or_else(|| "PackFromEdges".to_string()),
            hosts_per_switch: raw.hosts_per_switch.unwrap_or(4),
            host_search_retry_delay: raw.host_search_retry_delay.unwrap_or(5.),
            datacenters: raw.datacenters.unwrap_or_default(),
            utilization_history_length: raw.utilization_history_length.unwrap_or(DEFAULT_HISTORY_LENGTH),
            scheduling_interval: raw.scheduling_interval.unwrap_or(300.),
            migration_bandwidth_share: raw.migration_bandwidth_share.unwrap_or(0.5),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.hosts_per_switch == 0 {
            return Err(invalid_value("hosts_per_switch", self.hosts_per_switch));
        }
        if !(self.host_search_retry_delay >= 0.) {
            return Err(invalid_value("host_search_retry_delay", self.host_search_retry_delay));
        }
        if !(self.scheduling_interval > 0.) {
            return Err(invalid_value("scheduling_interval", self.scheduling_interval));
        }
        if !(self.migration_bandwidth_share > 0. && self.migration_bandwidth_share <= 1.) {
            return Err(invalid_value("migration_bandwidth_share", self.migration_bandwidth_share));
        }
        Ok(())
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        // defaults are always valid
        match Self::from_raw(RawPolicyConfig::default()) {
            Ok(config) => config,
            Err(e) => panic!("invalid default policy config: {}", e),
        }
    }
}

fn invalid_value<T: ToString>(name: &str, value: T) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
    }
}

/// Parses config value string, which consists of two parts - name and options.
/// Example: StaticThreshold[over=0.8] parts are name StaticThreshold and options string "over=0.8".
pub fn parse_config_value(config_str: &str) -> (String, Option<String>) {
    match config_str.split_once('[') {
        Some((l, r)) => (l.trim().to_string(), Some(r.replace(']', ""))),
        None => (config_str.trim().to_string(), None),
    }
}

/// Parses options string from config value, returns map with option names and values.
pub fn parse_options(options_str: &str) -> HashMap<String, String> {
    let mut options = HashMap::new();
    for option_str in options_str.split(',') {
        if let Some((name, value)) = option_str.split_once('=') {
            options.insert(name.trim().to_string(), value.trim().to_string());
        }
    }
    options
}

/// Options of a single configured component with typed access.
#[derive(Debug, Clone)]
pub struct ComponentOptions {
    component: String,
    options: HashMap<String, String>,
}

impl ComponentOptions {
    pub fn new(component: &str, options_str: Option<&str>) -> Self {
        Self {
            component: component.to_string(),
            options: options_str.map(parse_options).unwrap_or_default(),
        }
    }

    /// Returns parsed option value or `None` if the option is absent.
    pub fn get<T: FromStr>(&self, name: &str) -> Result<Option<T>, ConfigError> {
        match self.options.get(name) {
            Some(value) => value.parse::<T>().map(Some).map_err(|_| ConfigError::InvalidValue {
                name: format!("{}.{}", self.component, name),
                value: value.clone(),
            }),
            None => Ok(None),
        }
    }

    pub fn get_or<T: FromStr>(&self, name: &str, default: T) -> Result<T, ConfigError> {
        Ok(self.get(name)?.unwrap_or(default))
    }
}
