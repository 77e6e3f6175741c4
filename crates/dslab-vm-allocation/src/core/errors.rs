//! Errors reported by the policy engine.

use thiserror::Error;

use crate::core::common::{AllocationVerdict, HostId, VmId};

/// Misuse of the resource model: allocations that do not fit, releases of absent VMs and so on.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AllocationError {
    #[error("host {0} does not exist")]
    UnknownHost(HostId),
    #[error("vm {0} does not exist")]
    UnknownVm(VmId),
    #[error("host {host} cannot accommodate vm {vm}: {verdict}")]
    CapacityViolation {
        host: HostId,
        vm: VmId,
        verdict: AllocationVerdict,
    },
    #[error("vm {vm} is already placed on host {host}")]
    AlreadyPlaced { vm: VmId, host: HostId },
    #[error("vm {vm} is not placed on host {host}")]
    VmNotOnHost { vm: VmId, host: HostId },
    #[error("vm {vm} has no temporary placement on host {host}")]
    NotTemporary { vm: VmId, host: HostId },
    #[error("vm {0} is already migrating")]
    AlreadyMigrating(VmId),
    #[error("vm {0} is not migrating")]
    NotMigrating(VmId),
}

/// Invalid policy configuration. Reported when the policy or one of its components is constructed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} threshold must be within (0, 1), got {value}")]
    InvalidThreshold { name: &'static str, value: f64 },
    #[error("under-utilization threshold {under} must be below over-utilization threshold {over}")]
    InconsistentThresholds { under: f64, over: f64 },
    #[error("invalid value of {name}: {value}")]
    InvalidValue { name: String, value: String },
    #[error("unknown {kind}: {name}")]
    UnknownComponent { kind: &'static str, name: String },
    #[error("can't read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("can't parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// A previously saved allocation can no longer be recreated.
///
/// This means that the sandbox contract was violated somewhere and the simulation state is undefined.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("can't restore allocation of vm {vm} on host {host}: {verdict}")]
pub struct SnapshotRestoreError {
    pub vm: VmId,
    pub host: HostId,
    pub verdict: AllocationVerdict,
}
