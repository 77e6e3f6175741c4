use std::fmt::{Display, Formatter};

use serde::Serialize;

pub type HostId = u32;
pub type VmId = u32;

/// Temporary VM copies created during group placement get IDs counted down from this value.
pub const TEMPORARY_VM_ID_BASE: VmId = u32::MAX;

/// Tolerance used when comparing MIPS amounts.
pub const MIPS_EPSILON: f64 = 1e-9;

/// Returns the ID of temporary copy of the specified VM.
pub fn temporary_vm_id(vm_id: VmId) -> VmId {
    TEMPORARY_VM_ID_BASE - vm_id
}

/// Result of checking whether a VM fits a host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AllocationVerdict {
    Success,
    HostNotFound,
    VmNotFound,
    HostFailed,
    NotEnoughPes,
    NotEnoughCpu,
    NotEnoughMemory,
    NotEnoughBandwidth,
    NotEnoughStorage,
}

impl Display for AllocationVerdict {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            AllocationVerdict::Success => write!(f, "success"),
            AllocationVerdict::HostNotFound => write!(f, "host not found"),
            AllocationVerdict::VmNotFound => write!(f, "vm not found"),
            AllocationVerdict::HostFailed => write!(f, "host failed"),
            AllocationVerdict::NotEnoughPes => write!(f, "not enough processing elements"),
            AllocationVerdict::NotEnoughCpu => write!(f, "not enough cpu"),
            AllocationVerdict::NotEnoughMemory => write!(f, "not enough memory"),
            AllocationVerdict::NotEnoughBandwidth => write!(f, "not enough bandwidth"),
            AllocationVerdict::NotEnoughStorage => write!(f, "not enough storage"),
        }
    }
}
