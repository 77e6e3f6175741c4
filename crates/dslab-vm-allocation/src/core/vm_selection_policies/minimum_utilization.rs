//! Minimum Utilization policy.

use crate::core::common::{HostId, VmId};
use crate::core::resource_pool::ResourcePool;
use crate::core::vm_selection::VmSelectionPolicy;

/// Selects the VM with the lowest current CPU demand.
#[derive(Clone, Default)]
pub struct MinimumUtilization;

impl MinimumUtilization {
    pub fn new() -> Self {
        Self {}
    }
}

impl VmSelectionPolicy for MinimumUtilization {
    fn select_vm(&self, pool: &ResourcePool, host_id: HostId) -> Option<VmId> {
        let mut result: Option<VmId> = None;
        let mut min_mips = f64::MAX;

        for vm_id in pool.migratable_vms(host_id) {
            let mips = pool.vm(vm_id).current_requested_mips();
            if mips < min_mips {
                min_mips = mips;
                result = Some(vm_id);
            }
        }
        result
    }
}
