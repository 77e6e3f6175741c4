//! Minimum Migration Time policy.

use crate::core::common::{HostId, VmId};
use crate::core::resource_pool::ResourcePool;
use crate::core::vm_selection::VmSelectionPolicy;

/// Selects the VM which is the fastest to migrate, i.e. has the least amount of memory.
#[derive(Clone, Default)]
pub struct MinimumMigrationTime;

impl MinimumMigrationTime {
    pub fn new() -> Self {
        Self {}
    }
}

impl VmSelectionPolicy for MinimumMigrationTime {
    fn select_vm(&self, pool: &ResourcePool, host_id: HostId) -> Option<VmId> {
        pool.migratable_vms(host_id)
            .into_iter()
            .min_by_key(|&vm_id| pool.vm(vm_id).resources.ram)
    }
}
