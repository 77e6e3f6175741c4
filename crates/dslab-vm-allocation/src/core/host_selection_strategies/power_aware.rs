//! Power-aware strategy.

use crate::core::common::{HostId, VmId};
use crate::core::host_selection::{HostFilter, HostSelectionStrategy};
use crate::core::resource_pool::ResourcePool;

/// Uses the suitable host whose power consumption grows the least after placing the VM.
#[derive(Clone, Default)]
pub struct PowerAware;

impl PowerAware {
    pub fn new() -> Self {
        Self {}
    }
}

impl HostSelectionStrategy for PowerAware {
    fn select_host(
        &mut self,
        vm_id: VmId,
        candidates: &[HostId],
        pool: &mut ResourcePool,
        filter: &mut HostFilter,
        time: f64,
    ) -> Option<HostId> {
        let mut result: Option<HostId> = None;
        let mut min_power_diff = f64::MAX;

        for &host_id in candidates {
            if filter(pool, host_id) {
                let power_diff = pool.host_power_after_allocation(host_id, vm_id, time) - pool.host_power(host_id, time);
                if power_diff < min_power_diff {
                    min_power_diff = power_diff;
                    result = Some(host_id);
                }
            }
        }
        result
    }
}
