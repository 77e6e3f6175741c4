//! Best Fit strategy.

use crate::core::common::{HostId, VmId};
use crate::core::host_selection::{HostFilter, HostSelectionStrategy};
use crate::core::resource_pool::ResourcePool;

/// Uses the most loaded (by current CPU demand) suitable host.
#[derive(Clone, Default)]
pub struct BestFit;

impl BestFit {
    pub fn new() -> Self {
        Self {}
    }
}

impl HostSelectionStrategy for BestFit {
    fn select_host(
        &mut self,
        _vm_id: VmId,
        candidates: &[HostId],
        pool: &mut ResourcePool,
        filter: &mut HostFilter,
        _time: f64,
    ) -> Option<HostId> {
        let mut result: Option<HostId> = None;
        let mut max_used_mips = f64::MIN;

        for &host_id in candidates {
            if filter(pool, host_id) {
                let used_mips = pool.host_cpu_utilization_mips(host_id);
                if used_mips > max_used_mips {
                    max_used_mips = used_mips;
                    result = Some(host_id);
                }
            }
        }
        result
    }
}
