//! First Fit strategy.

use crate::core::common::{HostId, VmId};
use crate::core::host_selection::{HostFilter, HostSelectionStrategy};
use crate::core::resource_pool::ResourcePool;

/// Uses the first suitable host.
///
/// Hosts are scanned round-robin starting from the position where the previous search stopped,
/// so consecutive requests do not pile up on the first hosts.
#[derive(Clone, Default)]
pub struct FirstFit {
    last_host_index: usize,
}

impl FirstFit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_start_index(last_host_index: usize) -> Self {
        Self { last_host_index }
    }

    /// Returns position in the candidate list the next scan starts from.
    pub fn last_host_index(&self) -> usize {
        self.last_host_index
    }
}

impl HostSelectionStrategy for FirstFit {
    fn select_host(
        &mut self,
        _vm_id: VmId,
        candidates: &[HostId],
        pool: &mut ResourcePool,
        filter: &mut HostFilter,
        _time: f64,
    ) -> Option<HostId> {
        let n = candidates.len();
        if n == 0 {
            return None;
        }
        let start = self.last_host_index % n;
        for step in 0..n {
            let idx = (start + step) % n;
            let host_id = candidates[idx];
            if filter(pool, host_id) {
                self.last_host_index = (idx + 1) % n;
                return Some(host_id);
            }
        }
        self.last_host_index = start;
        None
    }
}
