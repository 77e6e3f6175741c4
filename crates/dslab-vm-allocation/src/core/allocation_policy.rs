//! VM allocation policy: initial placement of VMs and groups and periodic reoptimization via live migration.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use indexmap::IndexMap;
use serde::Serialize;

use crate::core::common::{HostId, VmId};
use crate::core::config::PolicyConfig;
use crate::core::context::PolicyContext;
use crate::core::errors::ConfigError;
use crate::core::group_placement::{GroupPacking, GroupScheduler};
use crate::core::host_selection::{host_selection_strategy_resolver, HostSelectionStrategy};
use crate::core::overload_detection::{overload_detector_resolver, OverloadDetector};
use crate::core::placement_group::VmPlacementGroup;
use crate::core::resource_pool::ResourcePool;
use crate::core::vm_selection::{vm_selection_policy_resolver, VmSelectionPolicy};
use crate::{log_debug, log_error, log_info, log_trace, log_warn};

/// Stage of the reoptimization pass the policy is at (or finished with).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum OptimizationPhase {
    Idle,
    Detecting,
    DrainingOverloaded,
    ConsolidatingUnderloaded,
    Restored,
    RetryScheduled,
    Done,
}

impl Display for OptimizationPhase {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            OptimizationPhase::Idle => write!(f, "idle"),
            OptimizationPhase::Detecting => write!(f, "detecting"),
            OptimizationPhase::DrainingOverloaded => write!(f, "draining overloaded"),
            OptimizationPhase::ConsolidatingUnderloaded => write!(f, "consolidating underloaded"),
            OptimizationPhase::Restored => write!(f, "restored"),
            OptimizationPhase::RetryScheduled => write!(f, "retry scheduled"),
            OptimizationPhase::Done => write!(f, "done"),
        }
    }
}

/// Request to repeat the host search later because no migration plan was found for overloaded hosts.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HostSearchRetry {
    /// Time of the next attempt.
    pub at: f64,
    /// Datacenter to search in, `None` means the current one.
    pub datacenter: Option<u32>,
}

/// Result of reoptimization pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MigrationPlan {
    /// Target host of each VM to migrate, in the order the decisions were made.
    pub migrations: IndexMap<VmId, HostId>,
    pub retry: Option<HostSearchRetry>,
}

impl MigrationPlan {
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

/// Places VMs on hosts and periodically computes VM migrations which resolve host overloads and free underloaded
/// hosts.
///
/// The policy is composed of an overload detector, a policy selecting VMs to migrate from overloaded hosts,
/// a strategy selecting hosts for VMs and a scheduler of placement groups. It does not perform migrations itself,
/// the returned plan is executed by the caller (see [`ResourcePool::start_migration`]).
pub struct VmAllocationPolicy {
    ctx: PolicyContext,
    detector: Box<dyn OverloadDetector>,
    vm_selection: Box<dyn VmSelectionPolicy>,
    host_selection: Box<dyn HostSelectionStrategy>,
    group_scheduler: GroupScheduler,
    host_search_retry_delay: f64,
    datacenters: Vec<u32>,
    next_datacenter: usize,
    phase: OptimizationPhase,
}

impl VmAllocationPolicy {
    pub const DEFAULT_HOST_SEARCH_RETRY_DELAY: f64 = 5.;

    pub fn new(
        detector: Box<dyn OverloadDetector>,
        vm_selection: Box<dyn VmSelectionPolicy>,
        host_selection: Box<dyn HostSelectionStrategy>,
        group_scheduler: GroupScheduler,
    ) -> Self {
        Self {
            ctx: PolicyContext::new("vm_allocation_policy"),
            detector,
            vm_selection,
            host_selection,
            group_scheduler,
            host_search_retry_delay: Self::DEFAULT_HOST_SEARCH_RETRY_DELAY,
            datacenters: Vec::new(),
            next_datacenter: 0,
            phase: OptimizationPhase::Idle,
        }
    }

    /// Sets the delay of the next host search when no migration plan is found, and datacenters to search in.
    pub fn with_retry(mut self, delay: f64, datacenters: Vec<u32>) -> Self {
        self.host_search_retry_delay = delay;
        self.datacenters = datacenters;
        self
    }

    /// Creates policy from config, resolving all its components.
    pub fn from_config(config: &PolicyConfig) -> Result<Self, ConfigError> {
        let detector = overload_detector_resolver(&config.overload_detector)?;
        let vm_selection = vm_selection_policy_resolver(&config.vm_selection)?;
        let host_selection = host_selection_strategy_resolver(&config.host_selection)?;
        let packing = GroupPacking::from_str(&config.group_packing)?;
        let group_scheduler = GroupScheduler::new(config.hosts_per_switch, packing);
        Ok(Self::new(detector, vm_selection, host_selection, group_scheduler)
            .with_retry(config.host_search_retry_delay, config.datacenters.clone()))
    }

    pub fn ctx(&self) -> &PolicyContext {
        &self.ctx
    }

    pub fn phase(&self) -> OptimizationPhase {
        self.phase
    }

    pub fn detector(&self) -> &dyn OverloadDetector {
        self.detector.as_ref()
    }

    pub fn group_scheduler(&self) -> &GroupScheduler {
        &self.group_scheduler
    }

    pub fn host_search_retry_delay(&self) -> f64 {
        self.host_search_retry_delay
    }

    /// Selects host for the VM with the configured strategy and allocates the VM there.
    ///
    /// Returns `None` if there is no suitable host, the VM stays unplaced then.
    pub fn allocate_host_for_vm(&mut self, pool: &mut ResourcePool, vm_id: VmId, time: f64) -> Option<HostId> {
        self.ctx.set_time(time);
        match pool.try_vm(vm_id) {
            Ok(vm) if vm.is_created() => {
                log_warn!(self.ctx, "vm {} is already placed on host {:?}", vm_id, vm.host());
                return None;
            }
            Err(e) => {
                log_warn!(self.ctx, "{}", e);
                return None;
            }
            _ => {}
        }
        let candidates = self.group_scheduler.host_order(pool);
        let host_id = self.find_host_for_vm(pool, vm_id, &candidates, &BTreeSet::new(), false, time)?;
        if let Err(e) = pool.allocate(host_id, vm_id) {
            log_warn!(self.ctx, "failed to place vm {}: {}", vm_id, e);
            return None;
        }
        log_debug!(self.ctx, "placed vm {} on host {}", vm_id, host_id);
        Some(host_id)
    }

    /// Places all VMs of the group or none of them.
    pub fn allocate_host_for_group(&mut self, pool: &mut ResourcePool, group: &mut VmPlacementGroup, time: f64) -> bool {
        self.ctx.set_time(time);
        self.group_scheduler.place_group(pool, group, &self.ctx)
    }

    /// Computes VM migrations which resolve host overloads and switch off underloaded hosts.
    ///
    /// The pool is used as a sandbox during the pass and is restored to the saved placement before returning.
    pub fn optimize_allocation(&mut self, pool: &mut ResourcePool, time: f64) -> MigrationPlan {
        self.ctx.set_time(time);
        self.phase = OptimizationPhase::Detecting;
        let overloaded_hosts: Vec<HostId> = pool
            .host_ids()
            .into_iter()
            .filter(|&host_id| {
                pool.host(host_id).vms_migrating_out().is_empty() && self.detector.is_host_overloaded(pool, host_id)
            })
            .collect();
        if !overloaded_hosts.is_empty() {
            log_debug!(self.ctx, "overloaded hosts: {:?}", overloaded_hosts);
        }
        let snapshot = pool.save_allocation();

        self.phase = OptimizationPhase::DrainingOverloaded;
        let mut migrations = IndexMap::new();
        let victims = self.drain_overloaded_hosts(pool, &overloaded_hosts);
        let overloaded_set: BTreeSet<HostId> = overloaded_hosts.iter().copied().collect();
        let all_hosts = pool.host_ids();
        for vm_id in victims {
            match self.find_host_for_vm(pool, vm_id, &all_hosts, &overloaded_set, false, time) {
                Some(host_id) if pool.create_temporary(host_id, vm_id) => {
                    migrations.insert(vm_id, host_id);
                }
                _ => log_debug!(self.ctx, "no host for vm {} from overloaded host", vm_id),
            }
        }

        self.phase = OptimizationPhase::ConsolidatingUnderloaded;
        self.consolidate_underloaded_hosts(pool, &overloaded_set, &mut migrations, time);

        if let Err(e) = pool.restore_allocation(&snapshot) {
            log_error!(self.ctx, "{}", e);
            panic!("{}", e);
        }
        self.phase = OptimizationPhase::Restored;

        let mut retry = None;
        if !overloaded_hosts.is_empty() && migrations.is_empty() {
            let datacenter = self.next_retry_datacenter();
            let at = time + self.host_search_retry_delay;
            log_warn!(
                self.ctx,
                "no migration plan for {} overloaded hosts, next attempt at {:.3} in datacenter {:?}",
                overloaded_hosts.len(),
                at,
                datacenter
            );
            retry = Some(HostSearchRetry { at, datacenter });
            self.phase = OptimizationPhase::RetryScheduled;
        } else {
            self.phase = OptimizationPhase::Done;
        }
        if !migrations.is_empty() {
            log_info!(self.ctx, "planned {} migrations", migrations.len());
        }
        MigrationPlan { migrations, retry }
    }

    fn next_retry_datacenter(&mut self) -> Option<u32> {
        if self.datacenters.is_empty() {
            return None;
        }
        let datacenter = self.datacenters[self.next_datacenter % self.datacenters.len()];
        self.next_datacenter = (self.next_datacenter + 1) % self.datacenters.len();
        Some(datacenter)
    }

    /// Evicts VMs from each overloaded host until it is not overloaded.
    /// Returns evicted VMs sorted by decreasing CPU demand.
    fn drain_overloaded_hosts(&mut self, pool: &mut ResourcePool, overloaded_hosts: &[HostId]) -> Vec<VmId> {
        let mut victims = Vec::new();
        for &host_id in overloaded_hosts {
            while self.detector.is_host_overloaded(pool, host_id) {
                let Some(vm_id) = self.vm_selection.select_vm(pool, host_id) else {
                    break;
                };
                if let Err(e) = pool.deallocate(host_id, vm_id) {
                    log_warn!(self.ctx, "can't evict vm {} from host {}: {}", vm_id, host_id, e);
                    break;
                }
                log_trace!(self.ctx, "vm {} selected for migration from host {}", vm_id, host_id);
                victims.push(vm_id);
            }
        }
        victims.sort_by(|&a, &b| {
            let a = pool.vm(a).current_requested_mips();
            let b = pool.vm(b).current_requested_mips();
            b.total_cmp(&a)
        });
        victims
    }

    /// Moves all VMs away from the most underloaded hosts, one host at a time.
    fn consolidate_underloaded_hosts(
        &mut self,
        pool: &mut ResourcePool,
        overloaded_hosts: &BTreeSet<HostId>,
        migrations: &mut IndexMap<VmId, HostId>,
        time: f64,
    ) {
        let all_hosts = pool.host_ids();
        let switched_off: BTreeSet<HostId> = all_hosts
            .iter()
            .copied()
            .filter(|&host_id| pool.is_host_switched_off(host_id))
            .collect();
        let mut excluded_targets: BTreeSet<HostId> = overloaded_hosts.union(&switched_off).copied().collect();
        let mut excluded_sources = excluded_targets.clone();
        excluded_sources.extend(migrations.values().copied());

        loop {
            let mut source: Option<HostId> = None;
            let mut min_utilization = f64::MAX;
            for &host_id in all_hosts.iter() {
                if excluded_sources.contains(&host_id)
                    || !pool.host(host_id).vms_migrating_out().is_empty()
                    || !self.detector.is_host_underloaded(pool, host_id)
                {
                    continue;
                }
                let utilization = pool.host_cpu_utilization(host_id);
                if utilization < min_utilization {
                    min_utilization = utilization;
                    source = Some(host_id);
                }
            }
            let Some(source) = source else {
                break;
            };
            excluded_sources.insert(source);
            excluded_targets.insert(source);

            let vms = pool.migratable_vms(source);
            if vms.is_empty() {
                continue;
            }
            let mut batch: Vec<(VmId, HostId)> = Vec::with_capacity(vms.len());
            for &vm_id in vms.iter() {
                match self.find_host_for_vm(pool, vm_id, &all_hosts, &excluded_targets, true, time) {
                    Some(host_id) if pool.create_temporary(host_id, vm_id) => batch.push((vm_id, host_id)),
                    _ => break,
                }
            }
            if batch.len() < vms.len() {
                log_debug!(self.ctx, "can't move all vms away from underloaded host {}", source);
                for &(vm_id, host_id) in batch.iter().rev() {
                    if let Err(e) = pool.destroy_temporary(host_id, vm_id) {
                        log_error!(self.ctx, "{}", e);
                        panic!("{}", e);
                    }
                }
                continue;
            }
            log_debug!(self.ctx, "underloaded host {} can be switched off", source);
            for (vm_id, host_id) in batch {
                migrations.insert(vm_id, host_id);
                excluded_sources.insert(host_id);
            }
        }
    }

    fn find_host_for_vm(
        &mut self,
        pool: &mut ResourcePool,
        vm_id: VmId,
        candidates: &[HostId],
        excluded: &BTreeSet<HostId>,
        reject_underloaded: bool,
        time: f64,
    ) -> Option<HostId> {
        let detector = self.detector.as_ref();
        let mut filter = |pool: &mut ResourcePool, host_id: HostId| {
            is_eligible_host(pool, detector, host_id, vm_id, excluded, reject_underloaded)
        };
        self.host_selection.select_host(vm_id, candidates, pool, &mut filter, time)
    }
}

/// Common eligibility filter of target hosts.
///
/// The host must not be excluded or be the current VM host, must have enough free resources
/// and must not become overloaded after the placement.
fn is_eligible_host(
    pool: &mut ResourcePool,
    detector: &dyn OverloadDetector,
    host_id: HostId,
    vm_id: VmId,
    excluded: &BTreeSet<HostId>,
    reject_underloaded: bool,
) -> bool {
    if excluded.contains(&host_id) || pool.vm(vm_id).host() == Some(host_id) || !pool.is_suitable_for(host_id, vm_id)
    {
        return false;
    }
    if reject_underloaded && detector.is_host_underloaded(pool, host_id) {
        return false;
    }
    !is_overloaded_after_allocation(pool, detector, host_id, vm_id)
}

/// Probes the placement with a temporary allocation.
fn is_overloaded_after_allocation(
    pool: &mut ResourcePool,
    detector: &dyn OverloadDetector,
    host_id: HostId,
    vm_id: VmId,
) -> bool {
    if !pool.create_temporary(host_id, vm_id) {
        return true;
    }
    let overloaded = detector.is_host_overloaded(pool, host_id);
    let released = pool.destroy_temporary(host_id, vm_id).is_ok();
    overloaded || !released
}
