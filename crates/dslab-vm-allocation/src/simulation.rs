//! Tick-driven simulation of a single datacenter governed by the VM allocation policy.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::allocation_policy::VmAllocationPolicy;
use crate::core::common::{HostId, VmId};
use crate::core::config::PolicyConfig;
use crate::core::context::PolicyContext;
use crate::core::energy_meter::EnergyMeter;
use crate::core::errors::{AllocationError, ConfigError};
use crate::core::host::HostSpec;
use crate::core::load_model::LoadModel;
use crate::core::placement_group::{Enforcement, GroupStatus, VmPlacementGroup};
use crate::core::resource_pool::ResourcePool;
use crate::core::vm::VmResources;
use crate::{log_debug, log_error, log_info, log_warn};

/// Counters collected during the simulation.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SimulationStats {
    pub vms_placed: u64,
    pub groups_placed: u64,
    pub migrations_started: u64,
    pub migrations_completed: u64,
    /// Reoptimization passes which found overloaded hosts but no migration plan.
    pub failed_optimizations: u64,
}

struct MigrationInProgress {
    vm_id: VmId,
    source: HostId,
    target: HostId,
    finish_time: f64,
}

struct VmLoad {
    model: Box<dyn LoadModel>,
    start_time: f64,
}

/// Owns the resource pool and the policy and advances time in fixed steps.
///
/// On each step the simulation completes finished migrations, retries placement of pending VMs and groups,
/// refreshes VM CPU utilization from load models, records host utilization history, accounts energy and runs
/// the reoptimization pass, starting the planned migrations.
pub struct DatacenterSimulation {
    ctx: PolicyContext,
    config: PolicyConfig,
    pool: ResourcePool,
    policy: VmAllocationPolicy,
    loads: BTreeMap<VmId, VmLoad>,
    pending_vms: Vec<VmId>,
    groups: BTreeMap<u32, VmPlacementGroup>,
    next_group_id: u32,
    migrations: Vec<MigrationInProgress>,
    energy_meters: Vec<EnergyMeter>,
    next_optimization_time: f64,
    stats: SimulationStats,
}

impl DatacenterSimulation {
    /// Creates simulation with the policy built from config.
    pub fn new(config: PolicyConfig) -> Result<Self, ConfigError> {
        let policy = VmAllocationPolicy::from_config(&config)?;
        Ok(Self::with_policy(config, policy))
    }

    pub fn with_policy(config: PolicyConfig, policy: VmAllocationPolicy) -> Self {
        Self {
            ctx: PolicyContext::new("datacenter"),
            config,
            pool: ResourcePool::new(),
            policy,
            loads: BTreeMap::new(),
            pending_vms: Vec::new(),
            groups: BTreeMap::new(),
            next_group_id: 0,
            migrations: Vec::new(),
            energy_meters: Vec::new(),
            next_optimization_time: 0.,
            stats: SimulationStats::default(),
        }
    }

    /// Adds host, its utilization history length is taken from the config.
    pub fn add_host(&mut self, spec: HostSpec) -> HostId {
        let spec = spec.history_length(self.config.utilization_history_length);
        let id = self.pool.add_host(spec);
        self.energy_meters.push(EnergyMeter::new());
        id
    }

    /// Submits VM for placement by the policy. If there is no suitable host now, placement is retried on each step.
    pub fn spawn_vm(&mut self, resources: VmResources, load_model: Box<dyn LoadModel>) -> VmId {
        let vm_id = self.register_vm(resources, load_model);
        let time = self.time();
        if self.policy.allocate_host_for_vm(&mut self.pool, vm_id, time).is_some() {
            self.on_vm_placed(vm_id);
        } else {
            log_debug!(self.ctx, "vm {} is waiting for a host", vm_id);
            self.pending_vms.push(vm_id);
        }
        vm_id
    }

    /// Places VM on the specified host bypassing the policy.
    pub fn spawn_vm_directly(
        &mut self,
        resources: VmResources,
        load_model: Box<dyn LoadModel>,
        host_id: HostId,
    ) -> Result<VmId, AllocationError> {
        self.pool.try_host(host_id)?;
        let vm_id = self.register_vm(resources, load_model);
        if let Err(e) = self.pool.allocate(host_id, vm_id) {
            self.loads.remove(&vm_id);
            self.pool.remove_vm(vm_id);
            return Err(e);
        }
        self.on_vm_placed(vm_id);
        Ok(vm_id)
    }

    /// Submits group of VMs to be placed atomically. Returns the group ID.
    pub fn submit_group(&mut self, vms: Vec<(VmResources, Box<dyn LoadModel>)>, enforcement: Enforcement) -> u32 {
        let vm_ids: Vec<VmId> = vms
            .into_iter()
            .map(|(resources, load_model)| self.register_vm(resources, load_model))
            .collect();
        let group_id = self.next_group_id;
        self.next_group_id += 1;
        let mut group = VmPlacementGroup::affinity(group_id, vm_ids, enforcement);
        self.place_group(&mut group);
        self.groups.insert(group_id, group);
        group_id
    }

    pub fn group(&self, group_id: u32) -> Option<&VmPlacementGroup> {
        self.groups.get(&group_id)
    }

    /// Removes all VMs of created group and marks it finished.
    pub fn finish_group(&mut self, group_id: u32) -> Result<bool, AllocationError> {
        let Some(group) = self.groups.get(&group_id) else {
            return Ok(false);
        };
        if group.status() != GroupStatus::Created {
            return Ok(false);
        }
        for vm_id in group.vms().to_vec() {
            self.destroy_vm(vm_id)?;
        }
        Ok(self.groups.get_mut(&group_id).map_or(false, |group| group.finish()))
    }

    /// Releases VM resources and forgets the VM.
    pub fn destroy_vm(&mut self, vm_id: VmId) -> Result<(), AllocationError> {
        self.pool.destroy_vm(vm_id)?;
        self.loads.remove(&vm_id);
        self.pending_vms.retain(|&id| id != vm_id);
        log_debug!(self.ctx, "vm {} destroyed", vm_id);
        Ok(())
    }

    pub fn set_host_failed(&mut self, host_id: HostId, failed: bool) -> Result<(), AllocationError> {
        self.pool.set_host_failed(host_id, failed)?;
        if failed {
            log_warn!(self.ctx, "host {} failed", host_id);
        }
        Ok(())
    }

    pub fn time(&self) -> f64 {
        self.ctx.time()
    }

    pub fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    pub fn policy(&self) -> &VmAllocationPolicy {
        &self.policy
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    pub fn pending_vms(&self) -> &[VmId] {
        &self.pending_vms
    }

    pub fn vm_location(&self, vm_id: VmId) -> Option<HostId> {
        self.pool.try_vm(vm_id).ok().and_then(|vm| vm.host())
    }

    /// Returns the number of migrations which are in progress now.
    pub fn migrations_in_progress(&self) -> usize {
        self.migrations.len()
    }

    /// Returns the energy consumed by the host so far.
    pub fn host_energy(&self, host_id: HostId) -> f64 {
        self.energy_meters
            .get(host_id as usize)
            .map_or(0., |meter| meter.energy_consumed())
    }

    /// Returns the energy consumed by all hosts so far.
    pub fn total_energy(&self) -> f64 {
        self.energy_meters.iter().map(|meter| meter.energy_consumed()).sum()
    }

    /// Performs the specified number of steps.
    pub fn steps(&mut self, step_count: u64) {
        for _ in 0..step_count {
            self.step();
        }
    }

    /// Performs steps until the specified amount of time passes.
    pub fn step_for_duration(&mut self, duration: f64) {
        let end_time = self.time() + duration;
        while self.time() + self.config.scheduling_interval <= end_time + 1e-9 {
            self.step();
        }
    }

    /// Advances time by one scheduling interval.
    pub fn step(&mut self) {
        let time = self.time() + self.config.scheduling_interval;
        self.ctx.set_time(time);

        self.complete_migrations();
        self.retry_pending();
        self.update_vm_utilization();
        self.pool.record_utilization_history();
        self.update_energy();

        if time >= self.next_optimization_time {
            let plan = self.policy.optimize_allocation(&mut self.pool, time);
            if let Some(retry) = plan.retry {
                self.stats.failed_optimizations += 1;
                self.next_optimization_time = retry.at;
            }
            for (vm_id, target) in plan.migrations {
                self.start_migration(vm_id, target);
            }
        }
        for group in self.groups.values_mut() {
            group.update_migration_status(&self.pool);
        }
    }

    fn register_vm(&mut self, resources: VmResources, load_model: Box<dyn LoadModel>) -> VmId {
        let vm_id = self.pool.add_vm(resources);
        let time = self.time();
        if let Err(e) = self.pool.set_vm_utilization(vm_id, load_model.get_resource_load(time, 0.)) {
            log_error!(self.ctx, "{}", e);
        }
        self.loads.insert(
            vm_id,
            VmLoad {
                model: load_model,
                start_time: time,
            },
        );
        vm_id
    }

    fn on_vm_placed(&mut self, vm_id: VmId) {
        let time = self.time();
        if let Some(load) = self.loads.get_mut(&vm_id) {
            load.start_time = time;
        }
        self.stats.vms_placed += 1;
    }

    fn place_group(&mut self, group: &mut VmPlacementGroup) {
        let time = self.time();
        if self.policy.allocate_host_for_group(&mut self.pool, group, time) {
            for vm_id in group.vms().to_vec() {
                self.on_vm_placed(vm_id);
            }
            self.stats.groups_placed += 1;
        }
    }

    fn retry_pending(&mut self) {
        let time = self.time();
        for vm_id in std::mem::take(&mut self.pending_vms) {
            if self.policy.allocate_host_for_vm(&mut self.pool, vm_id, time).is_some() {
                self.on_vm_placed(vm_id);
            } else {
                self.pending_vms.push(vm_id);
            }
        }

        let pending_groups: Vec<u32> = self
            .groups
            .iter()
            .filter(|(_, group)| group.status() == GroupStatus::Pending)
            .map(|(&id, _)| id)
            .collect();
        for group_id in pending_groups {
            if let Some(mut group) = self.groups.remove(&group_id) {
                self.place_group(&mut group);
                self.groups.insert(group_id, group);
            }
        }
    }

    fn update_vm_utilization(&mut self) {
        let time = self.time();
        for (&vm_id, load) in self.loads.iter() {
            let utilization = load.model.get_resource_load(time, time - load.start_time);
            if let Err(e) = self.pool.set_vm_utilization(vm_id, utilization) {
                log_error!(self.ctx, "{}", e);
            }
        }
    }

    fn update_energy(&mut self) {
        let time = self.time();
        for host_id in self.pool.host_ids() {
            let power = if self.pool.is_host_switched_off(host_id) {
                0.
            } else {
                self.pool.host_power(host_id, time)
            };
            self.energy_meters[host_id as usize].update(time, power);
        }
    }

    fn start_migration(&mut self, vm_id: VmId, target: HostId) {
        let source = match self.pool.start_migration(vm_id, target) {
            Ok(source) => source,
            Err(e) => {
                log_warn!(self.ctx, "can't migrate vm {} to host {}: {}", vm_id, target, e);
                return;
            }
        };
        let ram = self.pool.vm(vm_id).resources.ram as f64;
        let bandwidth = self.pool.host(source).bw_total() as f64 * self.config.migration_bandwidth_share;
        let duration = if bandwidth > 0. {
            ram / bandwidth
        } else {
            self.config.scheduling_interval
        };
        log_info!(
            self.ctx,
            "migration of vm {} from host {} to host {} started, duration {:.3}",
            vm_id,
            source,
            target,
            duration
        );
        self.migrations.push(MigrationInProgress {
            vm_id,
            source,
            target,
            finish_time: self.time() + duration,
        });
        self.stats.migrations_started += 1;
    }

    fn complete_migrations(&mut self) {
        let time = self.time();
        let (finished, in_progress): (Vec<_>, Vec<_>) = std::mem::take(&mut self.migrations)
            .into_iter()
            .partition(|migration| migration.finish_time <= time);
        self.migrations = in_progress;
        for migration in finished {
            match self.pool.finish_migration(migration.vm_id) {
                Ok(_) => {
                    log_info!(
                        self.ctx,
                        "vm {} migrated from host {} to host {}",
                        migration.vm_id,
                        migration.source,
                        migration.target
                    );
                    if let Some(load) = self.loads.get_mut(&migration.vm_id) {
                        load.start_time = time;
                    }
                    self.stats.migrations_completed += 1;
                }
                Err(e) => log_error!(self.ctx, "can't complete migration of vm {}: {}", migration.vm_id, e),
            }
        }
    }
}
