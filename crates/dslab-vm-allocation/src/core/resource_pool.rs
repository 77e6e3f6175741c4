//! Resource pool state: the arena holding all hosts and VMs of a datacenter.

use std::collections::BTreeMap;

use crate::core::common::{AllocationVerdict, HostId, VmId};
use crate::core::errors::AllocationError;
use crate::core::host::{AllocationKind, Host, HostSpec};
use crate::core::vm::{Vm, VmResources};

/// Stores hosts and VMs addressed by stable integer IDs and performs all changes of their placement.
///
/// Host IDs are indices in the host list, so iteration over hosts always follows the order in which they were added.
/// VMs are kept in an ordered map to make every scan over them deterministic.
#[derive(Clone, Default)]
pub struct ResourcePool {
    hosts: Vec<Host>,
    vms: BTreeMap<VmId, Vm>,
    next_vm_id: VmId,
}

impl ResourcePool {
    /// Creates empty resource pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds host to the pool and returns its ID.
    pub fn add_host(&mut self, spec: HostSpec) -> HostId {
        let id = self.hosts.len() as HostId;
        self.hosts.push(Host::new(id, spec));
        id
    }

    /// Registers new VM which is not placed anywhere yet and returns its ID.
    pub fn add_vm(&mut self, resources: VmResources) -> VmId {
        let id = self.next_vm_id;
        self.next_vm_id += 1;
        self.vms.insert(id, Vm::new(id, resources));
        id
    }

    /// Registers a temporary copy of the specified VM and returns the copy ID.
    pub(crate) fn add_temporary_copy(&mut self, vm_id: VmId) -> Result<VmId, AllocationError> {
        let copy = self.try_vm(vm_id)?.temporary_copy();
        let copy_id = copy.id;
        self.vms.insert(copy_id, copy);
        Ok(copy_id)
    }

    /// Removes VM which holds no resources from the pool.
    pub(crate) fn remove_vm(&mut self, vm_id: VmId) -> Option<Vm> {
        let vm = self.vms.get(&vm_id)?;
        if vm.is_created() || vm.is_temporary() {
            return None;
        }
        self.vms.remove(&vm_id)
    }

    pub fn host(&self, host_id: HostId) -> &Host {
        &self.hosts[host_id as usize]
    }

    pub(crate) fn host_mut(&mut self, host_id: HostId) -> &mut Host {
        &mut self.hosts[host_id as usize]
    }

    pub fn try_host(&self, host_id: HostId) -> Result<&Host, AllocationError> {
        self.hosts
            .get(host_id as usize)
            .ok_or(AllocationError::UnknownHost(host_id))
    }

    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    /// Returns IDs of all hosts in the order they were added.
    pub fn host_ids(&self) -> Vec<HostId> {
        (0..self.hosts.len() as HostId).collect()
    }

    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    pub fn vm(&self, vm_id: VmId) -> &Vm {
        &self.vms[&vm_id]
    }

    pub(crate) fn vm_mut(&mut self, vm_id: VmId) -> Option<&mut Vm> {
        self.vms.get_mut(&vm_id)
    }

    pub fn try_vm(&self, vm_id: VmId) -> Result<&Vm, AllocationError> {
        self.vms.get(&vm_id).ok_or(AllocationError::UnknownVm(vm_id))
    }

    pub fn vms(&self) -> impl Iterator<Item = &Vm> {
        self.vms.values()
    }

    pub fn vm_count(&self) -> usize {
        self.vms.len()
    }

    /// Checks if the VM can be allocated on the host now.
    pub fn can_allocate(&self, host_id: HostId, vm_id: VmId) -> AllocationVerdict {
        let Some(host) = self.hosts.get(host_id as usize) else {
            return AllocationVerdict::HostNotFound;
        };
        let Some(vm) = self.vms.get(&vm_id) else {
            return AllocationVerdict::VmNotFound;
        };
        host.can_allocate(&vm.resources)
    }

    /// Returns true iff every host resource has enough headroom for the VM.
    pub fn is_suitable_for(&self, host_id: HostId, vm_id: VmId) -> bool {
        self.can_allocate(host_id, vm_id) == AllocationVerdict::Success
    }

    /// Commits VM resources on the host.
    pub fn allocate(&mut self, host_id: HostId, vm_id: VmId) -> Result<(), AllocationError> {
        self.try_host(host_id)?;
        let vm = self.try_vm(vm_id)?;
        if let Some(host) = vm.host() {
            return Err(AllocationError::AlreadyPlaced { vm: vm_id, host });
        }
        let resources = vm.resources;
        let host = self.host_mut(host_id);
        host.allocate(vm_id, &resources, AllocationKind::Real)
            .map_err(|verdict| AllocationError::CapacityViolation {
                host: host_id,
                vm: vm_id,
                verdict,
            })?;
        host.vms_mut().push(vm_id);
        if let Some(vm) = self.vm_mut(vm_id) {
            vm.set_host(Some(host_id));
        }
        Ok(())
    }

    /// Releases VM resources committed on the host.
    pub fn deallocate(&mut self, host_id: HostId, vm_id: VmId) -> Result<(), AllocationError> {
        self.try_host(host_id)?;
        if self.try_vm(vm_id)?.host() != Some(host_id) || !self.host(host_id).has_allocation(vm_id, AllocationKind::Real)
        {
            return Err(AllocationError::VmNotOnHost { vm: vm_id, host: host_id });
        }
        let host = self.host_mut(host_id);
        host.release(vm_id);
        host.vms_mut().retain(|&id| id != vm_id);
        if let Some(vm) = self.vm_mut(vm_id) {
            vm.set_host(None);
        }
        Ok(())
    }

    /// Returns CPU capacity in MIPS currently demanded by VMs on the host,
    /// including temporary placements and incoming migrations.
    pub fn host_cpu_utilization_mips(&self, host_id: HostId) -> f64 {
        let host = self.host(host_id);
        host.vms()
            .iter()
            .chain(host.vms_migrating_in().iter())
            .filter_map(|vm_id| self.vms.get(vm_id))
            .map(|vm| vm.current_requested_mips())
            .sum()
    }

    /// Returns the current CPU utilization (0-1) of the host.
    pub fn host_cpu_utilization(&self, host_id: HostId) -> f64 {
        let total = self.host(host_id).total_mips();
        if total == 0. {
            return 0.;
        }
        self.host_cpu_utilization_mips(host_id) / total
    }

    /// Returns the current power consumption of the host.
    pub fn host_power(&self, host_id: HostId, time: f64) -> f64 {
        self.host(host_id).power(time, self.host_cpu_utilization(host_id))
    }

    /// Returns the host power consumption if the VM were additionally placed on it.
    pub fn host_power_after_allocation(&self, host_id: HostId, vm_id: VmId, time: f64) -> f64 {
        let host = self.host(host_id);
        let total = host.total_mips();
        if total == 0. {
            return 0.;
        }
        let utilization = (self.host_cpu_utilization_mips(host_id) + self.vm(vm_id).current_requested_mips()) / total;
        host.power(time, utilization)
    }

    /// Returns VMs committed to the host which can be migrated away (not migrating already).
    pub fn migratable_vms(&self, host_id: HostId) -> Vec<VmId> {
        let host = self.host(host_id);
        host.vms()
            .iter()
            .copied()
            .filter(|&vm_id| {
                host.has_allocation(vm_id, AllocationKind::Real) && !self.vm(vm_id).is_in_migration()
            })
            .collect()
    }

    /// Returns true if the host is failed or has nothing to run (no VMs, even temporary ones, and no incoming
    /// migrations).
    pub fn is_host_switched_off(&self, host_id: HostId) -> bool {
        let host = self.host(host_id);
        host.is_failed() || (host.vms().is_empty() && host.vms_migrating_in().is_empty())
    }

    /// Sets the fraction of requested CPU the VM currently uses.
    pub fn set_vm_utilization(&mut self, vm_id: VmId, utilization: f64) -> Result<(), AllocationError> {
        self.vm_mut(vm_id)
            .ok_or(AllocationError::UnknownVm(vm_id))?
            .set_utilization(utilization);
        Ok(())
    }

    /// Appends the current CPU utilization of each host to its utilization history.
    pub fn record_utilization_history(&mut self) {
        for host_id in 0..self.hosts.len() {
            let utilization = self.host_cpu_utilization(host_id as HostId);
            self.hosts[host_id].record_utilization(utilization);
        }
    }

    /// Marks host as failed (or repaired). Failed host never accepts VMs.
    pub fn set_host_failed(&mut self, host_id: HostId, failed: bool) -> Result<(), AllocationError> {
        self.try_host(host_id)?;
        self.host_mut(host_id).set_failed(failed);
        Ok(())
    }

    /// Starts migration of the VM: reserves resources on the target and marks both hosts.
    pub fn start_migration(&mut self, vm_id: VmId, target: HostId) -> Result<HostId, AllocationError> {
        self.try_host(target)?;
        let vm = self.try_vm(vm_id)?;
        if vm.is_in_migration() {
            return Err(AllocationError::AlreadyMigrating(vm_id));
        }
        let source = vm.host().ok_or(AllocationError::VmNotOnHost { vm: vm_id, host: target })?;
        if source == target {
            return Err(AllocationError::AlreadyPlaced { vm: vm_id, host: target });
        }
        let resources = vm.resources;
        let host = self.host_mut(target);
        host.allocate(vm_id, &resources, AllocationKind::MigratingIn)
            .map_err(|verdict| AllocationError::CapacityViolation {
                host: target,
                vm: vm_id,
                verdict,
            })?;
        host.set_active(true);
        host.vms_migrating_in_mut().push(vm_id);
        self.host_mut(source).vms_migrating_out_mut().push(vm_id);
        if let Some(vm) = self.vm_mut(vm_id) {
            vm.set_in_migration(true);
        }
        Ok(source)
    }

    /// Completes migration of the VM: releases the source host and turns the reservation on the target
    /// into a real placement.
    ///
    /// Returns source and target host IDs. A source host left without VMs is switched off.
    /// If the target has failed meanwhile, the migration is aborted and the VM stays on the source.
    pub fn finish_migration(&mut self, vm_id: VmId) -> Result<(HostId, HostId), AllocationError> {
        let vm = self.try_vm(vm_id)?;
        if !vm.is_in_migration() {
            return Err(AllocationError::NotMigrating(vm_id));
        }
        let source = vm.host().ok_or(AllocationError::NotMigrating(vm_id))?;
        let target = self
            .hosts
            .iter()
            .find(|host| {
                host.vms_migrating_in().contains(&vm_id) && host.has_allocation(vm_id, AllocationKind::MigratingIn)
            })
            .map(|host| host.id)
            .ok_or(AllocationError::NotMigrating(vm_id))?;

        if self.host(target).is_failed() {
            self.abort_migration(vm_id, source, target);
            return Err(AllocationError::CapacityViolation {
                host: target,
                vm: vm_id,
                verdict: AllocationVerdict::HostFailed,
            });
        }

        let target_host = self.host_mut(target);
        target_host.convert_allocation(vm_id, AllocationKind::Real);
        target_host.vms_migrating_in_mut().retain(|&id| id != vm_id);
        target_host.vms_mut().push(vm_id);

        let source_host = self.host_mut(source);
        source_host.release(vm_id);
        source_host.vms_mut().retain(|&id| id != vm_id);
        source_host.vms_migrating_out_mut().retain(|&id| id != vm_id);
        if source_host.vms().is_empty() && source_host.vms_migrating_in().is_empty() {
            source_host.set_active(false);
        }

        if let Some(vm) = self.vm_mut(vm_id) {
            vm.set_host(Some(target));
            vm.set_in_migration(false);
        }
        Ok((source, target))
    }

    /// Drops the target reservation of a migration, the VM keeps running on the source.
    fn abort_migration(&mut self, vm_id: VmId, source: HostId, target: HostId) {
        let target_host = self.host_mut(target);
        target_host.release(vm_id);
        target_host.vms_migrating_in_mut().retain(|&id| id != vm_id);
        if target_host.vms().is_empty() && target_host.vms_migrating_in().is_empty() {
            target_host.set_active(false);
        }
        self.host_mut(source).vms_migrating_out_mut().retain(|&id| id != vm_id);
        if let Some(vm) = self.vm_mut(vm_id) {
            vm.set_in_migration(false);
        }
    }

    /// Releases all resources of the VM and removes it from the pool (e.g. when the VM finishes).
    pub fn destroy_vm(&mut self, vm_id: VmId) -> Result<Vm, AllocationError> {
        let vm = self.try_vm(vm_id)?;
        if vm.is_in_migration() {
            return Err(AllocationError::AlreadyMigrating(vm_id));
        }
        if let Some(host_id) = vm.host() {
            self.deallocate(host_id, vm_id)?;
            let host = self.host_mut(host_id);
            if host.vms().is_empty() && host.vms_migrating_in().is_empty() {
                host.set_active(false);
            }
        }
        if let Some(host_id) = self.vm(vm_id).temporary_host() {
            self.destroy_temporary(host_id, vm_id)?;
        }
        self.vms.remove(&vm_id).ok_or(AllocationError::UnknownVm(vm_id))
    }
}
