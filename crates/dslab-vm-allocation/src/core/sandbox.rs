//! Transactional allocation sandbox.
//!
//! Temporary placements reserve host resources without committing a VM, so that a placement decision can be
//! evaluated and then undone. A snapshot of real placements can be saved before a series of such probes and
//! restored afterwards.

use indexmap::IndexMap;

use crate::core::common::{AllocationVerdict, HostId, VmId};
use crate::core::errors::{AllocationError, SnapshotRestoreError};
use crate::core::host::{AllocationKind, VmAllocation};
use crate::core::resource_pool::ResourcePool;

/// Real placements of VMs captured at some moment, together with the exact PEs each of them holds.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AllocationSnapshot {
    placements: IndexMap<VmId, (HostId, VmAllocation)>,
    migrating_in: IndexMap<VmId, (HostId, VmAllocation)>,
}

impl AllocationSnapshot {
    pub fn host_of(&self, vm_id: VmId) -> Option<HostId> {
        self.placements.get(&vm_id).map(|(host_id, _)| *host_id)
    }

    /// Returns the saved reservation of the VM placement.
    pub fn allocation_of(&self, vm_id: VmId) -> Option<&VmAllocation> {
        self.placements.get(&vm_id).map(|(_, alloc)| alloc)
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }
}

impl ResourcePool {
    /// Provisionally reserves VM resources on the host and adds the VM to the host VM list.
    ///
    /// Returns `false` without changing anything if the VM already holds a temporary reservation
    /// or the host can't accommodate it.
    pub fn create_temporary(&mut self, host_id: HostId, vm_id: VmId) -> bool {
        let Ok(vm) = self.try_vm(vm_id) else {
            return false;
        };
        if vm.is_temporary() {
            return false;
        }
        let resources = vm.resources;
        let Ok(host) = self.try_host(host_id) else {
            return false;
        };
        if host.allocation(vm_id).is_some() {
            return false;
        }
        let host = self.host_mut(host_id);
        if host.allocate(vm_id, &resources, AllocationKind::Temporary).is_err() {
            return false;
        }
        host.vms_mut().push(vm_id);
        if let Some(vm) = self.vm_mut(vm_id) {
            vm.set_temporary_host(Some(host_id));
        }
        true
    }

    /// Releases the temporary reservation made by [`create_temporary`](Self::create_temporary).
    pub fn destroy_temporary(&mut self, host_id: HostId, vm_id: VmId) -> Result<(), AllocationError> {
        self.try_host(host_id)?;
        if self.try_vm(vm_id)?.temporary_host() != Some(host_id)
            || !self.host(host_id).has_allocation(vm_id, AllocationKind::Temporary)
        {
            return Err(AllocationError::NotTemporary { vm: vm_id, host: host_id });
        }
        let host = self.host_mut(host_id);
        host.release(vm_id);
        host.vms_mut().retain(|&id| id != vm_id);
        if let Some(vm) = self.vm_mut(vm_id) {
            vm.set_temporary_host(None);
        }
        Ok(())
    }

    /// Captures real placements of all VMs and reservations of incoming migrations.
    /// Temporary reservations are not included.
    pub fn save_allocation(&self) -> AllocationSnapshot {
        let mut snapshot = AllocationSnapshot::default();
        for host in self.hosts() {
            for &vm_id in host.vms() {
                if let Some(alloc) = host.allocation(vm_id).filter(|alloc| alloc.kind == AllocationKind::Real) {
                    snapshot.placements.insert(vm_id, (host.id, alloc.clone()));
                }
            }
            for &vm_id in host.vms_migrating_in() {
                if let Some(alloc) = host.allocation(vm_id).filter(|alloc| alloc.kind == AllocationKind::MigratingIn) {
                    snapshot.migrating_in.insert(vm_id, (host.id, alloc.clone()));
                }
            }
        }
        snapshot
    }

    /// Brings the pool back to the saved state.
    ///
    /// All reservations are dropped, then reservations of incoming migrations and every saved placement are put
    /// back on the same PEs they occupied when the snapshot was taken.
    pub fn restore_allocation(&mut self, snapshot: &AllocationSnapshot) -> Result<(), SnapshotRestoreError> {
        for host_id in self.host_ids() {
            self.host_mut(host_id).clear_allocations();
        }
        let vm_ids: Vec<VmId> = self.vms().map(|vm| vm.id).collect();
        for vm_id in vm_ids {
            if let Some(vm) = self.vm_mut(vm_id) {
                vm.set_host(None);
                vm.set_temporary_host(None);
            }
        }

        for host_id in self.host_ids() {
            let migrating_in = self.host(host_id).vms_migrating_in().to_vec();
            for vm_id in migrating_in {
                let error = |verdict| SnapshotRestoreError {
                    vm: vm_id,
                    host: host_id,
                    verdict,
                };
                let resources = self.try_vm(vm_id).map_err(|_| error(AllocationVerdict::VmNotFound))?.resources;
                let host = self.host_mut(host_id);
                let result = match snapshot.migrating_in.get(&vm_id) {
                    Some((saved_host, alloc)) if *saved_host == host_id => host.restore_reservation(vm_id, alloc),
                    _ => host.reserve(vm_id, &resources, AllocationKind::MigratingIn),
                };
                result.map_err(error)?;
            }
        }

        for (&vm_id, (host_id, alloc)) in snapshot.placements.iter() {
            let host_id = *host_id;
            let error = |verdict| SnapshotRestoreError {
                vm: vm_id,
                host: host_id,
                verdict,
            };
            self.try_vm(vm_id).map_err(|_| error(AllocationVerdict::VmNotFound))?;
            self.try_host(host_id).map_err(|_| error(AllocationVerdict::HostNotFound))?;
            let host = self.host_mut(host_id);
            host.restore_reservation(vm_id, alloc).map_err(error)?;
            host.vms_mut().push(vm_id);
            if let Some(vm) = self.vm_mut(vm_id) {
                vm.set_host(Some(host_id));
            }
        }
        Ok(())
    }
}
