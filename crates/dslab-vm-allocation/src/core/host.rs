//! Physical host: resource capacity, current allocations and utilization history.

use std::collections::{BTreeMap, VecDeque};

use crate::core::common::{AllocationVerdict, HostId, VmId, MIPS_EPSILON};
use crate::core::power_model::{LinearPowerModel, PowerModel};
use crate::core::vm::VmResources;

/// Default number of utilization samples kept by a host.
pub const DEFAULT_HISTORY_LENGTH: usize = 30;

/// Processing element (CPU core) of a host.
#[derive(Clone, Debug, PartialEq)]
pub struct Pe {
    pub mips: f64,
    pub allocated_mips: f64,
}

impl Pe {
    pub fn new(mips: f64) -> Self {
        Self {
            mips,
            allocated_mips: 0.,
        }
    }

    pub fn available_mips(&self) -> f64 {
        self.mips - self.allocated_mips
    }

    pub fn is_free(&self) -> bool {
        self.allocated_mips <= MIPS_EPSILON
    }
}

/// Kind of resources reservation held by a VM on a host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocationKind {
    /// VM is committed to the host.
    Real,
    /// Provisional reservation used to probe a placement.
    Temporary,
    /// Reservation for a VM which is being migrated to the host.
    MigratingIn,
}

/// Resources held by a single VM on a host.
#[derive(Clone, Debug, PartialEq)]
pub struct VmAllocation {
    pub pes: Vec<usize>,
    pub mips_per_pe: f64,
    pub ram: u64,
    pub bw: u64,
    pub storage: u64,
    pub kind: AllocationKind,
}

/// Host properties used to add a host to the resource pool.
#[derive(Clone)]
pub struct HostSpec {
    pub pes: u32,
    pub mips_per_pe: f64,
    pub ram: u64,
    pub bw: u64,
    pub storage: u64,
    pub history_length: usize,
    pub power_model: Box<dyn PowerModel>,
}

impl HostSpec {
    /// Creates host spec with the default linear power model (idle 70% of 250 W) and history length.
    pub fn new(pes: u32, mips_per_pe: f64, ram: u64, bw: u64, storage: u64) -> Self {
        Self {
            pes,
            mips_per_pe,
            ram,
            bw,
            storage,
            history_length: DEFAULT_HISTORY_LENGTH,
            power_model: Box::new(LinearPowerModel::new(250., 175.)),
        }
    }

    pub fn power_model(mut self, power_model: Box<dyn PowerModel>) -> Self {
        self.power_model = power_model;
        self
    }

    pub fn history_length(mut self, history_length: usize) -> Self {
        self.history_length = history_length;
        self
    }
}

/// Represents physical host.
///
/// The host tracks which VMs hold resources on it and how much of each resource is allocated. VMs which are placed
/// on the host (for real or temporarily) are listed in `vms`, reservations of incoming migrations are listed in
/// `vms_migrating_in`.
#[derive(Clone)]
pub struct Host {
    pub id: HostId,
    pes: Vec<Pe>,
    ram_total: u64,
    ram_allocated: u64,
    bw_total: u64,
    bw_allocated: u64,
    storage_total: u64,
    storage_allocated: u64,
    active: bool,
    failed: bool,
    vms: Vec<VmId>,
    vms_migrating_in: Vec<VmId>,
    vms_migrating_out: Vec<VmId>,
    allocations: BTreeMap<VmId, VmAllocation>,
    utilization_history: VecDeque<f64>,
    history_length: usize,
    power_model: Box<dyn PowerModel>,
}

impl Host {
    pub fn new(id: HostId, spec: HostSpec) -> Self {
        Self {
            id,
            pes: (0..spec.pes).map(|_| Pe::new(spec.mips_per_pe)).collect(),
            ram_total: spec.ram,
            ram_allocated: 0,
            bw_total: spec.bw,
            bw_allocated: 0,
            storage_total: spec.storage,
            storage_allocated: 0,
            active: false,
            failed: false,
            vms: Vec::new(),
            vms_migrating_in: Vec::new(),
            vms_migrating_out: Vec::new(),
            allocations: BTreeMap::new(),
            utilization_history: VecDeque::with_capacity(spec.history_length),
            history_length: spec.history_length,
            power_model: spec.power_model,
        }
    }

    pub fn pes(&self) -> &[Pe] {
        &self.pes
    }

    pub fn pes_number(&self) -> usize {
        self.pes.len()
    }

    /// Returns the number of PEs without any allocated capacity.
    pub fn free_pes_number(&self) -> usize {
        self.pes.iter().filter(|pe| pe.is_free()).count()
    }

    pub fn total_mips(&self) -> f64 {
        self.pes.iter().map(|pe| pe.mips).sum()
    }

    pub fn allocated_mips(&self) -> f64 {
        self.pes.iter().map(|pe| pe.allocated_mips).sum()
    }

    pub fn available_mips(&self) -> f64 {
        self.total_mips() - self.allocated_mips()
    }

    pub fn ram_total(&self) -> u64 {
        self.ram_total
    }

    pub fn ram_available(&self) -> u64 {
        self.ram_total - self.ram_allocated
    }

    pub fn bw_total(&self) -> u64 {
        self.bw_total
    }

    pub fn bw_available(&self) -> u64 {
        self.bw_total - self.bw_allocated
    }

    pub fn storage_total(&self) -> u64 {
        self.storage_total
    }

    pub fn storage_available(&self) -> u64 {
        self.storage_total - self.storage_allocated
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// VMs placed on the host, including temporary placements.
    pub fn vms(&self) -> &[VmId] {
        &self.vms
    }

    pub fn vms_migrating_in(&self) -> &[VmId] {
        &self.vms_migrating_in
    }

    pub fn vms_migrating_out(&self) -> &[VmId] {
        &self.vms_migrating_out
    }

    pub fn allocation(&self, vm_id: VmId) -> Option<&VmAllocation> {
        self.allocations.get(&vm_id)
    }

    /// Returns true if the host holds a reservation of the specified kind for the VM.
    pub fn has_allocation(&self, vm_id: VmId, kind: AllocationKind) -> bool {
        self.allocations.get(&vm_id).map_or(false, |alloc| alloc.kind == kind)
    }

    /// Returns utilization samples, the oldest first.
    pub fn utilization_history(&self) -> &VecDeque<f64> {
        &self.utilization_history
    }

    /// Returns the host power consumption at the specified CPU utilization.
    pub fn power(&self, time: f64, utilization: f64) -> f64 {
        self.power_model.get_power(time, utilization)
    }

    /// Checks if the requested resources can be allocated on the host now.
    pub fn can_allocate(&self, demand: &VmResources) -> AllocationVerdict {
        if self.failed {
            return AllocationVerdict::HostFailed;
        }
        self.check_capacity(demand)
    }

    /// Checks only the free capacity, ignoring the host state.
    fn check_capacity(&self, demand: &VmResources) -> AllocationVerdict {
        if self.select_pes(demand).is_none() {
            if (demand.pes as usize) > self.pes.len() {
                return AllocationVerdict::NotEnoughPes;
            }
            if self.available_mips() + MIPS_EPSILON < demand.total_mips() {
                return AllocationVerdict::NotEnoughCpu;
            }
            return AllocationVerdict::NotEnoughPes;
        }
        if self.ram_available() < demand.ram {
            return AllocationVerdict::NotEnoughMemory;
        }
        if self.bw_available() < demand.bw {
            return AllocationVerdict::NotEnoughBandwidth;
        }
        if self.storage_available() < demand.storage {
            return AllocationVerdict::NotEnoughStorage;
        }
        AllocationVerdict::Success
    }

    /// Picks PEs for the demand: the first ones (in index order) which have enough free MIPS.
    fn select_pes(&self, demand: &VmResources) -> Option<Vec<usize>> {
        let selected: Vec<usize> = self
            .pes
            .iter()
            .enumerate()
            .filter(|(_, pe)| pe.available_mips() + MIPS_EPSILON >= demand.mips)
            .map(|(idx, _)| idx)
            .take(demand.pes as usize)
            .collect();
        if selected.len() < demand.pes as usize {
            return None;
        }
        Some(selected)
    }

    /// Reserves resources for the VM. The caller is responsible for maintaining VM lists.
    pub(crate) fn allocate(
        &mut self,
        vm_id: VmId,
        demand: &VmResources,
        kind: AllocationKind,
    ) -> Result<(), AllocationVerdict> {
        if self.failed {
            return Err(AllocationVerdict::HostFailed);
        }
        self.reserve(vm_id, demand, kind)
    }

    /// Same as [`allocate`](Self::allocate) but also works on a failed host.
    /// Used to bring back reservations which existed before.
    pub(crate) fn reserve(
        &mut self,
        vm_id: VmId,
        demand: &VmResources,
        kind: AllocationKind,
    ) -> Result<(), AllocationVerdict> {
        let verdict = self.check_capacity(demand);
        if verdict != AllocationVerdict::Success {
            return Err(verdict);
        }
        let pes = self.select_pes(demand).ok_or(AllocationVerdict::NotEnoughPes)?;
        self.commit(
            vm_id,
            VmAllocation {
                pes,
                mips_per_pe: demand.mips,
                ram: demand.ram,
                bw: demand.bw,
                storage: demand.storage,
                kind,
            },
        );
        Ok(())
    }

    /// Puts back a reservation captured earlier on exactly the same PEs.
    ///
    /// Unlike [`reserve`](Self::reserve) no PE selection is done, so a fragmented layout of PEs
    /// is reproduced as it was.
    pub(crate) fn restore_reservation(&mut self, vm_id: VmId, alloc: &VmAllocation) -> Result<(), AllocationVerdict> {
        if self.allocations.contains_key(&vm_id) || alloc.pes.iter().any(|&idx| idx >= self.pes.len()) {
            return Err(AllocationVerdict::NotEnoughPes);
        }
        if alloc
            .pes
            .iter()
            .any(|&idx| self.pes[idx].available_mips() + MIPS_EPSILON < alloc.mips_per_pe)
        {
            return Err(AllocationVerdict::NotEnoughCpu);
        }
        if self.ram_available() < alloc.ram {
            return Err(AllocationVerdict::NotEnoughMemory);
        }
        if self.bw_available() < alloc.bw {
            return Err(AllocationVerdict::NotEnoughBandwidth);
        }
        if self.storage_available() < alloc.storage {
            return Err(AllocationVerdict::NotEnoughStorage);
        }
        self.commit(vm_id, alloc.clone());
        Ok(())
    }

    fn commit(&mut self, vm_id: VmId, alloc: VmAllocation) {
        for &idx in alloc.pes.iter() {
            self.pes[idx].allocated_mips += alloc.mips_per_pe;
        }
        self.ram_allocated += alloc.ram;
        self.bw_allocated += alloc.bw;
        self.storage_allocated += alloc.storage;
        if alloc.kind == AllocationKind::Real {
            self.active = true;
        }
        self.allocations.insert(vm_id, alloc);
    }

    /// Changes the kind of existing reservation without touching the reserved resources.
    pub(crate) fn convert_allocation(&mut self, vm_id: VmId, kind: AllocationKind) -> bool {
        let Some(alloc) = self.allocations.get_mut(&vm_id) else {
            return false;
        };
        alloc.kind = kind;
        if kind == AllocationKind::Real {
            self.active = true;
        }
        true
    }

    /// Releases resources held by the VM.
    pub(crate) fn release(&mut self, vm_id: VmId) -> Option<VmAllocation> {
        let alloc = self.allocations.remove(&vm_id)?;
        for &idx in alloc.pes.iter() {
            let pe = &mut self.pes[idx];
            pe.allocated_mips = (pe.allocated_mips - alloc.mips_per_pe).max(0.);
        }
        self.ram_allocated -= alloc.ram;
        self.bw_allocated -= alloc.bw;
        self.storage_allocated -= alloc.storage;
        Some(alloc)
    }

    /// Drops all reservations and placed VMs. Migration lists are kept.
    pub(crate) fn clear_allocations(&mut self) {
        self.allocations.clear();
        for pe in self.pes.iter_mut() {
            pe.allocated_mips = 0.;
        }
        self.ram_allocated = 0;
        self.bw_allocated = 0;
        self.storage_allocated = 0;
        self.vms.clear();
    }

    pub(crate) fn vms_mut(&mut self) -> &mut Vec<VmId> {
        &mut self.vms
    }

    pub(crate) fn vms_migrating_in_mut(&mut self) -> &mut Vec<VmId> {
        &mut self.vms_migrating_in
    }

    pub(crate) fn vms_migrating_out_mut(&mut self) -> &mut Vec<VmId> {
        &mut self.vms_migrating_out
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub(crate) fn set_failed(&mut self, failed: bool) {
        self.failed = failed;
    }

    /// Appends utilization sample dropping the oldest one if the history is full.
    pub(crate) fn record_utilization(&mut self, utilization: f64) {
        if self.history_length == 0 {
            return;
        }
        if self.utilization_history.len() == self.history_length {
            self.utilization_history.pop_front();
        }
        self.utilization_history.push_back(utilization);
    }
}
