//! Placement groups: sets of VMs which are placed as a unit.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::core::common::{HostId, VmId};
use crate::core::resource_pool::ResourcePool;

/// Topology level the group is placed under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum GroupScope {
    Switch,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AffinityType {
    /// Members are placed close to each other.
    Affinity,
    /// Members are placed apart. Not supported by the scheduler.
    AntiAffinity,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Enforcement {
    /// All members must be placed under a single switch.
    Strict,
    /// Members are placed under as few switches as possible.
    BestEffort,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum GroupStatus {
    Pending,
    Created,
    Migrating,
    Finished,
}

impl Display for GroupStatus {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            GroupStatus::Pending => write!(f, "pending"),
            GroupStatus::Created => write!(f, "created"),
            GroupStatus::Migrating => write!(f, "migrating"),
            GroupStatus::Finished => write!(f, "finished"),
        }
    }
}

/// Ordered set of VMs which are created all at once or not at all.
///
/// Placement metadata (start time, number of used hosts and switches) is available once the group is created.
#[derive(Clone, Debug, Serialize)]
pub struct VmPlacementGroup {
    pub id: u32,
    vms: Vec<VmId>,
    scope: GroupScope,
    affinity: AffinityType,
    enforcement: Enforcement,
    status: GroupStatus,
    ideal_num_switches: Option<usize>,
    start_time: Option<f64>,
    num_hosts: Option<usize>,
    num_switches: Option<usize>,
}

impl VmPlacementGroup {
    pub fn new(id: u32, vms: Vec<VmId>, scope: GroupScope, affinity: AffinityType, enforcement: Enforcement) -> Self {
        Self {
            id,
            vms,
            scope,
            affinity,
            enforcement,
            status: GroupStatus::Pending,
            ideal_num_switches: None,
            start_time: None,
            num_hosts: None,
            num_switches: None,
        }
    }

    /// Creates group of co-located VMs under one switch.
    pub fn affinity(id: u32, vms: Vec<VmId>, enforcement: Enforcement) -> Self {
        Self::new(id, vms, GroupScope::Switch, AffinityType::Affinity, enforcement)
    }

    pub fn vms(&self) -> &[VmId] {
        &self.vms
    }

    pub fn scope(&self) -> GroupScope {
        self.scope
    }

    pub fn affinity_type(&self) -> AffinityType {
        self.affinity
    }

    pub fn enforcement(&self) -> Enforcement {
        self.enforcement
    }

    pub fn status(&self) -> GroupStatus {
        self.status
    }

    pub fn is_created(&self) -> bool {
        matches!(self.status, GroupStatus::Created | GroupStatus::Migrating)
    }

    /// Returns the minimal number of switches able to hold the group (computed on the first placement attempt).
    pub fn ideal_num_switches(&self) -> Option<usize> {
        self.ideal_num_switches
    }

    pub fn start_time(&self) -> Option<f64> {
        self.start_time
    }

    /// Returns the number of distinct hosts the members were placed on.
    pub fn num_hosts(&self) -> Option<usize> {
        self.num_hosts
    }

    /// Returns the number of distinct switches the members were placed under.
    pub fn num_switches(&self) -> Option<usize> {
        self.num_switches
    }

    pub(crate) fn set_ideal_num_switches(&mut self, num: usize) {
        self.ideal_num_switches = Some(num);
    }

    pub(crate) fn mark_created(&mut self, time: f64, num_hosts: usize, num_switches: usize) {
        self.status = GroupStatus::Created;
        self.start_time = Some(time);
        self.num_hosts = Some(num_hosts);
        self.num_switches = Some(num_switches);
    }

    /// Switches a created group between `Created` and `Migrating` depending on whether any member is migrating.
    pub fn update_migration_status(&mut self, pool: &ResourcePool) {
        if !self.is_created() {
            return;
        }
        let migrating = self
            .vms
            .iter()
            .any(|&vm_id| pool.try_vm(vm_id).map_or(false, |vm| vm.is_in_migration()));
        self.status = if migrating {
            GroupStatus::Migrating
        } else {
            GroupStatus::Created
        };
    }

    /// Marks created group as finished. Returns `false` if the group was never created.
    pub fn finish(&mut self) -> bool {
        if !self.is_created() {
            return false;
        }
        self.status = GroupStatus::Finished;
        true
    }

    /// Returns the hosts the members are placed on now.
    pub fn hosts(&self, pool: &ResourcePool) -> BTreeSet<HostId> {
        self.vms
            .iter()
            .filter_map(|&vm_id| pool.try_vm(vm_id).ok().and_then(|vm| vm.host()))
            .collect()
    }
}
