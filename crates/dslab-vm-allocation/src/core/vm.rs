//! Representation of virtual machine and its status.

use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::core::common::{temporary_vm_id, HostId, VmId};

/// Resources requested by a VM.
///
/// CPU is requested as a number of processing elements (PEs) with the same MIPS capacity each.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct VmResources {
    pub pes: u32,
    pub mips: f64,
    pub ram: u64,
    pub bw: u64,
    pub storage: u64,
}

impl VmResources {
    pub fn new(pes: u32, mips: f64, ram: u64, bw: u64, storage: u64) -> Self {
        Self {
            pes,
            mips,
            ram,
            bw,
            storage,
        }
    }

    /// Returns the total requested CPU capacity in MIPS.
    pub fn total_mips(&self) -> f64 {
        self.pes as f64 * self.mips
    }
}

/// Status of virtual machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum VmStatus {
    Waiting,
    Running,
    Migrating,
}

impl Display for VmStatus {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            VmStatus::Waiting => write!(f, "waiting"),
            VmStatus::Running => write!(f, "running"),
            VmStatus::Migrating => write!(f, "migrating"),
        }
    }
}

/// Represents virtual machine (VM).
///
// A VM is committed to at most one host at a time (`host`). Independently of that it can hold a single
// temporary reservation on some host (`temporary_host`), which is used to probe placements without committing them.
#[derive(Clone, Debug, Serialize)]
pub struct Vm {
    pub id: VmId,
    pub resources: VmResources,
    host: Option<HostId>,
    temporary_host: Option<HostId>,
    in_migration: bool,
    utilization: f64,
}

impl Vm {
    /// Creates VM which is not placed anywhere and uses all requested CPU.
    pub fn new(id: VmId, resources: VmResources) -> Self {
        Self {
            id,
            resources,
            host: None,
            temporary_host: None,
            in_migration: false,
            utilization: 1.,
        }
    }

    /// Creates a copy of this VM with the same resource demand and a synthetic ID,
    /// which is used to probe placements of this VM.
    pub fn temporary_copy(&self) -> Self {
        let mut copy = Self::new(temporary_vm_id(self.id), self.resources);
        copy.utilization = self.utilization;
        copy
    }

    /// Returns the host where the VM resources are committed.
    pub fn host(&self) -> Option<HostId> {
        self.host
    }

    /// Returns the host where the VM has a temporary reservation.
    pub fn temporary_host(&self) -> Option<HostId> {
        self.temporary_host
    }

    /// Returns true if VM resources are committed on some host.
    pub fn is_created(&self) -> bool {
        self.host.is_some()
    }

    /// Returns true if VM holds a temporary reservation.
    pub fn is_temporary(&self) -> bool {
        self.temporary_host.is_some()
    }

    pub fn is_in_migration(&self) -> bool {
        self.in_migration
    }

    pub fn status(&self) -> VmStatus {
        if self.in_migration {
            VmStatus::Migrating
        } else if self.host.is_some() {
            VmStatus::Running
        } else {
            VmStatus::Waiting
        }
    }

    /// Returns the fraction of requested CPU capacity currently used by the VM.
    pub fn utilization(&self) -> f64 {
        self.utilization
    }

    /// Returns the CPU capacity in MIPS the VM currently demands.
    pub fn current_requested_mips(&self) -> f64 {
        self.resources.total_mips() * self.utilization
    }

    pub(crate) fn set_utilization(&mut self, utilization: f64) {
        self.utilization = utilization.clamp(0., 1.);
    }

    pub(crate) fn set_host(&mut self, host: Option<HostId>) {
        self.host = host;
    }

    pub(crate) fn set_temporary_host(&mut self, host: Option<HostId>) {
        self.temporary_host = host;
    }

    pub(crate) fn set_in_migration(&mut self, in_migration: bool) {
        self.in_migration = in_migration;
    }
}
