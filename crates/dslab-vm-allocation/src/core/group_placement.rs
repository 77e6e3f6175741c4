//! Placement of VM groups under switch topology constraints.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use serde::Serialize;

use crate::core::common::{temporary_vm_id, HostId, VmId};
use crate::core::context::PolicyContext;
use crate::core::errors::ConfigError;
use crate::core::placement_group::{AffinityType, Enforcement, GroupStatus, VmPlacementGroup};
use crate::core::resource_pool::ResourcePool;
use crate::{log_debug, log_error, log_info, log_warn};

/// Heuristic used to spread a best-effort group across switches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum GroupPacking {
    /// Switches are filled left to right.
    Naive,
    /// Small groups fill switches left to right, large groups fill them right to left.
    PackFromEdges,
    /// The most free switches and hosts are filled first.
    AllPack,
}

impl FromStr for GroupPacking {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Naive" => Ok(GroupPacking::Naive),
            "PackFromEdges" => Ok(GroupPacking::PackFromEdges),
            "AllPack" => Ok(GroupPacking::AllPack),
            _ => Err(ConfigError::UnknownComponent {
                kind: "group packing heuristic",
                name: s.to_string(),
            }),
        }
    }
}

/// Temporary copy of a group member and the host it is provisionally placed on.
type TemporaryPlacement = (VmId, HostId);

/// Places VM groups atomically: either every member is created or none.
///
/// Hosts are split into switches by their IDs: switch `i` holds hosts `[i * hosts_per_switch, (i + 1) *
/// hosts_per_switch)`. Members are probed with temporary copies, which are converted to real placements only after
/// the whole group has found its hosts.
#[derive(Clone, Debug)]
pub struct GroupScheduler {
    hosts_per_switch: usize,
    packing: GroupPacking,
    right_to_left_cursor: Option<usize>,
}

impl GroupScheduler {
    pub fn new(hosts_per_switch: u32, packing: GroupPacking) -> Self {
        Self {
            hosts_per_switch: hosts_per_switch.max(1) as usize,
            packing,
            right_to_left_cursor: None,
        }
    }

    pub fn hosts_per_switch(&self) -> usize {
        self.hosts_per_switch
    }

    pub fn packing(&self) -> GroupPacking {
        self.packing
    }

    /// Returns the switch where the next large pack-from-edges group starts (the rightmost one if `None`).
    pub fn right_to_left_cursor(&self) -> Option<usize> {
        self.right_to_left_cursor
    }

    pub fn switch_of(&self, host_id: HostId) -> usize {
        host_id as usize / self.hosts_per_switch
    }

    pub fn switch_count(&self, pool: &ResourcePool) -> usize {
        (pool.host_count() + self.hosts_per_switch - 1) / self.hosts_per_switch
    }

    fn switch_hosts(&self, pool: &ResourcePool, switch: usize) -> Vec<HostId> {
        let start = switch * self.hosts_per_switch;
        let end = (start + self.hosts_per_switch).min(pool.host_count());
        (start..end).map(|id| id as HostId).collect()
    }

    fn switch_free_pes(&self, pool: &ResourcePool, switch: usize) -> usize {
        self.switch_hosts(pool, switch)
            .iter()
            .map(|&host_id| pool.host(host_id).free_pes_number())
            .sum()
    }

    /// Returns hosts of the switch in the order they are tried.
    ///
    /// All-pack puts hosts with the most free PEs first, other heuristics put the fullest hosts first.
    /// Ties keep the host ID order.
    pub fn ordered_switch_hosts(&self, pool: &ResourcePool, switch: usize) -> Vec<HostId> {
        let mut hosts = self.switch_hosts(pool, switch);
        match self.packing {
            GroupPacking::AllPack => hosts.sort_by_key(|&host_id| Reverse(pool.host(host_id).free_pes_number())),
            _ => hosts.sort_by_key(|&host_id| pool.host(host_id).free_pes_number()),
        }
        hosts
    }

    /// Returns switches in the order they are tried, all-pack puts the most free switches first.
    ///
    /// The order is computed once per group placement (and once per single VM placement) and is kept for the whole
    /// sweep, while hosts within a switch are re-sorted for every member placed.
    pub fn switch_order(&self, pool: &ResourcePool) -> Vec<usize> {
        let mut switches: Vec<usize> = (0..self.switch_count(pool)).collect();
        if self.packing == GroupPacking::AllPack {
            switches.sort_by_key(|&switch| Reverse(self.switch_free_pes(pool, switch)));
        }
        switches
    }

    /// Returns the order of hosts for placing a single VM.
    pub fn host_order(&self, pool: &ResourcePool) -> Vec<HostId> {
        match self.packing {
            GroupPacking::AllPack => self
                .switch_order(pool)
                .into_iter()
                .flat_map(|switch| self.ordered_switch_hosts(pool, switch))
                .collect(),
            _ => pool.host_ids(),
        }
    }

    /// Returns the minimal number of switches whose PE capacity can hold all members.
    pub fn ideal_num_switches(&self, pool: &ResourcePool, vms: &[VmId]) -> usize {
        let demand: usize = vms
            .iter()
            .filter_map(|&vm_id| pool.try_vm(vm_id).ok())
            .map(|vm| vm.resources.pes as usize)
            .sum();
        let capacity = (0..self.switch_count(pool))
            .map(|switch| {
                self.switch_hosts(pool, switch)
                    .iter()
                    .map(|&host_id| pool.host(host_id).pes_number())
                    .sum::<usize>()
            })
            .max()
            .unwrap_or(0);
        if capacity == 0 {
            return 1;
        }
        ((demand + capacity - 1) / capacity).max(1)
    }

    /// Tries to place all members of the group.
    ///
    /// Returns `true` if the group is created. Otherwise nothing is changed in the pool and the group stays pending.
    pub fn place_group(&mut self, pool: &mut ResourcePool, group: &mut VmPlacementGroup, ctx: &PolicyContext) -> bool {
        if group.status() != GroupStatus::Pending {
            log_warn!(ctx, "group {} is {}, can't place it", group.id, group.status());
            return false;
        }
        if group.affinity_type() == AffinityType::AntiAffinity {
            log_warn!(ctx, "group {}: anti-affinity groups are not supported", group.id);
            return false;
        }
        if group.vms().is_empty() {
            log_warn!(ctx, "group {} is empty", group.id);
            return false;
        }
        let mut members = BTreeSet::new();
        for &vm_id in group.vms() {
            let placeable = match pool.try_vm(vm_id) {
                Ok(vm) => !vm.is_created() && !vm.is_temporary() && members.insert(vm_id),
                Err(_) => false,
            };
            if !placeable || pool.try_vm(temporary_vm_id(vm_id)).is_ok() {
                log_warn!(ctx, "group {}: vm {} can't be placed", group.id, vm_id);
                return false;
            }
        }

        let ideal_num_switches = match group.ideal_num_switches() {
            Some(num) => num,
            None => {
                let num = self.ideal_num_switches(pool, group.vms());
                group.set_ideal_num_switches(num);
                num
            }
        };

        let mut copies: Vec<(VmId, VmId)> = Vec::with_capacity(group.vms().len());
        for &vm_id in group.vms() {
            match pool.add_temporary_copy(vm_id) {
                Ok(copy_id) => copies.push((vm_id, copy_id)),
                Err(e) => {
                    log_warn!(ctx, "group {}: {}", group.id, e);
                    remove_copies(pool, &copies);
                    return false;
                }
            }
        }
        let copy_ids: Vec<VmId> = copies.iter().map(|&(_, copy_id)| copy_id).collect();

        let mut placed: Vec<TemporaryPlacement> = Vec::new();
        let success = match group.enforcement() {
            Enforcement::Strict => self.place_under_single_switch(pool, &copy_ids, &mut placed, ctx),
            Enforcement::BestEffort => {
                (ideal_num_switches == 1 && self.place_under_single_switch(pool, &copy_ids, &mut placed, ctx))
                    || self.place_across_switches(pool, &copy_ids, ideal_num_switches, &mut placed, ctx)
            }
        };

        if !success {
            rollback(pool, &mut placed, ctx);
            remove_copies(pool, &copies);
            log_info!(ctx, "failed to place group {} of {} vms", group.id, copies.len());
            return false;
        }

        let hosts_of_copies: BTreeMap<VmId, HostId> = placed.iter().copied().collect();
        let mut hosts = BTreeSet::new();
        let mut switches = BTreeSet::new();
        for &(vm_id, copy_id) in copies.iter() {
            let Some(&host_id) = hosts_of_copies.get(&copy_id) else {
                log_error!(ctx, "group {}: vm {} has no host after successful placement", group.id, vm_id);
                panic!("placement of group {} is inconsistent", group.id);
            };
            let result = pool.destroy_temporary(host_id, copy_id).and_then(|_| {
                pool.remove_vm(copy_id);
                pool.allocate(host_id, vm_id)
            });
            if let Err(e) = result {
                log_error!(ctx, "group {}: can't create vm {} on host {}: {}", group.id, vm_id, host_id, e);
                panic!("can't create vm {} of group {}: {}", vm_id, group.id, e);
            }
            log_debug!(ctx, "group {}: vm {} created on host {}", group.id, vm_id, host_id);
            hosts.insert(host_id);
            switches.insert(self.switch_of(host_id));
        }
        group.mark_created(ctx.time(), hosts.len(), switches.len());
        log_info!(
            ctx,
            "group {} created on {} hosts under {} switches (ideal {})",
            group.id,
            hosts.len(),
            switches.len(),
            ideal_num_switches
        );
        true
    }

    /// Places the copy on the first host of the switch that accepts it.
    fn place_in_switch(&self, pool: &mut ResourcePool, switch: usize, copy_id: VmId) -> Option<HostId> {
        let hosts = self.ordered_switch_hosts(pool, switch);
        hosts.into_iter().find(|&host_id| pool.create_temporary(host_id, copy_id))
    }

    fn place_under_single_switch(
        &self,
        pool: &mut ResourcePool,
        copies: &[VmId],
        placed: &mut Vec<TemporaryPlacement>,
        ctx: &PolicyContext,
    ) -> bool {
        for switch in self.switch_order(pool) {
            let mut switch_placed = Vec::with_capacity(copies.len());
            for &copy_id in copies {
                match self.place_in_switch(pool, switch, copy_id) {
                    Some(host_id) => switch_placed.push((copy_id, host_id)),
                    None => break,
                }
            }
            if switch_placed.len() == copies.len() {
                placed.extend(switch_placed);
                return true;
            }
            rollback(pool, &mut switch_placed, ctx);
        }
        false
    }

    fn place_across_switches(
        &mut self,
        pool: &mut ResourcePool,
        copies: &[VmId],
        ideal_num_switches: usize,
        placed: &mut Vec<TemporaryPlacement>,
        ctx: &PolicyContext,
    ) -> bool {
        let switch_count = self.switch_count(pool);
        if switch_count == 0 {
            return false;
        }
        match self.packing {
            GroupPacking::Naive => {
                let switches: Vec<usize> = (0..switch_count).collect();
                self.sweep(pool, &switches, copies, placed).is_some()
            }
            GroupPacking::AllPack => {
                let switches = self.switch_order(pool);
                self.sweep(pool, &switches, copies, placed).is_some()
            }
            GroupPacking::PackFromEdges if ideal_num_switches <= 1 => {
                let switches: Vec<usize> = (0..switch_count).collect();
                self.sweep(pool, &switches, copies, placed).is_some()
            }
            GroupPacking::PackFromEdges => {
                let rightmost = switch_count - 1;
                let start = self.right_to_left_cursor.filter(|&s| s < switch_count).unwrap_or(rightmost);
                let switches: Vec<usize> = (0..=start).rev().collect();
                if let Some(last) = self.sweep(pool, &switches, copies, placed) {
                    self.right_to_left_cursor = Some(last);
                    return true;
                }
                if start != rightmost {
                    log_debug!(ctx, "retrying right-to-left sweep from switch {}", rightmost);
                    rollback(pool, placed, ctx);
                    let switches: Vec<usize> = (0..=rightmost).rev().collect();
                    if let Some(last) = self.sweep(pool, &switches, copies, placed) {
                        self.right_to_left_cursor = Some(last);
                        return true;
                    }
                }
                self.right_to_left_cursor = None;
                false
            }
        }
    }

    /// Visits switches in the given order placing as many pending copies as possible under each one.
    ///
    /// Returns the last switch used if every copy was placed.
    fn sweep(
        &self,
        pool: &mut ResourcePool,
        switches: &[usize],
        copies: &[VmId],
        placed: &mut Vec<TemporaryPlacement>,
    ) -> Option<usize> {
        let mut pending: Vec<VmId> = copies.to_vec();
        for &switch in switches {
            let mut used = false;
            pending.retain(|&copy_id| match self.place_in_switch(pool, switch, copy_id) {
                Some(host_id) => {
                    placed.push((copy_id, host_id));
                    used = true;
                    false
                }
                None => true,
            });
            if pending.is_empty() && used {
                return Some(switch);
            }
        }
        None
    }
}

fn rollback(pool: &mut ResourcePool, placed: &mut Vec<TemporaryPlacement>, ctx: &PolicyContext) {
    for (copy_id, host_id) in placed.drain(..).rev() {
        if let Err(e) = pool.destroy_temporary(host_id, copy_id) {
            log_error!(ctx, "can't roll back temporary placement: {}", e);
            panic!("can't roll back temporary placement: {}", e);
        }
    }
}

fn remove_copies(pool: &mut ResourcePool, copies: &[(VmId, VmId)]) {
    for &(_, copy_id) in copies {
        pool.remove_vm(copy_id);
    }
}
