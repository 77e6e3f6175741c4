use std::collections::BTreeSet;

use approx::assert_abs_diff_eq;

use dslab_vm_allocation::core::allocation_policy::VmAllocationPolicy;
use dslab_vm_allocation::core::common::{HostId, VmId};
use dslab_vm_allocation::core::context::PolicyContext;
use dslab_vm_allocation::core::group_placement::{GroupPacking, GroupScheduler};
use dslab_vm_allocation::core::host::HostSpec;
use dslab_vm_allocation::core::host_selection_strategies::first_fit::FirstFit;
use dslab_vm_allocation::core::overload_detectors::static_threshold::StaticThreshold;
use dslab_vm_allocation::core::placement_group::{
    AffinityType, Enforcement, GroupScope, GroupStatus, VmPlacementGroup,
};
use dslab_vm_allocation::core::resource_pool::ResourcePool;
use dslab_vm_allocation::core::vm::VmResources;
use dslab_vm_allocation::core::vm_selection_policies::minimum_utilization::MinimumUtilization;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn pool_with_hosts(count: usize) -> ResourcePool {
    let mut pool = ResourcePool::new();
    for _ in 0..count {
        pool.add_host(HostSpec::new(4, 1000., 8192, 10000, 100000));
    }
    pool
}

fn vm(pes: u32) -> VmResources {
    VmResources::new(pes, 1000., 1024, 100, 1000)
}

fn add_vms(pool: &mut ResourcePool, count: usize, pes: u32) -> Vec<VmId> {
    (0..count).map(|_| pool.add_vm(vm(pes))).collect()
}

fn free_pes(pool: &ResourcePool) -> Vec<usize> {
    pool.hosts().iter().map(|host| host.free_pes_number()).collect()
}

fn hosts(ids: &[HostId]) -> BTreeSet<HostId> {
    ids.iter().copied().collect()
}

#[test]
fn test_switch_layout() {
    let pool = pool_with_hosts(5);
    let scheduler = GroupScheduler::new(2, GroupPacking::PackFromEdges);
    assert_eq!(scheduler.switch_count(&pool), 3);
    assert_eq!(scheduler.switch_of(0), 0);
    assert_eq!(scheduler.switch_of(3), 1);
    assert_eq!(scheduler.switch_of(4), 2);
    assert_eq!(scheduler.ordered_switch_hosts(&pool, 2), vec![4]);
    assert_eq!(scheduler.host_order(&pool), vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_ideal_num_switches() {
    let mut pool = pool_with_hosts(6);
    let scheduler = GroupScheduler::new(2, GroupPacking::PackFromEdges);
    let small = add_vms(&mut pool, 4, 2);
    let large = add_vms(&mut pool, 6, 2);
    let huge = add_vms(&mut pool, 9, 2);
    assert_eq!(scheduler.ideal_num_switches(&pool, &small), 1);
    assert_eq!(scheduler.ideal_num_switches(&pool, &large), 2);
    assert_eq!(scheduler.ideal_num_switches(&pool, &huge), 3);
}

#[test]
// Large groups are packed right to left, each next one continues from the switch where the previous one ended.
fn test_pack_from_edges() {
    init_logger();
    let mut pool = pool_with_hosts(6);
    let mut scheduler = GroupScheduler::new(2, GroupPacking::PackFromEdges);
    let ctx = PolicyContext::new("test");

    let vms = add_vms(&mut pool, 6, 2);
    let mut group = VmPlacementGroup::affinity(0, vms, Enforcement::BestEffort);
    assert!(scheduler.place_group(&mut pool, &mut group, &ctx));
    assert_eq!(group.status(), GroupStatus::Created);
    assert_eq!(group.ideal_num_switches(), Some(2));
    assert_eq!(group.hosts(&pool), hosts(&[2, 4, 5]));
    assert_eq!(group.num_hosts(), Some(3));
    assert_eq!(group.num_switches(), Some(2));
    assert_eq!(scheduler.right_to_left_cursor(), Some(1));

    let vms = add_vms(&mut pool, 6, 2);
    let mut group = VmPlacementGroup::affinity(1, vms, Enforcement::BestEffort);
    assert!(scheduler.place_group(&mut pool, &mut group, &ctx));
    assert_eq!(group.hosts(&pool), hosts(&[0, 1, 3]));
    assert_eq!(scheduler.right_to_left_cursor(), Some(0));
    assert_eq!(free_pes(&pool), vec![0; 6]);

    // no space left, the group stays pending and the pool is unchanged
    let vms = add_vms(&mut pool, 6, 2);
    let vm_count = pool.vm_count();
    let mut group = VmPlacementGroup::affinity(2, vms.clone(), Enforcement::BestEffort);
    assert!(!scheduler.place_group(&mut pool, &mut group, &ctx));
    assert_eq!(group.status(), GroupStatus::Pending);
    assert_eq!(scheduler.right_to_left_cursor(), None);
    assert_eq!(pool.vm_count(), vm_count);
    assert_eq!(free_pes(&pool), vec![0; 6]);
    for vm_id in vms {
        assert!(!pool.vm(vm_id).is_created());
        assert!(!pool.vm(vm_id).is_temporary());
    }
}

#[test]
// Small groups fit under one switch and fill switches left to right.
fn test_pack_from_edges_small_group() {
    let mut pool = pool_with_hosts(6);
    let mut scheduler = GroupScheduler::new(2, GroupPacking::PackFromEdges);
    let ctx = PolicyContext::new("test");
    let busy = pool.add_vm(vm(1));
    pool.allocate(1, busy).unwrap();

    let vms = add_vms(&mut pool, 2, 1);
    let mut group = VmPlacementGroup::affinity(0, vms, Enforcement::BestEffort);
    assert!(scheduler.place_group(&mut pool, &mut group, &ctx));
    // the fullest host of the switch is tried first
    assert_eq!(group.hosts(&pool), hosts(&[1]));
    assert_eq!(group.num_switches(), Some(1));
    assert_eq!(scheduler.right_to_left_cursor(), None);
}

#[test]
fn test_strict_group() {
    let mut pool = pool_with_hosts(4);
    let mut scheduler = GroupScheduler::new(2, GroupPacking::PackFromEdges);
    let ctx = PolicyContext::new("test");
    let busy = pool.add_vm(vm(4));
    pool.allocate(0, busy).unwrap();

    let vms = add_vms(&mut pool, 3, 2);
    let mut group = VmPlacementGroup::affinity(0, vms, Enforcement::Strict);
    assert!(scheduler.place_group(&mut pool, &mut group, &ctx));
    assert_eq!(group.hosts(&pool), hosts(&[2, 3]));
    assert_eq!(group.num_switches(), Some(1));
    assert_eq!(free_pes(&pool), vec![0, 4, 0, 2]);

    // does not fit under any single switch
    let vms = add_vms(&mut pool, 5, 2);
    let mut group = VmPlacementGroup::affinity(1, vms, Enforcement::Strict);
    assert!(!scheduler.place_group(&mut pool, &mut group, &ctx));
    assert_eq!(free_pes(&pool), vec![0, 4, 0, 2]);
}

#[test]
fn test_naive_packing() {
    let mut pool = pool_with_hosts(6);
    let mut scheduler = GroupScheduler::new(2, GroupPacking::Naive);
    let ctx = PolicyContext::new("test");

    let vms = add_vms(&mut pool, 6, 2);
    let mut group = VmPlacementGroup::affinity(0, vms, Enforcement::BestEffort);
    assert!(scheduler.place_group(&mut pool, &mut group, &ctx));
    assert_eq!(group.hosts(&pool), hosts(&[0, 1, 2]));
    assert_eq!(group.num_switches(), Some(2));
}

#[test]
// The most free switch is used and members are spread over its most free hosts.
fn test_all_pack() {
    let mut pool = pool_with_hosts(4);
    let mut scheduler = GroupScheduler::new(2, GroupPacking::AllPack);
    let ctx = PolicyContext::new("test");
    let busy = pool.add_vm(vm(2));
    pool.allocate(0, busy).unwrap();
    assert_eq!(scheduler.switch_order(&pool), vec![1, 0]);
    assert_eq!(scheduler.host_order(&pool), vec![2, 3, 1, 0]);

    let vms = add_vms(&mut pool, 3, 2);
    let mut group = VmPlacementGroup::affinity(0, vms, Enforcement::BestEffort);
    assert!(scheduler.place_group(&mut pool, &mut group, &ctx));
    assert_eq!(group.hosts(&pool), hosts(&[2, 3]));
    assert_eq!(free_pes(&pool), vec![2, 4, 0, 2]);
    // the next placement sees the orders computed from the new load
    assert_eq!(scheduler.switch_order(&pool), vec![0, 1]);
    assert_eq!(scheduler.host_order(&pool), vec![1, 0, 3, 2]);
}

#[test]
fn test_rejected_groups() {
    init_logger();
    let mut pool = pool_with_hosts(4);
    let mut scheduler = GroupScheduler::new(2, GroupPacking::PackFromEdges);
    let ctx = PolicyContext::new("test");

    let vms = add_vms(&mut pool, 2, 1);
    let mut group = VmPlacementGroup::new(
        0,
        vms,
        GroupScope::Switch,
        AffinityType::AntiAffinity,
        Enforcement::BestEffort,
    );
    assert!(!scheduler.place_group(&mut pool, &mut group, &ctx));
    assert_eq!(group.status(), GroupStatus::Pending);

    let mut group = VmPlacementGroup::affinity(1, Vec::new(), Enforcement::Strict);
    assert!(!scheduler.place_group(&mut pool, &mut group, &ctx));

    let v = pool.add_vm(vm(1));
    let mut group = VmPlacementGroup::affinity(2, vec![v, v], Enforcement::Strict);
    assert!(!scheduler.place_group(&mut pool, &mut group, &ctx));

    pool.allocate(0, v).unwrap();
    let mut group = VmPlacementGroup::affinity(3, vec![v], Enforcement::Strict);
    assert!(!scheduler.place_group(&mut pool, &mut group, &ctx));
    assert_eq!(free_pes(&pool), vec![3, 4, 4, 4]);

    // created group is not placed again
    let vms = add_vms(&mut pool, 1, 1);
    let mut group = VmPlacementGroup::affinity(4, vms, Enforcement::Strict);
    assert!(scheduler.place_group(&mut pool, &mut group, &ctx));
    assert!(!scheduler.place_group(&mut pool, &mut group, &ctx));
}

#[test]
fn test_group_lifecycle() {
    let mut pool = pool_with_hosts(4);
    let mut policy = VmAllocationPolicy::new(
        Box::new(StaticThreshold::default()),
        Box::new(MinimumUtilization::new()),
        Box::new(FirstFit::new()),
        GroupScheduler::new(2, GroupPacking::PackFromEdges),
    );

    let vms = add_vms(&mut pool, 2, 2);
    let mut group = VmPlacementGroup::affinity(0, vms.clone(), Enforcement::Strict);
    assert!(!group.finish());
    assert!(policy.allocate_host_for_group(&mut pool, &mut group, 42.));
    assert!(group.is_created());
    assert_abs_diff_eq!(group.start_time().unwrap(), 42.);
    assert_eq!(group.hosts(&pool), hosts(&[0]));

    pool.start_migration(vms[0], 3).unwrap();
    group.update_migration_status(&pool);
    assert_eq!(group.status(), GroupStatus::Migrating);
    pool.finish_migration(vms[0]).unwrap();
    group.update_migration_status(&pool);
    assert_eq!(group.status(), GroupStatus::Created);
    assert_eq!(group.hosts(&pool), hosts(&[0, 3]));

    assert!(group.finish());
    assert_eq!(group.status(), GroupStatus::Finished);
    group.update_migration_status(&pool);
    assert_eq!(group.status(), GroupStatus::Finished);
}
