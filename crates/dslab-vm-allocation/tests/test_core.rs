use approx::assert_abs_diff_eq;
use rstest::rstest;

use dslab_vm_allocation::core::allocation_policy::VmAllocationPolicy;
use dslab_vm_allocation::core::common::{temporary_vm_id, AllocationVerdict, VmId};
use dslab_vm_allocation::core::config::PolicyConfig;
use dslab_vm_allocation::core::errors::{AllocationError, ConfigError};
use dslab_vm_allocation::core::group_placement::GroupPacking;
use dslab_vm_allocation::core::host::{AllocationKind, HostSpec};
use dslab_vm_allocation::core::overload_detection::{overload_detector_resolver, OverloadDetector};
use dslab_vm_allocation::core::overload_detectors::dynamic_threshold::DynamicThreshold;
use dslab_vm_allocation::core::overload_detectors::static_threshold::StaticThreshold;
use dslab_vm_allocation::core::resource_pool::ResourcePool;
use dslab_vm_allocation::core::statistics::MedianAbsoluteDeviation;
use dslab_vm_allocation::core::vm::{VmResources, VmStatus};
use dslab_vm_allocation::core::vm_selection::{vm_selection_policy_resolver, VmSelectionPolicy};
use dslab_vm_allocation::core::vm_selection_policies::minimum_migration_time::MinimumMigrationTime;
use dslab_vm_allocation::core::vm_selection_policies::minimum_utilization::MinimumUtilization;

fn name_wrapper(file_name: &str) -> String {
    format!("test-configs/{}", file_name)
}

fn host_spec() -> HostSpec {
    HostSpec::new(4, 1000., 8192, 1000, 100000)
}

fn vm(pes: u32, mips: f64) -> VmResources {
    VmResources::new(pes, mips, 1024, 100, 1000)
}

fn dynamic_detector() -> DynamicThreshold {
    DynamicThreshold::new(
        2.5,
        Box::new(MedianAbsoluteDeviation),
        Box::new(StaticThreshold::new(0.9, 0.35).unwrap()),
    )
    .unwrap()
}

#[test]
// Allocation takes exactly the VM demand from every host resource.
fn test_allocate_updates_counters() {
    let mut pool = ResourcePool::new();
    let h = pool.add_host(host_spec());
    let v = pool.add_vm(VmResources::new(2, 500., 2048, 300, 5000));

    assert!(pool.is_suitable_for(h, v));
    pool.allocate(h, v).unwrap();

    let host = pool.host(h);
    assert_eq!(host.ram_available(), 8192 - 2048);
    assert_eq!(host.bw_available(), 1000 - 300);
    assert_eq!(host.storage_available(), 100000 - 5000);
    assert_abs_diff_eq!(host.allocated_mips(), 1000.);
    assert_eq!(host.free_pes_number(), 2);
    assert_eq!(host.vms(), &[v]);
    assert!(host.is_active());
    assert_eq!(pool.vm(v).host(), Some(h));
    assert_eq!(pool.vm(v).status(), VmStatus::Running);

    pool.deallocate(h, v).unwrap();
    assert_eq!(pool.host(h).ram_available(), 8192);
    assert_eq!(pool.host(h).free_pes_number(), 4);
    assert_eq!(pool.vm(v).host(), None);
}

#[test]
fn test_allocation_errors() {
    let mut pool = ResourcePool::new();
    let h1 = pool.add_host(host_spec());
    let h2 = pool.add_host(host_spec());
    let big = pool.add_vm(VmResources::new(4, 1000., 16384, 100, 1000));
    let small = pool.add_vm(vm(1, 100.));

    assert_eq!(pool.can_allocate(h1, big), AllocationVerdict::NotEnoughMemory);
    assert_eq!(
        pool.allocate(h1, big),
        Err(AllocationError::CapacityViolation {
            host: h1,
            vm: big,
            verdict: AllocationVerdict::NotEnoughMemory
        })
    );
    assert_eq!(pool.host(h1).ram_available(), 8192);
    assert!(pool.host(h1).vms().is_empty());

    assert_eq!(
        pool.deallocate(h1, small),
        Err(AllocationError::VmNotOnHost { vm: small, host: h1 })
    );
    pool.allocate(h1, small).unwrap();
    assert_eq!(
        pool.allocate(h2, small),
        Err(AllocationError::AlreadyPlaced { vm: small, host: h1 })
    );
    assert_eq!(pool.allocate(7, small), Err(AllocationError::UnknownHost(7)));
    assert_eq!(pool.allocate(h2, 100), Err(AllocationError::UnknownVm(100)));
    assert_eq!(pool.can_allocate(7, small), AllocationVerdict::HostNotFound);
}

#[rstest]
#[case(5, 100., AllocationVerdict::NotEnoughPes)]
#[case(4, 1200., AllocationVerdict::NotEnoughCpu)]
#[case(4, 1000., AllocationVerdict::Success)]
#[case(1, 10., AllocationVerdict::Success)]
fn test_cpu_verdicts(#[case] pes: u32, #[case] mips: f64, #[case] verdict: AllocationVerdict) {
    let mut pool = ResourcePool::new();
    let h = pool.add_host(host_spec());
    let v = pool.add_vm(vm(pes, mips));
    assert_eq!(pool.can_allocate(h, v), verdict);
}

#[test]
// Time-shared PEs: a VM fits if enough PEs have enough free MIPS.
fn test_pes_are_shared_between_vms() {
    let mut pool = ResourcePool::new();
    let h = pool.add_host(host_spec());
    let v1 = pool.add_vm(vm(4, 600.));
    let v2 = pool.add_vm(vm(4, 400.));
    let v3 = pool.add_vm(vm(1, 100.));

    pool.allocate(h, v1).unwrap();
    pool.allocate(h, v2).unwrap();
    assert_eq!(pool.host(h).free_pes_number(), 0);
    assert_abs_diff_eq!(pool.host(h).available_mips(), 0.);
    assert_eq!(pool.can_allocate(h, v3), AllocationVerdict::NotEnoughCpu);
}

#[test]
fn test_failed_host_is_not_suitable() {
    let mut pool = ResourcePool::new();
    let h = pool.add_host(host_spec());
    let v = pool.add_vm(vm(1, 100.));

    pool.set_host_failed(h, true).unwrap();
    assert_eq!(pool.can_allocate(h, v), AllocationVerdict::HostFailed);
    assert!(!pool.create_temporary(h, v));
    assert!(pool.is_host_switched_off(h));

    pool.set_host_failed(h, false).unwrap();
    assert!(pool.is_suitable_for(h, v));
}

#[test]
// Host with 4 PEs x 1000 MIPS runs three VMs using 0.3 of host CPU each.
// The host is not overloaded at 0.9 threshold, but the fourth small VM makes it overloaded.
fn test_overload_detection() {
    let mut pool = ResourcePool::new();
    let h = pool.add_host(host_spec());
    for _ in 0..3 {
        let v = pool.add_vm(vm(4, 300.));
        pool.allocate(h, v).unwrap();
    }
    let detector = StaticThreshold::new(0.9, 0.35).unwrap();
    assert_abs_diff_eq!(pool.host_cpu_utilization(h), 0.9, epsilon = 1e-12);
    assert!(!detector.is_host_overloaded(&pool, h));
    assert!(!detector.is_host_underloaded(&pool, h));

    let v = pool.add_vm(vm(4, 25.));
    pool.allocate(h, v).unwrap();
    assert_abs_diff_eq!(pool.host_cpu_utilization(h), 0.925, epsilon = 1e-12);
    assert!(detector.is_host_overloaded(&pool, h));
}

#[test]
// Utilization follows the current VM load and includes temporary placements.
fn test_utilization_with_load_and_temporary_vms() {
    let mut pool = ResourcePool::new();
    let h = pool.add_host(host_spec());
    let v1 = pool.add_vm(vm(4, 500.));
    let v2 = pool.add_vm(vm(2, 500.));
    pool.allocate(h, v1).unwrap();
    pool.set_vm_utilization(v1, 0.5).unwrap();
    assert_abs_diff_eq!(pool.host_cpu_utilization(h), 0.25);

    assert!(pool.create_temporary(h, v2));
    assert_abs_diff_eq!(pool.host_cpu_utilization(h), 0.5);
    pool.destroy_temporary(h, v2).unwrap();
    assert_abs_diff_eq!(pool.host_cpu_utilization(h), 0.25);

    pool.set_vm_utilization(v1, 2.).unwrap();
    assert_abs_diff_eq!(pool.vm(v1).utilization(), 1.);
}

#[rstest]
#[case(0.9, 0.35, true)]
#[case(1.0, 0.35, false)]
#[case(0.9, 0.0, false)]
#[case(0.5, 0.5, false)]
#[case(0.4, 0.6, false)]
#[case(f64::NAN, 0.2, false)]
fn test_static_threshold_validation(#[case] over: f64, #[case] under: f64, #[case] valid: bool) {
    assert_eq!(StaticThreshold::new(over, under).is_ok(), valid);
}

#[test]
fn test_underloaded_host() {
    let mut pool = ResourcePool::new();
    let h1 = pool.add_host(host_spec());
    let h2 = pool.add_host(host_spec());
    let v1 = pool.add_vm(vm(1, 1000.));
    let v2 = pool.add_vm(vm(1, 1000.));
    pool.allocate(h1, v1).unwrap();
    pool.allocate(h2, v2).unwrap();
    let detector = StaticThreshold::default();

    // 0.25 < 0.35
    assert!(detector.is_host_underloaded(&pool, h1));
    assert!(detector.is_host_underloaded(&pool, h2));

    pool.start_migration(v1, h2).unwrap();
    // all VMs of h1 are migrating out, h2 receives a VM
    assert!(!detector.is_host_underloaded(&pool, h1));
    assert!(!detector.is_host_underloaded(&pool, h2));
}

#[rstest]
#[case(0, 0.925)]
#[case(5, 0.925)]
#[case(11, 0.925)]
#[case(0, 0.5)]
#[case(11, 0.5)]
// With fewer than 12 non-zero samples the dynamic detector makes the same decision as its fallback.
fn test_dynamic_threshold_fallback(#[case] samples: usize, #[case] utilization: f64) {
    let mut pool = ResourcePool::new();
    let h = pool.add_host(host_spec());
    let v = pool.add_vm(vm(4, 1000.));
    pool.allocate(h, v).unwrap();
    pool.set_vm_utilization(v, utilization).unwrap();
    for _ in 0..samples {
        pool.record_utilization_history();
    }

    let detector = dynamic_detector();
    let fallback = StaticThreshold::new(0.9, 0.35).unwrap();
    assert_eq!(detector.over_utilization_threshold(pool.host(h)), f64::INFINITY);
    assert_eq!(
        detector.is_host_overloaded(&pool, h),
        fallback.is_host_overloaded(&pool, h)
    );
    assert_eq!(detector.under_utilization_threshold(), 0.35);
}

#[test]
// Zero samples are ignored, so a long idle history does not enable the dynamic threshold.
fn test_dynamic_threshold_ignores_zero_samples() {
    let mut pool = ResourcePool::new();
    let h = pool.add_host(host_spec());
    for _ in 0..20 {
        pool.record_utilization_history();
    }
    assert_eq!(pool.host(h).utilization_history().len(), 20);
    assert_eq!(dynamic_detector().over_utilization_threshold(pool.host(h)), f64::INFINITY);
}

#[test]
// History alternates between 0.5 and 0.7: median is 0.6 and MAD is 0.1,
// so the threshold is 1 - 2.5 * 0.1 = 0.75.
fn test_dynamic_threshold_from_history() {
    let mut pool = ResourcePool::new();
    let h = pool.add_host(host_spec());
    let v = pool.add_vm(vm(4, 1000.));
    pool.allocate(h, v).unwrap();
    for i in 0..12 {
        let load = if i % 2 == 0 { 0.5 } else { 0.7 };
        pool.set_vm_utilization(v, load).unwrap();
        pool.record_utilization_history();
    }

    let detector = dynamic_detector();
    assert_abs_diff_eq!(detector.over_utilization_threshold(pool.host(h)), 0.75, epsilon = 1e-9);

    pool.set_vm_utilization(v, 0.8).unwrap();
    assert!(detector.is_host_overloaded(&pool, h));
    assert!(!StaticThreshold::new(0.9, 0.35).unwrap().is_host_overloaded(&pool, h));

    pool.set_vm_utilization(v, 0.7).unwrap();
    assert!(!detector.is_host_overloaded(&pool, h));
}

#[test]
fn test_history_is_bounded() {
    let mut pool = ResourcePool::new();
    let h = pool.add_host(host_spec().history_length(3));
    let v = pool.add_vm(vm(4, 1000.));
    pool.allocate(h, v).unwrap();
    for load in [0.1, 0.2, 0.3, 0.4] {
        pool.set_vm_utilization(v, load).unwrap();
        pool.record_utilization_history();
    }
    let history: Vec<f64> = pool.host(h).utilization_history().iter().copied().collect();
    assert_eq!(history.len(), 3);
    assert_abs_diff_eq!(history[0], 0.2);
    assert_abs_diff_eq!(history[2], 0.4);
}

#[rstest]
#[case("StaticThreshold", true)]
#[case("StaticThreshold[over=0.8,under=0.1]", true)]
#[case("DynamicThreshold[statistic=iqr,safety=1.5]", true)]
#[case("DynamicThreshold[statistic=mad,safety=2.5,over=0.95,under=0.2,min_samples=20]", true)]
#[case("DynamicThreshold[statistic=variance]", false)]
#[case("StaticThreshold[over=abc]", false)]
#[case("StaticThreshold[over=0.3,under=0.5]", false)]
#[case("Unknown", false)]
fn test_overload_detector_resolver(#[case] config: &str, #[case] valid: bool) {
    assert_eq!(overload_detector_resolver(config).is_ok(), valid);
}

#[test]
fn test_resolver_errors() {
    assert!(matches!(
        overload_detector_resolver("StaticThreshold[over=1.5]"),
        Err(ConfigError::InvalidThreshold { .. })
    ));
    assert!(matches!(
        vm_selection_policy_resolver("MaximumCorrelation"),
        Err(ConfigError::UnknownComponent { .. })
    ));
}

#[test]
fn test_vm_selection() {
    let mut pool = ResourcePool::new();
    let h1 = pool.add_host(host_spec());
    let h2 = pool.add_host(host_spec());
    let v1 = pool.add_vm(VmResources::new(2, 500., 2048, 100, 1000));
    let v2 = pool.add_vm(VmResources::new(1, 500., 512, 100, 1000));
    let v3 = pool.add_vm(VmResources::new(1, 500., 1024, 100, 1000));
    for v in [v1, v2, v3] {
        pool.allocate(h1, v).unwrap();
    }
    let other = pool.add_vm(vm(1, 10.));
    // temporary VMs are never selected
    assert!(pool.create_temporary(h1, other));

    let min_utilization = MinimumUtilization::new();
    let min_migration_time = MinimumMigrationTime::new();
    // v2 and v3 demand the same MIPS, v2 goes first in host VM list
    assert_eq!(min_utilization.select_vm(&pool, h1), Some(v2));
    assert_eq!(min_migration_time.select_vm(&pool, h1), Some(v2));

    pool.set_vm_utilization(v1, 0.2).unwrap();
    assert_eq!(min_utilization.select_vm(&pool, h1), Some(v1));

    // VMs in migration are never selected
    pool.start_migration(v2, h2).unwrap();
    assert_eq!(min_migration_time.select_vm(&pool, h1), Some(v3));
    assert_eq!(min_utilization.select_vm(&pool, h2), None);
}

#[test]
fn test_temporary_allocation() {
    let mut pool = ResourcePool::new();
    let h1 = pool.add_host(host_spec());
    let h2 = pool.add_host(host_spec());
    let v = pool.add_vm(vm(2, 1000.));
    let big = pool.add_vm(vm(4, 1000.));

    assert!(pool.create_temporary(h1, v));
    assert!(pool.vm(v).is_temporary());
    assert!(!pool.vm(v).is_created());
    assert_eq!(pool.vm(v).temporary_host(), Some(h1));
    assert!(pool.host(h1).has_allocation(v, AllocationKind::Temporary));
    assert_eq!(pool.host(h1).free_pes_number(), 2);
    // second reservation of the same VM is refused
    assert!(!pool.create_temporary(h2, v));
    // unsuitable host is refused without changes
    assert!(!pool.create_temporary(h1, big));
    assert_eq!(pool.host(h1).vms(), &[v]);

    pool.destroy_temporary(h1, v).unwrap();
    assert_eq!(pool.host(h1).free_pes_number(), 4);
    assert!(pool.host(h1).vms().is_empty());
    assert_eq!(
        pool.destroy_temporary(h1, v),
        Err(AllocationError::NotTemporary { vm: v, host: h1 })
    );
}

#[test]
// Saved placements are restored after arbitrary temporary changes and evictions.
fn test_save_restore_allocation() {
    let mut pool = ResourcePool::new();
    let h1 = pool.add_host(host_spec());
    let h2 = pool.add_host(host_spec());
    let h3 = pool.add_host(host_spec());
    let v1 = pool.add_vm(vm(2, 1000.));
    let v2 = pool.add_vm(vm(2, 500.));
    let v3 = pool.add_vm(vm(1, 1000.));
    let v4 = pool.add_vm(vm(1, 1000.));
    pool.allocate(h1, v1).unwrap();
    pool.allocate(h1, v2).unwrap();
    pool.allocate(h2, v3).unwrap();
    pool.start_migration(v3, h3).unwrap();

    let snapshot = pool.save_allocation();
    assert_eq!(snapshot.len(), 3);
    assert_eq!(snapshot.host_of(v1), Some(h1));
    assert_eq!(snapshot.host_of(v3), Some(h2));

    pool.deallocate(h1, v2).unwrap();
    assert!(pool.create_temporary(h2, v2));
    assert!(pool.create_temporary(h3, v4));
    assert!(pool.create_temporary(h3, v1));

    pool.restore_allocation(&snapshot).unwrap();
    assert_eq!(pool.save_allocation(), snapshot);
    assert_eq!(pool.host(h1).vms(), &[v1, v2]);
    assert_eq!(pool.host(h2).vms(), &[v3]);
    assert!(pool.host(h3).vms().is_empty());
    assert!(pool.host(h3).has_allocation(v3, AllocationKind::MigratingIn));
    assert_eq!(pool.host(h3).free_pes_number(), 3);
    assert_eq!(pool.host(h1).free_pes_number(), 0);
    assert!(!pool.vm(v4).is_temporary());
    assert!(!pool.vm(v1).is_temporary());
    assert!(pool.vm(v3).is_in_migration());
}

#[test]
fn test_migration_lifecycle() {
    let mut pool = ResourcePool::new();
    let h1 = pool.add_host(host_spec());
    let h2 = pool.add_host(host_spec());
    let v = pool.add_vm(vm(2, 1000.));
    pool.allocate(h1, v).unwrap();

    assert_eq!(pool.finish_migration(v), Err(AllocationError::NotMigrating(v)));
    assert_eq!(pool.start_migration(v, h2), Ok(h1));
    assert_eq!(pool.start_migration(v, h2), Err(AllocationError::AlreadyMigrating(v)));
    assert_eq!(pool.vm(v).status(), VmStatus::Migrating);
    assert_eq!(pool.host(h1).vms_migrating_out(), &[v]);
    assert_eq!(pool.host(h2).vms_migrating_in(), &[v]);
    // both hosts hold the VM resources during migration
    assert_eq!(pool.host(h1).free_pes_number(), 2);
    assert_eq!(pool.host(h2).free_pes_number(), 2);
    assert_abs_diff_eq!(pool.host_cpu_utilization(h2), 0.5);
    assert!(pool.migratable_vms(h1).is_empty());

    let reserved = pool.host(h2).allocation(v).unwrap().pes.clone();
    assert_eq!(pool.finish_migration(v), Ok((h1, h2)));
    assert_eq!(pool.host(h2).allocation(v).unwrap().pes, reserved);
    assert_eq!(pool.vm(v).host(), Some(h2));
    assert_eq!(pool.vm(v).status(), VmStatus::Running);
    assert!(!pool.host(h1).is_active());
    assert!(pool.host(h1).vms_migrating_out().is_empty());
    assert!(pool.host(h2).vms_migrating_in().is_empty());
    assert!(pool.host(h2).has_allocation(v, AllocationKind::Real));
    assert_eq!(pool.host(h1).free_pes_number(), 4);
    assert_eq!(pool.host(h2).vms(), &[v]);
}

/// Single host with 2 PEs where the VMs left after destroying the first two don't follow first-fit PE order.
fn fragmented_pool() -> (ResourcePool, Vec<VmId>) {
    let mut pool = ResourcePool::new();
    let h = pool.add_host(HostSpec::new(2, 1000., 8192, 1000, 100000));
    let mut vms = Vec::new();
    for mips in [600., 600., 400., 400.] {
        let v = pool.add_vm(vm(1, mips));
        pool.allocate(h, v).unwrap();
        vms.push(v);
    }
    pool.destroy_vm(vms[0]).unwrap();
    pool.destroy_vm(vms[1]).unwrap();
    for _ in 0..2 {
        let v = pool.add_vm(vm(1, 600.));
        pool.allocate(h, v).unwrap();
        vms.push(v);
    }
    (pool, vms.split_off(2))
}

#[test]
// Saved VMs get back exactly the PEs they held.
fn test_restore_fragmented_pes() {
    let (mut pool, vms) = fragmented_pool();
    let pes_before: Vec<Vec<usize>> = vms
        .iter()
        .map(|&v| pool.host(0).allocation(v).unwrap().pes.clone())
        .collect();
    assert_eq!(pes_before, vec![vec![0], vec![1], vec![0], vec![1]]);

    let snapshot = pool.save_allocation();
    assert_eq!(snapshot.allocation_of(vms[3]).unwrap().pes, vec![1]);
    let e = vms[2];
    pool.deallocate(0, e).unwrap();
    assert!(pool.create_temporary(0, e));

    pool.restore_allocation(&snapshot).unwrap();
    assert_eq!(pool.save_allocation(), snapshot);
    for (v, pes) in vms.iter().zip(pes_before.iter()) {
        assert_eq!(&pool.host(0).allocation(*v).unwrap().pes, pes);
    }
    for pe in pool.host(0).pes() {
        assert_abs_diff_eq!(pe.available_mips(), 0.);
    }
}

#[test]
// The VM stays on the source when the migration target fails before the migration ends.
fn test_finish_migration_to_failed_host() {
    let mut pool = ResourcePool::new();
    let h1 = pool.add_host(host_spec());
    let h2 = pool.add_host(host_spec());
    let v = pool.add_vm(vm(2, 1000.));
    pool.allocate(h1, v).unwrap();
    pool.start_migration(v, h2).unwrap();
    pool.set_host_failed(h2, true).unwrap();

    assert_eq!(
        pool.finish_migration(v),
        Err(AllocationError::CapacityViolation {
            host: h2,
            vm: v,
            verdict: AllocationVerdict::HostFailed,
        })
    );
    assert_eq!(pool.vm(v).host(), Some(h1));
    assert!(!pool.vm(v).is_in_migration());
    assert_eq!(pool.vm(v).status(), VmStatus::Running);
    assert!(pool.host(h1).has_allocation(v, AllocationKind::Real));
    assert_eq!(pool.host(h1).vms(), &[v]);
    assert!(pool.host(h1).vms_migrating_out().is_empty());
    assert!(pool.host(h2).vms_migrating_in().is_empty());
    assert!(pool.host(h2).allocation(v).is_none());
    assert_eq!(pool.host(h2).free_pes_number(), 4);
    assert_eq!(pool.save_allocation().host_of(v), Some(h1));
    assert_eq!(pool.finish_migration(v), Err(AllocationError::NotMigrating(v)));
}

#[test]
fn test_destroy_vm() {
    let mut pool = ResourcePool::new();
    let h = pool.add_host(host_spec());
    let v = pool.add_vm(vm(2, 1000.));
    pool.allocate(h, v).unwrap();

    let destroyed = pool.destroy_vm(v).unwrap();
    assert_eq!(destroyed.id, v);
    assert_eq!(pool.vm_count(), 0);
    assert_eq!(pool.host(h).free_pes_number(), 4);
    assert!(!pool.host(h).is_active());
    assert!(pool.try_vm(v).is_err());
}

#[test]
fn test_temporary_vm_ids() {
    assert_eq!(temporary_vm_id(0), u32::MAX);
    assert_eq!(temporary_vm_id(5), u32::MAX - 5);
}

#[test]
fn test_config_file() {
    let config = PolicyConfig::from_file(&name_wrapper("config.yaml")).unwrap();
    assert_eq!(config.overload_detector, "StaticThreshold[over=0.9,under=0.35]");
    assert_eq!(config.host_selection, "PowerAware");
    assert_eq!(config.hosts_per_switch, 2);
    assert_eq!(config.datacenters, vec![1, 2]);
    assert_abs_diff_eq!(config.host_search_retry_delay, 10.);
    // absent values are taken from defaults
    assert_eq!(config.utilization_history_length, 30);

    let policy = VmAllocationPolicy::from_config(&config).unwrap();
    assert_abs_diff_eq!(policy.host_search_retry_delay(), 10.);
    assert_eq!(policy.group_scheduler().hosts_per_switch(), 2);
    assert_eq!(policy.group_scheduler().packing(), GroupPacking::PackFromEdges);
}

#[test]
fn test_dynamic_config_file() {
    let config = PolicyConfig::from_file(&name_wrapper("dynamic.yaml")).unwrap();
    assert_eq!(config.utilization_history_length, 20);
    assert_abs_diff_eq!(config.scheduling_interval, 300.);

    let policy = VmAllocationPolicy::from_config(&config).unwrap();
    assert_eq!(policy.group_scheduler().packing(), GroupPacking::AllPack);
    assert_abs_diff_eq!(policy.detector().under_utilization_threshold(), 0.2);
}

#[test]
fn test_default_config() {
    let config = PolicyConfig::default();
    assert_eq!(config.vm_selection, "MinimumUtilization");
    assert_eq!(config.group_packing, "PackFromEdges");
    assert_eq!(config.hosts_per_switch, 4);
    assert!(config.datacenters.is_empty());
    assert!(VmAllocationPolicy::from_config(&config).is_ok());
}

#[rstest]
#[case("invalid_threshold.yaml")]
#[case("unknown_strategy.yaml")]
// Configs are readable, but the policy can't be composed from them.
fn test_invalid_policy_config(#[case] file_name: &str) {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = PolicyConfig::from_file(&name_wrapper(file_name)).unwrap();
    assert!(VmAllocationPolicy::from_config(&config).is_err());
}

#[test]
fn test_config_errors() {
    assert!(matches!(
        PolicyConfig::from_file(&name_wrapper("missing.yaml")),
        Err(ConfigError::Io { .. })
    ));
    assert!(matches!(
        PolicyConfig::from_yaml_str("hosts_per_switch: 0"),
        Err(ConfigError::InvalidValue { .. })
    ));
    assert!(matches!(
        PolicyConfig::from_yaml_str("migration_bandwidth_share: 1.5"),
        Err(ConfigError::InvalidValue { .. })
    ));
    assert!(matches!(
        PolicyConfig::from_yaml_str("hosts_per_switch: [1"),
        Err(ConfigError::Yaml(_))
    ));
}

#[test]
fn test_first_fit_config_file() {
    let config = PolicyConfig::from_file(&name_wrapper("first_fit.yaml")).unwrap();
    assert_eq!(config.host_selection, "FirstFit");
    assert_eq!(config.vm_selection, "MinimumUtilization");
    assert_eq!(config.hosts_per_switch, 4);

    let mut pool = ResourcePool::new();
    pool.add_host(host_spec());
    pool.add_host(host_spec());
    let mut policy = VmAllocationPolicy::from_config(&config).unwrap();
    let v1 = pool.add_vm(vm(1, 500.));
    let v2 = pool.add_vm(vm(1, 500.));
    assert_eq!(policy.allocate_host_for_vm(&mut pool, v1, 0.), Some(0));
    assert_eq!(policy.allocate_host_for_vm(&mut pool, v2, 0.), Some(1));
}
