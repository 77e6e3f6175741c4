//! Selection of VMs to migrate away from overloaded hosts.

use dyn_clone::{clone_trait_object, DynClone};

use crate::core::common::{HostId, VmId};
use crate::core::config::parse_config_value;
use crate::core::errors::ConfigError;
use crate::core::resource_pool::ResourcePool;
use crate::core::vm_selection_policies::minimum_migration_time::MinimumMigrationTime;
use crate::core::vm_selection_policies::minimum_utilization::MinimumUtilization;

/// Trait for implementation of VM selection policies.
///
/// The policy returns the next VM to migrate from the host or `None` if there is no VM to migrate.
/// Only VMs committed to the host and not being migrated already can be selected
/// (see [`ResourcePool::migratable_vms`]). For the same host state the same VM must be returned.
pub trait VmSelectionPolicy: DynClone {
    fn select_vm(&self, pool: &ResourcePool, host_id: HostId) -> Option<VmId>;
}

clone_trait_object!(VmSelectionPolicy);

pub fn vm_selection_policy_resolver(config_str: &str) -> Result<Box<dyn VmSelectionPolicy>, ConfigError> {
    let (name, _) = parse_config_value(config_str);
    match name.as_str() {
        "MinimumUtilization" => Ok(Box::new(MinimumUtilization::new())),
        "MinimumMigrationTime" => Ok(Box::new(MinimumMigrationTime::new())),
        _ => Err(ConfigError::UnknownComponent {
            kind: "vm selection policy",
            name,
        }),
    }
}
