//! Selection of host for a VM.

use dyn_clone::{clone_trait_object, DynClone};

use crate::core::common::{HostId, VmId};
use crate::core::config::{parse_config_value, ComponentOptions};
use crate::core::errors::ConfigError;
use crate::core::host_selection_strategies::best_fit::BestFit;
use crate::core::host_selection_strategies::first_fit::FirstFit;
use crate::core::host_selection_strategies::power_aware::PowerAware;
use crate::core::host_selection_strategies::worst_fit::WorstFit;
use crate::core::resource_pool::ResourcePool;

/// Predicate deciding whether the host is eligible for the VM.
///
/// It gets mutable access to the pool, so it can probe a placement with temporary allocations,
/// but it must leave the pool in the same state.
pub type HostFilter<'a> = dyn FnMut(&mut ResourcePool, HostId) -> bool + 'a;

/// Trait for implementation of host selection strategies.
///
/// The strategy ranks the candidate hosts which pass the filter and returns the best one or `None` if no candidate
/// passes it. Candidates are given in the order they should be scanned. The strategy may keep state between calls.
pub trait HostSelectionStrategy: DynClone {
    fn select_host(
        &mut self,
        vm_id: VmId,
        candidates: &[HostId],
        pool: &mut ResourcePool,
        filter: &mut HostFilter,
        time: f64,
    ) -> Option<HostId>;
}

clone_trait_object!(HostSelectionStrategy);

pub fn host_selection_strategy_resolver(config_str: &str) -> Result<Box<dyn HostSelectionStrategy>, ConfigError> {
    let (name, options_str) = parse_config_value(config_str);
    let options = ComponentOptions::new(&name, options_str.as_deref());
    match name.as_str() {
        "FirstFit" => Ok(Box::new(FirstFit::with_start_index(options.get_or("start", 0)?))),
        "BestFit" => Ok(Box::new(BestFit::new())),
        "WorstFit" => Ok(Box::new(WorstFit::new())),
        "PowerAware" => Ok(Box::new(PowerAware::new())),
        _ => Err(ConfigError::UnknownComponent {
            kind: "host selection strategy",
            name,
        }),
    }
}
