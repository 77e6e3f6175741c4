//! Core of the VM allocation policy engine.

pub mod allocation_policy;
pub mod common;
pub mod config;
pub mod context;
pub mod energy_meter;
pub mod errors;
pub mod group_placement;
pub mod host;
pub mod host_selection;
pub mod host_selection_strategies;
pub mod load_model;
pub mod overload_detection;
pub mod overload_detectors;
pub mod placement_group;
pub mod power_model;
pub mod resource_pool;
pub mod sandbox;
pub mod statistics;
pub mod vm;
pub mod vm_selection;
pub mod vm_selection_policies;
