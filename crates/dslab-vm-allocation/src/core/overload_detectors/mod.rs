pub mod dynamic_threshold;
pub mod static_threshold;
