pub mod best_fit;
pub mod first_fit;
pub mod power_aware;
pub mod worst_fit;
