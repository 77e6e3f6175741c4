pub mod minimum_migration_time;
pub mod minimum_utilization;
