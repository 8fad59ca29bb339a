pub mod control;
pub mod memory;
pub mod probe;
pub mod services;

pub use probe::{check_service, ServiceStatus};
pub use services::{HealthAggregator, HealthReport, OverallStatus};
