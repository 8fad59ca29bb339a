pub mod dto;
pub mod memory;
pub mod repo;
pub mod repo_types;
pub mod services;

pub use dto::NewDetection;
pub use repo_types::DetectionRecord;
pub use services::DetectionService;
