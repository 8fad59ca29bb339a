pub mod memory;
pub(crate) mod password;
pub mod repo;
pub mod repo_types;
pub mod services;

pub use repo_types::User;
pub use services::UserDirectory;
