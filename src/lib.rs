//! Crop-disease detection records, user accounts and dependent-service health.

pub mod config;
pub mod db;
pub mod detections;
pub mod error;
pub mod health;
pub mod state;
pub mod users;

pub use error::{AppError, AppResult, ErrorKind};
pub use state::AppState;
