use async_trait::async_trait;
use serde::Serialize;

use crate::config::ServiceEndpoint;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum RestartOutcome {
    Restarted,
    NotImplemented,
    UnknownService,
    Failed(String),
}

/// Administrative control over a dependent process.
#[async_trait]
pub trait ServiceControl: Send + Sync {
    async fn restart(&self, service: &ServiceEndpoint) -> RestartOutcome;
}

/// No process control is available; every restart request reports
/// `NotImplemented`.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedControl;

#[async_trait]
impl ServiceControl for UnsupportedControl {
    async fn restart(&self, service: &ServiceEndpoint) -> RestartOutcome {
        tracing::info!(service = %service.name, "restart requested but process control is not available");
        RestartOutcome::NotImplemented
    }
}
