use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::MAX_PROBE_TIMEOUT;

/// Liveness of one dependent service, as seen by a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    /// Answered with 200.
    Running,
    /// Answered, but with any other status.
    Error,
    /// Did not answer within the timeout, refused, or was unreachable.
    Stopped,
}

/// The service could not be reached. Never leaves [`check_service`].
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),
}

async fn probe(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<StatusCode, ProbeError> {
    match tokio::time::timeout(timeout, client.get(url).send()).await {
        Err(_) => Err(ProbeError::Timeout(timeout)),
        Ok(Err(e)) => Err(ProbeError::Unreachable(e)),
        Ok(Ok(response)) => Ok(response.status()),
    }
}

/// Issues one GET against `url` and classifies the outcome. No retries and
/// no retained state; the timeout is capped at three seconds.
pub async fn check_service(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> ServiceStatus {
    let timeout = timeout.min(MAX_PROBE_TIMEOUT);
    match probe(client, url, timeout).await {
        Ok(status) if status == StatusCode::OK => ServiceStatus::Running,
        Ok(status) => {
            debug!(%url, %status, "probe answered with failure status");
            ServiceStatus::Error
        }
        Err(e) => {
            debug!(%url, error = %e, "probe failed");
            ServiceStatus::Stopped
        }
    }
}
