use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures::future::join_all;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use crate::config::{HealthConfig, ServiceEndpoint};
use crate::health::control::{RestartOutcome, ServiceControl};
use crate::health::memory::{MemoryGauge, MemoryUsage};
use crate::health::probe::{check_service, ServiceStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OverallStatus {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemoryState {
    Ok,
    HighUsage,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryCheck {
    pub status: MemoryState,
    pub usage_percentage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: OverallStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub services: BTreeMap<String, ServiceStatus>,
    pub memory: MemoryCheck,
}

impl HealthReport {
    pub fn is_up(&self) -> bool {
        self.status == OverallStatus::Up
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MemorySummary {
    pub total_mb: u64,
    pub used_mb: u64,
    pub available_mb: u64,
    pub usage_percentage: f64,
    pub process_mb: Option<u64>,
}

impl From<MemoryUsage> for MemorySummary {
    fn from(m: MemoryUsage) -> Self {
        const MB: u64 = 1024 * 1024;
        Self {
            total_mb: m.total_bytes / MB,
            used_mb: m.used_bytes() / MB,
            available_mb: m.available_bytes / MB,
            usage_percentage: percent(m.ratio()),
            process_mb: m.process_resident_bytes.map(|b| b / MB),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemInfo {
    #[serde(with = "time::serde::rfc3339")]
    pub server_time: OffsetDateTime,
    pub version: &'static str,
    pub os: &'static str,
    pub os_family: &'static str,
    pub arch: &'static str,
    pub memory: Option<MemorySummary>,
    pub services: BTreeMap<String, ServiceStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestartReport {
    pub service: String,
    pub outcome: RestartOutcome,
    /// Status re-statuses after the request; absent for unknown services.
    pub current_status: Option<ServiceStatus>,
}

fn percent(ratio: f64) -> f64 {
    (ratio * 1000.0).round() / 10.0
}

/// Probes dependent services and combines them with memory pressure into a
/// single verdict. Holds configuration only; every call starts from scratch.
#[derive(Clone)]
pub struct HealthAggregator {
    client: reqwest::Client,
    services: Arc<Vec<ServiceEndpoint>>,
    probe_timeout: Duration,
    memory_threshold: f64,
    memory: Arc<dyn MemoryGauge>,
    control: Arc<dyn ServiceControl>,
}

impl HealthAggregator {
    pub fn new(
        config: &HealthConfig,
        memory: Arc<dyn MemoryGauge>,
        control: Arc<dyn ServiceControl>,
    ) -> anyhow::Result<Self> {
        for (i, service) in config.services.iter().enumerate() {
            anyhow::ensure!(
                config.services[..i].iter().all(|s| s.name != service.name),
                "service {} is configured more than once",
                service.name
            );
        }
        let client = reqwest::Client::builder()
            .connect_timeout(config.probe_timeout)
            .build()
            .context("build health probe http client")?;
        Ok(Self {
            client,
            services: Arc::new(config.services.clone()),
            probe_timeout: config.probe_timeout,
            memory_threshold: config.memory_threshold,
            memory,
            control,
        })
    }

    pub fn services(&self) -> &[ServiceEndpoint] {
        &self.services
    }

    fn endpoint(&self, name: &str) -> Option<&ServiceEndpoint> {
        self.services.iter().find(|s| s.name == name)
    }

    pub async fn check_service(&self, url: &str) -> ServiceStatus {
        check_service(&self.client, url, self.probe_timeout).await
    }

    /// Status of one configured service by name.
    pub async fn check_named(&self, name: &str) -> Option<ServiceStatus> {
        let endpoint = self.endpoint(name)?;
        Some(self.check_service(&endpoint.url).await)
    }

    /// Checks all services concurrently, so a hanging service costs at most
    /// one timeout. One entry per configured endpoint, in configuration order.
    async fn check_all(&self) -> Vec<(String, ServiceStatus)> {
        let checks = self.services.iter().map(|s| async move {
            let status = self.check_service(&s.url).await;
            (s.name.clone(), status)
        });
        join_all(checks).await
    }

    fn memory_check(&self) -> MemoryCheck {
        match self.memory.sample() {
            Some(usage) => {
                let ratio = usage.ratio();
                MemoryCheck {
                    status: if ratio < self.memory_threshold {
                        MemoryState::Ok
                    } else {
                        MemoryState::HighUsage
                    },
                    usage_percentage: Some(percent(ratio)),
                }
            }
            None => MemoryCheck {
                status: MemoryState::Unknown,
                usage_percentage: None,
            },
        }
    }

    /// `UP` iff every service is running and memory is not over the
    /// threshold. An unreadable memory sample is reported as `UNKNOWN` and
    /// does not by itself turn the verdict `DOWN`.
    #[instrument(skip(self))]
    pub async fn overall_health(&self) -> HealthReport {
        let statuses = self.check_all().await;
        let memory = self.memory_check();

        let all_running = statuses.iter().all(|(_, s)| *s == ServiceStatus::Running);
        let status = if all_running && memory.status != MemoryState::HighUsage {
            OverallStatus::Up
        } else {
            OverallStatus::Down
        };
        let services: BTreeMap<_, _> = statuses.into_iter().collect();
        if memory.status == MemoryState::Unknown {
            warn!("memory usage unavailable; verdict uses services only");
        }
        if status == OverallStatus::Down {
            warn!(?services, memory = ?memory.status, "health check reports DOWN");
        }

        HealthReport {
            status,
            timestamp: OffsetDateTime::now_utc(),
            services,
            memory,
        }
    }

    pub async fn system_info(&self) -> SystemInfo {
        SystemInfo {
            server_time: OffsetDateTime::now_utc(),
            version: env!("CARGO_PKG_VERSION"),
            os: std::env::consts::OS,
            os_family: std::env::consts::FAMILY,
            arch: std::env::consts::ARCH,
            memory: self.memory.sample().map(MemorySummary::from),
            services: self.check_all().await.into_iter().collect(),
        }
    }

    /// Hands the request to the configured [`ServiceControl`] and re-probes.
    #[instrument(skip(self))]
    pub async fn restart_service(&self, name: &str) -> RestartReport {
        let Some(endpoint) = self.endpoint(name) else {
            warn!(service = %name, "restart requested for unknown service");
            return RestartReport {
                service: name.to_string(),
                outcome: RestartOutcome::UnknownService,
                current_status: None,
            };
        };
        let outcome = self.control.restart(endpoint).await;
        let current_status = self.check_service(&endpoint.url).await;
        info!(service = %name, ?outcome, ?current_status, "restart handled");
        RestartReport {
            service: endpoint.name.clone(),
            outcome,
            current_status: Some(current_status),
        }
    }
}
