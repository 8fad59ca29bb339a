use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

/// Upper bound for a single liveness probe.
pub const MAX_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

const DEFAULT_SERVICES: &str =
    "yolo=http://localhost:5000/health,python-backend=http://localhost:8080/api/health";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceEndpoint {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    pub services: Vec<ServiceEndpoint>,
    pub probe_timeout: Duration,
    pub memory_threshold: f64,
    pub poll_interval: Option<Duration>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            services: Vec::new(),
            probe_timeout: MAX_PROBE_TIMEOUT,
            memory_threshold: 0.90,
            poll_interval: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub health: HealthConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let max_connections = env_positive("DATABASE_MAX_CONNECTIONS")?
            .map(|n| u32::try_from(n).context("DATABASE_MAX_CONNECTIONS is too large"))
            .transpose()?
            .unwrap_or(10);

        let services = parse_services(
            &std::env::var("DEPENDENT_SERVICES").unwrap_or_else(|_| DEFAULT_SERVICES.into()),
        )?;
        let probe_timeout = env_positive("HEALTH_PROBE_TIMEOUT_MS")?
            .map(Duration::from_millis)
            .unwrap_or(MAX_PROBE_TIMEOUT)
            .min(MAX_PROBE_TIMEOUT);
        let memory_threshold = match std::env::var("HEALTH_MEMORY_THRESHOLD") {
            Ok(v) => parse_threshold(&v)?,
            Err(_) => 0.90,
        };
        let poll_interval = env_positive("HEALTH_POLL_INTERVAL_SECS")?.map(Duration::from_secs);

        Ok(Self {
            database_url,
            max_connections,
            health: HealthConfig {
                services,
                probe_timeout,
                memory_threshold,
                poll_interval,
            },
        })
    }
}

/// Reads an optional positive integer; set-but-malformed is an error.
fn env_positive(name: &str) -> anyhow::Result<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) => parse_positive(name, &raw).map(Some),
        Err(_) => Ok(None),
    }
}

fn parse_positive(name: &str, raw: &str) -> anyhow::Result<u64> {
    let value = raw
        .trim()
        .parse::<u64>()
        .with_context(|| format!("{name} is not a whole number: {raw:?}"))?;
    anyhow::ensure!(value > 0, "{name} must be greater than zero");
    Ok(value)
}

/// Parses `name=url` pairs separated by commas. Names must be unique.
pub fn parse_services(raw: &str) -> anyhow::Result<Vec<ServiceEndpoint>> {
    let mut services: Vec<ServiceEndpoint> = Vec::new();
    for pair in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (name, url) = pair
            .split_once('=')
            .with_context(|| format!("expected name=url, got {pair:?}"))?;
        let (name, url) = (name.trim(), url.trim());
        anyhow::ensure!(!name.is_empty(), "empty service name in {pair:?}");
        anyhow::ensure!(
            url.starts_with("http://") || url.starts_with("https://"),
            "service {name} has a non-http url {url:?}"
        );
        anyhow::ensure!(
            services.iter().all(|s| s.name != name),
            "service {name} is configured more than once"
        );
        services.push(ServiceEndpoint {
            name: name.to_string(),
            url: url.to_string(),
        });
    }
    Ok(services)
}

fn parse_threshold(raw: &str) -> anyhow::Result<f64> {
    let value = raw
        .trim()
        .parse::<f64>()
        .with_context(|| format!("HEALTH_MEMORY_THRESHOLD is not a number: {raw:?}"))?;
    anyhow::ensure!(
        value > 0.0 && value <= 1.0,
        "HEALTH_MEMORY_THRESHOLD must be in (0, 1], got {value}"
    );
    Ok(value)
}
