//! Environment-derived orchestrator configuration.
//!
//! The orchestrator is configured the way the surrounding platform
//! configures all of its services: plain environment variables with
//! sensible defaults for a single-host Docker deployment.

use crate::error::{Error, Result};
use std::time::Duration;

/// Default base URL for reaching workers from the orchestrator's own
/// container (the Docker bridge gateway; `host.docker.internal` on Mac).
pub const DEFAULT_HOST_URL: &str = "http://172.17.0.1";

/// Default worker image.
pub const DEFAULT_WORKER_IMAGE: &str = "ukpsquare/square-model-api:latest";

/// Default host port pool.
pub const DEFAULT_PORT_MIN: u16 = 8000;
/// Default host port pool upper bound (inclusive).
pub const DEFAULT_PORT_MAX: u16 = 8100;

/// Port the worker process listens on inside its container.
pub const DEFAULT_INTERNAL_PORT: u16 = 8000;

/// Default readiness poll cadence.
pub const DEFAULT_PROBE_INTERVAL_SECS: u64 = 2;

/// Default readiness wait budget. Model loading dominates worker startup
/// and can take minutes for large checkpoints.
pub const DEFAULT_PROBE_BUDGET_SECS: u64 = 600;

/// Default health endpoint path, relative to the worker prefix.
pub const DEFAULT_HEALTH_PATH: &str = "/health";

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Base URL for reaching workers (scheme + host, no port).
    pub host_url: String,
    /// Basic-auth username for authenticated worker calls, passed
    /// through opaquely.
    pub auth_user: Option<String>,
    /// Basic-auth password for authenticated worker calls.
    pub auth_password: Option<String>,
    /// Verify TLS certificates when probing workers.
    pub verify_ssl: bool,
    /// Image used when a worker config carries no override.
    pub worker_image: String,
    /// Inclusive host port pool bounds.
    pub port_min: u16,
    /// Inclusive host port pool upper bound.
    pub port_max: u16,
    /// Service port inside worker containers.
    pub internal_port: u16,
    /// Docker network to attach workers to, if any.
    pub docker_network: Option<String>,
    /// Readiness poll interval.
    pub probe_interval: Duration,
    /// Total readiness wait budget.
    pub probe_budget: Duration,
    /// Health endpoint path appended to each worker's prefix.
    pub health_path: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            host_url: DEFAULT_HOST_URL.to_string(),
            auth_user: None,
            auth_password: None,
            verify_ssl: true,
            worker_image: DEFAULT_WORKER_IMAGE.to_string(),
            port_min: DEFAULT_PORT_MIN,
            port_max: DEFAULT_PORT_MAX,
            internal_port: DEFAULT_INTERNAL_PORT,
            docker_network: None,
            probe_interval: Duration::from_secs(DEFAULT_PROBE_INTERVAL_SECS),
            probe_budget: Duration::from_secs(DEFAULT_PROBE_BUDGET_SECS),
            health_path: DEFAULT_HEALTH_PATH.to_string(),
        }
    }
}

impl OrchestratorConfig {
    /// Loads configuration from the environment, falling back to
    /// defaults for unset variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for unparsable numeric values or
    /// an inverted port range.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let port_min = env_u16("WORKER_PORT_MIN", defaults.port_min)?;
        let port_max = env_u16("WORKER_PORT_MAX", defaults.port_max)?;
        if port_min > port_max {
            return Err(Error::InvalidConfig {
                key: "WORKER_PORT_MIN".to_string(),
                reason: format!("port range inverted: {port_min} > {port_max}"),
            });
        }

        Ok(Self {
            host_url: env_string("DOCKER_HOST_URL", &defaults.host_url),
            auth_user: std::env::var("AUTH_USER").ok(),
            auth_password: std::env::var("AUTH_PASSWORD").ok(),
            // Anything except "0"/"false" keeps verification on.
            verify_ssl: !matches!(
                std::env::var("VERIFY_SSL").as_deref(),
                Ok("0") | Ok("false")
            ),
            worker_image: env_string("WORKER_IMAGE", &defaults.worker_image),
            port_min,
            port_max,
            internal_port: env_u16("WORKER_INTERNAL_PORT", defaults.internal_port)?,
            docker_network: std::env::var("DOCKER_NETWORK").ok(),
            probe_interval: Duration::from_secs(env_u64(
                "PROBE_INTERVAL_SECS",
                DEFAULT_PROBE_INTERVAL_SECS,
            )?),
            probe_budget: Duration::from_secs(env_u64(
                "PROBE_BUDGET_SECS",
                DEFAULT_PROBE_BUDGET_SECS,
            )?),
            health_path: env_string("HEALTH_PATH", &defaults.health_path),
        })
    }

    /// Base URL (host + port) of one worker, without the prefix.
    #[must_use]
    pub fn worker_base_url(&self, port: u16) -> String {
        format!("{}:{}", self.host_url.trim_end_matches('/'), port)
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u16(key: &str, default: u16) -> Result<u16> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| Error::InvalidConfig {
            key: key.to_string(),
            reason: format!("expected a port number, got '{raw}'"),
        }),
        Err(_) => Ok(default),
    }
}

fn env_u64(key: &str, default: u64) -> Result<u64> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| Error::InvalidConfig {
            key: key.to_string(),
            reason: format!("expected an integer, got '{raw}'"),
        }),
        Err(_) => Ok(default),
    }
}
