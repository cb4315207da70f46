//! Worker readiness probing.
//!
//! A freshly created worker container spends most of its startup loading
//! model weights; it is not usable until its health endpoint answers.
//! Each `deploy` spawns one prober task that polls the worker at a fixed
//! cadence until one of three terminal outcomes:
//!
//! ```text
//!   Polling ──▶ Ready      (health endpoint answered in time)
//!      │
//!      ├─────▶ Died        (container exited before becoming healthy)
//!      │
//!      └─────▶ TimedOut    (budget exhausted)
//! ```
//!
//! No backoff: probing is local and cheap, a fixed interval suffices.

use crate::config::OrchestratorConfig;
use crate::error::{Error, Result};
use crate::runtime::{ContainerHandle, ContainerRuntime, ContainerStatus};
use async_trait::async_trait;
use std::time::Duration;

// =============================================================================
// Probe Outcome
// =============================================================================

/// Terminal state of one readiness probe.
///
/// `Died` and `TimedOut` trigger identical cleanup (port released,
/// container stop requested); they are distinguished only for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Worker answered its health endpoint within budget.
    Ready,
    /// Container exited before the worker reported healthy.
    Died,
    /// Budget expired without a successful health response.
    TimedOut,
}

impl std::fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::Died => write!(f, "died"),
            Self::TimedOut => write!(f, "timed out"),
        }
    }
}

// =============================================================================
// Probe Settings
// =============================================================================

/// Polling cadence and wait budget for readiness probing.
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    /// Time between health checks.
    pub interval: Duration,
    /// Total time a worker gets to become healthy.
    pub budget: Duration,
}

impl ProbeSettings {
    /// Number of polls the budget allows, at least one.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        let interval = self.interval.max(Duration::from_millis(1));
        let attempts = self.budget.as_millis() / interval.as_millis();
        u32::try_from(attempts).unwrap_or(u32::MAX).max(1)
    }
}

impl From<&OrchestratorConfig> for ProbeSettings {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            interval: config.probe_interval,
            budget: config.probe_budget,
        }
    }
}

// =============================================================================
// Health Probe Trait
// =============================================================================

/// Capability interface for asking one worker whether it is healthy.
///
/// A separate seam from [`ContainerRuntime`] because readiness is a
/// worker-reported fact (the model finished loading), not an engine
/// fact (the container process exists). Tests substitute a scripted
/// implementation.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Returns true once the worker behind `port`/`prefix` answers its
    /// health endpoint with a success status. Connection failures and
    /// non-success statuses both mean not-yet-ready.
    async fn is_healthy(&self, port: u16, prefix: &str) -> bool;
}

// =============================================================================
// HTTP Health Probe
// =============================================================================

/// Production health probe: HTTP GET against
/// `{host_url}:{port}{prefix}{health_path}`.
pub struct HttpHealthProbe {
    client: reqwest::Client,
    host_url: String,
    health_path: String,
    auth: Option<(String, String)>,
}

impl HttpHealthProbe {
    /// Builds a probe client from orchestrator configuration.
    ///
    /// Credentials and the TLS-verification toggle are opaque
    /// pass-through from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProbeClientFailed`] if the underlying HTTP
    /// client cannot be constructed.
    pub fn new(config: &OrchestratorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!config.verify_ssl)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::ProbeClientFailed(e.to_string()))?;

        let auth = match (&config.auth_user, &config.auth_password) {
            (Some(user), Some(password)) => Some((user.clone(), password.clone())),
            _ => None,
        };

        Ok(Self {
            client,
            host_url: config.host_url.trim_end_matches('/').to_string(),
            health_path: config.health_path.clone(),
            auth,
        })
    }

    fn worker_url(&self, port: u16, prefix: &str, path: &str) -> String {
        format!("{}:{}{}{}", self.host_url, port, prefix, path)
    }

    /// Fetches the worker's self-reported statistics from
    /// `{prefix}/stats`.
    ///
    /// The orchestrator guarantees reachability, not payload shape, so
    /// the body is surfaced as raw JSON. `None` means the worker did not
    /// answer with a success status.
    pub async fn fetch_stats(&self, port: u16, prefix: &str) -> Option<serde_json::Value> {
        let url = self.worker_url(port, prefix, "/stats");
        let mut request = self.client.get(&url);
        if let Some((user, password)) = &self.auth {
            request = request.basic_auth(user, Some(password));
        }
        match request.send().await {
            Ok(response) if response.status().is_success() => response.json().await.ok(),
            Ok(response) => {
                tracing::debug!(url = %url, status = %response.status(), "stats not available");
                None
            }
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "stats fetch failed");
                None
            }
        }
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn is_healthy(&self, port: u16, prefix: &str) -> bool {
        let url = self.worker_url(port, prefix, &self.health_path);
        let mut request = self.client.get(&url);
        if let Some((user, password)) = &self.auth {
            request = request.basic_auth(user, Some(password));
        }
        match request.send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::trace!(url = %url, error = %e, "health check connection failed");
                false
            }
        }
    }
}

// =============================================================================
// Probe Loop
// =============================================================================

/// Polls one provisioning worker until a terminal outcome.
///
/// Each iteration first asks the runtime whether the container is still
/// alive (a dead container can never become healthy, no point waiting
/// out the budget), then checks the health endpoint. The first check
/// runs immediately; subsequent checks are spaced by
/// `settings.interval`.
pub async fn probe_worker(
    runtime: &dyn ContainerRuntime,
    probe: &dyn HealthProbe,
    handle: &ContainerHandle,
    port: u16,
    prefix: &str,
    settings: &ProbeSettings,
) -> ProbeOutcome {
    let max_attempts = settings.max_attempts();
    let mut ticks = tokio::time::interval(settings.interval.max(Duration::from_millis(1)));
    ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    for attempt in 1..=max_attempts {
        ticks.tick().await;

        if runtime.status(handle).await == ContainerStatus::Exited {
            tracing::warn!(container = %handle, attempt, "container exited during provisioning");
            return ProbeOutcome::Died;
        }

        if probe.is_healthy(port, prefix).await {
            tracing::debug!(container = %handle, attempt, "worker became healthy");
            return ProbeOutcome::Ready;
        }

        tracing::trace!(container = %handle, attempt, max_attempts, "worker not ready yet");
    }

    ProbeOutcome::TimedOut
}
