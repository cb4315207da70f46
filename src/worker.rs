//! Worker configuration and registry entry types.
//!
//! A *worker* is one isolated model-serving container managed by the
//! orchestrator, identified by a stable caller-chosen id and reachable
//! under a URL prefix on its assigned host port.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// =============================================================================
// Validation Bounds
// =============================================================================

/// Maximum worker identifier length.
pub const MAX_WORKER_ID_LEN: usize = 63;

/// Maximum URL prefix length.
pub const MAX_PREFIX_LEN: usize = 128;

/// Maximum number of environment variables per worker.
pub const MAX_ENV_VARS: usize = 64;

/// Maximum environment variable value length.
pub const MAX_ENV_VALUE_LEN: usize = 4096;

/// Characters allowed in a worker identifier.
///
/// The id doubles as the container name and as a URL path segment, so it
/// is restricted to lowercase DNS-label-ish characters.
pub const WORKER_ID_VALID_CHARS: &str = "abcdefghijklmnopqrstuvwxyz0123456789-_";

// =============================================================================
// Worker Phase
// =============================================================================

/// Lifecycle phase of a registry entry.
///
/// ```text
///   Provisioning ──▶ Ready
///        │             │
///        ▼             ▼
///      Failed       Removing ──▶ (deleted)
/// ```
///
/// Transitions are monotonic: nothing re-enters `Provisioning`, and any
/// phase may move to `Removing` on the way out of the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerPhase {
    /// Container created, readiness probe still in flight.
    Provisioning,
    /// Worker answered its health endpoint; this is the only phase
    /// surfaced by `list`.
    Ready,
    /// Probe timed out, the worker died, or its container vanished.
    /// Port already released; the entry awaits garbage collection.
    Failed,
    /// Teardown in progress.
    Removing,
}

impl WorkerPhase {
    /// True for phases that count as a live claim on the worker id.
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(self, Self::Provisioning | Self::Ready)
    }
}

impl std::fmt::Display for WorkerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Provisioning => write!(f, "provisioning"),
            Self::Ready => write!(f, "ready"),
            Self::Failed => write!(f, "failed"),
            Self::Removing => write!(f, "removing"),
        }
    }
}

// =============================================================================
// Worker Config
// =============================================================================

/// Immutable, caller-supplied launch configuration for one worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Unique worker identifier.
    pub id: String,
    /// Image override; falls back to the orchestrator's configured
    /// worker image when absent (image choice is implicit per
    /// deployment type).
    #[serde(default)]
    pub image: Option<String>,
    /// Opaque environment mapping passed through to the container.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// URL prefix the worker serves under. Empty means the default
    /// `/api/<id>`.
    #[serde(default)]
    pub prefix: String,
}

impl WorkerConfig {
    /// Creates a config with just an id; env and prefix filled by the
    /// builder-style methods or left at their defaults.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            image: None,
            env: HashMap::new(),
            prefix: String::new(),
        }
    }

    /// Sets an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Sets the URL prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Returns the effective prefix, defaulting to `/api/<id>`.
    #[must_use]
    pub fn effective_prefix(&self) -> String {
        if self.prefix.is_empty() {
            format!("/api/{}", self.id)
        } else {
            self.prefix.clone()
        }
    }

    /// Validates the config against the bounds above.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidWorkerId`] or
    /// [`Error::InvalidWorkerConfig`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::InvalidWorkerId {
                id: self.id.clone(),
                reason: "id must not be empty".to_string(),
            });
        }
        if self.id.len() > MAX_WORKER_ID_LEN {
            return Err(Error::InvalidWorkerId {
                id: self.id.clone(),
                reason: format!("id exceeds {MAX_WORKER_ID_LEN} characters"),
            });
        }
        if let Some(c) = self.id.chars().find(|c| !WORKER_ID_VALID_CHARS.contains(*c)) {
            return Err(Error::InvalidWorkerId {
                id: self.id.clone(),
                reason: format!("id contains invalid character '{c}'"),
            });
        }
        if !self.prefix.is_empty() && !self.prefix.starts_with('/') {
            return Err(Error::InvalidWorkerConfig {
                id: self.id.clone(),
                reason: "prefix must start with '/'".to_string(),
            });
        }
        if self.prefix.len() > MAX_PREFIX_LEN {
            return Err(Error::InvalidWorkerConfig {
                id: self.id.clone(),
                reason: format!("prefix exceeds {MAX_PREFIX_LEN} characters"),
            });
        }
        if self.env.len() > MAX_ENV_VARS {
            return Err(Error::InvalidWorkerConfig {
                id: self.id.clone(),
                reason: format!("more than {MAX_ENV_VARS} environment variables"),
            });
        }
        for (key, value) in &self.env {
            if key.is_empty() {
                return Err(Error::InvalidWorkerConfig {
                    id: self.id.clone(),
                    reason: "empty environment variable name".to_string(),
                });
            }
            if value.len() > MAX_ENV_VALUE_LEN {
                return Err(Error::InvalidWorkerConfig {
                    id: self.id.clone(),
                    reason: format!("value of '{key}' exceeds {MAX_ENV_VALUE_LEN} bytes"),
                });
            }
        }
        Ok(())
    }
}

// =============================================================================
// Deploy Request
// =============================================================================

/// Deployment request shape used by the external deployment API.
///
/// Mirrors the model-serving platform's request fields. All of these end
/// up in the worker's environment mapping; the orchestrator never
/// interprets them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployRequest {
    /// Logical worker identifier.
    pub identifier: String,
    /// Model name as known to the serving framework.
    #[serde(default)]
    pub model_name: String,
    /// Filesystem or hub path of the model weights.
    #[serde(default)]
    pub model_path: String,
    /// Path of the decoder weights, for encoder-decoder models.
    #[serde(default)]
    pub decoder_path: String,
    /// Serving framework model type.
    #[serde(default)]
    pub model_type: String,
    /// Serving framework model class.
    #[serde(default)]
    pub model_class: String,
    /// Disable GPU inference.
    #[serde(default)]
    pub disable_gpu: bool,
    /// Inference batch size.
    #[serde(default)]
    pub batch_size: u32,
    /// Maximum input length accepted by the worker.
    #[serde(default)]
    pub max_input: u32,
    /// Model cache directory inside the container.
    #[serde(default)]
    pub transformers_cache: String,
    /// Return arrays as plaintext instead of base64.
    #[serde(default)]
    pub return_plaintext_arrays: bool,
    /// Whether adapters were preloaded into the image.
    #[serde(default)]
    pub preloaded_adapters: bool,
}

impl DeployRequest {
    /// Converts the request into an opaque [`WorkerConfig`].
    ///
    /// Key names match the worker image's expected environment contract.
    #[must_use]
    pub fn into_worker_config(self) -> WorkerConfig {
        let env = HashMap::from([
            ("MODEL_NAME".to_string(), self.model_name),
            ("MODEL_PATH".to_string(), self.model_path),
            ("DECODER_PATH".to_string(), self.decoder_path),
            ("MODEL_TYPE".to_string(), self.model_type),
            ("MODEL_CLASS".to_string(), self.model_class),
            ("DISABLE_GPU".to_string(), self.disable_gpu.to_string()),
            ("BATCH_SIZE".to_string(), self.batch_size.to_string()),
            ("MAX_INPUT_SIZE".to_string(), self.max_input.to_string()),
            ("TRANSFORMERS_CACHE".to_string(), self.transformers_cache),
            (
                "RETURN_PLAINTEXT_ARRAYS".to_string(),
                self.return_plaintext_arrays.to_string(),
            ),
            (
                "PRELOADED_ADAPTERS".to_string(),
                self.preloaded_adapters.to_string(),
            ),
        ]);

        WorkerConfig {
            id: self.identifier,
            image: None,
            env,
            prefix: String::new(),
        }
    }
}

// =============================================================================
// Worker Summary
// =============================================================================

/// Snapshot of one registry entry, returned by `deploy` and `list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSummary {
    /// Worker identifier.
    pub id: String,
    /// Host port the worker is published on.
    pub port: u16,
    /// URL prefix the worker serves under.
    pub prefix: String,
    /// Lifecycle phase at snapshot time.
    pub phase: WorkerPhase,
    /// Creation timestamp; `list` orders by it.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_liveness() {
        assert!(WorkerPhase::Provisioning.is_live());
        assert!(WorkerPhase::Ready.is_live());
        assert!(!WorkerPhase::Failed.is_live());
        assert!(!WorkerPhase::Removing.is_live());
    }

    #[test]
    fn test_effective_prefix_default() {
        let config = WorkerConfig::new("bert-base");
        assert_eq!(config.effective_prefix(), "/api/bert-base");

        let config = WorkerConfig::new("bert-base").with_prefix("/models/bert");
        assert_eq!(config.effective_prefix(), "/models/bert");
    }

    #[test]
    fn test_deploy_request_env_mapping() {
        let request = DeployRequest {
            identifier: "distilbert".to_string(),
            model_name: "distilbert-base-uncased".to_string(),
            disable_gpu: true,
            batch_size: 32,
            ..Default::default()
        };
        let config = request.into_worker_config();
        assert_eq!(config.id, "distilbert");
        assert_eq!(
            config.env.get("MODEL_NAME").map(String::as_str),
            Some("distilbert-base-uncased")
        );
        assert_eq!(config.env.get("DISABLE_GPU").map(String::as_str), Some("true"));
        assert_eq!(config.env.get("BATCH_SIZE").map(String::as_str), Some("32"));
    }
}
