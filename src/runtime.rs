//! Container runtime adapter trait.
//!
//! The orchestrator never talks to a container engine directly; it goes
//! through [`ContainerRuntime`], a narrow capability interface covering
//! exactly the three operations worker lifecycle management needs:
//! create, stop, status. This boundary is what lets the orchestration
//! logic run against [`FakeRuntime`] in tests while production binds to
//! the host Docker engine via [`DockerRuntime`].
//!
//! [`FakeRuntime`]: crate::runtimes::FakeRuntime
//! [`DockerRuntime`]: crate::runtimes::DockerRuntime

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// =============================================================================
// Container Handle
// =============================================================================

/// Opaque reference to a container owned by the runtime adapter.
///
/// For Docker this is the engine-assigned container id; the fake runtime
/// uses a generated UUID. The registry stores handles but never
/// interprets them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerHandle(String);

impl ContainerHandle {
    /// Wraps a runtime-assigned container identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Container Status
// =============================================================================

/// Runtime-reported container status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    /// Container process is alive.
    Running,
    /// Container has stopped (any terminal engine state).
    Exited,
    /// Engine could not be queried or does not know the container.
    Unknown,
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Exited => write!(f, "exited"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

// =============================================================================
// Launch Spec
// =============================================================================

/// Everything a runtime adapter needs to create one worker container.
///
/// The env mapping is opaque pass-through: the orchestrator forwards the
/// caller's variables without inspecting individual keys.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Logical worker id, used as the container name where the engine
    /// supports naming.
    pub worker_id: String,
    /// Container image reference.
    pub image: String,
    /// Environment variables passed through to the container.
    pub env: HashMap<String, String>,
    /// Host port the container's service port is published on.
    pub host_port: u16,
    /// Port the worker process listens on inside the container. The
    /// host-to-internal mapping is fixed for the worker's lifetime.
    pub internal_port: u16,
    /// URL prefix the worker serves under, recorded as a container label
    /// so it can be recovered from the engine.
    pub prefix: String,
    /// Engine network to attach to, if any.
    pub network: Option<String>,
}

// =============================================================================
// Container Runtime Trait
// =============================================================================

/// Capability interface over the host's container engine.
///
/// # Implementations
///
/// - `DockerRuntime`: drives the `docker` CLI
/// - `FakeRuntime`: in-memory engine for testing
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Returns the adapter name, for logs.
    fn name(&self) -> &str;

    /// Creates and starts a container.
    ///
    /// Binds `spec.internal_port` inside the container to
    /// `spec.host_port` on the host.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CreateFailed`] when the engine rejects the
    /// request; the caller rolls back its port reservation and registry
    /// entry.
    ///
    /// [`Error::CreateFailed`]: crate::error::Error::CreateFailed
    async fn create(&self, spec: &LaunchSpec) -> Result<ContainerHandle>;

    /// Stops and removes a container.
    ///
    /// Must succeed (or at worst fail loudly) on an already-stopped
    /// container; callers treat stop failure as non-fatal and proceed
    /// with registry cleanup regardless.
    async fn stop(&self, handle: &ContainerHandle) -> Result<()>;

    /// Reports the container's current status.
    ///
    /// Infallible by design: an engine query failure maps to
    /// [`ContainerStatus::Unknown`] rather than an error, because every
    /// caller would treat the two identically.
    async fn status(&self, handle: &ContainerHandle) -> ContainerStatus;
}
