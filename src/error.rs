//! Error types for the orchestrator layer.

/// Result type alias for orchestrator operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while managing worker containers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Deploy Errors
    // =========================================================================
    /// A live worker (Ready or Provisioning) already owns this identifier.
    #[error("worker already exists: {0}")]
    WorkerAlreadyExists(String),

    /// Worker identifier failed validation.
    #[error("invalid worker id '{id}': {reason}")]
    InvalidWorkerId { id: String, reason: String },

    /// Worker configuration failed validation.
    #[error("invalid worker config for '{id}': {reason}")]
    InvalidWorkerConfig { id: String, reason: String },

    /// No free port left in the allocator's pool.
    #[error("port pool exhausted ({min}-{max} all reserved)")]
    PortsExhausted { min: u16, max: u16 },

    // =========================================================================
    // Runtime Adapter Errors
    // =========================================================================
    /// Container engine failed to create a container.
    #[error("failed to create container for worker '{id}': {reason}")]
    CreateFailed { id: String, reason: String },

    /// Container engine failed to stop/remove a container.
    #[error("failed to stop container '{handle}': {reason}")]
    StopFailed { handle: String, reason: String },

    // =========================================================================
    // Probe Errors
    // =========================================================================
    /// Failed to construct the HTTP client used for readiness probing.
    #[error("failed to build probe HTTP client: {0}")]
    ProbeClientFailed(String),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Environment-derived configuration value is unusable.
    #[error("invalid configuration for {key}: {reason}")]
    InvalidConfig { key: String, reason: String },

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error (spawning the container engine CLI, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
