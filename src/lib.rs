//! # modelyard
//!
//! **Lifecycle orchestrator for model-serving worker containers.**
//!
//! The deployment API of a model-serving platform needs to start, track,
//! expose and tear down isolated model workers on demand. Each worker is
//! one container bound to a unique host port and identified by a stable
//! name; this crate owns that lifecycle and nothing else - model
//! semantics stay behind the worker's HTTP contract.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Orchestrator                          │
//! │            deploy(config) · list() · remove(id)              │
//! │                                                              │
//! │   ┌───────────────────────────┐   ┌──────────────────────┐   │
//! │   │      Worker Registry      │   │    Port Allocator    │   │
//! │   │  id → {handle, port,      │   │  [min..max] pool,    │   │
//! │   │        prefix, phase}     │   │  lowest-free first   │   │
//! │   └───────────────────────────┘   └──────────────────────┘   │
//! │          one mutex over both: port moves and registry        │
//! │          mutations are a single atomic unit                  │
//! └───────────────┬──────────────────────────────┬───────────────┘
//!                 │                              │
//!     ┌───────────▼───────────┐      ┌───────────▼───────────┐
//!     │   ContainerRuntime    │      │   Readiness Prober    │
//!     │ create / stop / status│      │  poll health endpoint │
//!     │  (Docker CLI | fake)  │      │  → Ready|Died|TimedOut│
//!     └───────────────────────┘      └───────────────────────┘
//! ```
//!
//! # Worker Lifecycle
//!
//! ```text
//!   deploy ──▶ Provisioning ──▶ Ready ──▶ Removing ──▶ (deleted)
//!                   │                        ▲
//!                   ▼                        │ remove / list-reap
//!                 Failed ────────────────────┘
//! ```
//!
//! `deploy` returns as soon as the entry is registered, carrying the
//! assigned port; readiness is established in the background. Only
//! `Ready` workers are visible through `list` - a worker that never
//! became healthy looks, to callers, as if it was never deployed.
//!
//! # Guarantees
//!
//! - One live worker per id; a duplicate deploy fails with
//!   [`Error::WorkerAlreadyExists`] instead of superseding.
//! - A port is held by exactly one live entry; every failure path
//!   (engine rejection, probe timeout, dead container) returns it to
//!   the pool.
//! - Pool exhaustion degrades to a [`Error::PortsExhausted`] deploy
//!   error, never a crash.
//! - `remove` is idempotent and can interrupt provisioning.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use modelyard::{
//!     DockerRuntime, HttpHealthProbe, Orchestrator, OrchestratorConfig, WorkerConfig,
//! };
//!
//! let config = OrchestratorConfig::from_env()?;
//! let probe = Arc::new(HttpHealthProbe::new(&config)?);
//! let orchestrator = Arc::new(Orchestrator::new(config, Arc::new(DockerRuntime::new()), probe));
//!
//! let worker = orchestrator
//!     .deploy(WorkerConfig::new("distilbert").with_env("MODEL_NAME", "distilbert-base-uncased"))
//!     .await?;
//! println!("provisioning on port {}", worker.port);
//! ```

mod config;
mod error;
mod orchestrator;
mod ports;
mod probe;
mod runtime;
pub mod runtimes;
mod worker;

pub use config::OrchestratorConfig;
pub use error::{Error, Result};
pub use orchestrator::Orchestrator;
pub use ports::PortAllocator;
pub use probe::{probe_worker, HealthProbe, HttpHealthProbe, ProbeOutcome, ProbeSettings};
pub use runtime::{ContainerHandle, ContainerRuntime, ContainerStatus, LaunchSpec};
pub use runtimes::{DockerRuntime, FakeRuntime};
pub use worker::{
    DeployRequest, WorkerConfig, WorkerPhase, WorkerSummary, MAX_ENV_VALUE_LEN, MAX_ENV_VARS,
    MAX_PREFIX_LEN, MAX_WORKER_ID_LEN, WORKER_ID_VALID_CHARS,
};
