//! Worker registry and orchestrator facade.
//!
//! The orchestrator owns the only two pieces of shared mutable state in
//! the system - the worker registry and the port allocator - and guards
//! them together under a single async mutex. Every registry mutation
//! (insert, delete, phase transition) and its paired port operation
//! happen inside one critical section, so concurrent `deploy`, `list`
//! and `remove` calls always observe a consistent registry and the port
//! pool's free set stays exactly complementary to the ports held by
//! live entries.
//!
//! Readiness probing is the one activity that runs outside the lock:
//! each `deploy` spawns a detached prober task which re-acquires the
//! lock only to commit its terminal outcome. A concurrent `remove` can
//! interrupt a provisioning worker by aborting that task; the commit
//! path tolerates the entry being gone.

use crate::config::OrchestratorConfig;
use crate::error::{Error, Result};
use crate::ports::PortAllocator;
use crate::probe::{probe_worker, HealthProbe, ProbeOutcome, ProbeSettings};
use crate::runtime::{ContainerHandle, ContainerRuntime, ContainerStatus, LaunchSpec};
use crate::worker::{WorkerConfig, WorkerPhase, WorkerSummary};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;

// =============================================================================
// Worker Record
// =============================================================================

/// Registry-owned state for one worker.
struct WorkerRecord {
    id: String,
    /// Host port exclusively owned by this record while it is live.
    port: u16,
    prefix: String,
    /// Runtime-owned container reference.
    handle: ContainerHandle,
    phase: WorkerPhase,
    created_at: DateTime<Utc>,
    /// Creation sequence number; stable sort key for `list`.
    seq: u64,
    /// Handle for interrupting an in-flight readiness probe.
    probe_task: Option<AbortHandle>,
}

impl WorkerRecord {
    fn summary(&self) -> WorkerSummary {
        WorkerSummary {
            id: self.id.clone(),
            port: self.port,
            prefix: self.prefix.clone(),
            phase: self.phase,
            created_at: self.created_at,
        }
    }
}

/// Registry and port pool, mutated only under the orchestrator's mutex.
struct Inner {
    workers: HashMap<String, WorkerRecord>,
    ports: PortAllocator,
    next_seq: u64,
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Facade over worker lifecycle management: `deploy`, `list`, `remove`.
///
/// Constructed once and shared (`Arc`) between request handlers; owns
/// its registry rather than living in ambient global state.
pub struct Orchestrator {
    config: OrchestratorConfig,
    runtime: Arc<dyn ContainerRuntime>,
    probe: Arc<dyn HealthProbe>,
    probe_settings: ProbeSettings,
    inner: Mutex<Inner>,
}

impl Orchestrator {
    /// Creates an orchestrator over the given runtime adapter and
    /// health probe, with an empty registry and a full port pool.
    #[must_use]
    pub fn new(
        config: OrchestratorConfig,
        runtime: Arc<dyn ContainerRuntime>,
        probe: Arc<dyn HealthProbe>,
    ) -> Self {
        let ports = PortAllocator::new(config.port_min, config.port_max);
        let probe_settings = ProbeSettings::from(&config);
        Self {
            config,
            runtime,
            probe,
            probe_settings,
            inner: Mutex::new(Inner {
                workers: HashMap::new(),
                ports,
                next_seq: 0,
            }),
        }
    }

    /// The configuration this orchestrator was built with.
    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Base URL (host + port) under which a worker's prefix is served.
    #[must_use]
    pub fn worker_url(&self, summary: &WorkerSummary) -> String {
        format!(
            "{}{}",
            self.config.worker_base_url(summary.port),
            summary.prefix
        )
    }

    // =========================================================================
    // Deploy
    // =========================================================================

    /// Deploys a new worker.
    ///
    /// Reserves a port, creates the container, registers a
    /// `Provisioning` entry and spawns a readiness prober, then returns
    /// without waiting for the worker to become healthy - callers must
    /// not block on model loading. The returned summary carries the
    /// assigned port.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidWorkerId`] / [`Error::InvalidWorkerConfig`]:
    ///   the config failed validation
    /// - [`Error::WorkerAlreadyExists`]: a Ready or Provisioning worker
    ///   already owns this id; the existing entry is untouched
    /// - [`Error::PortsExhausted`]: no free port in the pool
    /// - [`Error::CreateFailed`]: the engine rejected the container;
    ///   the port reservation is rolled back before returning
    pub async fn deploy(self: &Arc<Self>, config: WorkerConfig) -> Result<WorkerSummary> {
        config.validate()?;

        let mut inner = self.inner.lock().await;

        // Atomic check-and-insert: a racing deploy of the same id loses
        // here with AlreadyExists rather than silently superseding.
        if let Some(existing) = inner.workers.get(&config.id) {
            if existing.phase.is_live() {
                return Err(Error::WorkerAlreadyExists(config.id));
            }
            // A Failed leftover holds no port and its container is
            // already stopped; drop it and deploy fresh under the id.
            inner.workers.remove(&config.id);
        }

        let port = inner.ports.reserve()?;
        let prefix = config.effective_prefix();
        let image = config
            .image
            .clone()
            .unwrap_or_else(|| self.config.worker_image.clone());

        let spec = LaunchSpec {
            worker_id: config.id.clone(),
            image,
            env: config.env.clone(),
            host_port: port,
            internal_port: self.config.internal_port,
            prefix: prefix.clone(),
            network: self.config.docker_network.clone(),
        };

        // The engine call runs inside the critical section; a failed
        // create must roll the reservation back before anyone can
        // observe it.
        let handle = match self.runtime.create(&spec).await {
            Ok(handle) => handle,
            Err(e) => {
                inner.ports.release(port);
                tracing::warn!(worker = %config.id, error = %e, "container create failed");
                return Err(e);
            }
        };

        let seq = inner.next_seq;
        inner.next_seq += 1;

        let mut record = WorkerRecord {
            id: config.id.clone(),
            port,
            prefix: prefix.clone(),
            handle: handle.clone(),
            phase: WorkerPhase::Provisioning,
            created_at: Utc::now(),
            seq,
            probe_task: None,
        };

        // Fire-and-forget readiness probing; the caller gets the
        // Provisioning entry back immediately.
        let task = tokio::spawn({
            let orchestrator = Arc::clone(self);
            let id = config.id.clone();
            let prefix = prefix.clone();
            async move {
                let outcome = probe_worker(
                    orchestrator.runtime.as_ref(),
                    orchestrator.probe.as_ref(),
                    &handle,
                    port,
                    &prefix,
                    &orchestrator.probe_settings,
                )
                .await;
                orchestrator.finish_probe(&id, outcome).await;
            }
        });
        record.probe_task = Some(task.abort_handle());

        let summary = record.summary();
        inner.workers.insert(config.id.clone(), record);

        tracing::info!(worker = %config.id, port, prefix = %summary.prefix, "worker provisioning");
        Ok(summary)
    }

    // =========================================================================
    // List
    // =========================================================================

    /// Lists ready workers in creation order.
    ///
    /// Doubles as the reaper: entries whose container the runtime
    /// reports as exited are failed, torn down and dropped from the
    /// registry before the result is built, as are leftovers from
    /// earlier probe failures. Only `Ready` workers appear in the
    /// result - a worker that never became healthy is indistinguishable
    /// from one that was never deployed.
    pub async fn list(&self) -> Vec<WorkerSummary> {
        let mut inner = self.inner.lock().await;

        // Cross-check live entries against the engine. Unknown status
        // is deliberately not reaped: a transient engine failure must
        // not tear down healthy workers.
        let mut dead: Vec<String> = Vec::new();
        for record in inner.workers.values() {
            if record.phase.is_live()
                && self.runtime.status(&record.handle).await == ContainerStatus::Exited
            {
                dead.push(record.id.clone());
            }
        }
        for id in &dead {
            tracing::warn!(worker = %id, "container died, reaping");
        }

        let failed: Vec<String> = inner
            .workers
            .values()
            .filter(|r| r.phase == WorkerPhase::Failed)
            .map(|r| r.id.clone())
            .collect();

        for id in dead.into_iter().chain(failed) {
            self.delete_record(&mut inner, &id).await;
        }

        let mut summaries: Vec<&WorkerRecord> = inner
            .workers
            .values()
            .filter(|r| r.phase == WorkerPhase::Ready)
            .collect();
        summaries.sort_by_key(|r| r.seq);
        summaries.iter().map(|r| r.summary()).collect()
    }

    /// Snapshot of every registry entry, all phases, in creation order.
    ///
    /// Unlike [`list`](Self::list) this has no reaping side effect;
    /// intended for diagnostics.
    pub async fn snapshot(&self) -> Vec<WorkerSummary> {
        let inner = self.inner.lock().await;
        let mut records: Vec<&WorkerRecord> = inner.workers.values().collect();
        records.sort_by_key(|r| r.seq);
        records.iter().map(|r| r.summary()).collect()
    }

    /// Number of free ports left in the pool.
    pub async fn available_ports(&self) -> usize {
        self.inner.lock().await.ports.available()
    }

    // =========================================================================
    // Remove
    // =========================================================================

    /// Removes a worker by id. Idempotent: removing an absent or
    /// already-removed worker returns `false` and changes nothing.
    ///
    /// Works on any phase, including interrupting a `Provisioning`
    /// worker mid-probe. A stop failure from the engine is logged but
    /// never blocks registry cleanup - a stuck container must not leak
    /// the logical slot and port forever.
    pub async fn remove(&self, id: &str) -> bool {
        let mut inner = self.inner.lock().await;
        if !inner.workers.contains_key(id) {
            return false;
        }
        self.delete_record(&mut inner, id).await;
        tracing::info!(worker = %id, "worker removed");
        true
    }

    // =========================================================================
    // Internal
    // =========================================================================

    /// Deletes one record, tearing down whatever it still holds: probe
    /// aborted, teardown requested, port released. Caller holds the
    /// registry lock, so the whole sequence is one atomic unit to every
    /// other operation.
    async fn delete_record(&self, inner: &mut Inner, id: &str) {
        let Some(mut record) = inner.workers.remove(id) else {
            return;
        };
        // A Failed record was already torn down when its probe outcome
        // was committed: container stopped, port back in the pool.
        // Releasing its stale port again could hand the pool a port a
        // newer worker has since reserved.
        if record.phase == WorkerPhase::Failed {
            return;
        }
        record.phase = WorkerPhase::Removing;

        if let Some(task) = record.probe_task.take() {
            task.abort();
        }

        if let Err(e) = self.runtime.stop(&record.handle).await {
            tracing::warn!(
                worker = %record.id,
                container = %record.handle,
                error = %e,
                "container stop failed during teardown"
            );
        }

        inner.ports.release(record.port);
    }

    /// Commits a probe outcome. No-op unless the entry still exists and
    /// is still `Provisioning` - a concurrent `remove` or reap wins and
    /// this side observes no entry.
    async fn finish_probe(&self, id: &str, outcome: ProbeOutcome) {
        let mut inner = self.inner.lock().await;
        let Some(record) = inner.workers.get_mut(id) else {
            return;
        };
        if record.phase != WorkerPhase::Provisioning {
            return;
        }
        record.probe_task = None;

        match outcome {
            ProbeOutcome::Ready => {
                record.phase = WorkerPhase::Ready;
                tracing::info!(worker = %id, port = record.port, "worker ready");
            }
            ProbeOutcome::Died | ProbeOutcome::TimedOut => {
                record.phase = WorkerPhase::Failed;
                let port = record.port;
                let handle = record.handle.clone();
                tracing::warn!(worker = %id, %outcome, "worker never became healthy");

                if let Err(e) = self.runtime.stop(&handle).await {
                    tracing::warn!(worker = %id, error = %e, "container stop failed after probe failure");
                }
                inner.ports.release(port);
                // The Failed entry stays registered until list() or a
                // redeploy of the same id garbage-collects it.
            }
        }
    }
}
