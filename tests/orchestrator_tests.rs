//! End-to-end tests of the orchestrator facade against the fake
//! container runtime: deploy/list/remove semantics, port accounting,
//! probe-driven phase transitions, and reaping.

use async_trait::async_trait;
use modelyard::{
    Error, FakeRuntime, HealthProbe, Orchestrator, OrchestratorConfig, WorkerConfig, WorkerPhase,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Test Fixtures
// =============================================================================

/// Health probe with an externally controlled verdict.
struct GatedProbe {
    healthy: AtomicBool,
}

impl GatedProbe {
    fn healthy() -> Arc<Self> {
        Arc::new(Self {
            healthy: AtomicBool::new(true),
        })
    }

    fn unhealthy() -> Arc<Self> {
        Arc::new(Self {
            healthy: AtomicBool::new(false),
        })
    }

    fn set_healthy(&self, value: bool) {
        self.healthy.store(value, Ordering::SeqCst);
    }
}

#[async_trait]
impl HealthProbe for GatedProbe {
    async fn is_healthy(&self, _port: u16, _prefix: &str) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}

fn test_config(port_min: u16, port_max: u16, budget: Duration) -> OrchestratorConfig {
    OrchestratorConfig {
        port_min,
        port_max,
        probe_interval: Duration::from_millis(5),
        probe_budget: budget,
        ..OrchestratorConfig::default()
    }
}

fn orchestrator_with(
    config: OrchestratorConfig,
    probe: Arc<GatedProbe>,
) -> (Arc<Orchestrator>, Arc<FakeRuntime>) {
    let runtime = Arc::new(FakeRuntime::new());
    let runtime_dyn: Arc<dyn modelyard::ContainerRuntime> = runtime.clone();
    let probe_dyn: Arc<dyn HealthProbe> = probe;
    let orchestrator = Arc::new(Orchestrator::new(config, runtime_dyn, probe_dyn));
    (orchestrator, runtime)
}

/// Polls until the worker reaches the phase, or panics after ~1s.
async fn wait_for_phase(orchestrator: &Arc<Orchestrator>, id: &str, phase: WorkerPhase) {
    for _ in 0..200 {
        if orchestrator
            .snapshot()
            .await
            .iter()
            .any(|s| s.id == id && s.phase == phase)
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("worker '{id}' never reached phase {phase}");
}

/// Polls until the pool has exactly `expected` free ports.
async fn wait_for_free_ports(orchestrator: &Arc<Orchestrator>, expected: usize) {
    for _ in 0..200 {
        if orchestrator.available_ports().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "pool never settled at {expected} free ports (got {})",
        orchestrator.available_ports().await
    );
}

// =============================================================================
// Deploy
// =============================================================================

#[tokio::test]
async fn test_deploy_returns_provisioning_entry_with_lowest_port() {
    let (orchestrator, runtime) =
        orchestrator_with(test_config(9000, 9010, Duration::from_secs(5)), GatedProbe::healthy());

    let summary = orchestrator
        .deploy(
            WorkerConfig::new("bert")
                .with_env("MODEL_NAME", "bert-base-uncased")
                .with_prefix("/api/bert"),
        )
        .await
        .unwrap();

    assert_eq!(summary.port, 9000);
    assert_eq!(summary.prefix, "/api/bert");
    assert_eq!(summary.phase, WorkerPhase::Provisioning);

    // The engine received the caller's env opaquely plus the port binding.
    let spec = runtime.spec_for("bert").expect("container created");
    assert_eq!(spec.host_port, 9000);
    assert_eq!(
        spec.env.get("MODEL_NAME").map(String::as_str),
        Some("bert-base-uncased")
    );
}

#[tokio::test]
async fn test_deploy_rejects_invalid_id_without_touching_pool() {
    let (orchestrator, _runtime) =
        orchestrator_with(test_config(9000, 9001, Duration::from_secs(5)), GatedProbe::healthy());

    assert!(matches!(
        orchestrator.deploy(WorkerConfig::new("")).await,
        Err(Error::InvalidWorkerId { .. })
    ));
    assert_eq!(orchestrator.available_ports().await, 2);
}

#[tokio::test]
async fn test_worker_becomes_ready_and_is_listed() {
    let (orchestrator, _runtime) =
        orchestrator_with(test_config(9000, 9010, Duration::from_secs(5)), GatedProbe::healthy());

    orchestrator.deploy(WorkerConfig::new("bert")).await.unwrap();
    wait_for_phase(&orchestrator, "bert", WorkerPhase::Ready).await;

    let listed = orchestrator.list().await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, "bert");
    assert_eq!(listed[0].phase, WorkerPhase::Ready);
}

#[tokio::test]
async fn test_duplicate_deploy_fails_and_leaves_existing_untouched() {
    let probe = GatedProbe::unhealthy();
    let (orchestrator, _runtime) = orchestrator_with(
        test_config(9000, 9010, Duration::from_secs(30)),
        Arc::clone(&probe),
    );

    let first = orchestrator.deploy(WorkerConfig::new("bert")).await.unwrap();

    // Still provisioning; a second deploy under the same id must lose.
    match orchestrator.deploy(WorkerConfig::new("bert")).await {
        Err(Error::WorkerAlreadyExists(id)) => assert_eq!(id, "bert"),
        other => panic!("expected WorkerAlreadyExists, got {other:?}"),
    }

    let snapshot = orchestrator.snapshot().await;
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].port, first.port);
    assert_eq!(orchestrator.available_ports().await, 10);

    // Same answer once the worker is ready.
    probe.set_healthy(true);
    wait_for_phase(&orchestrator, "bert", WorkerPhase::Ready).await;
    assert!(matches!(
        orchestrator.deploy(WorkerConfig::new("bert")).await,
        Err(Error::WorkerAlreadyExists(_))
    ));
}

#[tokio::test]
async fn test_create_failure_rolls_back_port_reservation() {
    let (orchestrator, runtime) =
        orchestrator_with(test_config(9000, 9001, Duration::from_secs(5)), GatedProbe::healthy());

    runtime.fail_next_create();
    match orchestrator.deploy(WorkerConfig::new("bert")).await {
        Err(Error::CreateFailed { id, .. }) => assert_eq!(id, "bert"),
        other => panic!("expected CreateFailed, got {other:?}"),
    }

    // No half-committed state: pool full, registry empty.
    assert_eq!(orchestrator.available_ports().await, 2);
    assert!(orchestrator.snapshot().await.is_empty());

    // The rolled-back port is handed out again.
    let summary = orchestrator.deploy(WorkerConfig::new("bert")).await.unwrap();
    assert_eq!(summary.port, 9000);
}

#[tokio::test]
async fn test_pool_exhaustion_fails_deploy_and_spares_existing_workers() {
    let (orchestrator, _runtime) =
        orchestrator_with(test_config(9000, 9001, Duration::from_secs(5)), GatedProbe::healthy());

    orchestrator.deploy(WorkerConfig::new("a")).await.unwrap();
    orchestrator.deploy(WorkerConfig::new("b")).await.unwrap();

    assert!(matches!(
        orchestrator.deploy(WorkerConfig::new("c")).await,
        Err(Error::PortsExhausted { .. })
    ));

    let snapshot = orchestrator.snapshot().await;
    assert_eq!(snapshot.len(), 2);
    assert!(snapshot.iter().all(|s| s.phase.is_live()));
}

// =============================================================================
// Remove
// =============================================================================

#[tokio::test]
async fn test_remove_is_idempotent() {
    let (orchestrator, runtime) =
        orchestrator_with(test_config(9000, 9010, Duration::from_secs(5)), GatedProbe::healthy());

    orchestrator.deploy(WorkerConfig::new("bert")).await.unwrap();
    wait_for_phase(&orchestrator, "bert", WorkerPhase::Ready).await;
    let handle = runtime.handle_for("bert").unwrap();

    assert!(orchestrator.remove("bert").await);
    assert!(runtime.was_stopped(&handle));
    assert_eq!(orchestrator.available_ports().await, 11);

    // Second remove: false, no state change.
    assert!(!orchestrator.remove("bert").await);
    assert_eq!(orchestrator.available_ports().await, 11);
    assert!(!orchestrator.remove("never-existed").await);
}

#[tokio::test]
async fn test_remove_interrupts_provisioning_worker() {
    let (orchestrator, runtime) = orchestrator_with(
        test_config(9000, 9010, Duration::from_secs(60)),
        GatedProbe::unhealthy(),
    );

    orchestrator.deploy(WorkerConfig::new("bert")).await.unwrap();
    let handle = runtime.handle_for("bert").unwrap();

    // Probe is mid-flight with a 60s budget; remove must not wait it out.
    assert!(orchestrator.remove("bert").await);
    assert!(runtime.was_stopped(&handle));
    assert_eq!(orchestrator.available_ports().await, 11);

    // The aborted prober must not resurrect the entry.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(orchestrator.snapshot().await.is_empty());
    assert_eq!(orchestrator.available_ports().await, 11);
}

// =============================================================================
// Probe Failure Cleanup
// =============================================================================

#[tokio::test]
async fn test_probe_timeout_frees_port_and_hides_worker() {
    let (orchestrator, runtime) = orchestrator_with(
        test_config(9000, 9001, Duration::from_millis(50)),
        GatedProbe::unhealthy(),
    );

    orchestrator.deploy(WorkerConfig::new("bert")).await.unwrap();
    let handle = runtime.handle_for("bert").unwrap();

    // After the budget elapses the port is back and the container stopped.
    wait_for_free_ports(&orchestrator, 2).await;
    assert!(runtime.was_stopped(&handle));

    // The worker is invisible to list, as if never deployed.
    assert!(orchestrator.list().await.is_empty());
}

#[tokio::test]
async fn test_worker_id_is_reusable_after_probe_failure() {
    let probe = GatedProbe::unhealthy();
    let (orchestrator, _runtime) = orchestrator_with(
        test_config(9000, 9001, Duration::from_millis(50)),
        Arc::clone(&probe),
    );

    orchestrator.deploy(WorkerConfig::new("bert")).await.unwrap();
    wait_for_free_ports(&orchestrator, 2).await;

    // The Failed leftover must not block a fresh deploy of the same id.
    probe.set_healthy(true);
    let summary = orchestrator.deploy(WorkerConfig::new("bert")).await.unwrap();
    assert_eq!(summary.port, 9000);
    wait_for_phase(&orchestrator, "bert", WorkerPhase::Ready).await;
}

#[tokio::test]
async fn test_reaping_failed_leftover_does_not_free_a_reassigned_port() {
    let probe = GatedProbe::unhealthy();
    let (orchestrator, _runtime) = orchestrator_with(
        test_config(9000, 9000, Duration::from_millis(50)),
        Arc::clone(&probe),
    );

    // "bert" fails its probe; its port goes back to the pool while the
    // Failed entry lingers in the registry.
    orchestrator.deploy(WorkerConfig::new("bert")).await.unwrap();
    wait_for_free_ports(&orchestrator, 1).await;

    // "gpt2" takes over the freed port and becomes healthy.
    probe.set_healthy(true);
    let summary = orchestrator.deploy(WorkerConfig::new("gpt2")).await.unwrap();
    assert_eq!(summary.port, 9000);
    wait_for_phase(&orchestrator, "gpt2", WorkerPhase::Ready).await;

    // Reaping the Failed "bert" must not touch the port "gpt2" now owns.
    let listed = orchestrator.list().await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, "gpt2");
    assert_eq!(orchestrator.available_ports().await, 0);
    match orchestrator.deploy(WorkerConfig::new("bart")).await {
        Err(Error::PortsExhausted { min: 9000, max: 9000 }) => {}
        other => panic!("expected PortsExhausted, got {other:?}"),
    }

    // Accounting stays exact after the owner is gone.
    assert!(orchestrator.remove("gpt2").await);
    assert_eq!(orchestrator.available_ports().await, 1);
}

// =============================================================================
// Reaping
// =============================================================================

#[tokio::test]
async fn test_list_reaps_workers_whose_container_died() {
    let (orchestrator, runtime) =
        orchestrator_with(test_config(9000, 9001, Duration::from_secs(5)), GatedProbe::healthy());

    orchestrator.deploy(WorkerConfig::new("bert")).await.unwrap();
    wait_for_phase(&orchestrator, "bert", WorkerPhase::Ready).await;

    // Kill the container behind the orchestrator's back.
    runtime.mark_exited(&runtime.handle_for("bert").unwrap());

    // list discovers the death, reaps the entry, frees the port.
    assert!(orchestrator.list().await.is_empty());
    assert_eq!(orchestrator.available_ports().await, 2);
    assert!(orchestrator.snapshot().await.is_empty());

    // The id and port are immediately reusable.
    let summary = orchestrator.deploy(WorkerConfig::new("bert")).await.unwrap();
    assert_eq!(summary.port, 9000);
}

// =============================================================================
// Port Accounting Invariant
// =============================================================================

#[tokio::test]
async fn test_live_entries_and_reserved_ports_stay_in_agreement() {
    let (orchestrator, runtime) =
        orchestrator_with(test_config(9000, 9004, Duration::from_secs(5)), GatedProbe::healthy());

    orchestrator.deploy(WorkerConfig::new("a")).await.unwrap();
    orchestrator.deploy(WorkerConfig::new("b")).await.unwrap();
    orchestrator.deploy(WorkerConfig::new("c")).await.unwrap();
    orchestrator.remove("b").await;
    runtime.fail_next_create();
    let _ = orchestrator.deploy(WorkerConfig::new("d")).await;
    orchestrator.deploy(WorkerConfig::new("e")).await.unwrap();

    let live: Vec<_> = orchestrator
        .snapshot()
        .await
        .into_iter()
        .filter(|s| s.phase.is_live())
        .collect();
    let capacity = 5;
    assert_eq!(orchestrator.available_ports().await, capacity - live.len());

    // No two live entries share a port.
    let mut ports: Vec<u16> = live.iter().map(|s| s.port).collect();
    ports.sort_unstable();
    ports.dedup();
    assert_eq!(ports.len(), live.len());
}

// =============================================================================
// Full Scenario
// =============================================================================

#[tokio::test]
async fn test_two_port_pool_lifecycle_scenario() {
    let (orchestrator, _runtime) =
        orchestrator_with(test_config(9000, 9001, Duration::from_secs(5)), GatedProbe::healthy());

    let a = orchestrator.deploy(WorkerConfig::new("a")).await.unwrap();
    assert_eq!(a.port, 9000);
    let b = orchestrator.deploy(WorkerConfig::new("b")).await.unwrap();
    assert_eq!(b.port, 9001);

    assert!(matches!(
        orchestrator.deploy(WorkerConfig::new("c")).await,
        Err(Error::PortsExhausted { .. })
    ));

    assert!(orchestrator.remove("a").await);

    let c = orchestrator.deploy(WorkerConfig::new("c")).await.unwrap();
    assert_eq!(c.port, 9000);

    wait_for_phase(&orchestrator, "b", WorkerPhase::Ready).await;
    wait_for_phase(&orchestrator, "c", WorkerPhase::Ready).await;

    // Creation order: b was deployed before c.
    let listed = orchestrator.list().await;
    let ids: Vec<&str> = listed.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, ["b", "c"]);
}
