//! In-memory fake container runtime for tests.
//!
//! Behaves like a well-behaved engine by default: `create` always
//! succeeds and containers run until stopped. Tests script failures
//! through the knob methods (`fail_next_create`, `mark_exited`).

use crate::error::{Error, Result};
use crate::runtime::{ContainerHandle, ContainerRuntime, ContainerStatus, LaunchSpec};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

struct FakeContainer {
    spec: LaunchSpec,
    status: ContainerStatus,
}

#[derive(Default)]
struct FakeState {
    containers: HashMap<ContainerHandle, FakeContainer>,
    fail_next_create: bool,
    stopped: Vec<ContainerHandle>,
}

/// Scriptable in-memory container runtime.
#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
}

impl FakeRuntime {
    /// Creates an empty fake engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `create` call fail.
    pub fn fail_next_create(&self) {
        self.state.lock().unwrap().fail_next_create = true;
    }

    /// Marks a container as exited, as if its process died.
    pub fn mark_exited(&self, handle: &ContainerHandle) {
        if let Some(container) = self.state.lock().unwrap().containers.get_mut(handle) {
            container.status = ContainerStatus::Exited;
        }
    }

    /// Handle of the container created for `worker_id`, if any.
    #[must_use]
    pub fn handle_for(&self, worker_id: &str) -> Option<ContainerHandle> {
        self.state
            .lock()
            .unwrap()
            .containers
            .iter()
            .find(|(_, c)| c.spec.worker_id == worker_id)
            .map(|(handle, _)| handle.clone())
    }

    /// Launch spec the engine received for `worker_id`, if any.
    #[must_use]
    pub fn spec_for(&self, worker_id: &str) -> Option<LaunchSpec> {
        self.state
            .lock()
            .unwrap()
            .containers
            .values()
            .find(|c| c.spec.worker_id == worker_id)
            .map(|c| c.spec.clone())
    }

    /// Number of containers currently in `Running` status.
    #[must_use]
    pub fn running_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .containers
            .values()
            .filter(|c| c.status == ContainerStatus::Running)
            .count()
    }

    /// True if `stop` was called for the handle.
    #[must_use]
    pub fn was_stopped(&self, handle: &ContainerHandle) -> bool {
        self.state.lock().unwrap().stopped.contains(handle)
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    fn name(&self) -> &str {
        "fake"
    }

    async fn create(&self, spec: &LaunchSpec) -> Result<ContainerHandle> {
        let mut state = self.state.lock().unwrap();
        if state.fail_next_create {
            state.fail_next_create = false;
            return Err(Error::CreateFailed {
                id: spec.worker_id.clone(),
                reason: "injected create failure".to_string(),
            });
        }

        let handle = ContainerHandle::new(uuid::Uuid::new_v4().to_string());
        state.containers.insert(
            handle.clone(),
            FakeContainer {
                spec: spec.clone(),
                status: ContainerStatus::Running,
            },
        );
        Ok(handle)
    }

    async fn stop(&self, handle: &ContainerHandle) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.stopped.push(handle.clone());
        if let Some(container) = state.containers.get_mut(handle) {
            container.status = ContainerStatus::Exited;
        }
        Ok(())
    }

    async fn status(&self, handle: &ContainerHandle) -> ContainerStatus {
        self.state
            .lock()
            .unwrap()
            .containers
            .get(handle)
            .map_or(ContainerStatus::Unknown, |c| c.status)
    }
}
