//! Docker runtime adapter.
//!
//! Drives the host Docker engine through the `docker` CLI with
//! [`tokio::process::Command`]. The CLI is the engine's stable public
//! interface and keeps this adapter free of any engine API dependency.
//!
//! Containers are created *without* `--rm` so that an exited container
//! remains inspectable: the orchestrator relies on observing `Exited`
//! status to reap dead workers, and removes containers itself via
//! `docker rm -f` on teardown.

use crate::error::{Error, Result};
use crate::runtime::{ContainerHandle, ContainerRuntime, ContainerStatus, LaunchSpec};
use async_trait::async_trait;
use tokio::process::Command;

/// Container label carrying the worker's URL prefix, so the prefix can
/// be recovered from `docker inspect` without consulting the registry.
pub const PREFIX_LABEL: &str = "modelyard.prefix";

/// Container label marking containers managed by this orchestrator.
pub const MANAGED_LABEL: &str = "modelyard.managed";

/// Container label carrying the worker's published host port.
pub const PORT_LABEL: &str = "modelyard.port";

/// Runtime adapter backed by the host `docker` CLI.
#[derive(Debug, Default)]
pub struct DockerRuntime {
    _private: (),
}

impl DockerRuntime {
    /// Creates a Docker adapter. Engine availability is discovered
    /// lazily on first use.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    fn name(&self) -> &str {
        "docker"
    }

    async fn create(&self, spec: &LaunchSpec) -> Result<ContainerHandle> {
        let mut command = Command::new("docker");
        command
            .arg("run")
            .arg("-d")
            .args(["--name", &spec.worker_id])
            .args(["-p", &format!("{}:{}", spec.host_port, spec.internal_port)])
            .args(["--label", &format!("{PREFIX_LABEL}={}", spec.prefix)])
            .args(["--label", &format!("{PORT_LABEL}={}", spec.host_port)])
            .args(["--label", &format!("{MANAGED_LABEL}=true")]);

        if let Some(network) = &spec.network {
            command.args(["--network", network]);
        }

        for (key, value) in &spec.env {
            command.args(["-e", &format!("{key}={value}")]);
        }

        command.arg(&spec.image);

        let output = command.output().await?;
        if !output.status.success() {
            return Err(Error::CreateFailed {
                id: spec.worker_id.clone(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        // `docker run -d` prints the full container id on stdout.
        let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if container_id.is_empty() {
            return Err(Error::CreateFailed {
                id: spec.worker_id.clone(),
                reason: "docker run returned no container id".to_string(),
            });
        }

        tracing::info!(
            worker = %spec.worker_id,
            container = %container_id,
            host_port = spec.host_port,
            image = %spec.image,
            "created worker container"
        );
        Ok(ContainerHandle::new(container_id))
    }

    async fn stop(&self, handle: &ContainerHandle) -> Result<()> {
        let output = Command::new("docker")
            .args(["rm", "-f", handle.as_str()])
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            // Removing a container the engine no longer knows is success
            // for our purposes.
            if stderr.contains("No such container") {
                return Ok(());
            }
            return Err(Error::StopFailed {
                handle: handle.to_string(),
                reason: stderr,
            });
        }

        tracing::info!(container = %handle, "removed worker container");
        Ok(())
    }

    async fn status(&self, handle: &ContainerHandle) -> ContainerStatus {
        let output = Command::new("docker")
            .args(["inspect", "-f", "{{.State.Status}}", handle.as_str()])
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                match String::from_utf8_lossy(&output.stdout).trim() {
                    // "created" is the transient window between create
                    // and start; treat it as alive so the prober does
                    // not misread a starting container as dead.
                    "running" | "restarting" | "created" => ContainerStatus::Running,
                    _ => ContainerStatus::Exited,
                }
            }
            Ok(output) => {
                tracing::debug!(
                    container = %handle,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "docker inspect failed"
                );
                ContainerStatus::Unknown
            }
            Err(e) => {
                tracing::warn!(container = %handle, error = %e, "failed to invoke docker");
                ContainerStatus::Unknown
            }
        }
    }
}
