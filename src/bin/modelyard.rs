//! Modelyard operator CLI.
//!
//! Thin command-line surface over the orchestrator facade, for driving
//! worker deployments against the local Docker engine.
//!
//! ## Usage
//!
//! ```sh
//! modelyard deploy <worker-id> [--env KEY=VALUE]... [--prefix /path] [--image ref] [--wait]
//! modelyard list [--stats]
//! modelyard remove <worker-id>
//! ```
//!
//! Configuration comes from the environment (`DOCKER_HOST_URL`,
//! `WORKER_IMAGE`, `WORKER_PORT_MIN`/`MAX`, `PROBE_BUDGET_SECS`, ...).

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use modelyard::{
    DockerRuntime, HttpHealthProbe, Orchestrator, OrchestratorConfig, WorkerConfig, WorkerPhase,
};

// =============================================================================
// CLI Parsing
// =============================================================================

#[derive(Debug)]
enum Command {
    Deploy {
        id: String,
        env: Vec<(String, String)>,
        prefix: Option<String>,
        image: Option<String>,
        wait: bool,
    },
    List {
        stats: bool,
    },
    Remove {
        id: String,
    },
    Version,
    Help,
}

fn parse_args() -> Result<Command, String> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        return Ok(Command::Help);
    }

    match args[1].as_str() {
        "deploy" => {
            if args.len() < 3 || args[2].starts_with('-') {
                return Err("deploy requires <worker-id>".to_string());
            }
            let id = args[2].clone();
            let mut env = Vec::new();
            let mut prefix = None;
            let mut image = None;
            let mut wait = false;
            let mut i = 3;
            while i < args.len() {
                match args[i].as_str() {
                    "--env" | "-e" => {
                        let Some(pair) = args.get(i + 1) else {
                            return Err("--env requires KEY=VALUE".to_string());
                        };
                        let Some((key, value)) = pair.split_once('=') else {
                            return Err(format!("invalid --env '{pair}', expected KEY=VALUE"));
                        };
                        env.push((key.to_string(), value.to_string()));
                        i += 2;
                    }
                    "--prefix" | "-p" => {
                        let Some(value) = args.get(i + 1) else {
                            return Err("--prefix requires a path".to_string());
                        };
                        prefix = Some(value.clone());
                        i += 2;
                    }
                    "--image" => {
                        let Some(value) = args.get(i + 1) else {
                            return Err("--image requires a reference".to_string());
                        };
                        image = Some(value.clone());
                        i += 2;
                    }
                    "--wait" | "-w" => {
                        wait = true;
                        i += 1;
                    }
                    other => return Err(format!("unknown deploy flag '{other}'")),
                }
            }
            Ok(Command::Deploy {
                id,
                env,
                prefix,
                image,
                wait,
            })
        }
        "list" => {
            let stats = args.iter().any(|a| a == "--stats");
            Ok(Command::List { stats })
        }
        "remove" => {
            if args.len() < 3 {
                return Err("remove requires <worker-id>".to_string());
            }
            Ok(Command::Remove {
                id: args[2].clone(),
            })
        }
        "version" | "--version" | "-V" => Ok(Command::Version),
        "help" | "--help" | "-h" => Ok(Command::Help),
        other => Err(format!("unknown command '{other}'")),
    }
}

fn print_help() {
    println!("modelyard - model worker container orchestrator");
    println!();
    println!("USAGE:");
    println!("  modelyard deploy <worker-id> [--env KEY=VALUE]... [--prefix /path] [--image ref] [--wait]");
    println!("  modelyard list [--stats]");
    println!("  modelyard remove <worker-id>");
    println!("  modelyard version");
}

// =============================================================================
// Commands
// =============================================================================

async fn run(command: Command) -> Result<(), String> {
    match command {
        Command::Version => {
            println!("modelyard {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Command::Help => {
            print_help();
            return Ok(());
        }
        _ => {}
    }

    let config = OrchestratorConfig::from_env().map_err(|e| e.to_string())?;
    let probe = Arc::new(HttpHealthProbe::new(&config).map_err(|e| e.to_string())?);
    let probe_dyn: Arc<dyn modelyard::HealthProbe> = probe.clone();
    let orchestrator = Arc::new(Orchestrator::new(
        config,
        Arc::new(DockerRuntime::new()),
        probe_dyn,
    ));

    match command {
        Command::Deploy {
            id,
            env,
            prefix,
            image,
            wait,
        } => {
            let mut worker = WorkerConfig::new(id);
            for (key, value) in env {
                worker = worker.with_env(key, value);
            }
            if let Some(prefix) = prefix {
                worker = worker.with_prefix(prefix);
            }
            worker.image = image;

            let summary = orchestrator.deploy(worker).await.map_err(|e| e.to_string())?;
            println!(
                "{} provisioning on port {} ({})",
                summary.id,
                summary.port,
                orchestrator.worker_url(&summary)
            );

            if wait {
                wait_until_settled(&orchestrator, &summary.id).await?;
            }
            Ok(())
        }
        Command::List { stats } => {
            // The registry lives in the deployment API's process; from
            // the CLI, running workers are discovered through their
            // engine labels instead.
            let workers = list_managed_containers().await?;
            if workers.is_empty() {
                println!("no running workers");
                return Ok(());
            }
            for (id, port, prefix) in workers {
                if stats {
                    let body = probe
                        .fetch_stats(port, &prefix)
                        .await
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "(not ready)".to_string());
                    println!("{id}\t{port}\t{prefix}\t{body}");
                } else {
                    println!("{id}\t{port}\t{prefix}");
                }
            }
            Ok(())
        }
        Command::Remove { id } => {
            // Worker containers are named by their worker id, so the id
            // doubles as the engine handle here.
            use modelyard::{ContainerHandle, ContainerRuntime};
            let runtime = DockerRuntime::new();
            match runtime.stop(&ContainerHandle::new(id.clone())).await {
                Ok(()) => {
                    println!("{id} removed");
                    Ok(())
                }
                Err(e) => Err(e.to_string()),
            }
        }
        Command::Version | Command::Help => unreachable!("handled above"),
    }
}

/// Lists running worker containers via their engine labels, as
/// `(worker id, host port, prefix)` tuples.
async fn list_managed_containers() -> Result<Vec<(String, u16, String)>, String> {
    use modelyard::runtimes::{MANAGED_LABEL, PORT_LABEL, PREFIX_LABEL};

    let output = tokio::process::Command::new("docker")
        .args([
            "ps",
            "--filter",
            &format!("label={MANAGED_LABEL}=true"),
            "--format",
            &format!("{{{{.Names}}}}\t{{{{.Label \"{PORT_LABEL}\"}}}}\t{{{{.Label \"{PREFIX_LABEL}\"}}}}"),
        ])
        .output()
        .await
        .map_err(|e| format!("failed to invoke docker: {e}"))?;

    if !output.status.success() {
        return Err(format!(
            "docker ps failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }

    let mut workers = Vec::new();
    for line in String::from_utf8_lossy(&output.stdout).lines() {
        let mut fields = line.split('\t');
        let (Some(id), Some(port), Some(prefix)) = (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        let Ok(port) = port.parse::<u16>() else {
            continue;
        };
        workers.push((id.to_string(), port, prefix.to_string()));
    }
    Ok(workers)
}

/// Polls the registry until the worker leaves `Provisioning`.
async fn wait_until_settled(orchestrator: &Arc<Orchestrator>, id: &str) -> Result<(), String> {
    loop {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let phase = orchestrator
            .snapshot()
            .await
            .into_iter()
            .find(|s| s.id == id)
            .map(|s| s.phase);
        match phase {
            Some(WorkerPhase::Provisioning) => {}
            Some(WorkerPhase::Ready) => {
                println!("{id} ready");
                return Ok(());
            }
            Some(phase) => return Err(format!("{id} ended up {phase}")),
            None => return Err(format!("{id} disappeared during provisioning")),
        }
    }
}

// =============================================================================
// Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let command = match parse_args() {
        Ok(command) => command,
        Err(e) => {
            eprintln!("error: {e}");
            print_help();
            return ExitCode::FAILURE;
        }
    };

    match run(command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
