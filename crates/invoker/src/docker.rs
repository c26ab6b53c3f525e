use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::models::{ContainerCreateResponse, HostConfig, RestartPolicy, RestartPolicyNameEnum};
use bollard::Docker;
use futures_util::StreamExt;
use skiff_models::{Recipe, SkiffError};
use tracing::{error, info, instrument};

#[derive(Clone, Debug)]
pub struct CreateSpec {
    pub image: String,
    pub name: String,
    pub env: Vec<(String, String)>,
    pub working_dir: Option<String>,
    pub exposed_ports: Vec<u16>,
    pub cmd: Vec<String>,
    pub labels: Vec<(String, String)>,
}

impl Default for CreateSpec {
    fn default() -> Self {
        Self {
            image: "test:latest".to_string(),
            name: "test-container".to_string(),
            env: vec![],
            working_dir: None,
            exposed_ports: vec![],
            cmd: vec![],
            labels: vec![],
        }
    }
}

/// Everything a recipe contributes to container creation: merged
/// environment (overrides win), working directory, declared ports as
/// metadata, and the startup command.
pub fn create_spec(
    recipe: &Recipe,
    image_ref: &str,
    overrides: &BTreeMap<String, String>,
) -> CreateSpec {
    CreateSpec {
        image: image_ref.to_string(),
        name: format!("skiff-{}-{}", recipe.name, uuid::Uuid::new_v4()),
        env: recipe.merged_env(overrides).into_iter().collect(),
        working_dir: Some(recipe.image.workdir.display().to_string()),
        exposed_ports: recipe.network.expose.clone(),
        cmd: recipe.process.command.clone(),
        labels: vec![("io.skiff.recipe".to_string(), recipe.name.clone())],
    }
}

#[async_trait]
pub trait ContainerHost: Send + Sync + 'static {
    async fn create(&self, spec: CreateSpec) -> anyhow::Result<String>; // returns container_id
    async fn start(&self, container_id: &str) -> anyhow::Result<()>;
    /// Blocks until the container exits; `Ok(None)` means the deadline
    /// passed with the container still running.
    async fn wait_exit(&self, container_id: &str, timeout_ms: u64) -> anyhow::Result<Option<i64>>;
    async fn logs(&self, container_id: &str) -> anyhow::Result<String>;
    async fn stop(&self, container_id: &str, timeout_secs: u64) -> anyhow::Result<()>;
    async fn remove(&self, container_id: &str, force: bool) -> anyhow::Result<()>;
}

#[derive(Clone, Debug)]
pub struct RunOptions {
    pub wait_timeout_ms: u64,
    pub stop_grace_secs: u64,
    pub remove_after_exit: bool,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub container_id: String,
    pub exit_code: i64,
    pub logs: String,
}

/// Create, start and await a single container. No retry and no restart:
/// when the process exits, the run is over and the exit code is reported
/// as-is. On a wait deadline the container is stopped (and removed when
/// configured) before the timeout surfaces.
pub async fn launch_and_wait<H: ContainerHost + ?Sized>(
    host: &H,
    spec: CreateSpec,
    opts: &RunOptions,
) -> Result<RunOutcome, SkiffError> {
    let container_id = host.create(spec).await.map_err(docker_err)?;
    host.start(&container_id).await.map_err(docker_err)?;

    let exit_code = match host
        .wait_exit(&container_id, opts.wait_timeout_ms)
        .await
        .map_err(docker_err)?
    {
        Some(code) => code,
        None => {
            let _ = host.stop(&container_id, opts.stop_grace_secs).await;
            if opts.remove_after_exit {
                let _ = host.remove(&container_id, true).await;
            }
            return Err(SkiffError::ContainerTimeout {
                timeout_ms: opts.wait_timeout_ms,
            });
        }
    };

    let logs = host.logs(&container_id).await.unwrap_or_else(|e| {
        error!("Failed to collect container logs: {}", e);
        String::new()
    });

    if opts.remove_after_exit {
        host.remove(&container_id, true).await.map_err(docker_err)?;
    }

    Ok(RunOutcome {
        container_id,
        exit_code,
        logs,
    })
}

fn docker_err(e: anyhow::Error) -> SkiffError {
    SkiffError::DockerError {
        message: e.to_string(),
    }
}

pub struct Launcher {
    docker: Docker,
}

impl Launcher {
    pub async fn new() -> Result<Self, SkiffError> {
        let docker =
            Docker::connect_with_socket_defaults().map_err(|e| SkiffError::DockerError {
                message: e.to_string(),
            })?;

        Ok(Self { docker })
    }

    #[instrument(skip(self, spec), fields(image = %spec.image, name = %spec.name))]
    pub async fn create_container(&self, spec: &CreateSpec) -> Result<String, SkiffError> {
        let env: Vec<String> = spec
            .env
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();

        let mut exposed_ports = HashMap::new();
        for port in &spec.exposed_ports {
            exposed_ports.insert(format!("{port}/tcp"), HashMap::new());
        }

        let labels: HashMap<String, String> = spec.labels.iter().cloned().collect();

        // The startup command is the only process; when it exits the
        // container is done. No supervision, no restart.
        let host_config = HostConfig {
            restart_policy: Some(RestartPolicy {
                name: Some(RestartPolicyNameEnum::NO),
                maximum_retry_count: None,
            }),
            ..Default::default()
        };

        let container_config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.cmd.clone()),
            env: Some(env),
            working_dir: spec.working_dir.clone(),
            exposed_ports: if exposed_ports.is_empty() {
                None
            } else {
                Some(exposed_ports)
            },
            labels: Some(labels),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            ..Default::default()
        };

        let response: ContainerCreateResponse = self
            .docker
            .create_container(Some(options), container_config)
            .await
            .map_err(|e| SkiffError::DockerError {
                message: e.to_string(),
            })?;

        info!("Created container: {} with ID: {}", spec.name, response.id);
        Ok(response.id)
    }

    #[instrument(skip(self))]
    pub async fn start_container(&self, container_id: &str) -> Result<(), SkiffError> {
        let options = StartContainerOptions::<String> {
            ..Default::default()
        };

        self.docker
            .start_container(container_id, Some(options))
            .await
            .map_err(|e| SkiffError::DockerError {
                message: e.to_string(),
            })?;

        info!("Started container: {}", container_id);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn stop_container(
        &self,
        container_id: &str,
        grace_secs: u64,
    ) -> Result<(), SkiffError> {
        let options = StopContainerOptions {
            t: grace_secs as i64,
        };

        self.docker
            .stop_container(container_id, Some(options))
            .await
            .map_err(|e| SkiffError::DockerError {
                message: e.to_string(),
            })?;

        info!("Stopped container: {}", container_id);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn remove_container(&self, container_id: &str, force: bool) -> Result<(), SkiffError> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };

        self.docker
            .remove_container(container_id, Some(options))
            .await
            .map_err(|e| SkiffError::DockerError {
                message: e.to_string(),
            })?;

        info!("Removed container: {}", container_id);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_container_logs(&self, container_id: &str) -> Result<String, SkiffError> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            ..Default::default()
        };

        let mut stream = self.docker.logs(container_id, Some(options));

        let mut logs = String::new();
        while let Some(log) = stream.next().await {
            match log {
                Ok(LogOutput::StdOut { message }) => {
                    logs.push_str(&String::from_utf8_lossy(&message));
                }
                Ok(LogOutput::StdErr { message }) => {
                    logs.push_str(&String::from_utf8_lossy(&message));
                }
                Ok(LogOutput::StdIn { message }) => {
                    logs.push_str(&String::from_utf8_lossy(&message));
                }
                Ok(LogOutput::Console { message }) => {
                    logs.push_str(&String::from_utf8_lossy(&message));
                }
                Err(e) => {
                    error!("Error reading container logs: {}", e);
                    break;
                }
            }
        }

        Ok(logs)
    }

    /// Poll until the container reports `exited`, returning its exit code,
    /// or `None` once the deadline passes.
    #[instrument(skip(self))]
    pub async fn wait_for_container(
        &self,
        container_id: &str,
        timeout_ms: u64,
    ) -> Result<Option<i64>, SkiffError> {
        let timeout = std::time::Duration::from_millis(timeout_ms);
        let start = std::time::Instant::now();

        loop {
            if start.elapsed() >= timeout {
                return Ok(None);
            }

            match self.docker.inspect_container(container_id, None).await {
                Ok(container) => {
                    if let Some(state) = container.state {
                        if let Some(status) = state.status {
                            if status.to_string() == "exited" {
                                if let Some(exit_code) = state.exit_code {
                                    return Ok(Some(exit_code));
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    error!("Error inspecting container {}: {}", container_id, e);
                    return Err(SkiffError::DockerError {
                        message: e.to_string(),
                    });
                }
            }

            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    }
}

#[async_trait]
impl ContainerHost for Launcher {
    async fn create(&self, spec: CreateSpec) -> anyhow::Result<String> {
        Ok(self.create_container(&spec).await?)
    }

    async fn start(&self, container_id: &str) -> anyhow::Result<()> {
        Ok(self.start_container(container_id).await?)
    }

    async fn wait_exit(&self, container_id: &str, timeout_ms: u64) -> anyhow::Result<Option<i64>> {
        Ok(self.wait_for_container(container_id, timeout_ms).await?)
    }

    async fn logs(&self, container_id: &str) -> anyhow::Result<String> {
        Ok(self.get_container_logs(container_id).await?)
    }

    async fn stop(&self, container_id: &str, timeout_secs: u64) -> anyhow::Result<()> {
        Ok(self.stop_container(container_id, timeout_secs).await?)
    }

    async fn remove(&self, container_id: &str, force: bool) -> anyhow::Result<()> {
        Ok(self.remove_container(container_id, force).await?)
    }
}
