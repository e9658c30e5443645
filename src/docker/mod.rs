//! Container runtime plumbing for the shadow database and one-shot helpers.
//!
//! Two usage patterns: a long-lived named Postgres container (the shadow),
//! and one-shot runs that exist only for their exit code and output (the
//! differ, the types generator).

use anyhow::{Result, anyhow};
use bollard::Docker;
use bollard::container::LogOutput;
use bollard::models::{ContainerCreateBody, ContainerStateStatusEnum};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, InspectContainerOptions, ListContainersOptions,
    LogsOptionsBuilder, RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::secret::{HostConfig, PortBinding};
use futures_util::StreamExt;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::constants::CLEANUP_TIMEOUT;

/// Result of a one-shot container run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

/// Options for the long-lived shadow container.
#[derive(Debug, Clone)]
pub struct PostgresContainer {
    pub name: String,
    pub image: String,
    pub host_port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

pub struct DockerManager {
    docker: Docker,
}

impl DockerManager {
    /// Connect to the Docker daemon, trying each socket candidate with a
    /// liveness ping before falling back to bollard's own detection.
    pub async fn new() -> Result<Self> {
        const MAX_RETRIES: u32 = 5;
        const RETRY_DELAY: Duration = Duration::from_millis(200);

        for attempt in 0..=MAX_RETRIES {
            match Self::try_connect().await {
                Ok(manager) => {
                    if attempt > 0 {
                        debug!("Connected to Docker after {} retries", attempt);
                    }
                    return Ok(manager);
                }
                Err(e) if attempt == MAX_RETRIES => {
                    return Err(anyhow!(
                        "Failed to connect to Docker after {} attempts: {}\n\
                         Make sure the Docker daemon is running (or set DOCKER_HOST).",
                        MAX_RETRIES + 1,
                        e
                    ));
                }
                Err(_) => sleep(RETRY_DELAY).await,
            }
        }
        unreachable!()
    }

    async fn try_connect() -> Result<Self> {
        for socket_path in Self::socket_candidates() {
            if let Some(socket_file) = socket_path.strip_prefix("unix://")
                && let Ok(docker) = Docker::connect_with_socket(
                    socket_file,
                    120,
                    bollard::API_DEFAULT_VERSION,
                )
                && docker.ping().await.is_ok()
            {
                return Ok(Self { docker });
            }
        }

        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| anyhow!("Failed to connect to Docker daemon: {}", e))?;
        docker
            .ping()
            .await
            .map_err(|e| anyhow!("Docker daemon not responding: {}", e))?;
        Ok(Self { docker })
    }

    /// Socket locations in priority order: `DOCKER_HOST`, then per-platform
    /// defaults (Docker Desktop, Colima, OrbStack on macOS), then the
    /// standard Linux socket.
    fn socket_candidates() -> Vec<String> {
        let mut candidates = Vec::new();

        if let Ok(docker_host) = std::env::var("DOCKER_HOST") {
            candidates.push(docker_host);
        }

        #[cfg(target_os = "macos")]
        if let Ok(home) = std::env::var("HOME") {
            candidates.push(format!("unix://{home}/.docker/run/docker.sock"));
            candidates.push(format!("unix://{home}/.colima/default/docker.sock"));
            candidates.push(format!("unix://{home}/.orbstack/run/docker.sock"));
        }

        candidates.push("unix:///var/run/docker.sock".to_string());
        candidates
    }

    /// Create and start a named Postgres container on a fixed host port.
    ///
    /// Any existing container holding the name is force-removed first:
    /// bearing the deterministic name means being owned by this process.
    pub async fn start_postgres(&self, spec: &PostgresContainer) -> Result<String> {
        self.remove_named(&spec.name).await?;
        self.ensure_image_available(&spec.image).await?;

        let env = vec![
            format!("POSTGRES_DB={}", spec.database),
            format!("POSTGRES_USER={}", spec.user),
            format!("POSTGRES_PASSWORD={}", spec.password),
        ];

        let mut port_bindings = HashMap::new();
        port_bindings.insert(
            "5432/tcp".to_string(),
            Some(vec![PortBinding {
                host_ip: Some("127.0.0.1".to_string()),
                host_port: Some(spec.host_port.to_string()),
            }]),
        );

        let body = ContainerCreateBody {
            image: Some(spec.image.clone()),
            env: Some(env),
            host_config: Some(HostConfig {
                port_bindings: Some(port_bindings),
                ..Default::default()
            }),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: Some(spec.name.clone()),
            ..Default::default()
        };

        let container = self
            .docker
            .create_container(Some(options), body)
            .await
            .map_err(|e| anyhow!("Failed to create container {}: {}", spec.name, e))?;

        if let Err(e) = self
            .docker
            .start_container(&container.id, None::<StartContainerOptions>)
            .await
        {
            let _ = self.remove_container(&container.id).await;
            return Err(anyhow!("Failed to start container {}: {}", spec.name, e));
        }

        register_container(container.id.clone());
        debug!("Started container {} ({})", spec.name, short_id(&container.id));
        Ok(container.id)
    }

    /// Whether the container exists and reports a running state.
    pub async fn is_running(&self, container_id: &str) -> bool {
        match self
            .docker
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
        {
            Ok(inspect) => matches!(
                inspect.state.and_then(|s| s.status),
                Some(ContainerStateStatusEnum::RUNNING)
            ),
            Err(_) => false,
        }
    }

    /// Wait until Postgres inside the container answers queries, or until
    /// the deadline. Fails fast when the container exits instead of burning
    /// the whole timeout.
    pub async fn wait_for_postgres(
        &self,
        container_id: &str,
        url: &str,
        timeout: Duration,
    ) -> Result<()> {
        const PROBE_DELAY: Duration = Duration::from_millis(500);
        let deadline = Instant::now() + timeout;
        let mut last_error = String::new();

        while Instant::now() < deadline {
            let inspect = self
                .docker
                .inspect_container(container_id, None::<InspectContainerOptions>)
                .await
                .map_err(|e| anyhow!("Failed to inspect container: {}", e))?;

            if let Some(state) = &inspect.state
                && matches!(
                    state.status,
                    Some(ContainerStateStatusEnum::EXITED) | Some(ContainerStateStatusEnum::DEAD)
                )
            {
                let logs = self.tail_logs(container_id).await;
                return Err(anyhow!(
                    "Database container exited with code {}.\n\nContainer logs (last 50 lines):\n{}",
                    state.exit_code.unwrap_or(-1),
                    logs
                ));
            }

            match probe(url).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    last_error = e.to_string();
                    debug!("Postgres not ready yet: {}", last_error);
                }
            }
            sleep(PROBE_DELAY).await;
        }

        let logs = self.tail_logs(container_id).await;
        Err(anyhow!(
            "Database did not become healthy within {:?}: {}\n\nContainer logs (last 50 lines):\n{}",
            timeout,
            last_error,
            logs
        ))
    }

    /// Run a container to completion and collect its exit code and output.
    /// Host networking so the process can reach databases on 127.0.0.1.
    pub async fn run_once(&self, image: &str, cmd: Vec<String>) -> Result<RunOutput> {
        self.ensure_image_available(image).await?;

        let body = ContainerCreateBody {
            image: Some(image.to_string()),
            cmd: Some(cmd),
            host_config: Some(HostConfig {
                network_mode: Some("host".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let container = self
            .docker
            .create_container(None::<CreateContainerOptions>, body)
            .await
            .map_err(|e| anyhow!("Failed to create {} container: {}", image, e))?;

        let result = self.run_to_completion(&container.id, image).await;
        let _ = self.remove_container(&container.id).await;
        result
    }

    async fn run_to_completion(&self, container_id: &str, image: &str) -> Result<RunOutput> {
        self.docker
            .start_container(container_id, None::<StartContainerOptions>)
            .await
            .map_err(|e| anyhow!("Failed to start {} container: {}", image, e))?;

        let mut wait_stream = self
            .docker
            .wait_container(container_id, None::<WaitContainerOptions>);

        let exit_code = match wait_stream.next().await {
            Some(Ok(response)) => response.status_code,
            // bollard surfaces non-zero exits as a typed error
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => code,
            Some(Err(e)) => return Err(anyhow!("Failed waiting for {} container: {}", image, e)),
            None => return Err(anyhow!("Wait stream ended early for {} container", image)),
        };

        let stdout = self.collect_logs(container_id, true, false).await;
        let stderr = self.collect_logs(container_id, false, true).await;

        Ok(RunOutput {
            exit_code,
            stdout,
            stderr,
        })
    }

    async fn collect_logs(&self, container_id: &str, stdout: bool, stderr: bool) -> String {
        let options = LogsOptionsBuilder::new().stdout(stdout).stderr(stderr).build();
        let results = self
            .docker
            .logs(container_id, Some(options))
            .collect::<Vec<Result<LogOutput, _>>>()
            .await;

        results
            .into_iter()
            .filter_map(|r| r.ok())
            .map(|output| output.to_string())
            .collect()
    }

    /// Last 50 log lines, for attaching to startup failures.
    async fn tail_logs(&self, container_id: &str) -> String {
        let options = LogsOptionsBuilder::new()
            .stdout(true)
            .stderr(true)
            .tail("50")
            .build();
        let log_stream = self.docker.logs(container_id, Some(options));

        match tokio::time::timeout(
            Duration::from_secs(3),
            log_stream.collect::<Vec<Result<LogOutput, _>>>(),
        )
        .await
        {
            Ok(results) => {
                let text: String = results
                    .into_iter()
                    .filter_map(|r| r.ok())
                    .map(|output| output.to_string())
                    .collect();
                if text.is_empty() {
                    "(no logs available)".to_string()
                } else {
                    text
                }
            }
            Err(_) => "(timed out fetching container logs)".to_string(),
        }
    }

    /// Force-remove every container holding a name. Missing is success.
    pub async fn remove_named(&self, name: &str) -> Result<()> {
        let options = ListContainersOptions {
            all: true,
            filters: Some({
                let mut filters = HashMap::new();
                filters.insert("name".to_string(), vec![name.to_string()]);
                filters
            }),
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| anyhow!("Failed to list containers: {}", e))?;

        for container in containers {
            if let Some(id) = container.id {
                self.remove_container(&id).await?;
            }
        }
        Ok(())
    }

    /// Force-remove by id; a 404 counts as removed.
    pub async fn remove_container(&self, container_id: &str) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };

        match self.docker.remove_container(container_id, Some(options)).await {
            Ok(()) => {}
            Err(e) => {
                let msg = e.to_string();
                if !msg.contains("404") && !msg.contains("No such container") {
                    return Err(anyhow!("Failed to remove container: {}", e));
                }
            }
        }
        unregister_container(container_id);
        Ok(())
    }

    /// Pull the image unless it is already present.
    async fn ensure_image_available(&self, image: &str) -> Result<()> {
        if self.docker.inspect_image(image).await.is_ok() {
            return Ok(());
        }
        debug!("Pulling image: {}", image);

        let options = CreateImageOptions {
            from_image: Some(image.to_string()),
            ..Default::default()
        };

        let mut pull_stream = self.docker.create_image(Some(options), None, None);
        while let Some(result) = pull_stream.next().await {
            result.map_err(|e| anyhow!("Failed to pull image {}: {}", image, e))?;
        }
        Ok(())
    }
}

async fn probe(url: &str) -> Result<()> {
    use sqlx::postgres::PgPoolOptions;

    // Short acquire timeout so the caller's loop re-inspects the container
    // between attempts.
    let pool = PgPoolOptions::new()
        .acquire_timeout(Duration::from_secs(5))
        .connect(url)
        .await?;
    sqlx::query("SELECT 1").fetch_one(&pool).await?;
    pool.close().await;
    Ok(())
}

fn short_id(id: &str) -> &str {
    &id[..id.len().min(12)]
}

/// Containers this process created and has not yet removed. The shutdown
/// path sweeps this even when the session errored out half-way.
static CONTAINER_REGISTRY: Lazy<Mutex<Vec<String>>> = Lazy::new(|| Mutex::new(Vec::new()));

pub fn register_container(container_id: String) {
    CONTAINER_REGISTRY.lock().unwrap().push(container_id);
}

pub fn unregister_container(container_id: &str) {
    CONTAINER_REGISTRY
        .lock()
        .unwrap()
        .retain(|id| id != container_id);
}

/// Remove every registered container, bounded by the detached cleanup
/// timeout so Ctrl-C always finishes.
pub async fn cleanup_all_containers() -> Result<()> {
    let container_ids: Vec<String> = {
        let mut registry = CONTAINER_REGISTRY.lock().unwrap();
        std::mem::take(&mut *registry)
    };

    if container_ids.is_empty() {
        return Ok(());
    }

    let sweep = async {
        match DockerManager::new().await {
            Ok(manager) => {
                for id in &container_ids {
                    if let Err(e) = manager.remove_container(id).await {
                        warn!("Failed to remove container {}: {}", short_id(id), e);
                    }
                }
            }
            Err(e) => warn!("Docker unavailable during cleanup: {}", e),
        }
    };

    if tokio::time::timeout(CLEANUP_TIMEOUT, sweep).await.is_err() {
        warn!("Container cleanup timed out after {:?}", CLEANUP_TIMEOUT);
    }
    Ok(())
}
