//! Container runtime access.
//!
//! The control loop only ever needs three things from the runtime: a
//! snapshot of every container, the time a container last stopped, and a
//! way to restart it. [`ContainerRuntime`] captures exactly that so the
//! loop can run against the Docker daemon (through bollard) or against
//! an in-memory fake in tests.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::Docker;
use bollard::query_parameters::{
    InspectContainerOptions, InspectContainerOptionsBuilder, ListContainersOptions,
    ListContainersOptionsBuilder, RestartContainerOptions, RestartContainerOptionsBuilder,
};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Docker API error: {0}")]
    DockerApi(#[from] bollard::errors::Error),
    #[error("Container {0} reported no state")]
    MissingState(String),
}

/// What the runtime reported about one container in a list call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSnapshot {
    pub id: String,
    /// All names of the container joined by a space.
    pub name: String,
    /// Lifecycle state, e.g. `running`, `exited`, `dead`, `restarting`.
    pub state: String,
    /// Human readable status, e.g. `Up 5 minutes (unhealthy)`.
    pub status: String,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Every container known to the runtime, stopped ones included.
    async fn list(&self) -> Result<Vec<ContainerSnapshot>, RuntimeError>;

    /// The raw `FinishedAt` timestamp of the container, if reported.
    async fn finished_at(&self, id: &str) -> Result<Option<String>, RuntimeError>;

    async fn restart(&self, id: &str) -> Result<(), RuntimeError>;
}

pub struct DockerRuntime {
    docker: Docker,
    label_filters: Vec<String>,
}

impl DockerRuntime {
    /// Connect to the daemon using `DOCKER_HOST` or the platform default
    /// socket. Failing here is fatal for the process.
    pub fn connect(label_filters: Vec<String>) -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_defaults()?;
        Ok(Self {
            docker,
            label_filters,
        })
    }

    fn list_options(&self) -> ListContainersOptions {
        let mut filters: HashMap<String, Vec<String>> = HashMap::new();
        if !self.label_filters.is_empty() {
            filters.insert("label".to_string(), self.label_filters.clone());
        }
        ListContainersOptionsBuilder::new()
            .all(true)
            .filters(&filters)
            .build()
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list(&self) -> Result<Vec<ContainerSnapshot>, RuntimeError> {
        let containers = self
            .docker
            .list_containers(Some(self.list_options()))
            .await?;

        Ok(containers
            .into_iter()
            .map(|c| ContainerSnapshot {
                id: c.id.unwrap_or_default(),
                name: c.names.unwrap_or_default().join(" "),
                state: c.state.map(|s| s.to_string()).unwrap_or_default(),
                status: c.status.unwrap_or_default(),
            })
            .collect())
    }

    async fn finished_at(&self, id: &str) -> Result<Option<String>, RuntimeError> {
        let options: InspectContainerOptions = InspectContainerOptionsBuilder::new().build();
        let info = self.docker.inspect_container(id, Some(options)).await?;
        let state = info
            .state
            .ok_or_else(|| RuntimeError::MissingState(id.to_string()))?;
        Ok(state.finished_at)
    }

    async fn restart(&self, id: &str) -> Result<(), RuntimeError> {
        let options: RestartContainerOptions = RestartContainerOptionsBuilder::new().build();
        self.docker.restart_container(id, Some(options)).await?;
        Ok(())
    }
}
