use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::models::HostConfig;
use crate::errors::V2rError;
use crate::utils::short_id;
use super::runtime::{ContainerRuntime, ContainerSpec, ExecOutput};
use tracing::{debug, info};

/// [`ContainerRuntime`] backed by the Docker Engine API.
///
/// A single client is shared by every reproduction; the daemon serializes
/// what it needs to, and each reproduction addresses its own container.
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect using `DOCKER_HOST` or the platform's default socket.
    pub fn connect() -> Result<Self, V2rError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| V2rError::RuntimeUnavailable(format!("Failed to connect to Docker: {}", e)))?;
        Ok(Self { docker })
    }

    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }

    pub fn docker(&self) -> &Docker {
        &self.docker
    }

    async fn ping_daemon(&self) -> Result<(), V2rError> {
        self.docker.ping().await
            .map_err(|e| V2rError::RuntimeUnavailable(format!("Docker daemon not reachable: {}", e)))?;
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, V2rError> {
        let host_config = HostConfig {
            binds: if spec.volumes.is_empty() {
                None
            } else {
                Some(spec.volumes.iter().map(|v| v.bind_spec()).collect())
            },
            privileged: Some(spec.privileged),
            network_mode: spec.network_disabled.then(|| "none".to_string()),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            env: Some(spec.env_list()),
            cmd: Some(vec!["sleep".to_string(), "infinity".to_string()]),
            tty: Some(true),
            open_stdin: Some(true),
            network_disabled: Some(spec.network_disabled),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.as_str(),
            platform: None,
        };

        match self.docker.create_container(Some(options), config).await {
            Ok(response) => {
                debug!(container = %spec.name, id = %short_id(&response.id), "Container created");
                Ok(response.id)
            }
            Err(BollardError::DockerResponseServerError { status_code: 404, .. }) => {
                Err(V2rError::ImageNotFound(spec.image.clone()))
            }
            Err(e) => Err(V2rError::Container(format!("Failed to create container: {}", e))),
        }
    }

    async fn start_container(&self, id: &str) -> Result<(), V2rError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| V2rError::Container(format!("Failed to start container: {}", e)))?;
        Ok(())
    }

    async fn stop_container(&self, id: &str, timeout_secs: i64) -> Result<(), V2rError> {
        match self.docker.stop_container(id, Some(StopContainerOptions { t: timeout_secs })).await {
            Ok(()) => {
                info!(container = %short_id(id), "Container stopped");
                Ok(())
            }
            // 304: already stopped
            Err(BollardError::DockerResponseServerError { status_code: 304, .. }) => Ok(()),
            Err(e) => Err(V2rError::Container(format!("Failed to stop container: {}", e))),
        }
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), V2rError> {
        match self.docker
            .remove_container(id, Some(RemoveContainerOptions { force, ..Default::default() }))
            .await
        {
            Ok(()) => {
                info!(container = %short_id(id), "Container removed");
                Ok(())
            }
            // 404: already gone
            Err(BollardError::DockerResponseServerError { status_code: 404, .. }) => Ok(()),
            Err(e) => Err(V2rError::Container(format!("Failed to remove container: {}", e))),
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> Result<(), V2rError> {
        self.ping_daemon().await
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<String, V2rError> {
        self.create_container(spec).await
    }

    async fn pull_image(&self, image: &str) -> Result<(), V2rError> {
        self.pull(image).await
    }

    async fn start(&self, id: &str) -> Result<(), V2rError> {
        self.start_container(id).await
    }

    async fn exec(&self, id: &str, cmd: &[String], workdir: Option<&str>) -> Result<ExecOutput, V2rError> {
        self.exec_command(id, cmd, workdir).await
    }

    async fn copy_in(&self, id: &str, dest_dir: &str, archive: Vec<u8>) -> Result<(), V2rError> {
        self.upload_archive(id, dest_dir, archive).await
    }

    async fn copy_out(&self, id: &str, path: &str) -> Result<Vec<u8>, V2rError> {
        self.download_archive(id, path).await
    }

    async fn commit(&self, id: &str, repo: &str, tag: &str) -> Result<(), V2rError> {
        self.commit_image(id, repo, tag).await
    }

    async fn stop(&self, id: &str, timeout_secs: i64) -> Result<(), V2rError> {
        self.stop_container(id, timeout_secs).await
    }

    async fn remove(&self, id: &str, force: bool) -> Result<(), V2rError> {
        self.remove_container(id, force).await
    }

    fn runtime_name(&self) -> &str {
        "docker"
    }
}
