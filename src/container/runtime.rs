use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use crate::errors::V2rError;

/// Everything needed to create one disposable container.
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub env: BTreeMap<String, String>,
    pub volumes: Vec<VolumeMount>,
    pub network_disabled: bool,
    pub privileged: bool,
}

impl ContainerSpec {
    /// Environment as `KEY=value` strings, in key order.
    pub fn env_list(&self) -> Vec<String> {
        self.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    pub host_path: PathBuf,
    pub container_path: String,
    #[serde(default)]
    pub read_only: bool,
}

impl VolumeMount {
    /// Docker bind syntax: `host:container:mode`.
    pub fn bind_spec(&self) -> String {
        format!(
            "{}:{}:{}",
            self.host_path.display(),
            self.container_path,
            if self.read_only { "ro" } else { "rw" }
        )
    }
}

/// Raw output of an exec call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

/// Operations the isolation layer needs from a container runtime.
///
/// Implementations must be safe to share between concurrent reproductions;
/// each reproduction works on its own container id.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Liveness check against the daemon.
    async fn ping(&self) -> Result<(), V2rError>;

    /// Create (but do not start) a container and return its id.
    /// Returns [`V2rError::ImageNotFound`] when the image is not present locally.
    async fn create(&self, spec: &ContainerSpec) -> Result<String, V2rError>;

    async fn pull_image(&self, image: &str) -> Result<(), V2rError>;

    async fn start(&self, id: &str) -> Result<(), V2rError>;

    /// Run `cmd` to completion. A non-zero exit code is a normal result.
    async fn exec(&self, id: &str, cmd: &[String], workdir: Option<&str>) -> Result<ExecOutput, V2rError>;

    /// Unpack a tar archive at `dest_dir` inside the container.
    async fn copy_in(&self, id: &str, dest_dir: &str, archive: Vec<u8>) -> Result<(), V2rError>;

    /// Fetch `path` from the container as a tar archive.
    async fn copy_out(&self, id: &str, path: &str) -> Result<Vec<u8>, V2rError>;

    async fn commit(&self, id: &str, repo: &str, tag: &str) -> Result<(), V2rError>;

    async fn stop(&self, id: &str, timeout_secs: i64) -> Result<(), V2rError>;

    async fn remove(&self, id: &str, force: bool) -> Result<(), V2rError>;

    /// Runtime name for logging
    fn runtime_name(&self) -> &str;
}
