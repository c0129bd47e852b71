use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{V2rConfig, DEFAULT_IMAGE, DEFAULT_NAME_PREFIX, DEFAULT_STOP_TIMEOUT_SECS};
use crate::errors::V2rError;
use crate::models::{ContainerInfo, ExecutionResult};
use crate::utils::{container_name, preview_command, short_id};
use super::archive;
use super::runtime::{ContainerRuntime, ContainerSpec, VolumeMount};
use tracing::{debug, error, info, warn};

/// Grace period used when stopping a running container right before removal.
const PRE_REMOVE_STOP_SECS: i64 = 5;

/// Lifecycle of an isolation handle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStatus {
    Created,
    Running,
    Stopped,
    Removed,
}

impl LifecycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Removed => "removed",
        }
    }

    pub fn can_advance_to(&self, next: LifecycleStatus) -> bool {
        next > *self
    }
}

impl std::fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationHandle {
    pub environment_id: String,
    pub name: String,
    pub status: LifecycleStatus,
    pub image: String,
    pub created_at: DateTime<Utc>,
}

/// What to do when the container runtime is unreachable at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuntimeMode {
    /// Fail construction.
    Strict,
    /// Construct a permanently disabled environment whose operations all
    /// return their failure sentinel.
    #[default]
    Degraded,
}

impl RuntimeMode {
    pub fn from_strict(strict: bool) -> Self {
        if strict { Self::Strict } else { Self::Degraded }
    }
}

#[derive(Debug, Clone)]
pub struct IsolationSettings {
    pub image: String,
    pub name_prefix: String,
    pub stop_timeout_secs: u64,
}

impl IsolationSettings {
    pub fn from_config(config: &V2rConfig) -> Self {
        let isolation = config.isolation();
        Self {
            image: isolation.image.unwrap_or_else(|| DEFAULT_IMAGE.to_string()),
            name_prefix: isolation.name_prefix.unwrap_or_else(|| DEFAULT_NAME_PREFIX.to_string()),
            stop_timeout_secs: isolation.stop_timeout_secs.unwrap_or(DEFAULT_STOP_TIMEOUT_SECS),
        }
    }
}

impl Default for IsolationSettings {
    fn default() -> Self {
        Self::from_config(&V2rConfig::default())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Must be unique among live containers; defaults to a timestamped name.
    pub name: Option<String>,
    pub env: BTreeMap<String, String>,
    pub volumes: Vec<VolumeMount>,
    pub network_disabled: bool,
    pub privileged: bool,
}

/// One disposable container and the command/file protocol against it.
///
/// The environment owns at most one container over its whole life:
/// created → running → stopped → removed, never reused. Dropping an
/// environment whose container was not removed schedules a forced removal
/// on the current tokio runtime.
pub struct IsolationEnvironment {
    runtime: Arc<dyn ContainerRuntime>,
    settings: IsolationSettings,
    /// Set when the runtime was unreachable in degraded mode.
    disabled: Option<String>,
    handle: Option<IsolationHandle>,
    snapshot_tag: Option<String>,
}

impl IsolationEnvironment {
    pub async fn connect(
        runtime: Arc<dyn ContainerRuntime>,
        settings: IsolationSettings,
        mode: RuntimeMode,
    ) -> Result<Self, V2rError> {
        let disabled = match runtime.ping().await {
            Ok(()) => {
                debug!(runtime = runtime.runtime_name(), "Container runtime reachable");
                None
            }
            Err(e) => match mode {
                RuntimeMode::Strict => {
                    error!(runtime = runtime.runtime_name(), error = %e, "Container runtime unavailable");
                    return Err(V2rError::RuntimeUnavailable(e.to_string()));
                }
                RuntimeMode::Degraded => {
                    warn!(
                        runtime = runtime.runtime_name(),
                        error = %e,
                        "Container runtime unavailable, isolation disabled"
                    );
                    Some(e.to_string())
                }
            },
        };

        Ok(Self { runtime, settings, disabled, handle: None, snapshot_tag: None })
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.is_some()
    }

    pub fn handle(&self) -> Option<&IsolationHandle> {
        self.handle.as_ref()
    }

    pub fn status(&self) -> Option<LifecycleStatus> {
        self.handle.as_ref().map(|h| h.status)
    }

    /// Allocate the container without starting it. A missing base image is
    /// pulled once and creation retried once.
    pub async fn create(&mut self, options: CreateOptions) -> Result<String, V2rError> {
        if let Some(reason) = &self.disabled {
            return Err(V2rError::RuntimeUnavailable(format!("isolation disabled: {}", reason)));
        }
        if let Some(handle) = &self.handle {
            return Err(V2rError::Container(format!(
                "Environment already allocated: {} ({})",
                handle.name, handle.status
            )));
        }

        let name = options.name.unwrap_or_else(|| {
            container_name(&self.settings.name_prefix, &Utc::now().format("%Y%m%d_%H%M%S_%6f").to_string())
        });

        let spec = ContainerSpec {
            name: name.clone(),
            image: self.settings.image.clone(),
            env: options.env,
            volumes: options.volumes,
            network_disabled: options.network_disabled,
            privileged: options.privileged,
        };

        let environment_id = match self.runtime.create(&spec).await {
            Ok(id) => id,
            Err(V2rError::ImageNotFound(image)) => {
                info!(image = %image, "Base image not found, pulling");
                self.runtime.pull_image(&image).await?;
                self.runtime.create(&spec).await?
            }
            Err(e) => {
                error!(container = %name, error = %e, "Failed to create container");
                return Err(e);
            }
        };

        info!(container = %name, id = %short_id(&environment_id), "Container created");
        self.handle = Some(IsolationHandle {
            environment_id: environment_id.clone(),
            name,
            status: LifecycleStatus::Created,
            image: spec.image,
            created_at: Utc::now(),
        });
        Ok(environment_id)
    }

    pub async fn start(&mut self) -> bool {
        if self.is_disabled() {
            return false;
        }
        let Some(handle) = self.handle.as_ref() else {
            error!("Container not created");
            return false;
        };
        match handle.status {
            LifecycleStatus::Running => return true,
            LifecycleStatus::Created => {}
            other => {
                error!(container = %handle.name, status = %other, "Container cannot be restarted");
                return false;
            }
        }

        let id = handle.environment_id.clone();
        match self.runtime.start(&id).await {
            Ok(()) => {
                info!(id = %short_id(&id), "Container started");
                self.advance(LifecycleStatus::Running);
                true
            }
            Err(e) => {
                error!(id = %short_id(&id), error = %e, "Failed to start container");
                false
            }
        }
    }

    /// Run `command` through `sh -c`. Never fails: a non-zero exit code is a
    /// normal result, and infrastructure errors come back as exit code -1
    /// with the error message in stderr.
    ///
    /// With a timeout, the environment is force-stopped once the deadline
    /// passes and the result is marked `timed_out`. Later commands against
    /// the stopped environment report infrastructure failures.
    pub async fn execute(
        &mut self,
        command: &str,
        timeout: Option<Duration>,
        workdir: Option<&str>,
    ) -> ExecutionResult {
        if let Some(reason) = &self.disabled {
            return ExecutionResult::infrastructure_failure(format!("isolation disabled: {}", reason));
        }
        let id = match &self.handle {
            Some(h) if h.status == LifecycleStatus::Running => h.environment_id.clone(),
            _ => return ExecutionResult::infrastructure_failure("Container not created or started"),
        };

        let cmd = vec!["sh".to_string(), "-c".to_string(), command.to_string()];
        let runtime = Arc::clone(&self.runtime);
        let outcome = match timeout {
            Some(limit) => {
                let bounded = tokio::time::timeout(limit, runtime.exec(&id, &cmd, workdir)).await;
                match bounded {
                    Ok(result) => result,
                    Err(_) => {
                        self.kill_after_deadline(&id, limit, command).await;
                        return ExecutionResult::deadline_exceeded(limit);
                    }
                }
            }
            None => runtime.exec(&id, &cmd, workdir).await,
        };

        match outcome {
            Ok(output) => {
                info!(
                    command = %preview_command(command),
                    exit_code = output.exit_code,
                    "Command executed"
                );
                ExecutionResult::new(output.exit_code, output.stdout, output.stderr)
            }
            Err(e) => {
                error!(command = %preview_command(command), error = %e, "Failed to execute command");
                ExecutionResult::infrastructure_failure(e.to_string())
            }
        }
    }

    async fn kill_after_deadline(&mut self, id: &str, limit: Duration, command: &str) {
        warn!(
            id = %short_id(id),
            command = %preview_command(command),
            timeout_secs = limit.as_secs_f64(),
            "Command exceeded deadline, force-stopping environment"
        );
        match self.runtime.stop(id, 0).await {
            Ok(()) => self.advance(LifecycleStatus::Stopped),
            Err(e) => error!(id = %short_id(id), error = %e, "Watchdog failed to stop container"),
        }
    }

    /// Copy a local file to `remote_path` inside the environment.
    pub async fn copy_to(&self, local_path: &Path, remote_path: &str) -> bool {
        let Some(id) = self.live_id() else {
            error!("Container not created");
            return false;
        };
        if !local_path.is_file() {
            error!(path = %local_path.display(), "Source file not found");
            return false;
        }

        let entry_name = remote_path.trim_start_matches('/');
        let result = match archive::pack_file(local_path, entry_name) {
            Ok(data) => self.runtime.copy_in(id, "/", data).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                info!(src = %local_path.display(), dst = %remote_path, "File copied to container");
                true
            }
            Err(e) => {
                error!(src = %local_path.display(), dst = %remote_path, error = %e, "Failed to copy file to container");
                false
            }
        }
    }

    /// Copy `remote_path` out of the environment into `local_path`,
    /// creating parent directories as needed.
    pub async fn copy_from(&self, remote_path: &str, local_path: &Path) -> bool {
        let Some(id) = self.live_id() else {
            error!("Container not created");
            return false;
        };

        let result = async {
            let data = self.runtime.copy_out(id, remote_path).await?;
            let contents = archive::unpack_first_file(&data)?;
            if let Some(parent) = local_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(local_path, contents).await?;
            Ok::<(), V2rError>(())
        }
        .await;

        match result {
            Ok(()) => {
                info!(src = %remote_path, dst = %local_path.display(), "File copied from container");
                true
            }
            Err(e) => {
                warn!(src = %remote_path, error = %e, "Failed to copy file from container");
                false
            }
        }
    }

    /// Commit the current state to an image tag (`repo:tag`). Forensic use only.
    pub async fn snapshot(&mut self, tag: Option<&str>) -> Option<String> {
        let Some(id) = self.live_id().map(str::to_string) else {
            error!("Container not created");
            return None;
        };

        let tag = tag.map(str::to_string).unwrap_or_else(|| {
            format!("{}-snapshot:{}", self.settings.name_prefix, Utc::now().format("%Y%m%d_%H%M%S"))
        });
        let (repo, version) = match tag.rsplit_once(':') {
            Some((repo, version)) if !version.contains('/') => (repo, version),
            _ => (tag.as_str(), "latest"),
        };

        match self.runtime.commit(&id, repo, version).await {
            Ok(()) => {
                info!(tag = %tag, "Snapshot created");
                self.snapshot_tag = Some(tag.clone());
                Some(tag)
            }
            Err(e) => {
                error!(tag = %tag, error = %e, "Failed to create snapshot");
                None
            }
        }
    }

    /// Stop the container. Stopping an absent or already stopped container
    /// succeeds.
    pub async fn stop(&mut self, timeout_secs: u64) -> bool {
        if self.is_disabled() {
            return false;
        }
        let id = match &self.handle {
            None => return true,
            Some(h) if h.status >= LifecycleStatus::Stopped => return true,
            Some(h) => h.environment_id.clone(),
        };

        match self.runtime.stop(&id, timeout_secs as i64).await {
            Ok(()) => {
                info!(id = %short_id(&id), "Container stopped");
                self.advance(LifecycleStatus::Stopped);
                true
            }
            Err(e) => {
                error!(id = %short_id(&id), error = %e, "Failed to stop container");
                false
            }
        }
    }

    /// Remove the container. Removing an absent or already removed container
    /// succeeds.
    pub async fn remove(&mut self, force: bool) -> bool {
        if self.is_disabled() {
            return false;
        }
        let (id, status) = match &self.handle {
            None => return true,
            Some(h) if h.status == LifecycleStatus::Removed => return true,
            Some(h) => (h.environment_id.clone(), h.status),
        };

        if status == LifecycleStatus::Running {
            match self.runtime.stop(&id, PRE_REMOVE_STOP_SECS).await {
                Ok(()) => self.advance(LifecycleStatus::Stopped),
                Err(e) => debug!(id = %short_id(&id), error = %e, "Stop before removal failed"),
            }
        }

        match self.runtime.remove(&id, force).await {
            Ok(()) => {
                info!(id = %short_id(&id), "Container removed");
                self.advance(LifecycleStatus::Removed);
                true
            }
            Err(e) => {
                error!(id = %short_id(&id), error = %e, "Failed to remove container");
                false
            }
        }
    }

    /// Unconditional teardown. Succeeds trivially when nothing was allocated.
    pub async fn cleanup(&mut self) -> bool {
        if self.handle.is_none() {
            return true;
        }
        self.remove(true).await
    }

    pub fn info(&self) -> Option<ContainerInfo> {
        self.handle.as_ref().map(|h| ContainerInfo {
            id: h.environment_id.clone(),
            name: h.name.clone(),
            status: h.status.to_string(),
            image: h.image.clone(),
            created: h.created_at,
            snapshot_tag: self.snapshot_tag.clone(),
        })
    }

    pub fn stop_timeout_secs(&self) -> u64 {
        self.settings.stop_timeout_secs
    }

    /// Id of a container that still exists.
    fn live_id(&self) -> Option<&str> {
        if self.is_disabled() {
            return None;
        }
        self.handle.as_ref()
            .filter(|h| h.status != LifecycleStatus::Removed)
            .map(|h| h.environment_id.as_str())
    }

    fn advance(&mut self, next: LifecycleStatus) {
        if let Some(handle) = self.handle.as_mut() {
            if handle.status.can_advance_to(next) {
                debug!(container = %handle.name, from = %handle.status, to = %next, "Lifecycle transition");
                handle.status = next;
            }
        }
    }
}

impl Drop for IsolationEnvironment {
    fn drop(&mut self) {
        let Some(handle) = &self.handle else { return };
        if handle.status == LifecycleStatus::Removed {
            return;
        }

        warn!(container = %handle.name, status = %handle.status, "Environment dropped without cleanup");
        let Ok(rt) = tokio::runtime::Handle::try_current() else {
            error!(container = %handle.name, "No async runtime available, container may be orphaned");
            return;
        };

        let runtime = Arc::clone(&self.runtime);
        let id = handle.environment_id.clone();
        let name = handle.name.clone();
        rt.spawn(async move {
            if let Err(e) = runtime.remove(&id, true).await {
                error!(container = %name, error = %e, "Forced removal failed, container may be orphaned");
            }
        });
    }
}
