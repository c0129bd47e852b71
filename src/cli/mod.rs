pub mod batch;
pub mod commands;
pub mod ping;
pub mod render;
pub mod reproduce;
pub mod score;

pub use commands::{Cli, Commands};

use std::path::Path;
use std::sync::Arc;

use crate::config::{load_config, V2rConfig};
use crate::container::{ContainerRuntime, DockerRuntime, ExecOutput, MemoryRuntime};
use crate::errors::V2rError;
use crate::utils::atomic_write;

pub(crate) async fn load(config: Option<&str>) -> Result<V2rConfig, V2rError> {
    load_config(config.map(Path::new)).await
}

/// Docker, or an in-memory runtime that accepts every command for dry runs.
pub(crate) fn build_runtime(dry_run: bool) -> Result<Arc<dyn ContainerRuntime>, V2rError> {
    if dry_run {
        let runtime = MemoryRuntime::new().with_exec_handler(|req| {
            let script = req.script();
            let stdout = if script.starts_with("find ") { String::new() } else { format!("[dry-run] {}\n", script) };
            ExecOutput { exit_code: 0, stdout, stderr: String::new() }
        });
        return Ok(Arc::new(runtime));
    }
    Ok(Arc::new(DockerRuntime::connect()?))
}

pub(crate) async fn write_json<T: serde::Serialize>(path: &str, value: &T) -> Result<(), V2rError> {
    let json = serde_json::to_vec_pretty(value)?;
    atomic_write(Path::new(path), &json).await
}
