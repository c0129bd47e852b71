//! In-memory [`ContainerRuntime`].
//!
//! Containers are plain records with a simulated file tree. Exec calls are
//! answered by a caller-supplied handler that can read and write that tree,
//! so whole reproductions run without a daemon. Every call is recorded for
//! assertions, and individual operations can be made to fail.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use crate::errors::V2rError;
use super::archive;
use super::runtime::{ContainerRuntime, ContainerSpec, ExecOutput};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeOp {
    Ping,
    Create,
    PullImage,
    Start,
    Exec,
    CopyIn,
    CopyOut,
    Commit,
    Stop,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeCall {
    pub op: RuntimeOp,
    /// Container id, image, or command line depending on the op.
    pub target: String,
}

/// What an exec handler sees: the command plus the container's state.
pub struct ExecRequest<'a> {
    pub cmd: &'a [String],
    pub workdir: Option<&'a str>,
    pub env: &'a BTreeMap<String, String>,
    pub files: &'a mut BTreeMap<String, Vec<u8>>,
}

impl ExecRequest<'_> {
    /// The shell script for `sh -c <script>` commands, else the joined argv.
    pub fn script(&self) -> String {
        match self.cmd {
            [shell, flag, script] if shell == "sh" && flag == "-c" => script.clone(),
            _ => self.cmd.join(" "),
        }
    }

    pub fn file_text(&self, path: &str) -> Option<String> {
        self.files.get(path).map(|b| String::from_utf8_lossy(b).into_owned())
    }
}

type ExecHandler = dyn Fn(&mut ExecRequest<'_>) -> ExecOutput + Send + Sync;

#[derive(Debug, Clone)]
struct MemoryContainer {
    name: String,
    image: String,
    env: BTreeMap<String, String>,
    running: bool,
    files: BTreeMap<String, Vec<u8>>,
}

#[derive(Default)]
struct MemoryState {
    containers: HashMap<String, MemoryContainer>,
    images: HashSet<String>,
    committed: Vec<String>,
    calls: Vec<RuntimeCall>,
    failures: HashMap<RuntimeOp, String>,
    unreachable: bool,
    next_id: u64,
}

pub struct MemoryRuntime {
    state: Mutex<MemoryState>,
    handler: Box<ExecHandler>,
    slow_commands: Vec<(String, Duration)>,
}

impl MemoryRuntime {
    /// Runtime with `python:3.11-slim` available and a handler that answers
    /// every command with exit code 0 and no output.
    pub fn new() -> Self {
        let mut state = MemoryState::default();
        state.images.insert(crate::config::DEFAULT_IMAGE.to_string());
        Self {
            state: Mutex::new(state),
            handler: Box::new(|_| ExecOutput::default()),
            slow_commands: Vec::new(),
        }
    }

    pub fn with_exec_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut ExecRequest<'_>) -> ExecOutput + Send + Sync + 'static,
    {
        self.handler = Box::new(handler);
        self
    }

    /// Remove `image` so the next create reports it missing.
    pub fn without_image(self, image: &str) -> Self {
        self.lock().images.remove(image);
        self
    }

    /// Make every call to `op` fail with `message`.
    pub fn failing(self, op: RuntimeOp, message: &str) -> Self {
        self.lock().failures.insert(op, message.to_string());
        self
    }

    /// Make the daemon unreachable: ping fails.
    pub fn unreachable(self) -> Self {
        self.lock().unreachable = true;
        self
    }

    /// Delay exec calls whose command contains `pattern`.
    pub fn with_slow_command(mut self, pattern: &str, delay: Duration) -> Self {
        self.slow_commands.push((pattern.to_string(), delay));
        self
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.lock().calls.clone()
    }

    pub fn count(&self, op: RuntimeOp) -> usize {
        self.lock().calls.iter().filter(|c| c.op == op).count()
    }

    /// Exec command lines in call order.
    pub fn exec_commands(&self) -> Vec<String> {
        self.lock().calls.iter()
            .filter(|c| c.op == RuntimeOp::Exec)
            .map(|c| c.target.clone())
            .collect()
    }

    /// Names of containers that were created and not yet removed.
    pub fn live_containers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().containers.values().map(|c| c.name.clone()).collect();
        names.sort();
        names
    }

    pub fn committed_images(&self) -> Vec<String> {
        self.lock().committed.clone()
    }

    pub fn has_image(&self, image: &str) -> bool {
        self.lock().images.contains(image)
    }

    /// Contents of `path` in the container with the given name.
    pub fn file(&self, container_name: &str, path: &str) -> Option<Vec<u8>> {
        self.lock().containers.values()
            .find(|c| c.name == container_name)
            .and_then(|c| c.files.get(path).cloned())
    }

    pub fn env_of(&self, container_name: &str) -> Option<BTreeMap<String, String>> {
        self.lock().containers.values()
            .find(|c| c.name == container_name)
            .map(|c| c.env.clone())
    }

    /// Image the named container was created from.
    pub fn image_of(&self, container_name: &str) -> Option<String> {
        self.lock().containers.values()
            .find(|c| c.name == container_name)
            .map(|c| c.image.clone())
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A panicking test handler must not wedge the remaining assertions.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record the call and apply any injected failure.
    fn record(&self, op: RuntimeOp, target: &str) -> Result<MutexGuard<'_, MemoryState>, V2rError> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall { op, target: target.to_string() });
        if state.unreachable {
            return Err(V2rError::RuntimeUnavailable("memory runtime unreachable".into()));
        }
        if let Some(message) = state.failures.get(&op) {
            return Err(V2rError::Container(message.clone()));
        }
        Ok(state)
    }
}

impl Default for MemoryRuntime {
    fn default() -> Self {
        Self::new()
    }
}

fn no_such_container(id: &str) -> V2rError {
    V2rError::Container(format!("No such container: {}", id))
}

/// Join an archive entry onto the extraction directory.
fn join_remote(dest_dir: &str, entry: &str) -> String {
    let dir = dest_dir.trim_end_matches('/');
    format!("{}/{}", dir, entry.trim_start_matches('/'))
}

#[async_trait]
impl ContainerRuntime for MemoryRuntime {
    async fn ping(&self) -> Result<(), V2rError> {
        self.record(RuntimeOp::Ping, "").map(|_| ())
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<String, V2rError> {
        let mut state = self.record(RuntimeOp::Create, &spec.name)?;
        if !state.images.contains(&spec.image) {
            return Err(V2rError::ImageNotFound(spec.image.clone()));
        }
        if state.containers.values().any(|c| c.name == spec.name) {
            return Err(V2rError::Container(format!("Conflict: container name {} already in use", spec.name)));
        }
        state.next_id += 1;
        let id = format!("{:064x}", state.next_id);
        state.containers.insert(id.clone(), MemoryContainer {
            name: spec.name.clone(),
            image: spec.image.clone(),
            env: spec.env.clone(),
            running: false,
            files: BTreeMap::new(),
        });
        Ok(id)
    }

    async fn pull_image(&self, image: &str) -> Result<(), V2rError> {
        let mut state = self.record(RuntimeOp::PullImage, image)?;
        state.images.insert(image.to_string());
        Ok(())
    }

    async fn start(&self, id: &str) -> Result<(), V2rError> {
        let mut state = self.record(RuntimeOp::Start, id)?;
        let container = state.containers.get_mut(id).ok_or_else(|| no_such_container(id))?;
        container.running = true;
        Ok(())
    }

    async fn exec(&self, id: &str, cmd: &[String], workdir: Option<&str>) -> Result<ExecOutput, V2rError> {
        let line = cmd.join(" ");
        if let Some((_, delay)) = self.slow_commands.iter().find(|(p, _)| line.contains(p.as_str())) {
            tokio::time::sleep(*delay).await;
        }

        let mut state = self.record(RuntimeOp::Exec, &line)?;
        let container = state.containers.get_mut(id).ok_or_else(|| no_such_container(id))?;
        if !container.running {
            return Err(V2rError::Container(format!("Container {} is not running", id)));
        }

        let MemoryContainer { env, files, .. } = container;
        let mut request = ExecRequest { cmd, workdir, env, files };
        Ok((self.handler)(&mut request))
    }

    async fn copy_in(&self, id: &str, dest_dir: &str, archive: Vec<u8>) -> Result<(), V2rError> {
        let mut state = self.record(RuntimeOp::CopyIn, id)?;
        let container = state.containers.get_mut(id).ok_or_else(|| no_such_container(id))?;
        for (entry, contents) in archive::unpack_files(&archive)? {
            container.files.insert(join_remote(dest_dir, &entry), contents);
        }
        Ok(())
    }

    async fn copy_out(&self, id: &str, path: &str) -> Result<Vec<u8>, V2rError> {
        let state = self.record(RuntimeOp::CopyOut, id)?;
        let container = state.containers.get(id).ok_or_else(|| no_such_container(id))?;
        let contents = container.files.get(path)
            .ok_or_else(|| V2rError::Container(format!("Could not find the file {} in container", path)))?;
        let name = path.rsplit('/').next().unwrap_or(path);
        archive::pack_bytes(name, contents)
    }

    async fn commit(&self, id: &str, repo: &str, tag: &str) -> Result<(), V2rError> {
        let mut state = self.record(RuntimeOp::Commit, id)?;
        if !state.containers.contains_key(id) {
            return Err(no_such_container(id));
        }
        let image = format!("{}:{}", repo, tag);
        state.images.insert(image.clone());
        state.committed.push(image);
        Ok(())
    }

    async fn stop(&self, id: &str, _timeout_secs: i64) -> Result<(), V2rError> {
        let mut state = self.record(RuntimeOp::Stop, id)?;
        let container = state.containers.get_mut(id).ok_or_else(|| no_such_container(id))?;
        container.running = false;
        Ok(())
    }

    async fn remove(&self, id: &str, _force: bool) -> Result<(), V2rError> {
        let mut state = self.record(RuntimeOp::Remove, id)?;
        state.containers.remove(id).ok_or_else(|| no_such_container(id))?;
        Ok(())
    }

    fn runtime_name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str) -> ContainerSpec {
        ContainerSpec {
            name: name.to_string(),
            image: crate::config::DEFAULT_IMAGE.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_requires_image() {
        let runtime = MemoryRuntime::new().without_image(crate::config::DEFAULT_IMAGE);
        let err = runtime.create(&spec("a")).await.unwrap_err();
        assert!(matches!(err, V2rError::ImageNotFound(_)));

        runtime.pull_image(crate::config::DEFAULT_IMAGE).await.unwrap();
        assert!(runtime.create(&spec("a")).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_records_image_and_env() {
        let runtime = MemoryRuntime::new();
        let mut with_env = spec("a");
        with_env.env.insert("POC_TYPE".into(), "rce".into());
        runtime.create(&with_env).await.unwrap();

        assert_eq!(runtime.image_of("a").as_deref(), Some(crate::config::DEFAULT_IMAGE));
        assert_eq!(runtime.env_of("a").unwrap()["POC_TYPE"], "rce");
        assert!(runtime.image_of("missing").is_none());
    }

    #[tokio::test]
    async fn test_duplicate_name_conflicts() {
        let runtime = MemoryRuntime::new();
        runtime.create(&spec("same")).await.unwrap();
        assert!(runtime.create(&spec("same")).await.is_err());
    }

    #[tokio::test]
    async fn test_exec_requires_running_container() {
        let runtime = MemoryRuntime::new();
        let id = runtime.create(&spec("a")).await.unwrap();
        let cmd = vec!["true".to_string()];
        assert!(runtime.exec(&id, &cmd, None).await.is_err());

        runtime.start(&id).await.unwrap();
        assert_eq!(runtime.exec(&id, &cmd, None).await.unwrap().exit_code, 0);
    }

    #[tokio::test]
    async fn test_copy_in_then_out() {
        let runtime = MemoryRuntime::new();
        let id = runtime.create(&spec("a")).await.unwrap();
        let tarball = archive::pack_bytes("tmp/poc.py", b"print(1)").unwrap();
        runtime.copy_in(&id, "/", tarball).await.unwrap();

        assert_eq!(runtime.file("a", "/tmp/poc.py").unwrap(), b"print(1)");
        let out = runtime.copy_out(&id, "/tmp/poc.py").await.unwrap();
        assert_eq!(archive::unpack_first_file(&out).unwrap(), b"print(1)");
    }

    #[tokio::test]
    async fn test_handler_can_write_files() {
        let runtime = MemoryRuntime::new().with_exec_handler(|req| {
            req.files.insert("/evidence/out.log".into(), b"trace".to_vec());
            ExecOutput { exit_code: 0, stdout: req.script(), stderr: String::new() }
        });
        let id = runtime.create(&spec("a")).await.unwrap();
        runtime.start(&id).await.unwrap();
        let cmd = vec!["sh".to_string(), "-c".to_string(), "echo hi".to_string()];
        let out = runtime.exec(&id, &cmd, None).await.unwrap();
        assert_eq!(out.stdout, "echo hi");
        assert_eq!(runtime.file("a", "/evidence/out.log").unwrap(), b"trace");
    }

    #[tokio::test]
    async fn test_injected_failure_and_call_log() {
        let runtime = MemoryRuntime::new().failing(RuntimeOp::Start, "start refused");
        let id = runtime.create(&spec("a")).await.unwrap();
        let err = runtime.start(&id).await.unwrap_err();
        assert!(err.to_string().contains("start refused"));
        assert_eq!(runtime.count(RuntimeOp::Create), 1);
        assert_eq!(runtime.count(RuntimeOp::Start), 1);
    }

    #[tokio::test]
    async fn test_unreachable_ping() {
        let runtime = MemoryRuntime::new().unreachable();
        assert!(matches!(runtime.ping().await, Err(V2rError::RuntimeUnavailable(_))));
    }

    #[tokio::test]
    async fn test_remove_forgets_container() {
        let runtime = MemoryRuntime::new();
        let id = runtime.create(&spec("gone")).await.unwrap();
        assert_eq!(runtime.live_containers(), vec!["gone".to_string()]);
        runtime.remove(&id, true).await.unwrap();
        assert!(runtime.live_containers().is_empty());
        assert!(runtime.remove(&id, true).await.is_err());
    }
}
