use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use similar::TextDiff;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{V2rConfig, DEFAULT_CAPTURE_SECS, DEFAULT_EVIDENCE_DIR};
use crate::container::{IsolationEnvironment, LifecycleStatus};
use crate::errors::V2rError;
use crate::models::{EvidenceBundle, EvidenceKind, ExecutionResult};
use crate::utils::atomic_write;
use tracing::{debug, info, warn};

/// Exit status the capture scripts use to report a missing tool.
pub const TOOL_MISSING_EXIT: i64 = 127;

/// Directory inside the environment that capture scripts write to.
const REMOTE_EVIDENCE_DIR: &str = "/evidence";

/// Directories whose file listing stands in for a filesystem diff.
const WATCHED_DIRS: &str = "/tmp /var/tmp /root";
const MAX_LISTED_FILES: usize = 1000;

/// Headroom on top of the capture window before the watchdog fires.
const COMMAND_GRACE_SECS: u64 = 30;

/// Which evidence kinds to attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRequest {
    pub syscalls: bool,
    pub network: bool,
    pub fs_diff: bool,
}

impl Default for EvidenceRequest {
    fn default() -> Self {
        Self { syscalls: true, network: true, fs_diff: true }
    }
}

impl EvidenceRequest {
    pub fn from_config(config: &V2rConfig) -> Self {
        let evidence = config.evidence();
        Self {
            syscalls: evidence.syscalls.unwrap_or(true),
            network: evidence.network.unwrap_or(true),
            fs_diff: evidence.fs_diff.unwrap_or(true),
        }
    }

    pub fn none() -> Self {
        Self { syscalls: false, network: false, fs_diff: false }
    }

    pub fn wants(&self, kind: EvidenceKind) -> bool {
        match kind {
            EvidenceKind::Syscalls => self.syscalls,
            EvidenceKind::Network => self.network,
            EvidenceKind::FsDiff => self.fs_diff,
            EvidenceKind::Screenshot => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionStatus {
    Collecting,
    Stopped,
}

/// Filesystem listing saved when a collection session starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesystemState {
    pub reproduction_id: String,
    pub captured_at: DateTime<Utc>,
    pub files: Vec<String>,
}

/// State carried from `start_collection` to `collect_session`.
///
/// Only the filesystem baseline is captured up front. Live syscall and
/// network streaming are not implemented; those kinds are still gathered
/// after execution.
#[derive(Debug, Clone)]
pub struct CollectionSession {
    pub reproduction_id: String,
    pub request: EvidenceRequest,
    pub status: CollectionStatus,
    pub baseline: Option<Vec<String>>,
    pub initial_state_path: Option<PathBuf>,
}

/// Gathers diagnostic artifacts from an environment. Every step is
/// best-effort: a missing tool or a failed transfer leaves that entry absent
/// and records a note, and never fails the reproduction.
#[derive(Debug, Clone)]
pub struct EvidenceCollector {
    evidence_dir: PathBuf,
    capture_secs: u64,
}

impl EvidenceCollector {
    pub fn new(evidence_dir: impl Into<PathBuf>) -> Self {
        Self { evidence_dir: evidence_dir.into(), capture_secs: DEFAULT_CAPTURE_SECS }
    }

    pub fn from_config(config: &V2rConfig) -> Self {
        let evidence = config.evidence();
        Self {
            evidence_dir: PathBuf::from(evidence.directory.unwrap_or_else(|| DEFAULT_EVIDENCE_DIR.to_string())),
            capture_secs: evidence.capture_secs.unwrap_or(DEFAULT_CAPTURE_SECS),
        }
    }

    pub fn with_capture_secs(mut self, capture_secs: u64) -> Self {
        self.capture_secs = capture_secs;
        self
    }

    pub fn evidence_dir(&self) -> &Path {
        &self.evidence_dir
    }

    pub fn artifact_path(&self, reproduction_id: &str, kind: EvidenceKind) -> PathBuf {
        self.evidence_dir.join(kind.file_name(reproduction_id))
    }

    /// Capture the initial filesystem listing so a later collection can
    /// report an actual diff.
    pub async fn start_collection(
        &self,
        env: &mut IsolationEnvironment,
        reproduction_id: &str,
        request: EvidenceRequest,
    ) -> CollectionSession {
        let mut session = CollectionSession {
            reproduction_id: reproduction_id.to_string(),
            request,
            status: CollectionStatus::Collecting,
            baseline: None,
            initial_state_path: None,
        };

        if request.fs_diff {
            match self.list_files(env).await {
                Ok(files) => {
                    let state = FilesystemState {
                        reproduction_id: reproduction_id.to_string(),
                        captured_at: Utc::now(),
                        files: files.clone(),
                    };
                    let path = self.evidence_dir.join(format!("{}_fs_initial.json", reproduction_id));
                    match save_state(&state, &path).await {
                        Ok(()) => session.initial_state_path = Some(path),
                        Err(e) => warn!(reproduction_id, error = %e, "Failed to save initial filesystem state"),
                    }
                    session.baseline = Some(files);
                }
                Err(e) => warn!(reproduction_id, error = %e, "Failed to capture initial filesystem state"),
            }
        }

        info!(reproduction_id, "Evidence collection started");
        session
    }

    pub fn stop_collection(&self, session: &mut CollectionSession) -> CollectionStatus {
        session.status = CollectionStatus::Stopped;
        info!(reproduction_id = %session.reproduction_id, "Evidence collection stopped");
        session.status
    }

    /// Collect everything the session asked for, diffing the filesystem
    /// against its baseline.
    pub async fn collect_session(
        &self,
        env: &mut IsolationEnvironment,
        session: &CollectionSession,
    ) -> EvidenceBundle {
        self.collect(env, &session.reproduction_id, session.request, session.baseline.as_deref()).await
    }

    /// Collect evidence from an environment whose script has finished.
    pub async fn collect_after_execution(
        &self,
        env: &mut IsolationEnvironment,
        reproduction_id: &str,
        request: EvidenceRequest,
    ) -> EvidenceBundle {
        self.collect(env, reproduction_id, request, None).await
    }

    async fn collect(
        &self,
        env: &mut IsolationEnvironment,
        reproduction_id: &str,
        request: EvidenceRequest,
        baseline: Option<&[String]>,
    ) -> EvidenceBundle {
        let mut bundle = EvidenceBundle::default();

        if env.status() != Some(LifecycleStatus::Running) {
            warn!(reproduction_id, "Environment not running, skipping evidence collection");
            for kind in EvidenceKind::COLLECTED.iter().filter(|k| request.wants(**k)) {
                bundle.note(*kind, "environment not running");
            }
            return bundle;
        }

        if request.syscalls {
            self.capture_with_tool(env, reproduction_id, EvidenceKind::Syscalls, &mut bundle).await;
        }
        if request.network {
            self.capture_with_tool(env, reproduction_id, EvidenceKind::Network, &mut bundle).await;
        }
        if request.fs_diff {
            self.capture_fs_diff(env, reproduction_id, baseline, &mut bundle).await;
        }

        info!(
            reproduction_id,
            collected = bundle.paths().len(),
            missing = bundle.notes.len(),
            "Evidence collected"
        );
        bundle
    }

    /// Run the capture script for `kind` and copy its artifact out.
    async fn capture_with_tool(
        &self,
        env: &mut IsolationEnvironment,
        reproduction_id: &str,
        kind: EvidenceKind,
        bundle: &mut EvidenceBundle,
    ) {
        let (script, remote) = match kind {
            EvidenceKind::Syscalls => (syscall_script(), remote_artifact("syscalls.log")),
            EvidenceKind::Network => (network_script(self.capture_secs), remote_artifact("network.pcap")),
            _ => return,
        };

        let result = env.execute(&script, Some(self.command_timeout()), None).await;
        if let Some(reason) = capture_failure(kind, &result) {
            warn!(reproduction_id, kind = %kind, reason = %reason, "Evidence capture skipped");
            bundle.note(kind, reason);
            return;
        }

        let local = self.artifact_path(reproduction_id, kind);
        if env.copy_from(&remote, &local).await {
            info!(reproduction_id, kind = %kind, path = %local.display(), "Evidence artifact collected");
            bundle.set(kind, local);
        } else {
            warn!(reproduction_id, kind = %kind, "Evidence artifact could not be copied out");
            bundle.note(kind, "artifact could not be copied from environment");
        }
    }

    async fn capture_fs_diff(
        &self,
        env: &mut IsolationEnvironment,
        reproduction_id: &str,
        baseline: Option<&[String]>,
        bundle: &mut EvidenceBundle,
    ) {
        let files = match self.list_files(env).await {
            Ok(files) => files,
            Err(e) => {
                warn!(reproduction_id, error = %e, "Filesystem listing failed");
                bundle.note(EvidenceKind::FsDiff, e.to_string());
                return;
            }
        };

        let report = match baseline {
            Some(before) => render_diff(before, &files),
            None => files.join("\n"),
        };
        if report.trim().is_empty() {
            debug!(reproduction_id, "No filesystem changes detected");
            bundle.note(EvidenceKind::FsDiff, "no filesystem changes detected");
            return;
        }

        let local = self.artifact_path(reproduction_id, EvidenceKind::FsDiff);
        match atomic_write(&local, report.as_bytes()).await {
            Ok(()) => {
                info!(reproduction_id, path = %local.display(), "Filesystem diff collected");
                bundle.set(EvidenceKind::FsDiff, local);
            }
            Err(e) => {
                warn!(reproduction_id, error = %e, "Failed to write filesystem diff");
                bundle.note(EvidenceKind::FsDiff, e.to_string());
            }
        }
    }

    async fn list_files(&self, env: &mut IsolationEnvironment) -> Result<Vec<String>, V2rError> {
        let command = format!(
            "find {} -type f 2>/dev/null | sort | head -{}",
            WATCHED_DIRS, MAX_LISTED_FILES
        );
        let result = env.execute(&command, Some(self.command_timeout()), None).await;
        if result.exit_code == -1 {
            return Err(V2rError::Evidence(format!("filesystem listing failed: {}", result.stderr.trim())));
        }
        Ok(result.stdout.lines().map(str::to_string).filter(|l| !l.is_empty()).collect())
    }

    fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.capture_secs + COMMAND_GRACE_SECS)
    }
}

fn remote_artifact(name: &str) -> String {
    format!("{}/{}", REMOTE_EVIDENCE_DIR, name)
}

fn syscall_script() -> String {
    let out = remote_artifact("syscalls.log");
    format!(
        "mkdir -p {dir} && if command -v strace >/dev/null 2>&1; then \
         strace -f -o {out} sleep 1 >/dev/null 2>&1; exit 0; \
         else echo 'strace not available' > {out}; exit {missing}; fi",
        dir = REMOTE_EVIDENCE_DIR,
        out = out,
        missing = TOOL_MISSING_EXIT,
    )
}

fn network_script(capture_secs: u64) -> String {
    let out = remote_artifact("network.pcap");
    format!(
        "mkdir -p {dir} && if command -v tcpdump >/dev/null 2>&1; then \
         timeout {secs} tcpdump -i any -w {out} >/dev/null 2>&1; exit 0; \
         else echo 'tcpdump not available' > {out}; exit {missing}; fi",
        dir = REMOTE_EVIDENCE_DIR,
        secs = capture_secs,
        out = out,
        missing = TOOL_MISSING_EXIT,
    )
}

/// Why a capture produced nothing usable, if it did not.
fn capture_failure(kind: EvidenceKind, result: &ExecutionResult) -> Option<String> {
    let tool = match kind {
        EvidenceKind::Syscalls => "strace",
        EvidenceKind::Network => "tcpdump",
        _ => "tool",
    };
    match result.exit_code {
        0 => None,
        TOOL_MISSING_EXIT => Some(format!("{} not available", tool)),
        _ if result.timed_out => Some(format!("{} capture timed out", tool)),
        -1 => Some(format!("{} capture failed: {}", tool, result.stderr.trim())),
        code => Some(format!("{} exited with status {}", tool, code)),
    }
}

fn render_diff(before: &[String], after: &[String]) -> String {
    if before == after {
        return String::new();
    }
    let before: String = before.iter().map(|l| format!("{}\n", l)).collect();
    let after: String = after.iter().map(|l| format!("{}\n", l)).collect();
    TextDiff::from_lines(&before, &after)
        .unified_diff()
        .header("initial", "final")
        .to_string()
}

async fn save_state(state: &FilesystemState, path: &Path) -> Result<(), V2rError> {
    let json = serde_json::to_vec_pretty(state)?;
    atomic_write(path, &json).await
}
