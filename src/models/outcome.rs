use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::V2rError;
use super::evidence::EvidenceBundle;
use super::execution::ExecutionResult;
use super::status::ReproductionStatus;

/// Input for one reproduction attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReproductionRequest {
    /// Script body, or a path to a local file holding it.
    pub poc_script: String,
    /// Free-form PoC category such as `rce` or `sql_injection`.
    pub poc_type: String,
    pub target_host: Option<String>,
    pub timeout_secs: u64,
    pub network_enabled: bool,
    /// Collect syscall/network/filesystem evidence before teardown.
    #[serde(default)]
    pub collect_evidence: bool,
    /// Commit the environment to an image tag before teardown.
    #[serde(default)]
    pub snapshot: bool,
}

impl ReproductionRequest {
    pub fn new(poc_script: impl Into<String>, poc_type: impl Into<String>) -> Self {
        Self {
            poc_script: poc_script.into(),
            poc_type: poc_type.into(),
            target_host: None,
            timeout_secs: crate::config::DEFAULT_TIMEOUT_SECS,
            network_enabled: true,
            collect_evidence: false,
            snapshot: false,
        }
    }

    pub fn with_target(mut self, target_host: impl Into<String>) -> Self {
        let host = target_host.into();
        self.target_host = if host.is_empty() { None } else { Some(host) };
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_network(mut self, enabled: bool) -> Self {
        self.network_enabled = enabled;
        self
    }

    pub fn with_evidence(mut self, collect: bool) -> Self {
        self.collect_evidence = collect;
        self
    }

    pub fn with_snapshot(mut self, snapshot: bool) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub fn validate(&self) -> Result<(), V2rError> {
        if self.poc_script.trim().is_empty() {
            return Err(V2rError::InvalidRequest("poc_script is empty".into()));
        }
        if self.poc_type.trim().is_empty() {
            return Err(V2rError::InvalidRequest("poc_type is empty".into()));
        }
        if self.timeout_secs == 0 {
            return Err(V2rError::InvalidRequest("timeout_secs must be greater than 0".into()));
        }
        Ok(())
    }
}

/// Snapshot of the isolation handle as seen by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub status: String,
    pub image: String,
    pub created: DateTime<Utc>,
    pub snapshot_tag: Option<String>,
}

/// Steps of one reproduction, in the order they are reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReproductionStage {
    Init,
    EnvironmentCreated,
    EnvironmentStarted,
    ScriptInjected,
    Executed,
    Classified,
    CleanedUp,
    Failed,
}

impl std::fmt::Display for ReproductionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Init => "init",
            Self::EnvironmentCreated => "environment_created",
            Self::EnvironmentStarted => "environment_started",
            Self::ScriptInjected => "script_injected",
            Self::Executed => "executed",
            Self::Classified => "classified",
            Self::CleanedUp => "cleaned_up",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Result of one reproduction attempt. Callers must check `success` before
/// trusting `status`: an infrastructure failure yields `success == false`,
/// `status == Failed` and a populated `error`.
///
/// `status` comes from a keyword heuristic and can report false positives,
/// e.g. an error message that happens to contain "executed".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReproductionOutcome {
    pub reproduction_id: String,
    pub poc_type: String,
    pub target_host: Option<String>,
    pub success: bool,
    pub status: ReproductionStatus,
    pub execution_result: Option<ExecutionResult>,
    #[serde(default)]
    pub evidence: EvidenceBundle,
    pub container_info: Option<ContainerInfo>,
    pub error: Option<String>,
    pub error_type: Option<String>,
    /// Last stage reached before an infrastructure failure.
    pub failed_stage: Option<ReproductionStage>,
    /// Final stage; `CleanedUp` unless teardown itself failed.
    pub final_stage: ReproductionStage,
    pub timestamp: DateTime<Utc>,
}

impl ReproductionOutcome {
    pub fn is_infrastructure_failure(&self) -> bool {
        !self.success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let request = ReproductionRequest::new("print(1)", "rce");
        assert_eq!(request.timeout_secs, 300);
        assert!(request.network_enabled);
        assert!(!request.collect_evidence);
        assert!(!request.snapshot);
        assert!(request.target_host.is_none());
    }

    #[test]
    fn test_empty_target_is_none() {
        let request = ReproductionRequest::new("print(1)", "rce").with_target("");
        assert!(request.target_host.is_none());
        let request = request.with_target("10.0.0.5");
        assert_eq!(request.target_host.as_deref(), Some("10.0.0.5"));
    }

    #[test]
    fn test_validate_rejects_empty_script() {
        let err = ReproductionRequest::new("  ", "rce").validate().unwrap_err();
        assert!(matches!(err, V2rError::InvalidRequest(_)));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        assert!(ReproductionRequest::new("x", "rce").with_timeout(0).validate().is_err());
    }

    #[test]
    fn test_stage_ordering_is_linear() {
        assert!(ReproductionStage::Init < ReproductionStage::EnvironmentCreated);
        assert!(ReproductionStage::ScriptInjected < ReproductionStage::Executed);
        assert!(ReproductionStage::Classified < ReproductionStage::CleanedUp);
    }
}
