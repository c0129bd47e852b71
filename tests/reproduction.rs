mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use common::{config_with_dependencies, poc_handler, poc_runtime, test_config};
use v2r::config::{IsolationConfig, DEFAULT_IMAGE};
use v2r::container::memory::RuntimeOp;
use v2r::container::ExecOutput;
use v2r::models::{EvidenceKind, ReproductionStage};
use v2r::{MemoryRuntime, PocReproducer, ReproductionRequest, ReproductionStatus};

const WORKING_POC: &str = "import sys\nprint('success')\nsys.exit(0)\n";
const SILENT_FAILURE: &str = "import sys\nprint('attempt finished')\nsys.exit(1)\n";

#[tokio::test]
async fn test_working_poc_reproduces() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Arc::new(poc_runtime());
    let reproducer = PocReproducer::new(runtime.clone(), &test_config(dir.path()));

    let request = ReproductionRequest::new(WORKING_POC, "rce").with_target("10.0.0.5").with_timeout(60);
    let outcome = reproducer.reproduce(&request).await;

    assert!(outcome.success, "unexpected error: {:?}", outcome.error);
    assert_eq!(outcome.status, ReproductionStatus::Success);
    assert_eq!(outcome.final_stage, ReproductionStage::CleanedUp);
    assert!(outcome.failed_stage.is_none());
    assert!(outcome.reproduction_id.starts_with("poc_"));

    let execution = outcome.execution_result.unwrap();
    assert_eq!(execution.exit_code, 0);
    assert!(execution.stdout.contains("success"));

    assert_eq!(runtime.count(RuntimeOp::Remove), 1);
    assert!(runtime.live_containers().is_empty());
}

#[tokio::test]
async fn test_failing_poc_without_keyword_is_failed() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Arc::new(poc_runtime());
    let reproducer = PocReproducer::new(runtime.clone(), &test_config(dir.path()));

    let outcome = reproducer.reproduce(&ReproductionRequest::new(SILENT_FAILURE, "rce")).await;

    assert!(outcome.success);
    assert_eq!(outcome.status, ReproductionStatus::Failed);
    assert_eq!(outcome.execution_result.unwrap().exit_code, 1);
    assert!(outcome.error.is_none());
    assert!(runtime.live_containers().is_empty());
}

#[tokio::test]
async fn test_exception_in_poc_is_failed_not_error() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Arc::new(poc_runtime());
    let reproducer = PocReproducer::new(runtime.clone(), &test_config(dir.path()));

    let outcome = reproducer
        .reproduce(&ReproductionRequest::new("raise RuntimeError('boom')", "rce"))
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.status, ReproductionStatus::Failed);
    assert!(outcome.execution_result.unwrap().stderr.contains("Traceback"));
}

#[tokio::test]
async fn test_nonzero_exit_with_type_keyword_is_success() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Arc::new(poc_runtime());
    let reproducer = PocReproducer::new(runtime.clone(), &test_config(dir.path()));

    let script = "import sys\nprint('success: remote code execution')\nsys.exit(3)\n";
    let outcome = reproducer.reproduce(&ReproductionRequest::new(script, "rce")).await;
    assert_eq!(outcome.status, ReproductionStatus::Success);

    let script = "import sys\nprint('success: payload sent')\nsys.exit(3)\n";
    let outcome = reproducer.reproduce(&ReproductionRequest::new(script, "sql_injection")).await;
    assert_eq!(outcome.status, ReproductionStatus::Partial);
}

#[tokio::test]
async fn test_exec_failure_still_removes_environment() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Arc::new(poc_runtime().failing(RuntimeOp::Exec, "exec socket closed"));
    let reproducer = PocReproducer::new(runtime.clone(), &test_config(dir.path()));

    let outcome = reproducer.reproduce(&ReproductionRequest::new(WORKING_POC, "rce")).await;

    assert!(!outcome.success);
    assert_eq!(outcome.status, ReproductionStatus::Failed);
    assert_eq!(outcome.error_type.as_deref(), Some("ContainerError"));
    assert!(outcome.error.unwrap().contains("exec socket closed"));
    assert_eq!(outcome.final_stage, ReproductionStage::CleanedUp);
    assert_eq!(runtime.count(RuntimeOp::Remove), 1);
    assert!(runtime.live_containers().is_empty());
}

#[tokio::test]
async fn test_injection_failure_still_removes_environment() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Arc::new(
        poc_runtime()
            .failing(RuntimeOp::CopyIn, "copy refused")
            .failing(RuntimeOp::Exec, "exec refused"),
    );
    let reproducer = PocReproducer::new(runtime.clone(), &test_config(dir.path()));

    let outcome = reproducer.reproduce(&ReproductionRequest::new(WORKING_POC, "rce")).await;

    assert!(!outcome.success);
    assert!(outcome.execution_result.is_none());
    assert_eq!(outcome.failed_stage, Some(ReproductionStage::EnvironmentStarted));
    assert_eq!(runtime.count(RuntimeOp::Remove), 1);
    assert!(runtime.live_containers().is_empty());
}

#[tokio::test]
async fn test_reproduction_ids_are_unique() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Arc::new(poc_runtime());
    let reproducer = PocReproducer::new(runtime.clone(), &test_config(dir.path()));
    let request = ReproductionRequest::new(WORKING_POC, "rce");

    let mut ids = HashSet::new();
    for _ in 0..100 {
        let outcome = reproducer.reproduce(&request).await;
        assert!(outcome.success);
        assert!(ids.insert(outcome.reproduction_id));
    }
    assert_eq!(runtime.count(RuntimeOp::Create), 100);
    assert!(runtime.live_containers().is_empty());
}

#[tokio::test]
async fn test_evidence_collected_with_missing_tool_noted() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Arc::new(poc_runtime());
    let reproducer = PocReproducer::new(runtime.clone(), &test_config(dir.path()));

    let script = "print('remote code execution success')\nopen('/tmp/pwned', 'w')\n";
    let request = ReproductionRequest::new(script, "rce").with_evidence(true);
    let outcome = reproducer.reproduce(&request).await;

    assert_eq!(outcome.status, ReproductionStatus::Success);

    let syscalls = outcome.evidence.get(EvidenceKind::Syscalls).unwrap();
    assert!(syscalls.starts_with(dir.path()));
    assert!(std::fs::read_to_string(syscalls).unwrap().contains("execve"));

    assert!(outcome.evidence.get(EvidenceKind::Network).is_none());
    assert_eq!(outcome.evidence.notes.get("network").map(String::as_str), Some("tcpdump not available"));

    let diff = std::fs::read_to_string(outcome.evidence.get(EvidenceKind::FsDiff).unwrap()).unwrap();
    assert!(diff.contains("+/tmp/pwned"));
    assert!(!diff.contains("+/tmp/poc_"));
}

#[tokio::test]
async fn test_evidence_not_requested_leaves_bundle_empty() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Arc::new(poc_runtime());
    let reproducer = PocReproducer::new(runtime.clone(), &test_config(dir.path()));

    let outcome = reproducer.reproduce(&ReproductionRequest::new(WORKING_POC, "rce")).await;

    assert!(outcome.evidence.is_empty());
    assert!(!runtime.exec_commands().iter().any(|c| c.contains("strace")));
}

#[tokio::test]
async fn test_timeout_kills_environment() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Arc::new(poc_runtime().with_slow_command("/tmp/poc_", Duration::from_secs(5)));
    let reproducer = PocReproducer::new(runtime.clone(), &test_config(dir.path()));

    let request = ReproductionRequest::new(WORKING_POC, "rce").with_timeout(1).with_evidence(true);
    let outcome = reproducer.reproduce(&request).await;

    assert!(outcome.success);
    assert_eq!(outcome.status, ReproductionStatus::Failed);
    let execution = outcome.execution_result.unwrap();
    assert!(execution.timed_out);
    assert_eq!(execution.exit_code, -1);
    assert_eq!(outcome.evidence.notes.get("syscalls").map(String::as_str), Some("environment not running"));
    assert!(runtime.count(RuntimeOp::Stop) >= 1);
    assert!(runtime.live_containers().is_empty());
}

#[tokio::test]
async fn test_missing_image_is_pulled_once() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Arc::new(poc_runtime().without_image(DEFAULT_IMAGE));
    let reproducer = PocReproducer::new(runtime.clone(), &test_config(dir.path()));

    let outcome = reproducer.reproduce(&ReproductionRequest::new(WORKING_POC, "rce")).await;

    assert!(outcome.success);
    assert_eq!(runtime.count(RuntimeOp::PullImage), 1);
    assert_eq!(runtime.count(RuntimeOp::Create), 2);
    assert!(runtime.has_image(DEFAULT_IMAGE));
}

#[tokio::test]
async fn test_unreachable_runtime_degrades() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Arc::new(MemoryRuntime::new().unreachable());
    let reproducer = PocReproducer::new(runtime.clone(), &test_config(dir.path()));

    let outcome = reproducer.reproduce(&ReproductionRequest::new(WORKING_POC, "rce")).await;

    assert!(!outcome.success);
    assert_eq!(outcome.error_type.as_deref(), Some("RuntimeUnavailableError"));
    assert_eq!(outcome.failed_stage, Some(ReproductionStage::Init));
    assert_eq!(outcome.final_stage, ReproductionStage::CleanedUp);
    assert!(outcome.error.unwrap().contains("isolation disabled"));
}

#[tokio::test]
async fn test_unreachable_runtime_in_strict_mode() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.isolation = Some(IsolationConfig { strict: Some(true), ..Default::default() });
    let runtime = Arc::new(MemoryRuntime::new().unreachable());
    let reproducer = PocReproducer::new(runtime.clone(), &config);

    let outcome = reproducer.reproduce(&ReproductionRequest::new(WORKING_POC, "rce")).await;

    assert!(!outcome.success);
    assert_eq!(outcome.error_type.as_deref(), Some("RuntimeUnavailableError"));
    assert_eq!(runtime.count(RuntimeOp::Create), 0);
}

#[tokio::test]
async fn test_script_file_is_resolved() {
    let dir = tempfile::tempdir().unwrap();
    let script_path = dir.path().join("exploit.py");
    std::fs::write(&script_path, WORKING_POC).unwrap();

    let runtime = Arc::new(poc_runtime());
    let reproducer = PocReproducer::new(runtime.clone(), &test_config(dir.path()));
    let request = ReproductionRequest::new(script_path.display().to_string(), "rce");
    let outcome = reproducer.reproduce(&request).await;

    assert_eq!(outcome.status, ReproductionStatus::Success);
    let audit = dir.path().join(format!("poc_{}.py", outcome.reproduction_id));
    assert_eq!(std::fs::read_to_string(audit).unwrap(), WORKING_POC);
}

#[tokio::test]
async fn test_slow_dependency_install_still_runs_poc() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Arc::new(poc_runtime().with_slow_command("pip install", Duration::from_secs(3)));
    let reproducer = PocReproducer::new(runtime.clone(), &config_with_dependencies(dir.path(), &["requests"]));

    let request = ReproductionRequest::new(WORKING_POC, "rce").with_timeout(1);
    let outcome = reproducer.reproduce(&request).await;

    assert!(outcome.success, "unexpected error: {:?}", outcome.error);
    assert_eq!(outcome.status, ReproductionStatus::Success);
    let execution = outcome.execution_result.unwrap();
    assert!(!execution.timed_out);
    assert!(execution.stdout.contains("success"));
    assert!(runtime.live_containers().is_empty());
}

#[tokio::test]
async fn test_failed_dependency_install_still_runs_poc() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Arc::new(MemoryRuntime::new().with_exec_handler(|req| {
        if req.script().contains("pip install") {
            return ExecOutput { exit_code: 1, stdout: String::new(), stderr: "No matching distribution".into() };
        }
        poc_handler(req)
    }));
    let config = config_with_dependencies(dir.path(), &["requests", "impacket", "bad;name"]);
    let reproducer = PocReproducer::new(runtime.clone(), &config);

    let outcome = reproducer.reproduce(&ReproductionRequest::new(SILENT_FAILURE, "rce")).await;

    assert!(outcome.success);
    assert_eq!(outcome.status, ReproductionStatus::Failed);
    assert_eq!(outcome.execution_result.unwrap().exit_code, 1);

    let commands = runtime.exec_commands();
    assert!(commands.iter().any(|c| c.contains("import requests")));
    assert!(commands.iter().any(|c| c.contains("import impacket")));
    assert!(!commands.iter().any(|c| c.contains("bad;name")));
}
