use chrono::Utc;
use data_encoding::BASE64;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{V2rConfig, DEFAULT_EVIDENCE_DIR};
use crate::container::{
    ContainerRuntime, CreateOptions, IsolationEnvironment, IsolationSettings, RuntimeMode,
};
use crate::errors::V2rError;
use crate::evidence::{EvidenceCollector, EvidenceRequest};
use crate::models::{
    EvidenceBundle, ExecutionResult, ReproductionOutcome, ReproductionRequest, ReproductionStage,
    ReproductionStatus,
};
use crate::utils::{atomic_write, container_name, format_duration, generate_reproduction_id, truncate_error, truncate_output};
use super::classifier::ClassifierRegistry;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct ReproducerSettings {
    pub isolation: IsolationSettings,
    pub mode: RuntimeMode,
    /// Local directory for the audit copy of each script.
    pub evidence_dir: PathBuf,
    pub interpreter: String,
    pub dependencies: Vec<String>,
    /// Directory inside the environment the script is written to.
    pub script_dir: String,
    pub evidence: EvidenceRequest,
}

impl ReproducerSettings {
    pub fn from_config(config: &V2rConfig) -> Self {
        let reproduction = config.reproduction();
        let evidence_dir = config.evidence().directory.unwrap_or_else(|| DEFAULT_EVIDENCE_DIR.to_string());
        Self {
            isolation: IsolationSettings::from_config(config),
            mode: RuntimeMode::from_strict(config.isolation().strict.unwrap_or(false)),
            evidence_dir: PathBuf::from(evidence_dir),
            interpreter: reproduction.interpreter.unwrap_or_else(|| "python3".to_string()),
            dependencies: reproduction.dependencies.unwrap_or_else(|| vec!["requests".to_string()]),
            script_dir: reproduction.script_dir.unwrap_or_else(|| "/tmp".to_string()),
            evidence: EvidenceRequest::from_config(config),
        }
    }
}

impl Default for ReproducerSettings {
    fn default() -> Self {
        Self::from_config(&V2rConfig::default())
    }
}

/// What one attempt accumulated before it finished or failed.
struct Attempt {
    stage: ReproductionStage,
    execution: Option<ExecutionResult>,
    evidence: EvidenceBundle,
}

impl Attempt {
    fn reach(&mut self, stage: ReproductionStage, reproduction_id: &str) {
        debug!(reproduction_id, stage = %stage, "Reproduction stage reached");
        self.stage = stage;
    }
}

/// Runs PoC scripts in disposable environments and judges the outcome.
///
/// Each call to [`reproduce`](Self::reproduce) allocates its own
/// environment, so one reproducer can serve concurrent attempts.
pub struct PocReproducer {
    runtime: Arc<dyn ContainerRuntime>,
    settings: ReproducerSettings,
    classifiers: ClassifierRegistry,
    collector: EvidenceCollector,
}

impl PocReproducer {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: &V2rConfig) -> Self {
        Self {
            runtime,
            settings: ReproducerSettings::from_config(config),
            classifiers: ClassifierRegistry::from_config(config),
            collector: EvidenceCollector::from_config(config),
        }
    }

    pub fn with_settings(mut self, settings: ReproducerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_classifiers(mut self, classifiers: ClassifierRegistry) -> Self {
        self.classifiers = classifiers;
        self
    }

    pub fn with_collector(mut self, collector: EvidenceCollector) -> Self {
        self.collector = collector;
        self
    }

    pub fn settings(&self) -> &ReproducerSettings {
        &self.settings
    }

    /// Run one reproduction attempt.
    ///
    /// Never fails: infrastructure problems come back as an outcome with
    /// `success == false` and `error` set. The environment is removed
    /// before this returns, whatever happened.
    pub async fn reproduce(&self, request: &ReproductionRequest) -> ReproductionOutcome {
        let reproduction_id = generate_reproduction_id();
        let started = Instant::now();
        info!(
            reproduction_id = %reproduction_id,
            poc_type = %request.poc_type,
            target = request.target_host.as_deref().unwrap_or("-"),
            "Starting PoC reproduction"
        );

        let mut attempt = Attempt {
            stage: ReproductionStage::Init,
            execution: None,
            evidence: EvidenceBundle::default(),
        };

        let env = match request.validate() {
            Ok(()) => IsolationEnvironment::connect(
                Arc::clone(&self.runtime),
                self.settings.isolation.clone(),
                self.settings.mode,
            )
            .await,
            Err(e) => Err(e),
        };

        let (result, cleaned, container_info) = match env {
            Ok(mut env) => {
                let result = self.run_attempt(&mut env, &reproduction_id, request, &mut attempt).await;
                let cleaned = env.cleanup().await;
                if !cleaned {
                    error!(reproduction_id = %reproduction_id, "Environment cleanup failed, container may be orphaned");
                }
                (result, cleaned, env.info())
            }
            Err(e) => (Err(e), true, None),
        };

        let final_stage = if cleaned { ReproductionStage::CleanedUp } else { ReproductionStage::Failed };
        let outcome = match result {
            Ok(status) => ReproductionOutcome {
                reproduction_id,
                poc_type: request.poc_type.clone(),
                target_host: request.target_host.clone(),
                success: true,
                status,
                execution_result: attempt.execution,
                evidence: attempt.evidence,
                container_info,
                error: None,
                error_type: None,
                failed_stage: None,
                final_stage,
                timestamp: Utc::now(),
            },
            Err(e) => {
                let classification = e.classify();
                error!(
                    reproduction_id = %reproduction_id,
                    stage = %attempt.stage,
                    error_type = classification.error_type,
                    error = %e,
                    "PoC reproduction failed"
                );
                ReproductionOutcome {
                    reproduction_id,
                    poc_type: request.poc_type.clone(),
                    target_host: request.target_host.clone(),
                    success: false,
                    status: ReproductionStatus::Failed,
                    execution_result: attempt.execution,
                    evidence: attempt.evidence,
                    container_info,
                    error: Some(truncate_error(&e.to_string())),
                    error_type: Some(classification.error_type.to_string()),
                    failed_stage: Some(attempt.stage),
                    final_stage,
                    timestamp: Utc::now(),
                }
            }
        };

        info!(
            reproduction_id = %outcome.reproduction_id,
            status = %outcome.status,
            success = outcome.success,
            duration = %format_duration(started.elapsed().as_millis() as u64),
            "PoC reproduction completed"
        );
        outcome
    }

    async fn run_attempt(
        &self,
        env: &mut IsolationEnvironment,
        reproduction_id: &str,
        request: &ReproductionRequest,
        attempt: &mut Attempt,
    ) -> Result<ReproductionStatus, V2rError> {
        let mut variables = BTreeMap::new();
        variables.insert("POC_TYPE".to_string(), request.poc_type.clone());
        variables.insert("TARGET_HOST".to_string(), request.target_host.clone().unwrap_or_default());
        variables.insert("REPRODUCTION_ID".to_string(), reproduction_id.to_string());

        env.create(CreateOptions {
            name: Some(container_name(&self.settings.isolation.name_prefix, reproduction_id)),
            env: variables,
            network_disabled: !request.network_enabled,
            ..Default::default()
        })
        .await?;
        attempt.reach(ReproductionStage::EnvironmentCreated, reproduction_id);

        if !env.start().await {
            return Err(V2rError::Container("Failed to start isolation environment".into()));
        }
        attempt.reach(ReproductionStage::EnvironmentStarted, reproduction_id);

        let script = resolve_script(&request.poc_script).await?;
        let remote_path = format!("{}/poc_{}.py", self.settings.script_dir.trim_end_matches('/'), reproduction_id);
        self.inject_script(env, reproduction_id, &script, &remote_path).await?;
        attempt.reach(ReproductionStage::ScriptInjected, reproduction_id);

        let timeout = Duration::from_secs(request.timeout_secs);
        self.prepare_dependencies(env, reproduction_id, timeout).await;

        let mut session = if request.collect_evidence && self.settings.evidence.fs_diff {
            Some(self.collector.start_collection(env, reproduction_id, self.settings.evidence).await)
        } else {
            None
        };

        let command = format!("{} {}", self.settings.interpreter, remote_path);
        let execution = env.execute(&command, Some(timeout), Some(&self.settings.script_dir)).await;
        debug!(
            reproduction_id,
            stdout = %truncate_output(&execution.stdout),
            stderr = %truncate_output(&execution.stderr),
            "PoC output"
        );
        attempt.execution = Some(execution.clone());
        if execution.is_infrastructure_failure() {
            return Err(V2rError::Container(format!("PoC execution failed: {}", execution.stderr.trim())));
        }
        if execution.timed_out {
            warn!(reproduction_id, timeout_secs = request.timeout_secs, "PoC exceeded its timeout");
        }
        attempt.reach(ReproductionStage::Executed, reproduction_id);

        if request.collect_evidence {
            attempt.evidence = match session.as_mut() {
                Some(session) => {
                    self.collector.stop_collection(session);
                    self.collector.collect_session(env, session).await
                }
                None => {
                    self.collector
                        .collect_after_execution(env, reproduction_id, self.settings.evidence)
                        .await
                }
            };
        }

        let status = self.classifiers.classify(&execution, &request.poc_type);
        attempt.reach(ReproductionStage::Classified, reproduction_id);
        info!(reproduction_id, exit_code = execution.exit_code, status = %status, "PoC classified");

        if request.snapshot {
            let tag = format!("{}-snapshot:{}", self.settings.isolation.name_prefix, reproduction_id);
            if env.snapshot(Some(&tag)).await.is_none() {
                warn!(reproduction_id, tag = %tag, "Snapshot requested but not created");
            }
        }

        Ok(status)
    }

    /// Keep an audit copy locally, then move the script in with an archive
    /// upload, falling back to base64 through the shell.
    async fn inject_script(
        &self,
        env: &mut IsolationEnvironment,
        reproduction_id: &str,
        script: &str,
        remote_path: &str,
    ) -> Result<(), V2rError> {
        let local_path = self.settings.evidence_dir.join(format!("poc_{}.py", reproduction_id));
        let audit_copy = match atomic_write(&local_path, script.as_bytes()).await {
            Ok(()) => true,
            Err(e) => {
                warn!(reproduction_id, path = %local_path.display(), error = %e, "Failed to save script audit copy");
                false
            }
        };

        if audit_copy && env.copy_to(&local_path, remote_path).await {
            return Ok(());
        }

        debug!(reproduction_id, "Falling back to base64 script injection");
        let result = env.execute(&base64_injection(script, remote_path), None, None).await;
        if result.success {
            Ok(())
        } else {
            Err(V2rError::Container(format!(
                "Failed to inject PoC script (exit {}): {}",
                result.exit_code,
                result.stderr.trim()
            )))
        }
    }

    /// Make sure the interpreter and declared modules are usable. Failures
    /// are logged; the script itself will surface anything still missing.
    /// Check the interpreter and install missing modules. Each step gets
    /// `timeout` as a soft deadline: an overrunning step is abandoned with a
    /// warning and the environment keeps running for the PoC itself.
    async fn prepare_dependencies(&self, env: &mut IsolationEnvironment, reproduction_id: &str, timeout: Duration) {
        let interpreter = &self.settings.interpreter;
        let check = format!("command -v {}", interpreter);
        match run_soft(env, &check, timeout).await {
            Some(result) if result.success => {}
            Some(_) => {
                warn!(reproduction_id, interpreter = %interpreter, "Interpreter not found in environment");
                return;
            }
            None => {
                warn!(reproduction_id, interpreter = %interpreter, "Interpreter check timed out, skipping dependencies");
                return;
            }
        }

        for dependency in &self.settings.dependencies {
            if !is_module_name(dependency) {
                warn!(reproduction_id, dependency = %dependency, "Skipping invalid dependency name");
                continue;
            }
            let command = format!(
                "{i} -c 'import {d}' 2>/dev/null || {i} -m pip install --quiet {d}",
                i = interpreter,
                d = dependency
            );
            match run_soft(env, &command, timeout).await {
                Some(result) if result.success => {
                    debug!(reproduction_id, dependency = %dependency, "Dependency available");
                }
                Some(result) => warn!(
                    reproduction_id,
                    dependency = %dependency,
                    exit_code = result.exit_code,
                    "Dependency could not be installed, continuing"
                ),
                None => warn!(
                    reproduction_id,
                    dependency = %dependency,
                    timeout_secs = timeout.as_secs(),
                    "Dependency preparation timed out, continuing"
                ),
            }
        }
    }
}

/// Run `command` without the environment watchdog; `None` once `limit`
/// passes. The abandoned exec is not killed.
async fn run_soft(env: &mut IsolationEnvironment, command: &str, limit: Duration) -> Option<ExecutionResult> {
    tokio::time::timeout(limit, env.execute(command, None, None)).await.ok()
}

/// A script argument naming an existing local file is replaced by the
/// file's contents; anything else is the script body itself.
pub async fn resolve_script(poc_script: &str) -> Result<String, V2rError> {
    let path = Path::new(poc_script);
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(tokio::fs::read_to_string(path).await?),
        _ => Ok(poc_script.to_string()),
    }
}

fn base64_injection(script: &str, remote_path: &str) -> String {
    let dir = match remote_path.rsplit_once('/') {
        Some((dir, _)) if !dir.is_empty() => dir,
        _ => "/",
    };
    format!(
        "mkdir -p {} && printf %s '{}' | base64 -d > {}",
        dir,
        BASE64.encode(script.as_bytes()),
        remote_path
    )
}

fn is_module_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}
