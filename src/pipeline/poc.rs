use data_encoding::HEXLOWER;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{V2rConfig, DEFAULT_TIMEOUT_SECS};
use crate::container::ContainerRuntime;
use crate::models::{ReproductionOutcome, ReproductionRequest, ReproductionStatus};
use crate::reproduction::{resolve_script, PocReproducer};
use crate::scoring::{reliability_level, ReliabilityLevel, ReliabilityScorer, ScoreBreakdown, VerificationStatus};
use tracing::{info, warn};

fn default_poc_type() -> String {
    "command_injection".to_string()
}

fn default_source() -> String {
    "manual".to_string()
}

fn default_true() -> bool {
    true
}

/// One PoC to reproduce and score, as handed over by the scanning side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PocJob {
    #[serde(default)]
    pub scan_result_id: Option<i64>,
    pub poc_script: String,
    #[serde(default = "default_poc_type")]
    pub poc_type: String,
    #[serde(default)]
    pub cve_id: Option<String>,
    /// Where the PoC came from (`exploit-db`, `github`, ...).
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default)]
    pub target_host: Option<String>,
    #[serde(default = "default_true")]
    pub collect_evidence: bool,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_true")]
    pub network_enabled: bool,
}

impl PocJob {
    pub fn new(poc_script: impl Into<String>, poc_type: impl Into<String>) -> Self {
        Self {
            scan_result_id: None,
            poc_script: poc_script.into(),
            poc_type: poc_type.into(),
            cve_id: None,
            source: default_source(),
            target_host: None,
            collect_evidence: true,
            timeout_secs: None,
            network_enabled: true,
        }
    }

    pub fn with_cve(mut self, cve_id: impl Into<String>) -> Self {
        self.cve_id = Some(cve_id.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

/// Identity of a PoC script, derived from its content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PocMetadataRecord {
    /// `poc_{cve_id}_{first 16 hex chars of the sha256}`.
    pub poc_id: String,
    pub cve_id: String,
    pub poc_type: String,
    pub source: String,
    pub file_hash_sha256: String,
    pub verification_status: VerificationStatus,
}

impl PocMetadataRecord {
    pub fn derive(cve_id: &str, poc_type: &str, source: &str, script: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(script.as_bytes());
        let hash = HEXLOWER.encode(&hasher.finalize());
        Self {
            poc_id: format!("poc_{}_{}", cve_id, &hash[..16]),
            cve_id: cve_id.to_string(),
            poc_type: poc_type.to_string(),
            source: source.to_string(),
            file_hash_sha256: hash,
            verification_status: VerificationStatus::Unverified,
        }
    }
}

/// Everything a persistence layer needs to store for one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PocRecord {
    pub success: bool,
    pub scan_result_id: Option<i64>,
    pub reproduction_id: String,
    pub status: ReproductionStatus,
    pub evidence_paths: BTreeMap<String, PathBuf>,
    pub score: ScoreBreakdown,
    pub reliability_score: u8,
    pub reliability_level: ReliabilityLevel,
    pub verification_status: VerificationStatus,
    pub metadata: Option<PocMetadataRecord>,
    pub error: Option<String>,
    pub outcome: ReproductionOutcome,
}

/// Reproduce, derive metadata, score. Storage is left to the caller.
pub struct PocPipeline {
    reproducer: Arc<PocReproducer>,
    scorer: ReliabilityScorer,
    default_timeout_secs: u64,
}

impl PocPipeline {
    pub fn new(reproducer: Arc<PocReproducer>, scorer: ReliabilityScorer) -> Self {
        Self { reproducer, scorer, default_timeout_secs: DEFAULT_TIMEOUT_SECS }
    }

    pub fn from_config(runtime: Arc<dyn ContainerRuntime>, config: &V2rConfig) -> Self {
        Self {
            reproducer: Arc::new(PocReproducer::new(runtime, config)),
            scorer: ReliabilityScorer::from_config(config),
            default_timeout_secs: config.reproduction().timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn scorer(&self) -> &ReliabilityScorer {
        &self.scorer
    }

    pub fn request_for(&self, job: &PocJob) -> ReproductionRequest {
        ReproductionRequest::new(job.poc_script.clone(), job.poc_type.clone())
            .with_target(job.target_host.clone().unwrap_or_default())
            .with_timeout(job.timeout_secs.unwrap_or(self.default_timeout_secs))
            .with_network(job.network_enabled)
            .with_evidence(job.collect_evidence)
    }

    pub async fn run(&self, job: &PocJob) -> PocRecord {
        info!(
            scan_result_id = job.scan_result_id,
            poc_type = %job.poc_type,
            cve_id = job.cve_id.as_deref().unwrap_or("-"),
            "Starting PoC pipeline"
        );

        let outcome = self.reproducer.reproduce(&self.request_for(job)).await;

        let metadata = match &job.cve_id {
            Some(cve_id) => match resolve_script(&job.poc_script).await {
                Ok(script) => Some(PocMetadataRecord::derive(cve_id, &job.poc_type, &job.source, &script)),
                Err(e) => {
                    warn!(cve_id = %cve_id, error = %e, "Failed to derive PoC metadata");
                    None
                }
            },
            None => None,
        };

        let score = self.scorer.score_outcome(&job.source, &outcome);
        let verification = self.scorer.verification_status(score.total);
        let metadata = metadata.map(|m| PocMetadataRecord { verification_status: verification, ..m });

        info!(
            reproduction_id = %outcome.reproduction_id,
            status = %outcome.status,
            score = score.total,
            "PoC pipeline completed"
        );

        PocRecord {
            success: outcome.success,
            scan_result_id: job.scan_result_id,
            reproduction_id: outcome.reproduction_id.clone(),
            status: outcome.status,
            evidence_paths: outcome.evidence.paths(),
            score,
            reliability_score: score.total,
            reliability_level: reliability_level(score.total),
            verification_status: verification,
            metadata,
            error: outcome.error.clone(),
            outcome,
        }
    }

    /// Run independent jobs with at most `max_concurrent` in flight.
    /// Records come back in job order.
    pub async fn run_batch(&self, jobs: &[PocJob], max_concurrent: usize) -> Vec<PocRecord> {
        let limit = max_concurrent.max(1);
        info!(jobs = jobs.len(), max_concurrent = limit, "Starting PoC batch");
        stream::iter(jobs.iter().map(|job| self.run(job)))
            .buffered(limit)
            .collect()
            .await
    }
}
