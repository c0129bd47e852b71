use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use crate::config::{V2rConfig, DEFAULT_VERIFIED_THRESHOLD};
use crate::errors::V2rError;
use crate::models::{ReproductionOutcome, ReproductionStatus};
use tracing::{debug, warn};

pub const SOURCE_MAX: u32 = 40;
pub const STATUS_MAX: u32 = 40;
pub const EVIDENCE_MAX: u32 = 20;

/// Trust in where a PoC came from, 0-100. Unknown sources get
/// [`DEFAULT_SOURCE_WEIGHT`].
pub const SOURCE_WEIGHTS: &[(&str, u8)] = &[
    ("security-advisory", 85),
    ("exploit-db", 80),
    ("cve-details", 75),
    ("github", 70),
    ("manual", 50),
    ("other", 50),
];
pub const DEFAULT_SOURCE_WEIGHT: u8 = 50;

pub const EVIDENCE_WEIGHTS: &[(&str, u8)] = &[
    ("syscalls", 30),
    ("network", 20),
    ("fs_diff", 20),
    ("screenshot", 10),
];

fn status_weight(status: ReproductionStatus) -> u8 {
    match status {
        ReproductionStatus::Success => 100,
        ReproductionStatus::Partial => 60,
        ReproductionStatus::Failed => 0,
    }
}

/// Scale a 0-100 weight onto `0..=max`, rounding half up.
fn scale(weight: u8, max: u32) -> u32 {
    (u32::from(weight) * max + 50) / 100
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub source: u8,
    pub status: u8,
    pub evidence: u8,
    pub total: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReliabilityLevel {
    High,
    Medium,
    Low,
}

impl ReliabilityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl std::fmt::Display for ReliabilityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Verified,
    Unverified,
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Verified => "verified",
            Self::Unverified => "unverified",
        })
    }
}

pub fn reliability_level(score: u8) -> ReliabilityLevel {
    if score >= 80 {
        ReliabilityLevel::High
    } else if score >= 60 {
        ReliabilityLevel::Medium
    } else {
        ReliabilityLevel::Low
    }
}

pub fn verification_status(score: u8, threshold: u8) -> VerificationStatus {
    if score >= threshold {
        VerificationStatus::Verified
    } else {
        VerificationStatus::Unverified
    }
}

/// Deterministic reliability score from source, status and evidence.
///
/// Holds only the weight tables; scoring the same inputs always gives the
/// same result. The only I/O is checking that evidence files exist and are
/// non-empty.
#[derive(Debug, Clone)]
pub struct ReliabilityScorer {
    source_weights: HashMap<String, u8>,
    verified_threshold: u8,
}

impl Default for ReliabilityScorer {
    fn default() -> Self {
        Self {
            source_weights: SOURCE_WEIGHTS.iter().map(|(s, w)| (s.to_string(), *w)).collect(),
            verified_threshold: DEFAULT_VERIFIED_THRESHOLD,
        }
    }
}

impl ReliabilityScorer {
    pub fn from_config(config: &V2rConfig) -> Self {
        let scoring = config.scoring();
        let mut scorer = Self::default();
        for (source, weight) in scoring.source_weights.unwrap_or_default() {
            scorer.source_weights.insert(source.to_lowercase(), weight.min(100));
        }
        scorer.verified_threshold = scoring.verified_threshold.unwrap_or(DEFAULT_VERIFIED_THRESHOLD);
        scorer
    }

    pub fn verified_threshold(&self) -> u8 {
        self.verified_threshold
    }

    pub fn source_component(&self, source: &str) -> u8 {
        let weight = self.source_weights
            .get(&source.trim().to_lowercase())
            .copied()
            .unwrap_or(DEFAULT_SOURCE_WEIGHT);
        scale(weight, SOURCE_MAX) as u8
    }

    pub fn status_component(&self, status: ReproductionStatus) -> u8 {
        scale(status_weight(status), STATUS_MAX) as u8
    }

    /// Sum of the scaled weights of every evidence file that exists and is
    /// non-empty, capped at [`EVIDENCE_MAX`].
    pub fn evidence_component(&self, evidence_paths: &BTreeMap<String, PathBuf>) -> u8 {
        let mut total = 0u32;
        for (kind, path) in evidence_paths {
            if path.as_os_str().is_empty() {
                continue;
            }
            let Some(weight) = EVIDENCE_WEIGHTS.iter().find(|(k, _)| *k == kind.as_str()).map(|(_, w)| *w) else {
                debug!(kind = %kind, "Ignoring unknown evidence kind");
                continue;
            };
            match std::fs::metadata(path) {
                Ok(meta) if meta.is_file() && meta.len() > 0 => total += scale(weight, EVIDENCE_MAX),
                _ => debug!(kind = %kind, path = %path.display(), "Evidence file missing or empty"),
            }
        }
        total.min(EVIDENCE_MAX) as u8
    }

    pub fn score(
        &self,
        source: &str,
        status: ReproductionStatus,
        evidence_paths: &BTreeMap<String, PathBuf>,
    ) -> ScoreBreakdown {
        let source = self.source_component(source);
        let status = self.status_component(status);
        let evidence = self.evidence_component(evidence_paths);
        let total = (u32::from(source) + u32::from(status) + u32::from(evidence)).min(100) as u8;
        debug!(total, source, status, evidence, "Reliability score calculated");
        ScoreBreakdown { source, status, evidence, total }
    }

    pub fn score_outcome(&self, source: &str, outcome: &ReproductionOutcome) -> ScoreBreakdown {
        self.score(source, outcome.status, &outcome.evidence.paths())
    }

    /// Score loosely-typed records. `poc_metadata.source` defaults to
    /// `other`; a missing or unrecognised `reproduction_result.status` counts
    /// as `failed`. Non-object records and non-string fields are errors.
    pub fn breakdown(
        &self,
        poc_metadata: &Value,
        reproduction_result: &Value,
        evidence_paths: &BTreeMap<String, PathBuf>,
    ) -> Result<ScoreBreakdown, V2rError> {
        let source = string_field(poc_metadata, "poc_metadata", "source")?.unwrap_or("other");
        let status = match string_field(reproduction_result, "reproduction_result", "status")? {
            Some(raw) => raw.parse::<ReproductionStatus>().unwrap_or_else(|_| {
                debug!(status = %raw, "Unrecognised reproduction status, scoring as failed");
                ReproductionStatus::Failed
            }),
            None => ReproductionStatus::Failed,
        };
        Ok(self.score(source, status, evidence_paths))
    }

    /// Total score in 0..=100. Malformed input scores 0 instead of failing.
    pub fn calculate_reliability_score(
        &self,
        poc_metadata: &Value,
        reproduction_result: &Value,
        evidence_paths: &BTreeMap<String, PathBuf>,
    ) -> u8 {
        match self.breakdown(poc_metadata, reproduction_result, evidence_paths) {
            Ok(breakdown) => breakdown.total,
            Err(e) => {
                warn!(error = %e, "Failed to calculate reliability score");
                0
            }
        }
    }

    pub fn verification_status(&self, score: u8) -> VerificationStatus {
        verification_status(score, self.verified_threshold)
    }
}

fn string_field<'a>(value: &'a Value, record: &str, field: &str) -> Result<Option<&'a str>, V2rError> {
    let object = value
        .as_object()
        .ok_or_else(|| V2rError::Scoring(format!("{} must be an object", record)))?;
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(V2rError::Scoring(format!("{}.{} must be a string, got {}", record, field, other))),
    }
}
