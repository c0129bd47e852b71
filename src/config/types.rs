use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_IMAGE: &str = "python:3.11-slim";
pub const DEFAULT_NAME_PREFIX: &str = "v2r-poc";
pub const DEFAULT_EVIDENCE_DIR: &str = "./evidence";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_STOP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CAPTURE_SECS: u64 = 5;
pub const DEFAULT_VERIFIED_THRESHOLD: u8 = 70;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct V2rConfig {
    pub isolation: Option<IsolationConfig>,
    pub evidence: Option<EvidenceConfig>,
    pub reproduction: Option<ReproductionConfig>,
    pub classification: Option<ClassificationConfig>,
    pub scoring: Option<ScoringConfig>,
}

impl V2rConfig {
    pub fn isolation(&self) -> IsolationConfig {
        self.isolation.clone().unwrap_or_default()
    }

    pub fn evidence(&self) -> EvidenceConfig {
        self.evidence.clone().unwrap_or_default()
    }

    pub fn reproduction(&self) -> ReproductionConfig {
        self.reproduction.clone().unwrap_or_default()
    }

    pub fn classification(&self) -> ClassificationConfig {
        self.classification.clone().unwrap_or_default()
    }

    pub fn scoring(&self) -> ScoringConfig {
        self.scoring.clone().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IsolationConfig {
    /// Base image every reproduction container is created from.
    pub image: Option<String>,
    /// Prefix for container names; the reproduction id is appended.
    pub name_prefix: Option<String>,
    /// Fail construction when the runtime is unreachable instead of degrading.
    pub strict: Option<bool>,
    pub stop_timeout_secs: Option<u64>,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            image: Some(DEFAULT_IMAGE.to_string()),
            name_prefix: Some(DEFAULT_NAME_PREFIX.to_string()),
            strict: Some(false),
            stop_timeout_secs: Some(DEFAULT_STOP_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EvidenceConfig {
    pub directory: Option<String>,
    pub syscalls: Option<bool>,
    pub network: Option<bool>,
    pub fs_diff: Option<bool>,
    /// How long the network capture runs inside the environment.
    pub capture_secs: Option<u64>,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            directory: Some(DEFAULT_EVIDENCE_DIR.to_string()),
            syscalls: Some(true),
            network: Some(true),
            fs_diff: Some(true),
            capture_secs: Some(DEFAULT_CAPTURE_SECS),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReproductionConfig {
    pub timeout_secs: Option<u64>,
    pub network_enabled: Option<bool>,
    pub interpreter: Option<String>,
    /// Modules the PoC may import; each is checked and installed best-effort.
    pub dependencies: Option<Vec<String>>,
    /// Directory inside the environment the script is written to.
    pub script_dir: Option<String>,
}

impl Default for ReproductionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: Some(DEFAULT_TIMEOUT_SECS),
            network_enabled: Some(true),
            interpreter: Some("python3".to_string()),
            dependencies: Some(vec!["requests".to_string()]),
            script_dir: Some("/tmp".to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ClassificationConfig {
    /// Replaces the built-in success keyword list when set.
    pub success_keywords: Option<Vec<String>>,
    /// Extra or overriding keyword lists keyed by poc_type.
    pub poc_types: Option<HashMap<String, Vec<String>>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScoringConfig {
    pub verified_threshold: Option<u8>,
    /// Extra or overriding source weights (0-100) keyed by lowercase source.
    pub source_weights: Option<HashMap<String, u8>>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            verified_threshold: Some(DEFAULT_VERIFIED_THRESHOLD),
            source_weights: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v2r_config_default() {
        let config = V2rConfig::default();
        assert!(config.isolation.is_none());
        assert!(config.evidence.is_none());
        assert!(config.scoring.is_none());
    }

    #[test]
    fn test_section_accessors_fall_back_to_defaults() {
        let config = V2rConfig::default();
        assert_eq!(config.isolation().image.as_deref(), Some(DEFAULT_IMAGE));
        assert_eq!(config.reproduction().timeout_secs, Some(300));
        assert_eq!(config.scoring().verified_threshold, Some(70));
    }

    #[test]
    fn test_isolation_config_defaults() {
        let config = IsolationConfig::default();
        assert_eq!(config.image, Some("python:3.11-slim".to_string()));
        assert_eq!(config.name_prefix, Some("v2r-poc".to_string()));
        assert_eq!(config.strict, Some(false));
        assert_eq!(config.stop_timeout_secs, Some(10));
    }

    #[test]
    fn test_evidence_config_defaults_enable_everything() {
        let config = EvidenceConfig::default();
        assert_eq!(config.syscalls, Some(true));
        assert_eq!(config.network, Some(true));
        assert_eq!(config.fs_diff, Some(true));
    }

    #[test]
    fn test_reproduction_config_requires_requests() {
        let config = ReproductionConfig::default();
        assert!(config.dependencies.unwrap().contains(&"requests".to_string()));
    }

    #[test]
    fn test_partial_section_deserializes() {
        let parsed: IsolationConfig = serde_yaml::from_str("image: alpine:3.19").unwrap();
        assert_eq!(parsed.image.as_deref(), Some("alpine:3.19"));
        assert!(parsed.name_prefix.is_none());
    }
}
