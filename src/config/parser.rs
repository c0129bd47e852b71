use std::path::Path;
use crate::errors::V2rError;
use super::types::V2rConfig;
use super::security::validate_security_patterns;
use super::schema::CONFIG_SCHEMA;
use tracing::{debug, warn};

pub async fn parse_config(path: &Path) -> Result<V2rConfig, V2rError> {
    if !path.exists() {
        return Err(V2rError::Config(format!("Config file not found: {}", path.display())));
    }

    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() > 1_048_576 {
        return Err(V2rError::Config("Config file exceeds 1MB limit".into()));
    }

    let content = tokio::fs::read_to_string(path).await?;
    parse_config_str(&content)
}

/// Load the config at `path`, or the built-in defaults when no path is given.
pub async fn load_config(path: Option<&Path>) -> Result<V2rConfig, V2rError> {
    match path {
        Some(p) => parse_config(p).await,
        None => {
            debug!("No config file given, using defaults");
            Ok(V2rConfig::default())
        }
    }
}

pub fn parse_config_str(content: &str) -> Result<V2rConfig, V2rError> {
    // An empty document is a valid "all defaults" config.
    if content.trim().is_empty() {
        return Ok(V2rConfig::default());
    }

    let yaml: serde_yaml::Value = serde_yaml::from_str(content)?;

    validate_security_patterns(&yaml)?;
    validate_schema(&yaml)?;

    let config: V2rConfig = serde_yaml::from_value(yaml)?;

    validate_semantics(&config)?;

    Ok(config)
}

/// Validate config against the JSON schema for structural correctness.
fn validate_schema(yaml: &serde_yaml::Value) -> Result<(), V2rError> {
    let json_str = serde_json::to_string(yaml)
        .map_err(|e| V2rError::Config(format!("Config conversion error: {}", e)))?;
    let json_value: serde_json::Value = serde_json::from_str(&json_str)
        .map_err(|e| V2rError::Config(format!("Config conversion error: {}", e)))?;

    let compiled = jsonschema::JSONSchema::compile(&CONFIG_SCHEMA)
        .map_err(|e| V2rError::Config(format!("Schema compilation error: {}", e)))?;

    let result = compiled.validate(&json_value);
    if let Err(errors) = result {
        // Advisory only; typed deserialization and semantic checks are authoritative.
        for e in errors {
            warn!(validation_error = %format!("{} at {}", e, e.instance_path), "Config schema warning");
        }
    }

    Ok(())
}

/// Reject values that deserialize fine but cannot be used.
fn validate_semantics(config: &V2rConfig) -> Result<(), V2rError> {
    if let Some(isolation) = &config.isolation {
        if isolation.image.as_ref().is_some_and(|i| i.trim().is_empty()) {
            return Err(V2rError::Config("isolation.image must not be empty".into()));
        }
        if let Some(prefix) = &isolation.name_prefix {
            let valid = prefix.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
                && prefix.chars().all(|c| c.is_ascii_alphanumeric() || "_.-".contains(c));
            if !valid {
                return Err(V2rError::Config(format!(
                    "isolation.name_prefix '{}' is not a valid container name prefix",
                    prefix
                )));
            }
        }
    }

    if let Some(reproduction) = &config.reproduction {
        if reproduction.timeout_secs == Some(0) {
            return Err(V2rError::Config("reproduction.timeout_secs must be greater than 0".into()));
        }
        if reproduction.interpreter.as_ref().is_some_and(|i| i.trim().is_empty()) {
            return Err(V2rError::Config("reproduction.interpreter must not be empty".into()));
        }
    }

    if let Some(evidence) = &config.evidence {
        if evidence.capture_secs == Some(0) {
            return Err(V2rError::Config("evidence.capture_secs must be greater than 0".into()));
        }
    }

    if let Some(scoring) = &config.scoring {
        if scoring.verified_threshold.is_some_and(|t| t > 100) {
            return Err(V2rError::Config("scoring.verified_threshold must be within 0-100".into()));
        }
        if let Some(weights) = &scoring.source_weights {
            if let Some((source, weight)) = weights.iter().find(|(_, w)| **w > 100) {
                return Err(V2rError::Config(format!(
                    "scoring.source_weights.{} = {} exceeds 100",
                    source, weight
                )));
            }
        }
    }

    Ok(())
}
