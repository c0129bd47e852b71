use serde::{Deserialize, Serialize};
use std::str::FromStr;
use crate::errors::V2rError;

/// Judged outcome of one reproduction attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReproductionStatus {
    /// The PoC demonstrated the vulnerability.
    Success,
    /// The PoC ran and reported progress but did not fully confirm impact.
    Partial,
    /// The PoC did not reproduce, or the infrastructure failed.
    Failed,
}

impl ReproductionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ReproductionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReproductionStatus {
    type Err = V2rError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "success" => Ok(Self::Success),
            "partial" => Ok(Self::Partial),
            "failed" => Ok(Self::Failed),
            other => Err(V2rError::InvalidRequest(format!("Unknown reproduction status: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&ReproductionStatus::Partial).unwrap();
        assert_eq!(json, "\"partial\"");
    }

    #[test]
    fn test_status_from_str_case_insensitive() {
        assert_eq!("SUCCESS".parse::<ReproductionStatus>().unwrap(), ReproductionStatus::Success);
        assert_eq!(" failed ".parse::<ReproductionStatus>().unwrap(), ReproductionStatus::Failed);
        assert!("crashed".parse::<ReproductionStatus>().is_err());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(format!("{}", ReproductionStatus::Success), "success");
    }
}
