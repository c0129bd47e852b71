use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use super::poc::PocRecord;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    /// Jobs whose reproduction hit an infrastructure failure.
    pub infrastructure_failures: usize,
    pub status_counts: BTreeMap<String, usize>,
    pub verified: usize,
    pub mean_score: f64,
}

pub fn compute_summary(records: &[PocRecord]) -> BatchSummary {
    let mut status_counts = BTreeMap::new();
    for record in records {
        *status_counts.entry(record.status.to_string()).or_insert(0) += 1;
    }

    let score_sum: u64 = records.iter().map(|r| u64::from(r.reliability_score)).sum();
    let mean_score = if records.is_empty() { 0.0 } else { score_sum as f64 / records.len() as f64 };

    BatchSummary {
        total: records.len(),
        infrastructure_failures: records.iter().filter(|r| !r.success).count(),
        status_counts,
        verified: records.iter()
            .filter(|r| r.verification_status == crate::scoring::VerificationStatus::Verified)
            .count(),
        mean_score,
    }
}
