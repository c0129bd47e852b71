pub mod metrics;
pub mod poc;

pub use metrics::{compute_summary, BatchSummary};
pub use poc::{PocJob, PocMetadataRecord, PocPipeline, PocRecord};
