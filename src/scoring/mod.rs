pub mod reliability;

pub use reliability::{
    reliability_level, verification_status, ReliabilityLevel, ReliabilityScorer, ScoreBreakdown,
    VerificationStatus,
};
