pub mod collector;

pub use collector::{
    CollectionSession, CollectionStatus, EvidenceCollector, EvidenceRequest, FilesystemState, TOOL_MISSING_EXIT,
};
