pub mod cli;
pub mod config;
pub mod container;
pub mod errors;
pub mod evidence;
pub mod models;
pub mod pipeline;
pub mod reproduction;
pub mod scoring;
pub mod utils;

pub use container::{ContainerRuntime, DockerRuntime, IsolationEnvironment, MemoryRuntime, RuntimeMode};
pub use errors::V2rError;
pub use evidence::EvidenceCollector;
pub use models::{ReproductionOutcome, ReproductionRequest, ReproductionStatus};
pub use pipeline::{PocJob, PocPipeline, PocRecord};
pub use reproduction::PocReproducer;
pub use scoring::ReliabilityScorer;
