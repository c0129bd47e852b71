pub mod classifier;
pub mod reproducer;

pub use classifier::{ClassifierRegistry, KeywordClassifier, StatusClassifier};
pub use reproducer::{resolve_script, PocReproducer, ReproducerSettings};
