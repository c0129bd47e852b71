pub mod types;
pub mod classification;

pub use types::V2rError;
pub use classification::ErrorClassification;
