use thiserror::Error;

#[derive(Debug, Error)]
pub enum V2rError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Container error: {0}")]
    Container(String),

    #[error("Image not found: {0}")]
    ImageNotFound(String),

    #[error("Container runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    #[error("Evidence error: {0}")]
    Evidence(String),

    #[error("Scoring error: {0}")]
    Scoring(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Docker error: {0}")]
    Docker(#[from] bollard::errors::Error),
}
