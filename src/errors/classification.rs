use super::types::V2rError;

#[derive(Debug, Clone)]
pub struct ErrorClassification {
    pub error_type: &'static str,
    /// Whether the error belongs to the isolation infrastructure rather than
    /// to the caller's input or configuration.
    pub infrastructure: bool,
}

impl V2rError {
    /// Classify this error so failed outcomes can carry a stable type tag.
    pub fn classify(&self) -> ErrorClassification {
        match self {
            // Infrastructure errors
            V2rError::Container(_) => ErrorClassification {
                error_type: "ContainerError",
                infrastructure: true,
            },
            V2rError::ImageNotFound(_) => ErrorClassification {
                error_type: "ImageNotFoundError",
                infrastructure: true,
            },
            V2rError::RuntimeUnavailable(_) => ErrorClassification {
                error_type: "RuntimeUnavailableError",
                infrastructure: true,
            },
            V2rError::Docker(_) => ErrorClassification {
                error_type: "DockerError",
                infrastructure: true,
            },
            V2rError::Io(_) => ErrorClassification {
                error_type: "IoError",
                infrastructure: true,
            },
            V2rError::Evidence(_) => ErrorClassification {
                error_type: "EvidenceError",
                infrastructure: true,
            },

            // Caller-side errors
            V2rError::Config(_) => ErrorClassification {
                error_type: "ConfigError",
                infrastructure: false,
            },
            V2rError::InvalidRequest(_) => ErrorClassification {
                error_type: "InvalidRequestError",
                infrastructure: false,
            },
            V2rError::Scoring(_) => ErrorClassification {
                error_type: "ScoringError",
                infrastructure: false,
            },
            V2rError::Json(_) => ErrorClassification {
                error_type: "JsonError",
                infrastructure: false,
            },
            V2rError::Yaml(_) => ErrorClassification {
                error_type: "YamlError",
                infrastructure: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_error_is_infrastructure() {
        let err = V2rError::Container("exec failed".into());
        let class = err.classify();
        assert!(class.infrastructure);
        assert_eq!(class.error_type, "ContainerError");
    }

    #[test]
    fn test_runtime_unavailable_is_infrastructure() {
        let err = V2rError::RuntimeUnavailable("no socket".into());
        let class = err.classify();
        assert!(class.infrastructure);
        assert_eq!(class.error_type, "RuntimeUnavailableError");
    }

    #[test]
    fn test_config_error_not_infrastructure() {
        let err = V2rError::Config("invalid config".into());
        let class = err.classify();
        assert!(!class.infrastructure);
        assert_eq!(class.error_type, "ConfigError");
    }

    #[test]
    fn test_invalid_request_not_infrastructure() {
        let err = V2rError::InvalidRequest("empty script".into());
        assert!(!err.classify().infrastructure);
    }

    #[test]
    fn test_evidence_error_is_infrastructure() {
        let class = V2rError::Evidence("listing failed".into()).classify();
        assert!(class.infrastructure);
        assert_eq!(class.error_type, "EvidenceError");
    }

    #[test]
    fn test_image_not_found_type() {
        let err = V2rError::ImageNotFound("python:3.11-slim".into());
        assert_eq!(err.classify().error_type, "ImageNotFoundError");
    }
}
