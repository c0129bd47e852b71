use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exit code reserved for failures of the isolation infrastructure itself.
pub const INFRASTRUCTURE_EXIT_CODE: i64 = -1;

/// Captured result of one command run inside an isolation environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
    /// `exit_code == 0`.
    pub success: bool,
    /// The command was cut off by the deadline watchdog.
    #[serde(default)]
    pub timed_out: bool,
}

impl ExecutionResult {
    pub fn new(exit_code: i64, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            success: exit_code == 0,
            timed_out: false,
        }
    }

    /// Result reported when the environment could not run the command at all.
    pub fn infrastructure_failure(message: impl Into<String>) -> Self {
        Self::new(INFRASTRUCTURE_EXIT_CODE, "", message)
    }

    pub fn deadline_exceeded(timeout: Duration) -> Self {
        Self {
            timed_out: true,
            ..Self::infrastructure_failure(format!(
                "Command timed out after {:.1}s; environment force-stopped",
                timeout.as_secs_f64()
            ))
        }
    }

    /// True for infrastructure failures, excluding deadline kills.
    pub fn is_infrastructure_failure(&self) -> bool {
        self.exit_code == INFRASTRUCTURE_EXIT_CODE && !self.timed_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_tracks_exit_code() {
        assert!(ExecutionResult::new(0, "ok", "").success);
        assert!(!ExecutionResult::new(2, "", "boom").success);
    }

    #[test]
    fn test_infrastructure_failure_shape() {
        let result = ExecutionResult::infrastructure_failure("socket closed");
        assert_eq!(result.exit_code, -1);
        assert_eq!(result.stderr, "socket closed");
        assert!(result.stdout.is_empty());
        assert!(result.is_infrastructure_failure());
    }

    #[test]
    fn test_deadline_is_not_infrastructure_failure() {
        let result = ExecutionResult::deadline_exceeded(Duration::from_secs(3));
        assert_eq!(result.exit_code, -1);
        assert!(result.timed_out);
        assert!(!result.is_infrastructure_failure());
        assert!(result.stderr.contains("3.0s"));
    }
}
