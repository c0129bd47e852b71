use std::collections::HashMap;
use std::sync::Arc;

use crate::config::V2rConfig;
use crate::models::{ExecutionResult, ReproductionStatus, INFRASTRUCTURE_EXIT_CODE};

/// Words in stdout that suggest a PoC ran to completion even when it exited
/// non-zero. Matched case-insensitively.
pub const DEFAULT_SUCCESS_KEYWORDS: &[&str] = &["성공", "success", "완료", "executed", "completed"];

/// Built-in indicator words per poc_type, matched against stdout and stderr.
pub const DEFAULT_TYPE_KEYWORDS: &[(&str, &[&str])] = &[
    ("command_injection", &["command", "executed", "output"]),
    ("sql_injection", &["sql", "query", "result"]),
    ("rce", &["remote", "code", "execution"]),
    ("xss", &["script", "alert", "xss"]),
];

/// Decides the reproduction status from what the script did.
///
/// This is a heuristic, not an oracle: output that merely mentions a
/// keyword (an error message containing "executed", say) can classify as a
/// success.
pub trait StatusClassifier: Send + Sync {
    fn classify(&self, result: &ExecutionResult, poc_type: &str) -> ReproductionStatus;
}

/// Keyword-table classifier.
///
/// - exit code -1 (infrastructure failure or deadline kill): `Failed`
/// - exit code 0: `Success`
/// - non-zero exit with a success keyword in stdout: `Success` when the
///   poc_type has no keyword list or one of its keywords appears, else
///   `Partial`
/// - anything else: `Failed`
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    success_keywords: Vec<String>,
    type_keywords: HashMap<String, Vec<String>>,
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self {
            success_keywords: DEFAULT_SUCCESS_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            type_keywords: DEFAULT_TYPE_KEYWORDS
                .iter()
                .map(|(t, kws)| (t.to_string(), kws.iter().map(|k| k.to_string()).collect()))
                .collect(),
        }
    }
}

impl KeywordClassifier {
    pub fn from_config(config: &V2rConfig) -> Self {
        let classification = config.classification();
        let mut classifier = Self::default();
        if let Some(keywords) = classification.success_keywords {
            classifier.success_keywords = keywords.iter().map(|k| k.to_lowercase()).collect();
        }
        for (poc_type, keywords) in classification.poc_types.unwrap_or_default() {
            classifier = classifier.with_type_keywords(&poc_type, keywords);
        }
        classifier
    }

    /// Add or replace the keyword list for `poc_type`.
    pub fn with_type_keywords<I, S>(mut self, poc_type: &str, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.type_keywords.insert(
            poc_type.to_lowercase(),
            keywords.into_iter().map(|k| k.as_ref().to_lowercase()).collect(),
        );
        self
    }

    pub fn type_keywords(&self, poc_type: &str) -> Option<&[String]> {
        self.type_keywords.get(&poc_type.to_lowercase()).map(Vec::as_slice)
    }

    fn has_success_keyword(&self, stdout: &str) -> bool {
        self.success_keywords.iter().any(|k| stdout.contains(k.as_str()))
    }

    fn matches_type(&self, poc_type: &str, stdout: &str, stderr: &str) -> bool {
        match self.type_keywords(poc_type) {
            None => true,
            Some(keywords) => keywords.iter().any(|k| stdout.contains(k.as_str()) || stderr.contains(k.as_str())),
        }
    }
}

impl StatusClassifier for KeywordClassifier {
    fn classify(&self, result: &ExecutionResult, poc_type: &str) -> ReproductionStatus {
        if result.exit_code == INFRASTRUCTURE_EXIT_CODE || result.timed_out {
            return ReproductionStatus::Failed;
        }
        if result.exit_code == 0 {
            return ReproductionStatus::Success;
        }

        let stdout = result.stdout.to_lowercase();
        if !self.has_success_keyword(&stdout) {
            return ReproductionStatus::Failed;
        }
        let stderr = result.stderr.to_lowercase();
        if self.matches_type(poc_type, &stdout, &stderr) {
            ReproductionStatus::Success
        } else {
            ReproductionStatus::Partial
        }
    }
}

/// Per-poc_type classifier lookup with a fallback for unregistered types.
#[derive(Clone)]
pub struct ClassifierRegistry {
    fallback: Arc<dyn StatusClassifier>,
    by_type: HashMap<String, Arc<dyn StatusClassifier>>,
}

impl ClassifierRegistry {
    pub fn new(fallback: Arc<dyn StatusClassifier>) -> Self {
        Self { fallback, by_type: HashMap::new() }
    }

    pub fn from_config(config: &V2rConfig) -> Self {
        Self::new(Arc::new(KeywordClassifier::from_config(config)))
    }

    pub fn register(&mut self, poc_type: &str, classifier: Arc<dyn StatusClassifier>) {
        self.by_type.insert(poc_type.to_lowercase(), classifier);
    }

    pub fn classify(&self, result: &ExecutionResult, poc_type: &str) -> ReproductionStatus {
        self.by_type
            .get(&poc_type.to_lowercase())
            .unwrap_or(&self.fallback)
            .classify(result, poc_type)
    }
}

impl Default for ClassifierRegistry {
    fn default() -> Self {
        Self::new(Arc::new(KeywordClassifier::default()))
    }
}

impl std::fmt::Debug for ClassifierRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&String> = self.by_type.keys().collect();
        types.sort();
        f.debug_struct("ClassifierRegistry").field("registered", &types).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn run(code: i64, stdout: &str, stderr: &str) -> ExecutionResult {
        ExecutionResult::new(code, stdout, stderr)
    }

    #[test]
    fn test_exit_zero_is_success_without_keywords() {
        let c = KeywordClassifier::default();
        assert_eq!(c.classify(&run(0, "", ""), "test"), ReproductionStatus::Success);
        assert_eq!(c.classify(&run(0, "nothing", ""), "rce"), ReproductionStatus::Success);
    }

    #[test]
    fn test_minus_one_is_always_failed() {
        let c = KeywordClassifier::default();
        assert_eq!(c.classify(&run(-1, "success executed", ""), "test"), ReproductionStatus::Failed);
        let timed_out = ExecutionResult::deadline_exceeded(Duration::from_secs(1));
        assert_eq!(c.classify(&timed_out, "test"), ReproductionStatus::Failed);
    }

    #[test]
    fn test_nonzero_without_keyword_is_failed() {
        let c = KeywordClassifier::default();
        assert_eq!(c.classify(&run(1, "", "Traceback"), "test"), ReproductionStatus::Failed);
        assert_eq!(c.classify(&run(2, "some output", ""), "rce"), ReproductionStatus::Failed);
    }

    #[test]
    fn test_keyword_with_matching_type_indicators() {
        let c = KeywordClassifier::default();
        let result = run(1, "Remote code execution SUCCESS", "");
        assert_eq!(c.classify(&result, "rce"), ReproductionStatus::Success);
        assert_eq!(c.classify(&result, "RCE"), ReproductionStatus::Success);
    }

    #[test]
    fn test_keyword_without_type_indicators_is_partial() {
        let c = KeywordClassifier::default();
        let result = run(1, "payload completed", "");
        assert_eq!(c.classify(&result, "sql_injection"), ReproductionStatus::Partial);
    }

    #[test]
    fn test_type_indicator_may_come_from_stderr() {
        let c = KeywordClassifier::default();
        let result = run(1, "공격 성공", "SQL syntax error near query");
        assert_eq!(c.classify(&result, "sql_injection"), ReproductionStatus::Success);
    }

    #[test]
    fn test_unlisted_type_accepts_success_keyword() {
        let c = KeywordClassifier::default();
        assert_eq!(c.classify(&run(3, "done: success", ""), "deserialization"), ReproductionStatus::Success);
    }

    #[test]
    fn test_config_overrides() {
        let mut config = V2rConfig::default();
        let mut classification = config.classification();
        classification.success_keywords = Some(vec!["PWNED".into()]);
        classification.poc_types = Some(HashMap::from([("ssrf".to_string(), vec!["metadata".to_string()])]));
        config.classification = Some(classification);

        let c = KeywordClassifier::from_config(&config);
        assert_eq!(c.classify(&run(1, "pwned instance metadata", ""), "ssrf"), ReproductionStatus::Success);
        assert_eq!(c.classify(&run(1, "pwned", ""), "ssrf"), ReproductionStatus::Partial);
        assert_eq!(c.classify(&run(1, "success", ""), "ssrf"), ReproductionStatus::Failed);
        assert!(c.type_keywords("rce").is_some());
    }

    struct AlwaysPartial;

    impl StatusClassifier for AlwaysPartial {
        fn classify(&self, _: &ExecutionResult, _: &str) -> ReproductionStatus {
            ReproductionStatus::Partial
        }
    }

    #[test]
    fn test_registry_dispatches_by_type() {
        let mut registry = ClassifierRegistry::default();
        registry.register("Fuzz", Arc::new(AlwaysPartial));
        assert_eq!(registry.classify(&run(0, "", ""), "fuzz"), ReproductionStatus::Partial);
        assert_eq!(registry.classify(&run(0, "", ""), "rce"), ReproductionStatus::Success);
    }
}
