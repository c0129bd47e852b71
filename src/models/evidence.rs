use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Kinds of diagnostic artifact a reproduction can leave behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    Syscalls,
    Network,
    FsDiff,
    Screenshot,
}

impl EvidenceKind {
    pub const COLLECTED: [EvidenceKind; 3] = [Self::Syscalls, Self::Network, Self::FsDiff];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Syscalls => "syscalls",
            Self::Network => "network",
            Self::FsDiff => "fs_diff",
            Self::Screenshot => "screenshot",
        }
    }

    /// Local file name for this artifact: `{reproduction_id}_{artifact}.{ext}`.
    pub fn file_name(&self, reproduction_id: &str) -> String {
        let suffix = match self {
            Self::Syscalls => "syscalls.log",
            Self::Network => "network.pcap",
            Self::FsDiff => "fs_diff.txt",
            Self::Screenshot => "screenshot.png",
        };
        format!("{}_{}", reproduction_id, suffix)
    }
}

impl std::fmt::Display for EvidenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Paths to whatever evidence was obtained. Every field is independently
/// optional; `None` means the tool was unavailable or collection failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceBundle {
    pub syscalls_path: Option<PathBuf>,
    pub network_path: Option<PathBuf>,
    pub fs_diff_path: Option<PathBuf>,
    /// Why a requested artifact is missing, keyed by evidence kind name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub notes: BTreeMap<String, String>,
}

impl EvidenceBundle {
    pub fn get(&self, kind: EvidenceKind) -> Option<&PathBuf> {
        match kind {
            EvidenceKind::Syscalls => self.syscalls_path.as_ref(),
            EvidenceKind::Network => self.network_path.as_ref(),
            EvidenceKind::FsDiff => self.fs_diff_path.as_ref(),
            EvidenceKind::Screenshot => None,
        }
    }

    pub fn set(&mut self, kind: EvidenceKind, path: PathBuf) {
        match kind {
            EvidenceKind::Syscalls => self.syscalls_path = Some(path),
            EvidenceKind::Network => self.network_path = Some(path),
            EvidenceKind::FsDiff => self.fs_diff_path = Some(path),
            EvidenceKind::Screenshot => {}
        }
    }

    pub fn note(&mut self, kind: EvidenceKind, reason: impl Into<String>) {
        self.notes.insert(kind.as_str().to_string(), reason.into());
    }

    /// Evidence-type name to local path, only for artifacts that were obtained.
    pub fn paths(&self) -> BTreeMap<String, PathBuf> {
        EvidenceKind::COLLECTED
            .iter()
            .filter_map(|kind| self.get(*kind).map(|p| (kind.as_str().to_string(), p.clone())))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.syscalls_path.is_none() && self.network_path.is_none() && self.fs_diff_path.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names_follow_artifact_convention() {
        assert_eq!(EvidenceKind::Syscalls.file_name("poc_1"), "poc_1_syscalls.log");
        assert_eq!(EvidenceKind::Network.file_name("poc_1"), "poc_1_network.pcap");
        assert_eq!(EvidenceKind::FsDiff.file_name("poc_1"), "poc_1_fs_diff.txt");
    }

    #[test]
    fn test_paths_only_lists_obtained_artifacts() {
        let mut bundle = EvidenceBundle::default();
        bundle.set(EvidenceKind::Syscalls, PathBuf::from("/e/a_syscalls.log"));
        bundle.note(EvidenceKind::Network, "tcpdump not available");

        let paths = bundle.paths();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths["syscalls"], PathBuf::from("/e/a_syscalls.log"));
        assert!(!paths.contains_key("network"));
        assert_eq!(bundle.notes["network"], "tcpdump not available");
    }

    #[test]
    fn test_empty_bundle() {
        let bundle = EvidenceBundle::default();
        assert!(bundle.is_empty());
        assert!(bundle.paths().is_empty());
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&EvidenceKind::FsDiff).unwrap(), "\"fs_diff\"");
    }
}
