/// Reconstruction configuration
use std::path::Path;

/// What to do with entries whose parent never shows up in the artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrphanPolicy {
    /// Log each orphan and hand them back beside the tree
    #[default]
    Report,
    /// Fail the assembly if any orphan remains after the fix-point pass
    Strict,
}

#[derive(Debug, Clone)]
pub struct ReconConfig {
    /// Artifacts larger than this are refused before mapping
    pub max_artifact_bytes: u64,
    pub orphan_policy: OrphanPolicy,
    /// Upper bound on ancestor hops when materialising a path
    pub max_path_depth: usize,
    /// Account name override; otherwise taken from the sync directory name
    pub account: Option<String>,
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            max_artifact_bytes: 4 * 1024 * 1024 * 1024, // 4GB
            orphan_policy: OrphanPolicy::Report,
            max_path_depth: 512,
            account: None,
        }
    }
}

impl ReconConfig {
    /// Account name for a sync directory: the override, or its last path component
    pub fn account_for(&self, sync_dir: &Path) -> String {
        if let Some(account) = &self.account {
            return account.clone();
        }

        // Artifacts collected on Windows keep backslash separators in the name
        let raw = sync_dir.to_string_lossy();
        raw.trim_end_matches(['/', '\\'])
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .to_string()
    }
}
