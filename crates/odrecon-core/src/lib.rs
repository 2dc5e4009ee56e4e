//! Reconstruction of a OneDrive client's folder hierarchy from forensic artifacts
//!
//! Two independent sources feed two independent outputs:
//! - the local cache artifact, scanned for GUID-tagged directory entries and
//!   assembled into a [`CacheTree`]
//! - the account's SQLite databases, joined into a [`SyncSnapshot`] of scope,
//!   file, folder and deleted-item records

use anyhow::{Context, Result};
use std::path::Path;

pub mod artifact;
pub mod cache;
pub mod config;
pub mod error;
pub mod sync;

pub use artifact::CacheArtifact;
pub use cache::{AssembledTree, CacheTree, DirectoryEntry, EntryKind};
pub use config::{OrphanPolicy, ReconConfig};
pub use error::{ReconError, SourceKind};
pub use sync::{reconstruct_sync, AccountProfile, SyncRecord, SyncSnapshot};

/// Map the artifact at `path` and assemble its directory tree
pub fn reconstruct_cache(path: &Path, config: &ReconConfig) -> Result<AssembledTree> {
    tracing::info!("Starting scan of {}", path.display());

    let artifact = CacheArtifact::open(path, config.max_artifact_bytes)
        .with_context(|| format!("Failed to open artifact {}", path.display()))?;

    let assembled = cache::reconstruct_tree(artifact.bytes(), config.orphan_policy)
        .with_context(|| format!("Failed to assemble tree from {}", artifact.path().display()))?;

    Ok(assembled)
}
