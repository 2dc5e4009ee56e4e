//! Error taxonomy for artifact and database reconstruction
//!
//! Every variant except `Io` and `ArtifactTooLarge` describes a failure local
//! to one record or one source. Callers skip, substitute or degrade; nothing
//! here aborts processing of sibling records.

use thiserror::Error;

/// Which relational source a failure belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    SyncEngine,
    SafeDelete,
    GraphMetadata,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::SyncEngine => write!(f, "SyncEngineDatabase.db"),
            SourceKind::SafeDelete => write!(f, "SafeDelete.db"),
            SourceKind::GraphMetadata => write!(f, "od_GraphMetadata_Records"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconError {
    /// Companion identifier could not be read (underflow or bad encoding)
    #[error("malformed record at offset {offset:#x}: {reason}")]
    MalformedRecord { offset: usize, reason: String },

    /// No UTF-16 name run follows the object identifier
    #[error("no decodable name after record at offset {offset:#x}")]
    MissingName { offset: usize },

    /// Database file missing, locked, or with an unexpected schema
    #[error("{source_kind} unavailable: {reason}")]
    SourceUnavailable {
        source_kind: SourceKind,
        reason: String,
    },

    /// Parent chain is cyclic or deeper than the configured bound
    #[error("unresolved ancestor chain for {id}")]
    UnresolvedAncestor { id: String },

    /// Records whose parent never appeared after the fix-point pass
    #[error("{count} orphan record(s) remain after assembly (first: {first})")]
    OrphanRecords { count: usize, first: String },

    #[error("artifact is {size} bytes, above the {limit} byte ceiling")]
    ArtifactTooLarge { size: u64, limit: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReconError {
    pub(crate) fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        ReconError::MalformedRecord {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn unavailable(source_kind: SourceKind, reason: impl std::fmt::Display) -> Self {
        ReconError::SourceUnavailable {
            source_kind,
            reason: reason.to_string(),
        }
    }
}
