//! Sync engine database reconstruction
//!
//! Joiner -> Normaliser -> Deletion merger -> Path resolver. Each database is
//! an independent source: one being absent or unusable leaves the other's
//! records intact.

pub mod deleted;
pub mod normalize;
pub mod paths;
pub mod records;
pub mod sources;

pub use deleted::{merge_deletions, FilterDeleteRow, RecycleBinRow};
pub use normalize::PermissionSet;
pub use paths::PathResolver;
pub use records::{
    AccountProfile, DeletedRecord, FileRecord, FolderRecord, MediaBlock, ScopeRecord, SyncRecord,
};
pub use sources::{GraphMetadataRecord, SafeDeleteTables, SyncEngineTables};

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::config::ReconConfig;
use crate::error::SourceKind;
use crate::ReconError;

/// Everything recovered from one account's sync directory
#[derive(Debug, Clone, Serialize)]
pub struct SyncSnapshot {
    pub account: String,
    pub profile: AccountProfile,
    /// Scopes, then files, then folders
    pub records: Vec<SyncRecord>,
    pub deleted: Vec<DeletedRecord>,
    pub scopes: Vec<ScopeRecord>,
    /// Distinct scope identifiers in first-seen order
    pub scope_ids: Vec<String>,
    pub graph_metadata: Vec<GraphMetadataRecord>,
    /// Resource ids whose ancestor chain could not be resolved
    pub unresolved: Vec<String>,
}

impl SyncSnapshot {
    /// Record stream followed by the deletion stream
    pub fn all_records(&self) -> impl Iterator<Item = SyncRecord> + '_ {
        self.records
            .iter()
            .cloned()
            .chain(self.deleted.iter().cloned().map(SyncRecord::Deleted))
    }

    /// Identifiers a cache tree root may be confirmed against
    pub fn known_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.records.iter().filter_map(SyncRecord::resource_id)
    }
}

/// Union scope, file and folder rows into one normalised, path-annotated stream
///
/// Returns the stream and the resource ids whose paths could not be resolved.
pub fn join_records(
    tables: &SyncEngineTables,
    profile: AccountProfile,
    max_path_depth: usize,
) -> (Vec<SyncRecord>, Vec<String>) {
    let mut files: Vec<FileRecord> = tables.files.iter().map(|f| f.normalize(profile)).collect();
    let mut folders: Vec<FolderRecord> = tables.folders.iter().map(|f| f.normalize()).collect();

    let mut names = HashMap::new();
    let mut parents = HashMap::new();
    for (id, name, parent) in files
        .iter()
        .map(|f| (&f.resource_id, &f.name, &f.parent_resource_id))
        .chain(
            folders
                .iter()
                .map(|f| (&f.resource_id, &f.name, &f.parent_resource_id)),
        )
    {
        let Some(id) = id else { continue };
        if let Some(name) = name {
            names.insert(id.clone(), name.clone());
        }
        if let Some(parent) = parent {
            parents.insert(id.clone(), parent.clone());
        }
    }

    let resolver = PathResolver::new(names, parents, max_path_depth);
    let mut unresolved = Vec::new();
    let mut resolve = |id: &Option<String>, parent: &Option<String>| -> Option<String> {
        match resolver.resolve(parent.as_deref()) {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!("{}", e);
                unresolved.push(id.clone().unwrap_or_default());
                None
            }
        }
    };

    for file in &mut files {
        file.path = resolve(&file.resource_id, &file.parent_resource_id);
    }
    for folder in &mut folders {
        folder.path = resolve(&folder.resource_id, &folder.parent_resource_id);
    }

    let records = tables
        .scopes
        .iter()
        .map(|s| SyncRecord::Scope(s.normalize()))
        .chain(files.into_iter().map(SyncRecord::File))
        .chain(folders.into_iter().map(SyncRecord::Folder))
        .collect();

    (records, unresolved)
}

/// Rebuild the record table for the account directory `sync_dir`
///
/// Never fails: a missing or unusable database contributes nothing and is
/// logged.
pub fn reconstruct_sync(sync_dir: &Path, config: &ReconConfig) -> SyncSnapshot {
    let account = config.account_for(sync_dir);
    let profile = AccountProfile::from_account(&account);

    tracing::info!("Start parsing {} ({:?} profile)", account, profile);

    let engine_path = sync_dir.join(sources::SYNC_ENGINE_DB);
    let engine = degrade(
        &engine_path,
        sources::load_source(SourceKind::SyncEngine, &engine_path, sources::read_sync_engine),
    );

    let graph_metadata = if engine_path.is_file() {
        sources::load_source(
            SourceKind::GraphMetadata,
            &engine_path,
            sources::read_graph_metadata,
        )
        .unwrap_or_else(|e| {
            tracing::debug!("{}", e);
            Vec::new()
        })
    } else {
        Vec::new()
    };

    let safe_delete_path = sync_dir.join(sources::SAFE_DELETE_DB);
    let safe_delete = degrade(
        &safe_delete_path,
        sources::load_source(SourceKind::SafeDelete, &safe_delete_path, sources::read_safe_delete),
    );

    let (records, unresolved) = join_records(&engine, profile, config.max_path_depth);
    let scopes: Vec<ScopeRecord> = engine.scopes.iter().map(|s| s.normalize()).collect();

    let mut seen = HashSet::new();
    let scope_ids = scopes
        .iter()
        .filter(|s| seen.insert(s.scope_id.clone()))
        .map(|s| s.scope_id.clone())
        .collect();

    let deleted = merge_deletions(safe_delete.recycle_bin, safe_delete.filter_deletes);

    tracing::info!(
        "Parsed {}: {} records, {} deleted, {} graph metadata rows",
        account,
        records.len(),
        deleted.len(),
        graph_metadata.len()
    );

    SyncSnapshot {
        account,
        profile,
        records,
        deleted,
        scopes,
        scope_ids,
        graph_metadata,
        unresolved,
    }
}

/// Fall back to an empty table set, logging why
fn degrade<T: Default>(path: &Path, loaded: Result<T, ReconError>) -> T {
    match loaded {
        Ok(tables) => tables,
        Err(e) if !path.exists() => {
            tracing::info!("{}", e);
            T::default()
        }
        Err(e) => {
            tracing::warn!("Unable to parse {}. {}", path.display(), e);
            T::default()
        }
    }
}
