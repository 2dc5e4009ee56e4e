//! Local cache artifact reconstruction
//!
//! Scanner -> Extractor -> Assembler. The artifact carries no magic number;
//! records are recognised solely by their GUID tags.

pub mod extract;
pub mod scanner;
pub mod tree;

pub use extract::{FieldExtractor, RecordIds};
pub use scanner::{RawRecordLocation, RecordScanner};
pub use tree::{
    AssembledTree, AssemblyStats, CacheTree, DirectoryEntry, EntryKind, NodeId, TreeAssembler,
};

use std::collections::HashSet;

use crate::config::OrphanPolicy;
use crate::ReconError;

/// Build the directory tree held in `buf`
///
/// The first parent identifier in the buffer becomes the synthetic root.
/// An empty identifier set yields an empty root.
pub fn reconstruct_tree(buf: &[u8], policy: OrphanPolicy) -> Result<AssembledTree, ReconError> {
    let extractor = FieldExtractor::new(buf);

    let folder_ids = extractor.collect_folder_ids();
    let root_id = folder_ids.first().cloned().unwrap_or_default();
    let folders: HashSet<String> = folder_ids.into_iter().collect();

    tracing::info!(
        "🔍 Pass 1 found {} folder identifiers; root {}",
        folders.len(),
        if root_id.is_empty() { "<none>" } else { root_id.as_str() }
    );

    let mut assembler = TreeAssembler::new(root_id);
    let mut malformed = 0usize;

    for loc in RecordScanner::new(buf) {
        match extractor.extract(&loc, &folders) {
            Ok(entry) => assembler.insert(entry),
            Err(e) => {
                malformed += 1;
                tracing::warn!("Skipping record: {}", e);
            }
        }
    }

    let assembled = assembler.finish(policy)?;

    tracing::info!(
        "✅ Assembled {} entries ({} deferred, {} orphaned, {} malformed)",
        assembled.tree.len() - 1,
        assembled.stats.deferred,
        assembled.stats.orphans,
        malformed
    );

    Ok(assembled)
}
