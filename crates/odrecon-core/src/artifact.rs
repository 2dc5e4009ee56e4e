/// Read-only access to the sync client's local cache artifact
use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::ReconError;

/// A memory-mapped cache artifact
pub struct CacheArtifact {
    path: PathBuf,
    // Zero-length files cannot be mapped
    mmap: Option<Mmap>,
}

impl CacheArtifact {
    /// Open an artifact, refusing files above `max_bytes`
    pub fn open<P: AsRef<Path>>(path: P, max_bytes: u64) -> Result<Self, ReconError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let size = file.metadata()?.len();

        if size > max_bytes {
            return Err(ReconError::ArtifactTooLarge {
                size,
                limit: max_bytes,
            });
        }

        let mmap = if size == 0 {
            None
        } else {
            Some(unsafe { MmapOptions::new().map(&file)? })
        };

        tracing::debug!("Mapped artifact {} ({} bytes)", path.display(), size);

        Ok(CacheArtifact { path, mmap })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the size of the artifact in bytes
    pub fn size(&self) -> u64 {
        self.bytes().len() as u64
    }

    pub fn bytes(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }
}
