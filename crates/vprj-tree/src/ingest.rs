//! Populating a tree from a directory on disk.

use std::path::Path;

use vprj_cas::CasStore;
use vprj_config::log_tree_info;
use vprj_dispatch::TreeError;
use walkdir::WalkDir;

use crate::{store_error, MemTree};

/// Counters reported after an ingest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub files: u64,
    pub directories: u64,
    pub bytes: u64,
    pub unique_blobs: u64,
}

impl IngestStats {
    /// Share of ingested files whose content was already stored.
    pub fn dedup_ratio(&self) -> f64 {
        if self.files == 0 {
            return 0.0;
        }
        100.0 * (1.0 - (self.unique_blobs as f64 / self.files as f64))
    }
}

impl MemTree {
    /// Store every regular file under `source` and build a tree mirroring it.
    ///
    /// Symlinks and other special files are skipped.
    pub fn ingest(source: &Path, cas: CasStore) -> Result<(MemTree, IngestStats), TreeError> {
        if !source.is_dir() {
            return Err(TreeError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Not a directory: {}", source.display()),
            )));
        }

        let tree = MemTree::new(cas);
        let mut stats = IngestStats::default();

        // Sorted so parents are always visited before their children.
        for entry in WalkDir::new(source).sort_by_file_name().min_depth(1) {
            let entry = entry.map_err(|e| TreeError::Store(format!("walk failed: {}", e)))?;
            let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
            let Some(relative) = relative.to_str() else {
                return Err(TreeError::Store(format!(
                    "non UTF-8 path: {}",
                    entry.path().display()
                )));
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                tree.add_dir(relative)?;
                stats.directories += 1;
            } else if file_type.is_file() {
                let put = tree.cas().put_file(entry.path()).map_err(store_error)?;
                if put.fresh {
                    stats.unique_blobs += 1;
                }
                tree.add_stored(relative, put.blob)?;
                stats.files += 1;
                stats.bytes += put.blob.size;
            }
        }

        log_tree_info!(
            "Ingest complete",
            source = %source.display(),
            files = stats.files,
            directories = stats.directories,
            bytes = stats.bytes,
            unique_blobs = stats.unique_blobs
        );
        Ok((tree, stats))
    }
}
