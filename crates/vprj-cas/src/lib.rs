//! # vprj-cas
//!
//! Content store holding the bytes behind every file in the projected tree.
//!
//! A blob is addressed by a [`BlobRef`]: its BLAKE3 hash plus its length.
//! The length lets the tree answer size queries without touching disk and
//! gives a cheap first check when a blob is read back. On disk, blobs fan
//! out over two directory levels taken from the hash:
//!
//! ```text
//! <root>/blake3/ab/cd/abcd1234...ef
//! ```

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, trace};

pub type Blake3Hash = [u8; 32];

const LAYOUT_DIR: &str = "blake3";

#[derive(Error, Debug)]
pub enum CasError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Blob {0} is not in the store")]
    Missing(BlobRef),

    #[error("Blob {blob} is corrupt: {reason}")]
    Corrupt { blob: BlobRef, reason: String },
}

pub type Result<T> = std::result::Result<T, CasError>;

/// Address of one stored blob.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobRef {
    pub hash: Blake3Hash,
    pub size: u64,
}

impl BlobRef {
    pub fn of(data: &[u8]) -> Self {
        Self {
            hash: *blake3::hash(data).as_bytes(),
            size: data.len() as u64,
        }
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.hash)
    }

    /// Parse `<hex>:<size>`, the form `Display` produces in full.
    pub fn parse(s: &str) -> Option<Self> {
        let (hex_part, size) = s.split_once(':')?;
        let mut hash = [0u8; 32];
        hex::decode_to_slice(hex_part, &mut hash).ok()?;
        Some(Self {
            hash,
            size: size.parse().ok()?,
        })
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            write!(f, "{}:{}", self.to_hex(), self.size)
        } else {
            write!(f, "{}..:{}", &self.to_hex()[..12], self.size)
        }
    }
}

impl fmt::Debug for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobRef({})", self)
    }
}

/// Result of a [`CasStore::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Put {
    pub blob: BlobRef,
    /// False when identical content was already stored.
    pub fresh: bool,
}

#[derive(Debug, Clone)]
pub struct CasStore {
    root: PathBuf,
}

impl CasStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(LAYOUT_DIR))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, blob: &BlobRef) -> PathBuf {
        let hex = blob.to_hex();
        self.root
            .join(LAYOUT_DIR)
            .join(&hex[..2])
            .join(&hex[2..4])
            .join(hex)
    }

    /// Store `data` unless identical content is already present.
    ///
    /// The blob is written to a temporary file beside its final location and
    /// renamed into place, so readers never observe a partial blob.
    pub fn put(&self, data: &[u8]) -> Result<Put> {
        let blob = BlobRef::of(data);
        let path = self.blob_path(&blob);
        if path.is_file() {
            trace!(blob = %blob, "Blob already stored");
            return Ok(Put { blob, fresh: false });
        }

        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir)?;
        let mut staging = tempfile::NamedTempFile::new_in(dir)?;
        staging.write_all(data)?;
        staging.as_file().sync_all()?;
        staging.persist(&path).map_err(|e| CasError::Io(e.error))?;

        debug!(blob = %blob, "Stored blob");
        Ok(Put { blob, fresh: true })
    }

    pub fn put_file<P: AsRef<Path>>(&self, path: P) -> Result<Put> {
        self.put(&fs::read(path)?)
    }

    /// Read a blob back, checking its length and hash.
    pub fn read(&self, blob: &BlobRef) -> Result<Vec<u8>> {
        let data = match fs::read(self.blob_path(blob)) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(CasError::Missing(*blob)),
            Err(e) => return Err(e.into()),
        };

        if data.len() as u64 != blob.size {
            return Err(CasError::Corrupt {
                blob: *blob,
                reason: format!("length {} on disk", data.len()),
            });
        }
        let actual = BlobRef::of(&data);
        if actual.hash != blob.hash {
            return Err(CasError::Corrupt {
                blob: *blob,
                reason: format!("content hashes to {}", actual.to_hex()),
            });
        }
        Ok(data)
    }

    pub fn contains(&self, blob: &BlobRef) -> bool {
        self.blob_path(blob).is_file()
    }

    pub fn remove(&self, blob: &BlobRef) -> Result<()> {
        match fs::remove_file(self.blob_path(blob)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(CasError::Missing(*blob)),
            Err(e) => Err(e.into()),
        }
    }
}
