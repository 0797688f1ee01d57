//! Interface of the inode tree the dispatcher projects.
//!
//! All operations are asynchronous; the dispatcher drives them to completion
//! at its synchronous callback boundary.

use async_trait::async_trait;

use crate::error::TreeError;
use crate::path::RelativePath;

/// One directory entry, or the description of a single looked-up path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub name: String,
    pub is_directory: bool,
    pub size: u64,
}

impl FileMetadata {
    pub fn new(name: impl Into<String>, is_directory: bool, size: u64) -> Self {
        Self {
            name: name.into(),
            is_directory,
            size,
        }
    }

    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self::new(name, false, size)
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self::new(name, true, 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InodeStat {
    pub size: u64,
}

/// A resolved file or directory.
///
/// Directory mutations fail with [`TreeError::NotADirectory`] on file inodes;
/// `materialize` fails with [`TreeError::NotAFile`] on directories.
#[async_trait]
pub trait Inode: Send + Sync {
    /// Canonical path, in the tree's own casing.
    fn path(&self) -> RelativePath;

    fn is_dir(&self) -> bool;

    async fn stat(&self) -> Result<InodeStat, TreeError>;

    /// Force the file's content to be fully realized locally.
    async fn materialize(&self) -> Result<(), TreeError>;

    async fn mkdir(&self, name: &str) -> Result<(), TreeError>;

    /// Create an empty regular file.
    async fn mknod(&self, name: &str) -> Result<(), TreeError>;

    async fn unlink(&self, name: &str) -> Result<(), TreeError>;

    async fn rmdir(&self, name: &str) -> Result<(), TreeError>;

    /// Atomically move `name` from this directory to `new_name` in `new_parent`.
    async fn rename(&self, name: &str, new_parent: &Self, new_name: &str) -> Result<(), TreeError>;
}

#[async_trait]
pub trait InodeTree: Send + Sync {
    type Inode: Inode;

    /// Resolve a path, failing with a not-found error if it does not exist.
    async fn get_inode(&self, path: &RelativePath) -> Result<Self::Inode, TreeError>;

    /// Snapshot of a directory's entries, in the tree's order.
    async fn enumerate_directory(
        &self,
        path: &RelativePath,
    ) -> Result<Vec<FileMetadata>, TreeError>;

    /// Full content of a file.
    async fn read_file(&self, path: &RelativePath) -> Result<Vec<u8>, TreeError>;
}
