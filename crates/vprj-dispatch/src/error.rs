//! Error types and the single error-to-status mapping.

use std::io;

use thiserror::Error;

use crate::path::RelativePath;
use crate::status::Status;

/// Failures reported by the inode tree.
#[derive(Error, Debug)]
pub enum TreeError {
    #[error("No such file or directory: {0}")]
    NotFound(RelativePath),

    #[error("Not a directory: {0}")]
    NotADirectory(RelativePath),

    #[error("Not a regular file: {0}")]
    NotAFile(RelativePath),

    #[error("Already exists: {0}")]
    AlreadyExists(RelativePath),

    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(RelativePath),

    /// A failure that already knows which status the OS should see.
    #[error("{message} ({status})")]
    Explicit { status: Status, message: String },

    #[error("Backing store error: {0}")]
    Store(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TreeError {
    /// Only "not found" is recoverable at the dispatcher; everything else fails the call.
    pub fn is_not_found(&self) -> bool {
        match self {
            TreeError::NotFound(_) => true,
            TreeError::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

impl From<&TreeError> for Status {
    fn from(err: &TreeError) -> Self {
        match err {
            TreeError::NotFound(_) => Status::FILE_NOT_FOUND,
            TreeError::NotADirectory(_) => Status::DIRECTORY,
            TreeError::NotAFile(_) => Status::ACCESS_DENIED,
            TreeError::AlreadyExists(_) => Status::FILE_EXISTS,
            TreeError::DirectoryNotEmpty(_) => Status::DIR_NOT_EMPTY,
            TreeError::Explicit { status, .. } => *status,
            TreeError::Store(_) => Status::FAIL,
            TreeError::Io(e) => Status::from(e),
        }
    }
}

/// Everything that can go wrong inside a dispatcher entry point.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// A provider callback (placeholder write, data write, instance query) failed.
    #[error("Provider call failed: {0}")]
    Provider(Status),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Failed to allocate {0} byte aligned buffer")]
    OutOfMemory(usize),

    /// Broken invariant. Never expected under correct OS behaviour.
    #[error("Invariant violated: {0}")]
    Defect(String),

    #[error("Failed to render virtual file: {0}")]
    Synthesize(#[from] toml::ser::Error),
}

impl DispatchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DispatchError::Tree(e) if e.is_not_found())
    }
}

impl From<&DispatchError> for Status {
    fn from(err: &DispatchError) -> Self {
        match err {
            DispatchError::Tree(e) => Status::from(e),
            DispatchError::Provider(status) => *status,
            DispatchError::InvalidParameter(_) => Status::INVALID_PARAMETER,
            DispatchError::OutOfMemory(_) => Status::OUT_OF_MEMORY,
            DispatchError::Defect(_) => Status::UNEXPECTED,
            DispatchError::Synthesize(_) => Status::FAIL,
        }
    }
}

impl From<Status> for DispatchError {
    fn from(status: Status) -> Self {
        DispatchError::Provider(status)
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
