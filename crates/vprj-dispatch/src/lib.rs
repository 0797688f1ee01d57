//! # vprj-dispatch
//!
//! Callback dispatcher between an OS projected-filesystem provider and the
//! vprj inode tree.
//!
//! The OS calls [`Dispatcher`] synchronously from its own worker threads to
//! list directories, describe paths, fetch file bytes and report changes.
//! The dispatcher answers from an asynchronous [`InodeTree`], writes results
//! back through a [`ProviderContext`], and always returns a [`Status`].
//!
//! ## Layout
//!
//! - `session`: enumeration snapshots and the shared session table
//! - `virtual_file`: the in-memory `.vprj/config` file
//! - `transfer`: alignment-aware chunked data delivery
//! - `notify`: notification kind to tree mutation routing
//! - `dispatcher`: the entry points and the error-to-status boundary

pub mod dispatcher;
pub mod error;
pub mod notify;
pub mod path;
pub mod provider;
pub mod session;
pub mod status;
pub mod transfer;
pub mod tree;
pub mod virtual_file;

pub use dispatcher::Dispatcher;
pub use error::{DispatchError, Result, TreeError};
pub use notify::NotificationKind;
pub use path::RelativePath;
pub use provider::{
    BasicInfo, CallbackData, CallbackFlags, DirEntryBuffer, InstanceInfo, PlaceholderInfo,
    ProviderContext,
};
pub use session::{EnumerationSession, SessionTable};
pub use status::Status;
pub use transfer::{ChunkedTransfer, TransferLimits, TransferPlan};
pub use tree::{FileMetadata, Inode, InodeStat, InodeTree};
pub use virtual_file::{MountIdentity, VirtualFile, VIRTUAL_CONFIG_PATH};
