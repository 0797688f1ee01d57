//! Translation of OS change notifications into inode tree mutations.

use vprj_config::log_dispatch_debug;

use crate::error::{DispatchError, TreeError};
use crate::path::RelativePath;
use crate::status::Status;
use crate::tree::{Inode, InodeTree};

/// The notifications the dispatcher acts on. Every other OS code is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    NewFileCreated,
    FileOverwritten,
    FileRenamed,
    PreSetHardlink,
    FileHandleClosedFileModified,
    FileHandleClosedFileDeleted,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 6] = [
        NotificationKind::NewFileCreated,
        NotificationKind::FileOverwritten,
        NotificationKind::FileRenamed,
        NotificationKind::PreSetHardlink,
        NotificationKind::FileHandleClosedFileModified,
        NotificationKind::FileHandleClosedFileDeleted,
    ];

    /// The OS bit value for this notification.
    pub const fn code(self) -> u32 {
        match self {
            NotificationKind::NewFileCreated => 0x0000_0004,
            NotificationKind::FileOverwritten => 0x0000_0008,
            NotificationKind::PreSetHardlink => 0x0000_0040,
            NotificationKind::FileRenamed => 0x0000_0080,
            NotificationKind::FileHandleClosedFileModified => 0x0000_0400,
            NotificationKind::FileHandleClosedFileDeleted => 0x0000_0800,
        }
    }
}

impl TryFrom<u32> for NotificationKind {
    type Error = DispatchError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        NotificationKind::ALL
            .into_iter()
            .find(|kind| kind.code() == code)
            .ok_or_else(|| {
                DispatchError::InvalidParameter(format!("unhandled notification 0x{:x}", code))
            })
    }
}

/// Perform the tree mutation for one notification and wait for it.
///
/// `dest` is only meaningful for renames; an empty path on either side of a
/// rename means the file moved across the boundary of the projection.
pub async fn route<T: InodeTree>(
    tree: &T,
    kind: NotificationKind,
    path: &RelativePath,
    dest: &RelativePath,
    is_directory: bool,
) -> Result<(), TreeError> {
    match kind {
        NotificationKind::NewFileCreated => {
            log_dispatch_debug!("New file created", path = %path);
            create_file(tree, path, is_directory).await
        }
        NotificationKind::FileOverwritten => {
            log_dispatch_debug!("File overwritten", path = %path);
            materialize_file(tree, path).await
        }
        NotificationKind::FileHandleClosedFileModified => {
            log_dispatch_debug!("File handle closed after modification", path = %path);
            materialize_file(tree, path).await
        }
        NotificationKind::FileRenamed => {
            log_dispatch_debug!("File renamed", path = %path, dest = %dest);
            if path.is_empty() {
                create_file(tree, dest, is_directory).await
            } else if dest.is_empty() {
                remove_file(tree, path, is_directory).await
            } else {
                rename_file(tree, path, dest).await
            }
        }
        NotificationKind::FileHandleClosedFileDeleted => {
            log_dispatch_debug!("File handle closed after deletion", path = %path);
            remove_file(tree, path, is_directory).await
        }
        NotificationKind::PreSetHardlink => {
            log_dispatch_debug!("Hardlink refused", path = %path);
            Err(TreeError::Explicit {
                status: Status::ACCESS_DENIED,
                message: format!("Hardlinks are not supported: {}", path),
            })
        }
    }
}

async fn create_file<T: InodeTree>(
    tree: &T,
    path: &RelativePath,
    is_directory: bool,
) -> Result<(), TreeError> {
    let parent = tree.get_inode(&path.dirname()).await?;
    if is_directory {
        parent.mkdir(path.basename()).await
    } else {
        parent.mknod(path.basename()).await
    }
}

async fn materialize_file<T: InodeTree>(tree: &T, path: &RelativePath) -> Result<(), TreeError> {
    tree.get_inode(path).await?.materialize().await
}

async fn rename_file<T: InodeTree>(
    tree: &T,
    old: &RelativePath,
    new: &RelativePath,
) -> Result<(), TreeError> {
    let (old_dir, new_dir) = (old.dirname(), new.dirname());
    let (old_parent, new_parent) =
        tokio::try_join!(tree.get_inode(&old_dir), tree.get_inode(&new_dir))?;
    old_parent.rename(old.basename(), &new_parent, new.basename()).await
}

async fn remove_file<T: InodeTree>(
    tree: &T,
    path: &RelativePath,
    is_directory: bool,
) -> Result<(), TreeError> {
    let parent = tree.get_inode(&path.dirname()).await?;
    if is_directory {
        parent.rmdir(path.basename()).await
    } else {
        parent.unlink(path.basename()).await
    }
}
