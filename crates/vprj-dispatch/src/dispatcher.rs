//! OS callback entry points.
//!
//! Every entry point is synchronous and returns a [`Status`]. Work against the
//! inode tree is asynchronous and is driven to completion on the calling
//! thread before the entry point returns. Errors and panics are converted to
//! a status at the boundary and never reach the OS.

use std::borrow::Cow;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};

use tokio::runtime::Handle;
use uuid::Uuid;
use vprj_config::{
    log_dispatch_debug, log_dispatch_error, log_dispatch_info, log_dispatch_trace,
    log_dispatch_warn,
};

use crate::error::{DispatchError, Result, TreeError};
use crate::notify::{self, NotificationKind};
use crate::path::RelativePath;
use crate::provider::{BasicInfo, CallbackData, DirEntryBuffer, PlaceholderInfo, ProviderContext};
use crate::session::{EnumerationSession, SessionTable};
use crate::status::Status;
use crate::transfer::{ChunkedTransfer, TransferLimits};
use crate::tree::{FileMetadata, Inode, InodeTree};
use crate::virtual_file::{MountIdentity, VirtualFile};

/// Pattern assumed when the OS supplies no search expression.
const MATCH_ALL: &str = "*";

pub struct Dispatcher<T: InodeTree> {
    tree: T,
    runtime: Handle,
    sessions: SessionTable,
    virtual_file: VirtualFile,
    limits: TransferLimits,
    mount: MountIdentity,
}

impl<T: InodeTree> Dispatcher<T> {
    /// `runtime` drives tree futures; entry points must not be called from
    /// one of its worker threads.
    pub fn new(tree: T, mount: MountIdentity, runtime: Handle) -> Result<Self> {
        let virtual_file = VirtualFile::synthesize(&mount)?;
        log_dispatch_info!(
            "Creating dispatcher",
            root = %mount.root.display(),
            virtual_file_size = virtual_file.len()
        );
        Ok(Self {
            tree,
            runtime,
            sessions: SessionTable::new(),
            virtual_file,
            limits: TransferLimits::default(),
            mount,
        })
    }

    pub fn with_limits(mut self, limits: TransferLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn tree(&self) -> &T {
        &self.tree
    }

    pub fn mount(&self) -> &MountIdentity {
        &self.mount
    }

    pub fn virtual_file(&self) -> &VirtualFile {
        &self.virtual_file
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    /// Block the calling OS thread until the tree operation completes.
    fn wait<F: Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }

    // ========================================================================
    // Directory enumeration
    // ========================================================================

    pub fn start_enumeration(&self, callback: &CallbackData, session_id: Uuid) -> Status {
        boundary("start_enumeration", || {
            let path = RelativePath::from_native(&callback.file_path);
            log_dispatch_debug!(
                "Starting enumeration",
                path = %path,
                session = %session_id,
                process = callback.process()
            );

            let entries = self.wait(self.tree.enumerate_directory(&path))?;
            self.sessions.insert(EnumerationSession::new(
                session_id,
                callback.file_path.clone(),
                entries,
            ))?;
            Ok(Status::OK)
        })
    }

    pub fn end_enumeration(&self, session_id: Uuid) -> Status {
        boundary("end_enumeration", || {
            self.sessions.remove(&session_id)?;
            Ok(Status::OK)
        })
    }

    /// Fill `buffer` from the session's cursor. Running out of buffer space is
    /// not an error: the cursor stays on the rejected entry and the OS calls
    /// again to continue from there.
    pub fn get_enumeration_data<B: DirEntryBuffer>(
        &self,
        callback: &CallbackData,
        session_id: Uuid,
        search_expression: Option<&str>,
        buffer: &mut B,
    ) -> Status {
        boundary("get_enumeration_data", || {
            let restart = callback.flags.restart_scan;
            let served = self.sessions.with_session(&session_id, |session| {
                if !session.is_expression_set() || restart {
                    session.save_expression(search_expression.unwrap_or(MATCH_ALL));
                }
                if restart {
                    session.restart();
                }

                let mut filled = 0usize;
                while let Some(entry) = session.current() {
                    let info = BasicInfo {
                        is_directory: entry.is_directory,
                        file_size: entry.size,
                    };
                    log_dispatch_trace!(
                        "Enumerating entry",
                        name = entry.name.as_str(),
                        is_directory = info.is_directory,
                        size = info.file_size
                    );
                    if buffer.fill(&entry.name, &info).is_err() {
                        break;
                    }
                    session.advance();
                    filled += 1;
                }
                filled
            });

            match served {
                Some(filled) => {
                    log_dispatch_trace!(
                        "Enumeration batch served",
                        session = %session_id,
                        entries = filled
                    );
                    Ok(Status::OK)
                }
                None => {
                    log_dispatch_debug!(
                        "Enumeration session not found",
                        path = callback.file_path.as_str(),
                        session = %session_id
                    );
                    Ok(Status::INVALID_PARAMETER)
                }
            }
        })
    }

    // ========================================================================
    // Metadata queries
    // ========================================================================

    /// Describe one path to the OS by writing a placeholder for it.
    pub fn get_file_info<P: ProviderContext>(
        &self,
        provider: &P,
        callback: &CallbackData,
    ) -> Status {
        boundary("get_file_info", || {
            let path = RelativePath::from_native(&callback.file_path);

            let Some(metadata) = self.lookup_metadata(&path)? else {
                log_dispatch_debug!("File not found", path = %path);
                return Ok(Status::FILE_NOT_FOUND);
            };

            log_dispatch_debug!(
                "Found entry",
                name = metadata.name.as_str(),
                is_directory = metadata.is_directory,
                size = metadata.size,
                process = callback.process()
            );

            let info = PlaceholderInfo {
                basic: BasicInfo {
                    is_directory: metadata.is_directory,
                    file_size: metadata.size,
                },
            };
            match provider.write_placeholder_info(&metadata.name, &info) {
                Ok(()) => Ok(Status::OK),
                Err(status) => {
                    log_dispatch_warn!(
                        "Failed to write placeholder",
                        path = %path,
                        status = %status
                    );
                    Ok(status)
                }
            }
        })
    }

    /// `Ok(None)` when neither the tree nor the virtual file knows the path.
    fn lookup_metadata(&self, path: &RelativePath) -> Result<Option<FileMetadata>> {
        let resolved = self.wait(async {
            let inode = self.tree.get_inode(path).await?;
            let stat = inode.stat().await?;
            // Report the tree's casing, not whatever casing the caller used.
            let name = inode.path().to_native();
            Ok::<_, TreeError>(FileMetadata::new(name, inode.is_dir(), stat.size))
        });

        match resolved {
            Ok(metadata) => Ok(Some(metadata)),
            Err(e) if e.is_not_found() => {
                if self.virtual_file.matches(path) {
                    Ok(Some(self.virtual_file.metadata()))
                } else {
                    Ok(None)
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn query_file_name(&self, callback: &CallbackData) -> Status {
        boundary("query_file_name", || {
            let path = RelativePath::from_native(&callback.file_path);
            match self.wait(self.tree.get_inode(&path)) {
                Ok(_) => Ok(Status::OK),
                Err(e) if e.is_not_found() => {
                    if self.virtual_file.matches(&path) {
                        Ok(Status::OK)
                    } else {
                        Ok(Status::FILE_NOT_FOUND)
                    }
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    // ========================================================================
    // File data
    // ========================================================================

    pub fn get_file_data<P: ProviderContext>(
        &self,
        provider: &P,
        callback: &CallbackData,
        byte_offset: u64,
        length: u32,
    ) -> Status {
        boundary("get_file_data", || {
            let path = RelativePath::from_native(&callback.file_path);

            let content: Cow<'_, [u8]> = match self.wait(self.tree.read_file(&path)) {
                Ok(bytes) => Cow::Owned(bytes),
                Err(e) if e.is_not_found() && self.virtual_file.matches(&path) => {
                    Cow::Borrowed(self.virtual_file.content())
                }
                Err(e) => return Err(e.into()),
            };

            let transfer =
                ChunkedTransfer::new(provider, &callback.data_stream_id, &content, self.limits);
            let plan = transfer.deliver(byte_offset, length)?;
            log_dispatch_debug!(
                "File data delivered",
                path = %path,
                offset = byte_offset,
                length = length,
                plan = ?plan
            );
            Ok(Status::OK)
        })
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    /// Apply a change notification. `kind` is the raw OS notification code.
    pub fn notify(
        &self,
        callback: &CallbackData,
        dest_path: Option<&str>,
        is_directory: bool,
        kind: u32,
    ) -> Status {
        boundary("notify", || {
            let kind = NotificationKind::try_from(kind)?;
            let path = RelativePath::from_native(&callback.file_path);
            let dest = dest_path.map(RelativePath::from_native).unwrap_or_default();
            self.wait(notify::route(&self.tree, kind, &path, &dest, is_directory))?;
            Ok(Status::OK)
        })
    }
}

/// Run one entry point body, converting every failure to a status.
fn boundary(op: &'static str, body: impl FnOnce() -> Result<Status>) -> Status {
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(status)) => status,
        Ok(Err(err)) => {
            let status = Status::from(&err);
            match &err {
                DispatchError::InvalidParameter(_) => {
                    log_dispatch_debug!("Rejected callback", op = op, error = %err);
                }
                _ if err.is_not_found() => {
                    log_dispatch_debug!("Callback target missing", op = op, error = %err);
                }
                DispatchError::Defect(_) => {
                    log_dispatch_error!("Callback hit a broken invariant", op = op, error = %err);
                }
                _ => {
                    log_dispatch_warn!("Callback failed", op = op, error = %err, status = %status);
                }
            }
            status
        }
        Err(_) => {
            log_dispatch_error!("Panic caught at callback boundary", op = op);
            Status::UNEXPECTED
        }
    }
}
