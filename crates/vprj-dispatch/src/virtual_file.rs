//! The `.vprj/config` file: served from memory, never routed to the tree.
//!
//! Tools running inside a projection read it to find the repository root,
//! the backing service endpoint and the client state directory.

use std::path::PathBuf;

use serde::Serialize;

use crate::error::Result;
use crate::path::RelativePath;
use crate::tree::FileMetadata;

pub const VIRTUAL_CONFIG_PATH: &str = ".vprj/config";

/// Identity of the mount the dispatcher serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountIdentity {
    pub root: PathBuf,
    pub socket: PathBuf,
    pub client_dir: PathBuf,
}

impl From<&vprj_config::MountConfig> for MountIdentity {
    fn from(mount: &vprj_config::MountConfig) -> Self {
        Self {
            root: mount.root.clone(),
            socket: mount.socket.clone(),
            client_dir: mount.client_dir.clone(),
        }
    }
}

#[derive(Serialize)]
struct Document<'a> {
    #[serde(rename = "Config")]
    config: Section<'a>,
}

#[derive(Serialize)]
struct Section<'a> {
    root: &'a str,
    socket: &'a str,
    client: &'a str,
}

/// Immutable content generated once per dispatcher.
#[derive(Debug, Clone)]
pub struct VirtualFile {
    path: RelativePath,
    content: Vec<u8>,
}

impl VirtualFile {
    pub fn synthesize(identity: &MountIdentity) -> Result<Self> {
        let root = identity.root.to_string_lossy();
        let socket = identity.socket.to_string_lossy();
        let client = identity.client_dir.to_string_lossy();
        let doc = Document {
            config: Section {
                root: &root,
                socket: &socket,
                client: &client,
            },
        };
        let content = toml::to_string(&doc)?.into_bytes();
        Ok(Self {
            path: RelativePath::new(VIRTUAL_CONFIG_PATH),
            content,
        })
    }

    pub fn path(&self) -> &RelativePath {
        &self.path
    }

    /// Exact, case-sensitive match against the reserved path.
    pub fn matches(&self, path: &RelativePath) -> bool {
        &self.path == path
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn len(&self) -> u64 {
        self.content.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Placeholder description, named by the native form of the reserved path.
    pub fn metadata(&self) -> FileMetadata {
        FileMetadata::file(self.path.to_native(), self.len())
    }
}
