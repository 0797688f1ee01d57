//! # vprj-tree
//!
//! In-memory inode tree projected by the dispatcher.
//!
//! Every node is keyed by its lowercased path, so lookups ignore case while
//! each node remembers the casing it was created with. File contents live in
//! the content store until something needs them locally; they are then
//! materialized into memory and the tree owns them from there on.
//!
//! Directory listings come back sorted case-insensitively, which is the order
//! the OS expects enumeration callbacks to produce.

mod ingest;

pub use ingest::IngestStats;

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use vprj_cas::{BlobRef, CasError, CasStore};
use vprj_config::log_tree_debug;
use vprj_dispatch::{
    FileMetadata, Inode, InodeStat, InodeTree, RelativePath, Status, TreeError,
};

/// Where a file's bytes currently live.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Content {
    Stored(BlobRef),
    Local(Vec<u8>),
}

impl Content {
    fn size(&self) -> u64 {
        match self {
            Content::Stored(blob) => blob.size,
            Content::Local(bytes) => bytes.len() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeKind {
    Directory,
    File(Content),
}

#[derive(Debug, Clone)]
struct Node {
    path: RelativePath,
    kind: NodeKind,
}

impl Node {
    fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory)
    }

    fn size(&self) -> u64 {
        match &self.kind {
            NodeKind::Directory => 0,
            NodeKind::File(content) => content.size(),
        }
    }
}

fn key(path: &RelativePath) -> String {
    path.as_str().to_lowercase()
}

/// Prefix shared by every descendant key of `dir_key`.
fn child_prefix(dir_key: &str) -> String {
    if dir_key.is_empty() {
        String::new()
    } else {
        format!("{}/", dir_key)
    }
}

/// Content store failures never read as "not found": the node exists even
/// when its blob does not.
fn store_error(err: CasError) -> TreeError {
    TreeError::Store(err.to_string())
}

struct Shared {
    cas: CasStore,
    nodes: RwLock<BTreeMap<String, Node>>,
}

impl Shared {
    fn lookup(&self, path: &RelativePath) -> Result<Node, TreeError> {
        self.nodes
            .read()
            .get(&key(path))
            .cloned()
            .ok_or_else(|| TreeError::NotFound(path.clone()))
    }

    fn lookup_dir(&self, path: &RelativePath) -> Result<Node, TreeError> {
        let node = self.lookup(path)?;
        if !node.is_dir() {
            return Err(TreeError::NotADirectory(node.path));
        }
        Ok(node)
    }

    /// Direct children of `dir_key`, in key order.
    fn children(nodes: &BTreeMap<String, Node>, dir_key: &str) -> Vec<Node> {
        let prefix = child_prefix(dir_key);
        nodes
            .range::<str, _>((Bound::Included(prefix.as_str()), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter(|(k, _)| !k.is_empty() && !k[prefix.len()..].contains('/'))
            .map(|(_, n)| n.clone())
            .collect()
    }

    /// Insert a new child under an existing directory.
    fn insert_child(
        &self,
        parent: &RelativePath,
        name: &str,
        kind: NodeKind,
    ) -> Result<RelativePath, TreeError> {
        let mut nodes = self.nodes.write();
        let parent_node = nodes
            .get(&key(parent))
            .ok_or_else(|| TreeError::NotFound(parent.clone()))?;
        if !parent_node.is_dir() {
            return Err(TreeError::NotADirectory(parent.clone()));
        }
        let path = parent_node.path.join(name);
        let child_key = key(&path);
        if nodes.contains_key(&child_key) {
            return Err(TreeError::AlreadyExists(path));
        }
        nodes.insert(
            child_key,
            Node {
                path: path.clone(),
                kind,
            },
        );
        Ok(path)
    }

    async fn load(&self, blob: BlobRef) -> Result<Vec<u8>, TreeError> {
        let cas = self.cas.clone();
        tokio::task::spawn_blocking(move || cas.read(&blob))
            .await
            .map_err(|e| TreeError::Store(format!("content load aborted: {}", e)))?
            .map_err(store_error)
    }
}

/// Tree statistics, as shown by `vprj show`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub file_count: u64,
    pub dir_count: u64,
    pub total_size: u64,
    pub materialized: u64,
}

/// Cheaply cloneable handle to one tree.
#[derive(Clone)]
pub struct MemTree {
    shared: Arc<Shared>,
}

impl MemTree {
    /// Empty tree holding only the root directory.
    pub fn new(cas: CasStore) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            String::new(),
            Node {
                path: RelativePath::root(),
                kind: NodeKind::Directory,
            },
        );
        Self {
            shared: Arc::new(Shared {
                cas,
                nodes: RwLock::new(nodes),
            }),
        }
    }

    pub fn cas(&self) -> &CasStore {
        &self.shared.cas
    }

    /// Add a directory, creating missing parents.
    pub fn add_dir(&self, path: &str) -> Result<(), TreeError> {
        let path = RelativePath::new(path);
        let mut current = RelativePath::root();
        for component in path.components() {
            current = current.join(component);
            let mut nodes = self.shared.nodes.write();
            match nodes.get(&key(&current)) {
                Some(node) if node.is_dir() => {}
                Some(node) => return Err(TreeError::NotADirectory(node.path.clone())),
                None => {
                    nodes.insert(
                        key(&current),
                        Node {
                            path: current.clone(),
                            kind: NodeKind::Directory,
                        },
                    );
                }
            }
        }
        Ok(())
    }

    /// Store `content` and add a file referencing it, creating missing parents.
    pub fn add_file(&self, path: &str, content: &[u8]) -> Result<(), TreeError> {
        let put = self.shared.cas.put(content).map_err(store_error)?;
        self.add_stored(path, put.blob)
    }

    /// Add a file whose bytes are already in the content store.
    pub fn add_stored(&self, path: &str, blob: BlobRef) -> Result<(), TreeError> {
        let path = RelativePath::new(path);
        let parent = path.dirname();
        self.add_dir(parent.as_str())?;
        self.shared
            .insert_child(&parent, path.basename(), NodeKind::File(Content::Stored(blob)))?;
        Ok(())
    }

    /// Whether `path` exists and its bytes are held locally.
    pub fn is_materialized(&self, path: &str) -> bool {
        matches!(
            self.shared.nodes.read().get(&key(&RelativePath::new(path))),
            Some(Node {
                kind: NodeKind::File(Content::Local(_)),
                ..
            })
        )
    }

    pub fn contains(&self, path: &str) -> bool {
        self.shared.nodes.read().contains_key(&key(&RelativePath::new(path)))
    }

    pub fn stats(&self) -> TreeStats {
        let nodes = self.shared.nodes.read();
        let mut stats = TreeStats::default();
        for node in nodes.values().filter(|n| !n.path.is_empty()) {
            match &node.kind {
                NodeKind::Directory => stats.dir_count += 1,
                NodeKind::File(content) => {
                    stats.file_count += 1;
                    stats.total_size += content.size();
                    if matches!(content, Content::Local(_)) {
                        stats.materialized += 1;
                    }
                }
            }
        }
        stats
    }
}

/// Handle to one node. Operations re-resolve the node, so a handle whose
/// node was removed reports `NotFound`.
pub struct MemInode {
    shared: Arc<Shared>,
    path: RelativePath,
    is_dir: bool,
}

#[async_trait]
impl Inode for MemInode {
    fn path(&self) -> RelativePath {
        self.path.clone()
    }

    fn is_dir(&self) -> bool {
        self.is_dir
    }

    async fn stat(&self) -> Result<InodeStat, TreeError> {
        let node = self.shared.lookup(&self.path)?;
        Ok(InodeStat { size: node.size() })
    }

    async fn materialize(&self) -> Result<(), TreeError> {
        let node = self.shared.lookup(&self.path)?;
        let blob = match node.kind {
            NodeKind::Directory => return Err(TreeError::NotAFile(self.path.clone())),
            NodeKind::File(Content::Local(_)) => return Ok(()),
            NodeKind::File(Content::Stored(blob)) => blob,
        };
        let bytes = self.shared.load(blob).await?;

        let mut nodes = self.shared.nodes.write();
        if let Some(node) = nodes.get_mut(&key(&self.path)) {
            // A concurrent writer may have replaced the content meanwhile.
            if node.kind == NodeKind::File(Content::Stored(blob)) {
                node.kind = NodeKind::File(Content::Local(bytes));
                log_tree_debug!("Materialized file", path = %self.path);
            }
        }
        Ok(())
    }

    async fn mkdir(&self, name: &str) -> Result<(), TreeError> {
        let path = self.shared.insert_child(&self.path, name, NodeKind::Directory)?;
        log_tree_debug!("Created directory", path = %path);
        Ok(())
    }

    async fn mknod(&self, name: &str) -> Result<(), TreeError> {
        let path = self
            .shared
            .insert_child(&self.path, name, NodeKind::File(Content::Local(Vec::new())))?;
        log_tree_debug!("Created file", path = %path);
        Ok(())
    }

    async fn unlink(&self, name: &str) -> Result<(), TreeError> {
        let target = self.path.join(name);
        let mut nodes = self.shared.nodes.write();
        match nodes.get(&key(&target)) {
            None => return Err(TreeError::NotFound(target)),
            Some(node) if node.is_dir() => return Err(TreeError::NotAFile(node.path.clone())),
            Some(_) => {}
        }
        nodes.remove(&key(&target));
        log_tree_debug!("Removed file", path = %target);
        Ok(())
    }

    async fn rmdir(&self, name: &str) -> Result<(), TreeError> {
        let target = self.path.join(name);
        let target_key = key(&target);
        let mut nodes = self.shared.nodes.write();
        match nodes.get(&target_key) {
            None => return Err(TreeError::NotFound(target)),
            Some(node) if !node.is_dir() => return Err(TreeError::NotADirectory(node.path.clone())),
            Some(_) => {}
        }
        if !Shared::children(&nodes, &target_key).is_empty() {
            return Err(TreeError::DirectoryNotEmpty(target));
        }
        nodes.remove(&target_key);
        log_tree_debug!("Removed directory", path = %target);
        Ok(())
    }

    async fn rename(&self, name: &str, new_parent: &Self, new_name: &str) -> Result<(), TreeError> {
        let from = self.path.join(name);
        let to = new_parent.path.join(new_name);
        let (from_key, to_key) = (key(&from), key(&to));

        let mut nodes = self.shared.nodes.write();
        let moved = nodes
            .get(&from_key)
            .cloned()
            .ok_or_else(|| TreeError::NotFound(from.clone()))?;
        match nodes.get(&key(&new_parent.path)) {
            Some(parent) if parent.is_dir() => {}
            Some(_) => return Err(TreeError::NotADirectory(new_parent.path.clone())),
            None => return Err(TreeError::NotFound(new_parent.path.clone())),
        }
        let from_prefix = child_prefix(&from_key);
        if moved.is_dir() && to_key.starts_with(&from_prefix) {
            return Err(TreeError::Explicit {
                status: Status::INVALID_PARAMETER,
                message: format!("Cannot move '{}' into itself: {}", from, to),
            });
        }
        if from_key != to_key {
            match nodes.get(&to_key) {
                Some(existing) if existing.is_dir() || moved.is_dir() => {
                    return Err(TreeError::AlreadyExists(to));
                }
                _ => {}
            }
        }

        // Re-key the node and, for directories, everything below it.
        let descendants: Vec<String> = if moved.is_dir() {
            nodes
                .range::<str, _>((Bound::Included(from_prefix.as_str()), Bound::Unbounded))
                .take_while(|(k, _)| k.starts_with(&from_prefix))
                .map(|(k, _)| k.clone())
                .collect()
        } else {
            Vec::new()
        };

        nodes.remove(&from_key);
        nodes.insert(
            to_key,
            Node {
                path: to.clone(),
                kind: moved.kind,
            },
        );
        let from_depth = from.components().count();
        for old_key in descendants {
            if let Some(node) = nodes.remove(&old_key) {
                let rest: Vec<&str> = node.path.components().skip(from_depth).collect();
                let path = to.join(&rest.join("/"));
                nodes.insert(key(&path), Node { path, kind: node.kind });
            }
        }
        log_tree_debug!("Renamed", from = %from, to = %to);
        Ok(())
    }
}

#[async_trait]
impl InodeTree for MemTree {
    type Inode = MemInode;

    async fn get_inode(&self, path: &RelativePath) -> Result<MemInode, TreeError> {
        let node = self.shared.lookup(path)?;
        Ok(MemInode {
            shared: self.shared.clone(),
            is_dir: node.is_dir(),
            path: node.path,
        })
    }

    async fn enumerate_directory(
        &self,
        path: &RelativePath,
    ) -> Result<Vec<FileMetadata>, TreeError> {
        self.shared.lookup_dir(path)?;
        let nodes = self.shared.nodes.read();
        Ok(Shared::children(&nodes, &key(path))
            .into_iter()
            .map(|n| FileMetadata::new(n.path.basename(), n.is_dir(), n.size()))
            .collect())
    }

    async fn read_file(&self, path: &RelativePath) -> Result<Vec<u8>, TreeError> {
        let node = self.shared.lookup(path)?;
        match node.kind {
            NodeKind::Directory => Err(TreeError::NotAFile(node.path)),
            NodeKind::File(Content::Local(bytes)) => Ok(bytes),
            NodeKind::File(Content::Stored(blob)) => self.shared.load(blob).await,
        }
    }
}
