//! Test doubles for driving the dispatcher the way the OS does.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;
use vprj_dispatch::{
    BasicInfo, DirEntryBuffer, Dispatcher, FileMetadata, Inode, InodeStat, InodeTree, InstanceInfo,
    MountIdentity, PlaceholderInfo, ProviderContext, RelativePath, Status, TransferLimits,
    TreeError,
};

#[derive(Debug, Clone)]
struct Node {
    canonical: RelativePath,
    is_dir: bool,
    content: Vec<u8>,
}

#[derive(Default)]
struct State {
    /// Keyed by lowercased path; lookups are case-insensitive.
    nodes: Mutex<BTreeMap<String, Node>>,
    broken: Mutex<HashSet<String>>,
    ops: Mutex<Vec<String>>,
}

/// Scripted inode tree. Mutations are recorded, not applied.
#[derive(Clone)]
pub struct FakeTree {
    state: Arc<State>,
}

impl FakeTree {
    pub fn new() -> Self {
        let tree = Self {
            state: Arc::new(State::default()),
        };
        tree.insert("", true, Vec::new());
        tree
    }

    fn insert(&self, path: &str, is_dir: bool, content: Vec<u8>) {
        let canonical = RelativePath::new(path);
        self.state.nodes.lock().unwrap().insert(
            canonical.as_str().to_lowercase(),
            Node {
                canonical,
                is_dir,
                content,
            },
        );
    }

    pub fn with_dir(self, path: &str) -> Self {
        self.insert(path, true, Vec::new());
        self
    }

    pub fn with_file(self, path: &str, content: impl Into<Vec<u8>>) -> Self {
        self.insert(path, false, content.into());
        self
    }

    /// Resolving this path fails with a non-"not found" error.
    pub fn break_path(&self, path: &str) {
        self.state.broken.lock().unwrap().insert(path.to_lowercase());
    }

    pub fn ops(&self) -> Vec<String> {
        self.state.ops.lock().unwrap().clone()
    }

    fn lookup(&self, path: &RelativePath) -> Result<Node, TreeError> {
        let key = path.as_str().to_lowercase();
        if self.state.broken.lock().unwrap().contains(&key) {
            return Err(TreeError::Store(format!("backing store unavailable for {}", path)));
        }
        self.state
            .nodes
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| TreeError::NotFound(path.clone()))
    }
}

pub struct FakeInode {
    state: Arc<State>,
    node: Node,
}

impl FakeInode {
    fn record(&self, op: &str, name: &str) -> Result<(), TreeError> {
        if !self.node.is_dir {
            return Err(TreeError::NotADirectory(self.node.canonical.clone()));
        }
        let target = self.node.canonical.join(name);
        self.state.ops.lock().unwrap().push(format!("{} {}", op, target));
        Ok(())
    }
}

#[async_trait]
impl Inode for FakeInode {
    fn path(&self) -> RelativePath {
        self.node.canonical.clone()
    }

    fn is_dir(&self) -> bool {
        self.node.is_dir
    }

    async fn stat(&self) -> Result<InodeStat, TreeError> {
        Ok(InodeStat {
            size: self.node.content.len() as u64,
        })
    }

    async fn materialize(&self) -> Result<(), TreeError> {
        if self.node.is_dir {
            return Err(TreeError::NotAFile(self.node.canonical.clone()));
        }
        self.state
            .ops
            .lock()
            .unwrap()
            .push(format!("materialize {}", self.node.canonical));
        Ok(())
    }

    async fn mkdir(&self, name: &str) -> Result<(), TreeError> {
        self.record("mkdir", name)
    }

    async fn mknod(&self, name: &str) -> Result<(), TreeError> {
        self.record("mknod", name)
    }

    async fn unlink(&self, name: &str) -> Result<(), TreeError> {
        self.record("unlink", name)
    }

    async fn rmdir(&self, name: &str) -> Result<(), TreeError> {
        self.record("rmdir", name)
    }

    async fn rename(&self, name: &str, new_parent: &Self, new_name: &str) -> Result<(), TreeError> {
        let from = self.node.canonical.join(name);
        let to = new_parent.node.canonical.join(new_name);
        self.state.ops.lock().unwrap().push(format!("rename {} -> {}", from, to));
        Ok(())
    }
}

#[async_trait]
impl InodeTree for FakeTree {
    type Inode = FakeInode;

    async fn get_inode(&self, path: &RelativePath) -> Result<FakeInode, TreeError> {
        Ok(FakeInode {
            state: self.state.clone(),
            node: self.lookup(path)?,
        })
    }

    async fn enumerate_directory(
        &self,
        path: &RelativePath,
    ) -> Result<Vec<FileMetadata>, TreeError> {
        let dir = self.lookup(path)?;
        if !dir.is_dir {
            return Err(TreeError::NotADirectory(path.clone()));
        }
        let nodes = self.state.nodes.lock().unwrap();
        Ok(nodes
            .values()
            .filter(|n| !n.canonical.is_empty() && n.canonical.dirname() == dir.canonical)
            .map(|n| FileMetadata::new(n.canonical.basename(), n.is_dir, n.content.len() as u64))
            .collect())
    }

    async fn read_file(&self, path: &RelativePath) -> Result<Vec<u8>, TreeError> {
        let node = self.lookup(path)?;
        if node.is_dir {
            return Err(TreeError::NotAFile(path.clone()));
        }
        Ok(node.content)
    }
}

/// Provider double recording every callback the dispatcher makes.
#[derive(Default)]
pub struct RecordingProvider {
    pub placeholders: Mutex<Vec<(String, PlaceholderInfo)>>,
    pub writes: Mutex<Vec<(u64, Vec<u8>)>>,
    pub alignment: u32,
    pub fail_alloc: bool,
    pub fail_placeholder: Option<Status>,
}

impl RecordingProvider {
    pub fn aligned(alignment: u32) -> Self {
        Self {
            alignment,
            ..Default::default()
        }
    }

    pub fn placeholders(&self) -> Vec<(String, PlaceholderInfo)> {
        self.placeholders.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<(u64, Vec<u8>)> {
        self.writes.lock().unwrap().clone()
    }
}

impl ProviderContext for RecordingProvider {
    type Buffer = Vec<u8>;

    fn write_placeholder_info(&self, name: &str, info: &PlaceholderInfo) -> Result<(), Status> {
        if let Some(status) = self.fail_placeholder {
            return Err(status);
        }
        self.placeholders.lock().unwrap().push((name.to_string(), *info));
        Ok(())
    }

    fn write_file_data(&self, _id: &Uuid, data: &[u8], offset: u64) -> Result<(), Status> {
        self.writes.lock().unwrap().push((offset, data.to_vec()));
        Ok(())
    }

    fn instance_info(&self) -> Result<InstanceInfo, Status> {
        Ok(InstanceInfo {
            write_alignment: self.alignment,
        })
    }

    fn allocate_aligned_buffer(&self, size: usize) -> Option<Vec<u8>> {
        (!self.fail_alloc).then(|| vec![0u8; size])
    }
}

/// Directory entry buffer that holds at most `capacity` entries.
pub struct CapacityBuffer {
    capacity: usize,
    pub entries: Vec<(String, BasicInfo)>,
}

impl CapacityBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::new(),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }
}

impl DirEntryBuffer for CapacityBuffer {
    fn fill(&mut self, name: &str, info: &BasicInfo) -> Result<(), Status> {
        if self.entries.len() >= self.capacity {
            return Err(Status::INSUFFICIENT_BUFFER);
        }
        self.entries.push((name.to_string(), *info));
        Ok(())
    }
}

pub fn mount_identity() -> MountIdentity {
    MountIdentity {
        root: PathBuf::from("C:\\repo"),
        socket: PathBuf::from("C:\\vprj\\socket"),
        client_dir: PathBuf::from("C:\\vprj\\clients\\repo"),
    }
}

/// Dispatcher plus the runtime its tree futures run on.
pub struct Harness {
    pub dispatcher: Dispatcher<FakeTree>,
    pub tree: FakeTree,
    _runtime: tokio::runtime::Runtime,
}

pub fn harness(tree: FakeTree) -> Harness {
    harness_with_limits(tree, TransferLimits::default())
}

pub fn harness_with_limits(tree: FakeTree, limits: TransferLimits) -> Harness {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();
    let dispatcher = Dispatcher::new(tree.clone(), mount_identity(), runtime.handle().clone())
        .unwrap()
        .with_limits(limits);
    Harness {
        dispatcher,
        tree,
        _runtime: runtime,
    }
}

/// A small repository layout used by most tests.
pub fn sample_tree() -> FakeTree {
    FakeTree::new()
        .with_dir("src")
        .with_file("src/lib.rs", "pub mod a;\n")
        .with_file("src/a.rs", "fn a() {}\n")
        .with_dir("src/nested")
        .with_file("src/Main.rs", "fn main() {}\n")
        .with_file("README.md", "# readme\n")
        .with_dir("docs")
}
