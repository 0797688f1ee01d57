//! `vprj hydrate`: play the OS side of the provider protocol against a
//! freshly ingested tree and write every projected path to disk.
//!
//! Nothing here reads the tree directly. Listings, placeholders and file
//! bytes all arrive through dispatcher entry points, with enumeration batches
//! kept small so the resume path is exercised on every directory.

use std::cell::RefCell;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use uuid::Uuid;
use vprj_cas::CasStore;
use vprj_config::{log_cli_debug, log_cli_info, Config};
use vprj_dispatch::{
    BasicInfo, CallbackData, DirEntryBuffer, Dispatcher, InstanceInfo, MountIdentity,
    PlaceholderInfo, ProviderContext, Status, TransferLimits, VIRTUAL_CONFIG_PATH,
};
use vprj_tree::MemTree;

pub const DEFAULT_BATCH: usize = 8;

/// Alignment reported to the dispatcher for chunked writes.
const WRITE_ALIGNMENT: u32 = 4096;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HydrateReport {
    pub files: u64,
    pub directories: u64,
    pub bytes: u64,
    pub callbacks: u64,
}

pub fn run(config: &Config, source: &Path, target: &Path, batch: usize) -> Result<HydrateReport> {
    anyhow::ensure!(batch > 0, "--batch must be at least 1");

    let cas = CasStore::new(&config.storage.cas_root)
        .with_context(|| format!("Failed to open CAS at {}", config.storage.cas_root.display()))?;
    let (tree, stats) = MemTree::ingest(source, cas)
        .with_context(|| format!("Failed to ingest {}", source.display()))?;
    log_cli_info!(
        "Source ingested",
        files = stats.files,
        unique_blobs = stats.unique_blobs,
        dedup = stats.dedup_ratio()
    );

    fs::create_dir_all(target).with_context(|| format!("Failed to create {}", target.display()))?;

    // Dispatcher calls block on this runtime from the current thread, the
    // way OS callback threads do.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let mut mount = MountIdentity::from(&config.mount);
    mount.root = target.to_path_buf();
    let dispatcher = Dispatcher::new(tree, mount, runtime.handle().clone())?
        .with_limits(TransferLimits::from(&config.transfer));

    let provider = DiskProvider::new(target);
    let mut host = Host {
        dispatcher: &dispatcher,
        provider: &provider,
        batch,
        report: HydrateReport::default(),
    };
    host.walk()?;
    host.fetch(&VIRTUAL_CONFIG_PATH.replace('/', "\\"))?;
    Ok(host.report)
}

fn check(status: Status, op: &str, path: &str) -> Result<()> {
    status
        .into_result()
        .with_context(|| format!("{} failed for '{}'", op, path))
}

struct Host<'a> {
    dispatcher: &'a Dispatcher<MemTree>,
    provider: &'a DiskProvider,
    batch: usize,
    report: HydrateReport,
}

impl Host<'_> {
    fn walk(&mut self) -> Result<()> {
        let mut pending = vec![String::new()];
        while let Some(dir) = pending.pop() {
            for (name, info) in self.list(&dir)? {
                let child = if dir.is_empty() {
                    name
                } else {
                    format!("{}\\{}", dir, name)
                };
                if info.is_directory {
                    self.describe(&child)?;
                    self.report.directories += 1;
                    pending.push(child);
                } else {
                    self.fetch(&child)?;
                }
            }
        }
        Ok(())
    }

    /// Collect one directory's entries across as many callbacks as it takes.
    fn list(&mut self, dir: &str) -> Result<Vec<(String, BasicInfo)>> {
        let id = Uuid::new_v4();
        let callback = CallbackData::new(dir).with_process("vprj-hydrate");
        self.report.callbacks += 1;
        check(self.dispatcher.start_enumeration(&callback, id), "start_enumeration", dir)?;

        let mut entries = Vec::new();
        let listed = loop {
            let mut batch = EntryBatch::new(self.batch);
            self.report.callbacks += 1;
            let status = self.dispatcher.get_enumeration_data(&callback, id, None, &mut batch);
            if let Err(e) = check(status, "get_enumeration_data", dir) {
                break Err(e);
            }
            if batch.entries.is_empty() {
                break Ok(());
            }
            entries.append(&mut batch.entries);
        };

        self.report.callbacks += 1;
        let ended = check(self.dispatcher.end_enumeration(id), "end_enumeration", dir);
        listed.and(ended)?;
        log_cli_debug!("Listed directory", path = dir, entries = entries.len());
        Ok(entries)
    }

    fn describe(&mut self, path: &str) -> Result<()> {
        self.report.callbacks += 1;
        check(
            self.dispatcher.get_file_info(self.provider, &CallbackData::new(path)),
            "get_file_info",
            path,
        )
    }

    /// Create the placeholder, then fill it with the file's bytes.
    fn fetch(&mut self, path: &str) -> Result<()> {
        self.describe(path)?;
        let size = self
            .provider
            .last_size()
            .with_context(|| format!("no placeholder recorded for '{}'", path))?;
        let length = u32::try_from(size)
            .with_context(|| format!("'{}' is too large to hydrate", path))?;

        self.provider
            .open(path)
            .with_context(|| format!("Failed to open placeholder for '{}'", path))?;
        let callback = CallbackData::new(path).with_data_stream(Uuid::new_v4());
        self.report.callbacks += 1;
        let status = self.dispatcher.get_file_data(self.provider, &callback, 0, length);
        self.provider.close();
        check(status, "get_file_data", path)?;

        self.report.files += 1;
        self.report.bytes += size;
        Ok(())
    }
}

/// Enumeration buffer with a fixed entry capacity.
struct EntryBatch {
    capacity: usize,
    entries: Vec<(String, BasicInfo)>,
}

impl EntryBatch {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::with_capacity(capacity),
        }
    }
}

impl DirEntryBuffer for EntryBatch {
    fn fill(&mut self, name: &str, info: &BasicInfo) -> Result<(), Status> {
        if self.entries.len() >= self.capacity {
            return Err(Status::INSUFFICIENT_BUFFER);
        }
        self.entries.push((name.to_string(), *info));
        Ok(())
    }
}

/// Provider that turns placeholders and data writes into files under `root`.
struct DiskProvider {
    root: PathBuf,
    open: RefCell<Option<File>>,
    last_size: RefCell<Option<u64>>,
}

impl DiskProvider {
    fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            open: RefCell::new(None),
            last_size: RefCell::new(None),
        }
    }

    fn local_path(&self, native: &str) -> PathBuf {
        native
            .split('\\')
            .filter(|c| !c.is_empty())
            .fold(self.root.clone(), |path, component| path.join(component))
    }

    fn last_size(&self) -> Option<u64> {
        self.last_size.borrow_mut().take()
    }

    fn open(&self, native: &str) -> io::Result<()> {
        let file = OpenOptions::new().write(true).open(self.local_path(native))?;
        *self.open.borrow_mut() = Some(file);
        Ok(())
    }

    fn close(&self) {
        self.open.borrow_mut().take();
    }

    fn create_placeholder(&self, native: &str, info: &PlaceholderInfo) -> io::Result<()> {
        let path = self.local_path(native);
        if info.basic.is_directory {
            return fs::create_dir_all(&path);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        File::create(&path)?.set_len(info.basic.file_size)
    }
}

impl ProviderContext for DiskProvider {
    type Buffer = Vec<u8>;

    fn write_placeholder_info(&self, name: &str, info: &PlaceholderInfo) -> Result<(), Status> {
        self.create_placeholder(name, info).map_err(|e| Status::from(&e))?;
        *self.last_size.borrow_mut() = Some(info.basic.file_size);
        Ok(())
    }

    fn write_file_data(
        &self,
        _data_stream_id: &Uuid,
        data: &[u8],
        offset: u64,
    ) -> Result<(), Status> {
        let mut open = self.open.borrow_mut();
        let file = open.as_mut().ok_or(Status::INVALID_PARAMETER)?;
        file.seek(SeekFrom::Start(offset))
            .and_then(|_| file.write_all(data))
            .map_err(|e| Status::from(&e))
    }

    fn instance_info(&self) -> Result<InstanceInfo, Status> {
        Ok(InstanceInfo {
            write_alignment: WRITE_ALIGNMENT,
        })
    }

    fn allocate_aligned_buffer(&self, size: usize) -> Option<Vec<u8>> {
        let mut buffer = Vec::new();
        buffer.try_reserve_exact(size).ok()?;
        buffer.resize(size, 0);
        Some(buffer)
    }
}
