//! Calls the dispatcher makes back into the OS virtualization provider.

use uuid::Uuid;

use crate::status::Status;

/// Flags the OS attaches to a callback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallbackFlags {
    /// The OS wants the enumeration served again from the first entry.
    pub restart_scan: bool,
}

/// Per-callback data handed over by the OS.
#[derive(Debug, Clone, Default)]
pub struct CallbackData {
    /// Native path relative to the virtualization root.
    pub file_path: String,
    /// Image name of the process whose I/O triggered the callback.
    pub triggering_process: Option<String>,
    pub flags: CallbackFlags,
    /// Identifies the stream file data writes belong to.
    pub data_stream_id: Uuid,
}

impl CallbackData {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            ..Default::default()
        }
    }

    pub fn with_restart_scan(mut self) -> Self {
        self.flags.restart_scan = true;
        self
    }

    pub fn with_process(mut self, image: impl Into<String>) -> Self {
        self.triggering_process = Some(image.into());
        self
    }

    pub fn with_data_stream(mut self, id: Uuid) -> Self {
        self.data_stream_id = id;
        self
    }

    pub(crate) fn process(&self) -> &str {
        self.triggering_process.as_deref().unwrap_or("<unknown>")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BasicInfo {
    pub is_directory: bool,
    pub file_size: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaceholderInfo {
    pub basic: BasicInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceInfo {
    /// Offsets and sizes of chunked writes must be multiples of this.
    pub write_alignment: u32,
}

/// OS-owned destination for directory entries of one enumeration callback.
pub trait DirEntryBuffer {
    /// Add one entry. An error (normally `INSUFFICIENT_BUFFER`) means the
    /// entry was not added and the buffer takes no more this call.
    fn fill(&mut self, name: &str, info: &BasicInfo) -> Result<(), Status>;
}

/// Provider-side operations available to the dispatcher during a callback.
pub trait ProviderContext {
    /// Scratch buffer meeting the provider's alignment; released on drop.
    type Buffer: AsRef<[u8]> + AsMut<[u8]>;

    fn write_placeholder_info(&self, name: &str, info: &PlaceholderInfo) -> Result<(), Status>;

    fn write_file_data(
        &self,
        data_stream_id: &Uuid,
        data: &[u8],
        offset: u64,
    ) -> Result<(), Status>;

    fn instance_info(&self) -> Result<InstanceInfo, Status>;

    /// `None` when the allocation fails.
    fn allocate_aligned_buffer(&self, size: usize) -> Option<Self::Buffer>;
}
