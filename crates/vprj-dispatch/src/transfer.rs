//! Delivery of file byte ranges through provider writes.
//!
//! Small files always go out whole. Ranges up to the maximum chunk size go
//! out in one write. Anything larger is cut into chunks whose boundaries sit
//! on the provider's write alignment and written in increasing offset order
//! through one reusable aligned scratch buffer.

use uuid::Uuid;
use vprj_config::{log_dispatch_trace, log_dispatch_warn, TransferConfig};

use crate::error::{DispatchError, Result};
use crate::provider::ProviderContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferLimits {
    pub min_chunk_size: u32,
    pub max_chunk_size: u32,
}

impl Default for TransferLimits {
    fn default() -> Self {
        Self::from(&TransferConfig::default())
    }
}

impl From<&TransferConfig> for TransferLimits {
    fn from(config: &TransferConfig) -> Self {
        Self {
            min_chunk_size: config.min_chunk_size,
            max_chunk_size: config.max_chunk_size,
        }
    }
}

/// How one data request will be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPlan {
    /// Entire file in one write from offset 0, whatever range was asked for.
    Whole { length: u32 },
    /// Exactly the requested range in one write.
    Single { offset: u64, length: u32 },
    /// The requested range in writes of at most `chunk_size` bytes.
    Chunked { offset: u64, length: u32, chunk_size: u32 },
}

impl TransferPlan {
    /// `alignment` is only consulted for ranges larger than the maximum chunk size.
    pub fn new(
        content_len: u64,
        offset: u64,
        length: u32,
        limits: TransferLimits,
        alignment: impl FnOnce() -> Result<u32>,
    ) -> Result<Self> {
        if content_len <= u64::from(limits.min_chunk_size) {
            // Small files are read close to entirely, so the requested range
            // is ignored and the whole file is written, even if that is more
            // than was asked for.
            return Ok(TransferPlan::Whole {
                length: content_len as u32,
            });
        }

        let end = offset.checked_add(u64::from(length));
        if end.map_or(true, |end| end > content_len) {
            return Err(DispatchError::InvalidParameter(format!(
                "range {}+{} exceeds file size {}",
                offset, length, content_len
            )));
        }

        if length <= limits.max_chunk_size {
            return Ok(TransferPlan::Single { offset, length });
        }

        let alignment = alignment()?;
        let end_offset = align_down(offset + u64::from(limits.max_chunk_size), alignment);
        if end_offset == 0 || end_offset <= offset {
            return Err(DispatchError::Defect(format!(
                "non-positive chunk size: offset {} aligned end {} (alignment {})",
                offset, end_offset, alignment
            )));
        }

        Ok(TransferPlan::Chunked {
            offset,
            length,
            chunk_size: (end_offset - offset) as u32,
        })
    }

    /// `(offset, length, chunk_size)` to hand to the write loop.
    fn extent(&self) -> (u64, u32, u32) {
        match *self {
            TransferPlan::Whole { length } => (0, length, length),
            TransferPlan::Single { offset, length } => (offset, length, length),
            TransferPlan::Chunked {
                offset,
                length,
                chunk_size,
            } => (offset, length, chunk_size),
        }
    }
}

/// Round `value` down to a multiple of `alignment` (0 and 1 mean unaligned).
pub fn align_down(value: u64, alignment: u32) -> u64 {
    match u64::from(alignment) {
        0 | 1 => value,
        a => value - value % a,
    }
}

/// Writes one file's bytes back through the provider.
pub struct ChunkedTransfer<'a, P: ProviderContext> {
    provider: &'a P,
    data_stream_id: &'a Uuid,
    content: &'a [u8],
    limits: TransferLimits,
}

impl<'a, P: ProviderContext> ChunkedTransfer<'a, P> {
    pub fn new(
        provider: &'a P,
        data_stream_id: &'a Uuid,
        content: &'a [u8],
        limits: TransferLimits,
    ) -> Self {
        Self {
            provider,
            data_stream_id,
            content,
            limits,
        }
    }

    /// Deliver the requested range according to [`TransferPlan`].
    pub fn deliver(&self, offset: u64, length: u32) -> Result<TransferPlan> {
        let plan = TransferPlan::new(self.content.len() as u64, offset, length, self.limits, || {
            Ok(self.provider.instance_info()?.write_alignment)
        })?;
        let (start, length, chunk_size) = plan.extent();
        self.write_chunks(start, length, chunk_size)?;
        Ok(plan)
    }

    /// Copy `[start, start + length)` through one aligned scratch buffer.
    /// The buffer is dropped (released) on every return path.
    fn write_chunks(&self, start: u64, length: u32, chunk_size: u32) -> Result<()> {
        if length == 0 {
            return Ok(());
        }

        let mut buffer = self
            .provider
            .allocate_aligned_buffer(chunk_size as usize)
            .ok_or(DispatchError::OutOfMemory(chunk_size as usize))?;

        let mut offset = start;
        let mut remaining = length;
        while remaining > 0 {
            let copy = remaining.min(chunk_size) as usize;
            let from = offset as usize;
            let scratch = &mut buffer.as_mut()[..copy];
            scratch.copy_from_slice(&self.content[from..from + copy]);

            log_dispatch_trace!("Writing file data", offset = offset, size = copy);
            if let Err(status) = self
                .provider
                .write_file_data(self.data_stream_id, &buffer.as_ref()[..copy], offset)
            {
                log_dispatch_warn!(
                    "File data write failed",
                    offset = offset,
                    size = copy,
                    status = %status
                );
                return Err(DispatchError::Provider(status));
            }

            remaining -= copy as u32;
            offset += copy as u64;
        }
        Ok(())
    }
}
