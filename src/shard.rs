//! A single-file handle: identity, the SG access descriptor, the next
//! block index, a transient staging buffer, and a frame count.
//!
//! The staging buffer is exclusively owned by the shard; it is modeled
//! as a plain `Option<Vec<u8>>` rather than a shared or borrowed
//! reference.

use std::path::{Path, PathBuf};

use crate::header::{first_header, last_header, TimeStamp};
use crate::sg::{SgReader, SgWriter};

/// Shared shape of a shard regardless of read/write mode; `S` is the
/// mode-specific SG access handle (`SgReader` or `SgWriter`).
pub struct Shard<S> {
    pub path: PathBuf,
    pub sg: S,
    pub block_index: u32,
    pub staging: Option<Vec<u8>>,
    pub frame_count: u32,
}

pub type ReadShard = Shard<SgReader>;
pub type WriteShard = Shard<SgWriter>;

impl<S> Shard<S> {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A shard's staging is either empty (`frame_count == 0`, buffer
    /// absent) or full (`frame_count > 0`, buffer owned) -- never both.
    pub fn staging_is_empty(&self) -> bool {
        debug_assert_eq!(self.staging.is_none(), self.frame_count == 0);
        self.staging.is_none()
    }

    pub fn clear_staging(&mut self) {
        self.staging = None;
        self.frame_count = 0;
    }
}

impl Shard<SgReader> {
    pub fn new(path: PathBuf, sg: SgReader) -> Self {
        Self {
            path,
            sg,
            block_index: 0,
            staging: None,
            frame_count: 0,
        }
    }

    /// A dead shard has reached the last block on disk and can
    /// contribute nothing further.
    pub fn is_dead(&self) -> bool {
        self.staging.is_none() && self.block_index >= self.sg.total_blocks()
    }

    pub fn first_header(&self) -> Option<TimeStamp> {
        self.staging
            .as_deref()
            .and_then(|bytes| first_header(bytes, self.frame_count))
    }

    pub fn last_header(&self) -> Option<TimeStamp> {
        self.staging.as_deref().and_then(|bytes| {
            last_header(bytes, self.sg.packet_size(), self.frame_count)
        })
    }
}

impl Shard<SgWriter> {
    pub fn new(path: PathBuf, sg: SgWriter) -> Self {
        Self {
            path,
            sg,
            block_index: 0,
            staging: None,
            frame_count: 0,
        }
    }
}
