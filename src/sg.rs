//! The single-file scatter-gather access layer: open/close, block count,
//! and block-by-index access yielding a contiguous byte range, split
//! between a read-only production implementation and a growable writable
//! one.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::Mmap;
use snafu::{ensure, OptionExt, ResultExt};

use crate::config::{
    EngineConfig, FILE_HEADER_LEN, FILE_VERSION, PACKET_FORMAT_VDIF, SYNC_WORD, WBLOCK_HEADER_LEN,
};
use crate::error::{
    BadSyncWordSnafu, BlockOutOfRangeSnafu, MmapSnafu, OpenSnafu, SgError, TruncatedFileHeaderSnafu,
};
use crate::header::VdifHeader;
use crate::mmap::GrowableMap;

#[derive(Debug, Clone, Copy)]
struct BlockEntry {
    payload_offset: usize,
    frame_count: u32,
}

/// Read access into a single already-written SG file.
///
/// Cheaply [`Clone`]able: the backing mmap and block index are
/// reference-counted so the same file can be handed to a `spawn_blocking`
/// worker without re-opening it.
#[derive(Clone)]
pub struct SgReader {
    path: PathBuf,
    mmap: Arc<Mmap>,
    packet_size: u32,
    blocks: Arc<Vec<BlockEntry>>,
}

impl SgReader {
    /// Opens `path`, validates the file header tag, and indexes every
    /// write-block it contains.
    pub fn open(path: &Path) -> Result<Self, SgError> {
        let file = File::open(path).context(OpenSnafu { path })?;
        let mmap = unsafe { Mmap::map(&file) }.context(MmapSnafu { path })?;

        ensure!(
            mmap.len() as u64 >= FILE_HEADER_LEN,
            TruncatedFileHeaderSnafu { path }
        );

        let sync_word = read_u32(&mmap, 0);
        ensure!(sync_word == SYNC_WORD, BadSyncWordSnafu { path });

        let packet_size = read_u32(&mmap, 12);

        let mut blocks = Vec::new();
        let mut offset = FILE_HEADER_LEN;
        while offset + WBLOCK_HEADER_LEN <= mmap.len() as u64 {
            let wb_size = read_u32(&mmap, offset + 4) as u64;
            if wb_size < WBLOCK_HEADER_LEN {
                break;
            }
            let payload_offset = offset + WBLOCK_HEADER_LEN;
            let payload_len = wb_size - WBLOCK_HEADER_LEN;
            if payload_offset + payload_len > mmap.len() as u64 {
                break;
            }
            let frame_count = if packet_size > 0 {
                (payload_len / packet_size as u64) as u32
            } else {
                0
            };
            blocks.push(BlockEntry {
                payload_offset: payload_offset as usize,
                frame_count,
            });
            offset += wb_size;
        }

        Ok(Self {
            path: path.to_path_buf(),
            mmap: Arc::new(mmap),
            packet_size,
            blocks: Arc::new(blocks),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn packet_size(&self) -> u32 {
        self.packet_size
    }

    pub fn total_blocks(&self) -> u32 {
        self.blocks.len() as u32
    }

    /// Returns the contiguous packet bytes for write-block `index`, and
    /// the number of complete frames it holds.
    pub fn block_bytes(&self, index: u32) -> Option<(&[u8], u32)> {
        let entry = self.blocks.get(index as usize)?;
        let len = entry.frame_count as usize * self.packet_size as usize;
        Some((&self.mmap[entry.payload_offset..entry.payload_offset + len], entry.frame_count))
    }

    /// Reads block `index`, copying its packet bytes into an owned buffer.
    ///
    /// Used by the blocking workers so the result can outlive the
    /// borrowed mmap once it crosses a `spawn_blocking` boundary.
    pub fn read_block_owned(&self, index: u32) -> Result<(Vec<u8>, u32), SgError> {
        let total = self.total_blocks();
        let (bytes, frame_count) = self.block_bytes(index).context(BlockOutOfRangeSnafu {
            path: self.path.clone(),
            index,
            total,
        })?;
        Ok((bytes.to_vec(), frame_count))
    }

    /// Timestamp of the very first frame in this file, used to sort
    /// shards ascending during read-plan construction. Shards with no
    /// blocks at all sort last.
    pub fn first_block_timestamp(&self) -> (u32, u32) {
        match self.block_bytes(0) {
            Some((bytes, frame_count)) if frame_count > 0 => {
                crate::header::first_header(bytes, frame_count).unwrap_or((u32::MAX, u32::MAX))
            }
            _ => (u32::MAX, u32::MAX),
        }
    }
}

fn read_u32(buf: &[u8], offset: u64) -> u32 {
    let offset = offset as usize;
    u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap())
}

/// Write access into a single SG file being actively appended to.
///
/// Owns the growable mapped region exclusively; never shared between
/// workers, so each shard is exclusively owned by whichever worker is
/// currently writing to it.
pub struct SgWriter {
    path: PathBuf,
    map: GrowableMap,
    block_index: u32,
    /// Byte offset of the next write, tracked separately from
    /// `map.mapped_len()`, which is always rounded up to a growth step.
    write_offset: u64,
    packet_size: Option<u32>,
    frames_per_block: Option<u32>,
}

impl SgWriter {
    /// Creates/truncates `path`, sets mode `0664`, and reserves
    /// `config.initial_blocks() * config.wblock_size()` bytes.
    pub fn create(path: &Path, config: &EngineConfig) -> Result<Self, SgError> {
        let initial_len = config.initial_blocks() * config.wblock_size();
        let map = GrowableMap::create(path, initial_len)?;
        Ok(Self {
            path: path.to_path_buf(),
            map,
            block_index: 0,
            write_offset: 0,
            packet_size: None,
            frames_per_block: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn block_index(&self) -> u32 {
        self.block_index
    }

    pub fn packet_size(&self) -> u32 {
        self.packet_size.unwrap_or(0)
    }

    pub fn write_offset(&self) -> u64 {
        self.write_offset
    }

    pub fn mapped_len(&self) -> u64 {
        self.map.mapped_len()
    }

    fn ensure_capacity(&mut self, additional: u64, config: &EngineConfig) -> Result<(), SgError> {
        let needed = self.write_offset + additional;
        if needed <= self.map.mapped_len() {
            return Ok(());
        }
        let mut new_len = self.map.mapped_len() + config.growth_blocks() * config.wblock_size();
        while new_len < needed {
            new_len += config.growth_blocks() * config.wblock_size();
        }
        self.map.grow(new_len)
    }

    fn append_bytes(&mut self, bytes: &[u8], config: &EngineConfig) -> Result<(), SgError> {
        self.ensure_capacity(bytes.len() as u64, config)?;
        let start = self.write_offset as usize;
        self.map.as_mut_slice()[start..start + bytes.len()].copy_from_slice(bytes);
        self.write_offset += bytes.len() as u64;
        Ok(())
    }

    /// Writes the file header tag if this is the first write to this
    /// shard. A no-op on subsequent calls.
    pub fn write_file_header_if_needed(
        &mut self,
        packet_size: u32,
        frames_per_block: u32,
        config: &EngineConfig,
    ) -> Result<(), SgError> {
        if self.block_index != 0 || self.write_offset != 0 {
            return Ok(());
        }

        self.packet_size = Some(packet_size);
        self.frames_per_block = Some(frames_per_block);

        let block_size = packet_size as u64 * frames_per_block as u64 + WBLOCK_HEADER_LEN;
        let mut header = [0u8; FILE_HEADER_LEN as usize];
        header[0..4].copy_from_slice(&SYNC_WORD.to_le_bytes());
        header[4..8].copy_from_slice(&FILE_VERSION.to_le_bytes());
        header[8..12].copy_from_slice(&PACKET_FORMAT_VDIF.to_le_bytes());
        header[12..16].copy_from_slice(&packet_size.to_le_bytes());
        header[16..20].copy_from_slice(&(block_size as u32).to_le_bytes());

        self.append_bytes(&header, config)
    }

    /// Appends one write-block header tag followed by `payload` (packed
    /// VDIF packets), growing the mapped region first if needed.
    pub fn append_block(&mut self, payload: &[u8], config: &EngineConfig) -> Result<(), SgError> {
        let wb_size = payload.len() as u64 + WBLOCK_HEADER_LEN;
        let mut header = [0u8; WBLOCK_HEADER_LEN as usize];
        header[0..4].copy_from_slice(&self.block_index.to_le_bytes());
        header[4..8].copy_from_slice(&(wb_size as u32).to_le_bytes());

        self.append_bytes(&header, config)?;
        self.append_bytes(payload, config)?;
        self.block_index += 1;
        Ok(())
    }

    /// Finalizes the shard: shrinks the mapped region/file to exactly the
    /// bytes written, or, if nothing was ever written, leaves the file at
    /// its reserved mapped length for the caller to unlink outright.
    /// Returns the number of bytes written.
    pub fn finalize(self) -> Result<u64, SgError> {
        let written = self.write_offset;
        if written > 0 {
            self.map.shrink_to(written)?;
        }
        Ok(written)
    }
}

/// Parses only the fields `write_frames` needs from the first frame of an
/// incoming write buffer.
pub fn first_header_of_buffer(buffer: &[u8]) -> Option<VdifHeader> {
    VdifHeader::parse(buffer)
}
