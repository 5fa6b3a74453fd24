//! Tunables and on-disk constants for the scatter-gather engine.
//!
//! Mirrors [`DiskBufferConfig`]/[`DiskBufferConfigBuilder`] from the disk
//! buffer this crate is descended from: callers build an [`EngineConfig`]
//! once and hand it to plan construction. This is library configuration,
//! not a file/environment loader.

use snafu::Snafu;

/// Magic value at the start of every SG file, used to reject files that
/// aren't ours (or that are truncated before the header is complete).
pub const SYNC_WORD: u32 = 0x5347_4631; // ASCII "1GFS" read little-endian

/// On-disk format version written into new SG files.
pub const FILE_VERSION: u32 = 1;

/// Value of the `packet_format` field for VDIF payloads; the only format
/// this engine understands.
pub const PACKET_FORMAT_VDIF: u32 = 1;

/// Byte length of the file header tag: sync word, version, packet format,
/// packet size, nominal block size (5 `u32` fields).
pub const FILE_HEADER_LEN: u64 = 5 * 4;

/// Byte length of a write-block header tag: block index, block size.
pub const WBLOCK_HEADER_LEN: u64 = 2 * 4;

/// Default nominal size, in bytes, of a single write-block.
///
/// Kept modest (well under a typical data-file-sized default) since a
/// single super-block here is one write-block per shard, not an entire
/// data file.
pub const DEFAULT_WBLOCK_SIZE: u64 = 8 * 1024 * 1024;

/// Number of write-blocks' worth of space reserved when a write-mode shard
/// is first created.
pub const DEFAULT_INITIAL_BLOCKS: u64 = 2;

/// Number of write-blocks' worth of space added each time a write-mode
/// shard's mapped region must grow.
pub const DEFAULT_GROWTH_BLOCKS: u64 = 4;

#[derive(Debug, Snafu)]
pub enum BuildError {
    #[snafu(display("parameter '{}' was invalid: {}", param_name, reason))]
    InvalidParameter {
        param_name: &'static str,
        reason: String,
    },
}

/// Engine-wide tunables governing write-block sizing and mmap growth.
#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    pub(crate) wblock_size: u64,
    pub(crate) initial_blocks: u64,
    pub(crate) growth_blocks: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfigBuilder::new()
            .build()
            .expect("default engine config parameters are always valid")
    }
}

impl EngineConfig {
    /// Nominal size, in bytes, of a single write-block.
    pub fn wblock_size(&self) -> u64 {
        self.wblock_size
    }

    /// Number of write-blocks reserved when a write-mode shard is created.
    pub fn initial_blocks(&self) -> u64 {
        self.initial_blocks
    }

    /// Number of write-blocks added on each mmap growth step.
    pub fn growth_blocks(&self) -> u64 {
        self.growth_blocks
    }
}

/// Builder for [`EngineConfig`].
#[derive(Clone, Copy, Debug)]
pub struct EngineConfigBuilder {
    wblock_size: Option<u64>,
    initial_blocks: Option<u64>,
    growth_blocks: Option<u64>,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self {
            wblock_size: None,
            initial_blocks: None,
            growth_blocks: None,
        }
    }

    /// Sets the nominal write-block size, in bytes.
    ///
    /// Defaults to 8MB.
    pub fn wblock_size(mut self, amount: u64) -> Self {
        self.wblock_size = Some(amount);
        self
    }

    /// Sets how many write-blocks' worth of space a new write-mode shard
    /// reserves up front.
    ///
    /// Defaults to 2.
    pub fn initial_blocks(mut self, amount: u64) -> Self {
        self.initial_blocks = Some(amount);
        self
    }

    /// Sets how many write-blocks' worth of space is added each time a
    /// write-mode shard's mapped region must grow.
    ///
    /// Defaults to 4.
    pub fn growth_blocks(mut self, amount: u64) -> Self {
        self.growth_blocks = Some(amount);
        self
    }

    /// Consumes this builder and constructs an [`EngineConfig`].
    pub fn build(self) -> Result<EngineConfig, BuildError> {
        let wblock_size = self.wblock_size.unwrap_or(DEFAULT_WBLOCK_SIZE);
        let initial_blocks = self.initial_blocks.unwrap_or(DEFAULT_INITIAL_BLOCKS);
        let growth_blocks = self.growth_blocks.unwrap_or(DEFAULT_GROWTH_BLOCKS);

        if wblock_size == 0 {
            return Err(BuildError::InvalidParameter {
                param_name: "wblock_size",
                reason: "cannot be zero".to_string(),
            });
        }

        if initial_blocks == 0 {
            return Err(BuildError::InvalidParameter {
                param_name: "initial_blocks",
                reason: "cannot be zero".to_string(),
            });
        }

        if growth_blocks == 0 {
            return Err(BuildError::InvalidParameter {
                param_name: "growth_blocks",
                reason: "cannot be zero".to_string(),
            });
        }

        Ok(EngineConfig {
            wblock_size,
            initial_blocks,
            growth_blocks,
        })
    }
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
