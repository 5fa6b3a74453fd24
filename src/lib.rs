//! # Scatter-gather I/O engine for VDIF
//!
//! A single logical recording is partitioned across `M × D` files (`M`
//! storage modules, each holding `D` disks); each file ("shard") holds a
//! portion of the overall VDIF packet stream. This crate reconstructs a
//! single time-ordered stream from the shards in read mode, and stripes
//! an incoming stream across the shards round-robin in write mode.
//!
//! ## On-disk layout
//!
//! Each shard is a single SG file:
//!
//! ```text
//! file header tag:
//!   sync_word:      u32
//!   version:        u32
//!   packet_format:  u32  (always VDIF)
//!   packet_size:    u32  (bytes)
//!   block_size:     u32  (bytes; packets * packet_size + header size)
//!
//! repeated write-block:
//!   block_index:    u32
//!   wb_size:        u32  (bytes; payload + header size)
//!   payload:        packets * packet_size bytes
//! ```
//!
//! All integers are little-endian. The file header and each write-block
//! header are written by the writer side and consumed by the reader side
//! exactly as laid out above; there is no checksumming and no recovery
//! from a truncated or corrupt file (see the crate's Non-goals).
//!
//! ## Read mode
//!
//! [`Plan::make_read_plan`] opens one SG file per `(module, disk)` pair
//! that exists, in parallel, and sorts the resulting shards ascending by
//! the timestamp of their first frame. [`Plan::read_next_block`] then
//! reads the next write-block from every shard whose staging buffer is
//! empty, and runs the [`merge`] contiguity merger over whatever becomes
//! ready, returning the time-contiguous prefix and retaining the rest for
//! the next call.
//!
//! ## Write mode
//!
//! [`Plan::make_write_plan`] creates one SG file per `(module, disk)`
//! pair. [`Plan::write_frames`] stripes an incoming run of VDIF frames
//! across the shards round-robin at write-block granularity, growing
//! each shard's memory-mapped region on demand via [`mmap::GrowableMap`].
//!
//! ## Concurrency
//!
//! Every public entry point fans work out over the shards on `tokio`'s
//! blocking thread pool and joins before returning: there are no
//! long-lived background tasks, and no ordering between workers within a
//! single step is observed or required.

pub mod config;
pub mod error;
pub mod header;
pub mod merge;
pub mod mmap;
pub mod plan;
pub mod read;
pub mod sg;
pub mod shard;
pub mod write;

pub use config::{EngineConfig, EngineConfigBuilder};
pub use error::{CloseError, PlanError, ReadError, SgError, WriteError};
pub use plan::Plan;
