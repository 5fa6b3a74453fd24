//! Error taxonomy for the scatter-gather engine.
//!
//! A fatal worker-task failure is surfaced through the task join rather
//! than aborting the process or printing to `stderr`, and a read/write
//! mode mismatch becomes a typed error variant instead of a `-1` sentinel.

use std::path::PathBuf;

use snafu::Snafu;

/// Errors from the single-file SG access layer adapter.
#[derive(Debug, Snafu)]
pub enum SgError {
    #[snafu(display("failed to open sg file {}: {}", path.display(), source))]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to memory-map sg file {}: {}", path.display(), source))]
    Mmap {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("sg file {} is missing or has a truncated file header", path.display()))]
    TruncatedFileHeader { path: PathBuf },

    #[snafu(display("sg file {} has an invalid sync word", path.display()))]
    BadSyncWord { path: PathBuf },

    #[snafu(display(
        "sg file {} has a truncated or corrupt write-block header at offset {}",
        path.display(),
        offset
    ))]
    CorruptBlockHeader { path: PathBuf, offset: u64 },

    #[snafu(display("failed to grow mapped region for {}: {}", path.display(), source))]
    Resize {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("block index {} out of range for sg file {} ({} blocks)", index, path.display(), total))]
    BlockOutOfRange {
        path: PathBuf,
        index: u32,
        total: u32,
    },
}

/// Errors from plan construction (`make_read_plan`/`make_write_plan`).
#[derive(Debug, Snafu)]
pub enum PlanError {
    #[snafu(display("failed to join shard-open worker task: {}", source))]
    TaskJoin { source: tokio::task::JoinError },

    #[snafu(display("invalid path template: {}", reason))]
    InvalidTemplate { reason: String },
}

/// Errors from the read pipeline.
#[derive(Debug, Snafu)]
pub enum ReadError {
    #[snafu(display("read operation attempted on a write-mode plan"))]
    WrongMode,

    #[snafu(display("failed to join shard-read worker task: {}", source))]
    TaskJoin { source: tokio::task::JoinError },

    #[snafu(display("shard i/o failed during read: {}", source))]
    Sg { source: SgError },
}

/// Errors from the write pipeline.
#[derive(Debug, Snafu)]
pub enum WriteError {
    #[snafu(display("write operation attempted on a read-mode plan"))]
    WrongMode,

    #[snafu(display("failed to join shard-write worker task: {}", source))]
    TaskJoin { source: tokio::task::JoinError },

    #[snafu(display("shard i/o failed during write: {}", source))]
    Sg { source: SgError },

    #[snafu(display("write buffer does not contain a valid VDIF header"))]
    InvalidFirstHeader,
}

/// Errors from closing a plan.
#[derive(Debug, Snafu)]
pub enum CloseError {
    #[snafu(display("failed to finalize shard {}: {}", path.display(), source))]
    Finalize {
        path: PathBuf,
        source: SgError,
    },

    #[snafu(display("failed to remove empty shard file {}: {}", path.display(), source))]
    Unlink {
        path: PathBuf,
        source: std::io::Error,
    },
}
