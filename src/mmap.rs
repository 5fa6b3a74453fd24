//! Memory map manager: allocate, grow, shrink, finalize.
//!
//! A growable mmap-backed file, built over `memmap2`, generalized here to
//! support the live resizing a growable write-mode shard needs. `memmap2`
//! has no `mremap` equivalent, so growth unmaps, extends the file with
//! `set_len`, and remaps, preserving old contents up to the old size.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::MmapMut;

use crate::error::{MmapSnafu, OpenSnafu, ResizeSnafu, SgError};
use snafu::ResultExt;

#[cfg(unix)]
const FILE_MODE: u32 = 0o664;

/// A growable, file-backed writable memory map.
///
/// The file's logical length and the mapped region's length are always
/// equal; growth and shrinkage are applied to both atomically from the
/// caller's perspective.
pub struct GrowableMap {
    path: PathBuf,
    file: File,
    mmap: MmapMut,
    mapped_len: u64,
}

impl GrowableMap {
    /// Creates (truncating if necessary) the file at `path` with mode
    /// `0664`, sizes it to `initial_len` bytes, and maps it writable.
    pub fn create(path: &Path, initial_len: u64) -> Result<Self, SgError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .context(OpenSnafu { path })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(FILE_MODE);
            let _ = file.set_permissions(perms);
        }

        file.set_len(initial_len)
            .context(ResizeSnafu { path })?;

        let mmap = unsafe { MmapMut::map_mut(&file) }.context(MmapSnafu { path })?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            mmap,
            mapped_len: initial_len,
        })
    }

    /// Current length of the mapped region, in bytes.
    pub fn mapped_len(&self) -> u64 {
        self.mapped_len
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.mmap[..]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.mmap[..]
    }

    /// Grows the mapped region to at least `new_len` bytes.
    ///
    /// Old contents, up to the previous length, are preserved. A no-op if
    /// `new_len <= mapped_len()`.
    pub fn grow(&mut self, new_len: u64) -> Result<(), SgError> {
        if new_len <= self.mapped_len {
            return Ok(());
        }

        // Flush outstanding writes before dropping the old mapping.
        self.mmap.flush().context(ResizeSnafu { path: &self.path })?;
        // Dropping the old mapping before resizing the backing file avoids
        // holding a mapping whose extent no longer matches the file.
        let placeholder = unsafe { MmapMut::map_anon(1) }.context(MmapSnafu { path: &self.path })?;
        let _old = std::mem::replace(&mut self.mmap, placeholder);
        drop(_old);

        self.file
            .set_len(new_len)
            .context(ResizeSnafu { path: &self.path })?;

        self.mmap = unsafe { MmapMut::map_mut(&self.file) }.context(MmapSnafu { path: &self.path })?;
        self.mapped_len = new_len;

        Ok(())
    }

    /// Shrinks the file and mapped region to exactly `exact_len` bytes.
    ///
    /// Used at write-plan finalization to truncate a shard's backing file
    /// down to the number of bytes actually written.
    pub fn shrink_to(mut self, exact_len: u64) -> Result<(), SgError> {
        self.mmap.flush().context(ResizeSnafu { path: &self.path })?;
        // Unmap before truncating; some platforms refuse to shrink a file
        // underneath an active mapping.
        let placeholder = unsafe { MmapMut::map_anon(1) }.context(MmapSnafu { path: &self.path })?;
        drop(std::mem::replace(&mut self.mmap, placeholder));

        self.file
            .set_len(exact_len)
            .context(ResizeSnafu { path: &self.path })?;

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
