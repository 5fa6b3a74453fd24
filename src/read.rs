//! The read pipeline: launches one worker per shard whose staging buffer
//! is empty, then runs the contiguity merger over whatever is ready.

use tokio::task::JoinSet;
use tracing::trace;

use crate::error::ReadError;
use crate::merge::contiguity_merge;
use crate::plan::ReadState;

/// Number of frames produced by a single read step.
pub type FrameCount = u32;

impl ReadState {
    /// Produces one super-block's worth of temporally contiguous frames,
    /// concatenated into a freshly allocated byte buffer.
    ///
    /// Shards whose staging was not consumed by the previous call (their
    /// block did not merge then) are left alone this step; they do not
    /// consume I/O until their buffer is cleared.
    #[tracing::instrument(skip(self), level = "trace")]
    pub async fn read_next_block(&mut self) -> Result<(Vec<u8>, FrameCount), ReadError> {
        let mut joinset = JoinSet::new();
        for (idx, shard) in self.shards.iter().enumerate() {
            if shard.staging_is_empty() && !shard.is_dead() {
                let sg = shard.sg.clone();
                let block_index = shard.block_index;
                joinset.spawn_blocking(move || (idx, sg.read_block_owned(block_index)));
            }
        }

        // Over-allocate: sum of each shard's nominal per-block packet
        // count covers retained-plus-newly-read without an extra pass.
        let estimate: usize = self
            .shards
            .iter()
            .map(|s| s.sg.block_bytes(0).map(|(b, _)| b.len()).unwrap_or(0))
            .sum();

        while let Some(res) = joinset.join_next().await {
            let (idx, outcome) = res.map_err(|source| ReadError::TaskJoin { source })?;
            let (bytes, frame_count) =
                outcome.map_err(|source| ReadError::Sg { source })?;
            let shard = &mut self.shards[idx];
            shard.staging = Some(bytes);
            shard.frame_count = frame_count;
            shard.block_index += 1;
        }

        let spans: Vec<Option<_>> = self
            .shards
            .iter()
            .map(|s| match (s.first_header(), s.last_header()) {
                (Some(first), Some(last)) => Some((first, last)),
                _ => None,
            })
            .collect();

        let (merged, _mapping) = contiguity_merge(&spans);

        let mut out = Vec::with_capacity(estimate);
        let mut total_frames: u32 = 0;
        for idx in merged.order {
            let shard = &mut self.shards[idx];
            if let Some(bytes) = shard.staging.take() {
                out.extend_from_slice(&bytes);
                total_frames += shard.frame_count;
            }
            shard.clear_staging();
        }

        trace!(total_frames, "read_next_block completed");
        Ok((out, total_frames))
    }

    /// Single-shot variant: reads write-block `index` from every shard
    /// that has it, joins, and concatenates in shard order without a
    /// contiguity check. Does not advance `block_index` or touch
    /// `staging`. Intended for random access / diagnostics.
    pub async fn read_block_at(&self, index: u32) -> Result<(Vec<u8>, FrameCount), ReadError> {
        let mut joinset = JoinSet::new();
        for (idx, shard) in self.shards.iter().enumerate() {
            let sg = shard.sg.clone();
            joinset.spawn_blocking(move || (idx, sg.read_block_owned(index)));
        }

        let mut slots: Vec<Option<(Vec<u8>, u32)>> = (0..self.shards.len()).map(|_| None).collect();
        while let Some(res) = joinset.join_next().await {
            let (idx, outcome) = res.map_err(|source| ReadError::TaskJoin { source })?;
            if let Ok(block) = outcome {
                slots[idx] = Some(block);
            }
        }

        let mut out = Vec::new();
        let mut total_frames = 0u32;
        for slot in slots.into_iter().flatten() {
            out.extend_from_slice(&slot.0);
            total_frames += slot.1;
        }

        Ok((out, total_frames))
    }

    /// Closes the read plan: drops every shard's SG accessor. Any
    /// remaining staging buffers are freed along with the shards.
    pub fn close(self) {
        drop(self.shards);
    }
}
