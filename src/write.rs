//! The write pipeline: splits an incoming frame run across shards
//! round-robin at write-block granularity, launching one worker per
//! assigned shard per cycle.

use tokio::task::JoinSet;
use tracing::{debug, trace};

use crate::config::EngineConfig;
use crate::error::{SgError, WriteError};
use crate::plan::WriteState;
use crate::shard::WriteShard;
use crate::sg::first_header_of_buffer;

pub type FrameCount = u32;

impl WriteState {
    /// Writes exactly `n_frames` VDIF frames from `buffer`, striped
    /// across shards in write-block-sized chunks round-robin, returning
    /// the number of frames actually written.
    ///
    /// If a worker hits [`WriteError::Sg`] mid-call, the current cycle is
    /// abandoned and the count accumulated through the last fully-joined
    /// cycle is returned rather than propagated as an error, matching a
    /// degrade-gracefully short-write contract. Task-join failures (a
    /// worker task itself panicking or being cancelled) do propagate as
    /// `Err`.
    #[tracing::instrument(skip(self, buffer), level = "trace")]
    pub async fn write_frames(
        &mut self,
        buffer: &[u8],
        n_frames: u32,
    ) -> Result<FrameCount, WriteError> {
        if self.shards.is_empty() || n_frames == 0 {
            return Ok(0);
        }

        let is_first_write = self.packet_size.is_none()
            && self.shards.iter().all(|s| s.sg.block_index() == 0);

        if is_first_write {
            let header = first_header_of_buffer(buffer)
                .ok_or(WriteError::InvalidFirstHeader)?;
            let packet_size = header.frame_byte_len() as u32;
            if packet_size == 0 {
                return Err(WriteError::InvalidFirstHeader);
            }
            let frames_per_block = (self.config.wblock_size() / packet_size as u64).max(1) as u32;
            self.packet_size = Some(packet_size);
            self.frames_per_block = Some(frames_per_block);
        }

        let packet_size = self.packet_size.ok_or(WriteError::InvalidFirstHeader)?;
        let frames_per_block = self.frames_per_block.ok_or(WriteError::InvalidFirstHeader)?;

        let n_shards = self.shards.len();
        let s0 = self
            .shards
            .iter()
            .enumerate()
            .min_by_key(|(_, s)| s.sg.block_index())
            .map(|(idx, _)| idx)
            .unwrap_or(0);

        let mut slots: Vec<Option<WriteShard>> =
            std::mem::take(&mut self.shards).into_iter().map(Some).collect();

        let mut frame_cursor: u32 = 0;
        let mut frames_written: u32 = 0;
        let mut short_write = false;

        while frame_cursor < n_frames && !short_write {
            let mut joinset = JoinSet::new();
            let mut cycle_chunks: Vec<(usize, u32)> = Vec::new();

            for j in 0..n_shards {
                if frame_cursor >= n_frames {
                    break;
                }
                let shard_idx = (s0 + j) % n_shards;
                let chunk = (n_frames - frame_cursor).min(frames_per_block);
                let byte_start = frame_cursor as usize * packet_size as usize;
                let byte_len = chunk as usize * packet_size as usize;
                let payload = buffer[byte_start..byte_start + byte_len].to_vec();

                let shard = slots[shard_idx]
                    .take()
                    .expect("shard assigned twice in the same cycle");
                let config = self.config;

                joinset.spawn_blocking(move || {
                    (shard_idx, write_worker(shard, payload, packet_size, frames_per_block, config))
                });

                cycle_chunks.push((shard_idx, chunk));
                frame_cursor += chunk;
            }

            let mut cycle_failed = false;
            while let Some(res) = joinset.join_next().await {
                let (idx, (shard, result)) =
                    res.map_err(|source| WriteError::TaskJoin { source })?;
                slots[idx] = Some(shard);
                if result.is_err() {
                    cycle_failed = true;
                }
            }

            if cycle_failed {
                short_write = true;
            } else {
                frames_written += cycle_chunks.iter().map(|(_, c)| c).sum::<u32>();
            }
        }

        self.shards = slots
            .into_iter()
            .map(|s| s.expect("every shard slot reassembled after its cycle"))
            .collect();

        if short_write {
            debug!(frames_written, n_frames, "write_frames ended in a short write");
        }
        trace!(frames_written, "write_frames completed");

        Ok(frames_written)
    }

    /// Closes the write plan: for each shard, if no bytes were ever
    /// written, `finalize` leaves the file at its reserved mapped length
    /// and the (empty) file is unlinked outright. Otherwise `finalize`
    /// shrinks the file to its true written length first.
    pub fn close(self) -> Result<(), crate::error::CloseError> {
        for shard in self.shards {
            let path = shard.path().to_path_buf();
            let written = shard
                .sg
                .finalize()
                .map_err(|source| crate::error::CloseError::Finalize {
                    path: path.clone(),
                    source,
                })?;

            if written == 0 {
                std::fs::remove_file(&path)
                    .map_err(|source| crate::error::CloseError::Unlink { path, source })?;
            }
        }
        Ok(())
    }
}

fn write_worker(
    mut shard: WriteShard,
    payload: Vec<u8>,
    packet_size: u32,
    frames_per_block: u32,
    config: EngineConfig,
) -> (WriteShard, Result<(), SgError>) {
    let result = shard
        .sg
        .write_file_header_if_needed(packet_size, frames_per_block, &config)
        .and_then(|()| shard.sg.append_block(&payload, &config));

    shard.block_index = shard.sg.block_index();
    (shard, result)
}
