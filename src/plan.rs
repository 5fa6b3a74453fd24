//! Plan construction: the ordered collection of shards, plus a mode flag
//! modeled as a tagged variant so that calling a read operation on a write
//! plan, or vice versa, is caught by the type system at the low-level API
//! and by an explicit error at the [`Plan`] dispatch layer.

use std::path::PathBuf;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::PlanError;
use crate::shard::{ReadShard, WriteShard};
use crate::sg::{SgReader, SgWriter};

/// Read-mode plan state: shards sorted ascending by first-frame
/// timestamp immediately after construction.
pub struct ReadState {
    pub shards: Vec<ReadShard>,
    pub config: EngineConfig,
}

/// Write-mode plan state: shards in (module, disk) enumeration order;
/// they carry no data yet, so there is nothing to sort by.
pub struct WriteState {
    pub shards: Vec<WriteShard>,
    pub config: EngineConfig,
    /// Packet size in bytes, learned from the first frame of the first
    /// `write_frames` call and reused by every shard's first file header
    /// tag thereafter, even if that shard's own first assigned cycle
    /// comes later.
    pub packet_size: Option<u32>,
    /// Frames per write-block, derived from `packet_size` and the
    /// configured `wblock_size`.
    pub frames_per_block: Option<u32>,
}

/// A plan coordinates one storage shard per file, in either read or
/// write mode. All public entry points act on a `Plan`.
pub enum Plan {
    Read(ReadState),
    Write(WriteState),
}

/// Validates that `template` contains exactly two integer fields (`%d`)
/// and one string field (`%s`).
///
/// Returns [`PlanError::InvalidTemplate`] if the counts don't match --
/// a third `%d` would otherwise silently reuse `disk`'s value, and a
/// missing `%s` would silently drop the suffix.
fn validate_template(template: &str) -> Result<(), PlanError> {
    let mut chars = template.chars().peekable();
    let mut int_fields = 0u32;
    let mut string_fields = 0u32;

    while let Some(c) = chars.next() {
        if c == '%' {
            match chars.peek() {
                Some('d') => {
                    chars.next();
                    int_fields += 1;
                }
                Some('s') => {
                    chars.next();
                    string_fields += 1;
                }
                _ => {}
            }
        }
    }

    if int_fields != 2 || string_fields != 1 {
        return Err(PlanError::InvalidTemplate {
            reason: format!(
                "expected exactly two '%d' fields and one '%s' field, found {} '%d' and {} '%s' in {:?}",
                int_fields, string_fields, template
            ),
        });
    }

    Ok(())
}

/// Expands a path template with exactly two integer fields (`%d`) and one
/// string field (`%s`) against a `(module, disk, suffix)` triple.
///
/// The first two `%d` occurrences are replaced by `module` then `disk`,
/// in template order; the first `%s` is replaced by `suffix`. Callers
/// must validate the template with [`validate_template`] first --
/// `format_path` itself performs no validation and is only ever called
/// after that check has passed.
pub fn format_path(template: &str, module: u32, disk: u32, suffix: &str) -> PathBuf {
    let mut result = String::with_capacity(template.len() + suffix.to_string().len());
    let mut chars = template.chars().peekable();
    let mut int_fields_seen = 0u32;

    while let Some(c) = chars.next() {
        if c == '%' {
            match chars.peek() {
                Some('d') => {
                    chars.next();
                    let value = if int_fields_seen == 0 { module } else { disk };
                    int_fields_seen += 1;
                    result.push_str(&value.to_string());
                    continue;
                }
                Some('s') => {
                    chars.next();
                    result.push_str(suffix);
                    continue;
                }
                _ => {}
            }
        }
        result.push(c);
    }

    PathBuf::from(result)
}

fn module_disk_pairs(modules: &[u32], disks: &[u32]) -> Vec<(u32, u32)> {
    let mut pairs = Vec::with_capacity(modules.len() * disks.len());
    for &m in modules {
        for &d in disks {
            pairs.push((m, d));
        }
    }
    pairs
}

impl Plan {
    /// Opens every `(module, disk)` candidate path in parallel, keeps
    /// only the ones that open successfully, sorts them ascending by
    /// `(first_secs, first_frame)`, and returns the resulting plan along
    /// with the number of shards opened.
    ///
    /// A candidate file that fails to open is silently skipped -- not
    /// every module/disk is required to be populated.
    pub async fn make_read_plan(
        pattern: &str,
        template: &str,
        modules: &[u32],
        disks: &[u32],
        config: EngineConfig,
    ) -> Result<(Plan, usize), PlanError> {
        validate_template(template)?;

        let pairs = module_disk_pairs(modules, disks);
        let mut slots: Vec<Option<(PathBuf, SgReader)>> = (0..pairs.len()).map(|_| None).collect();

        let mut joinset = JoinSet::new();
        for (idx, &(m, d)) in pairs.iter().enumerate() {
            let path = format_path(template, m, d, pattern);
            joinset.spawn_blocking(move || (idx, path.clone(), SgReader::open(&path)));
        }

        while let Some(res) = joinset.join_next().await {
            let (idx, path, outcome) = res.map_err(|source| PlanError::TaskJoin { source })?;
            match outcome {
                Ok(sg) => slots[idx] = Some((path, sg)),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping sg shard that failed to open");
                }
            }
        }

        let mut shards: Vec<ReadShard> = slots
            .into_iter()
            .flatten()
            .map(|(path, sg)| ReadShard::new(path, sg))
            .collect();

        shards.sort_by_key(|shard| shard.sg.first_block_timestamp());

        let n_opened = shards.len();
        debug!(n_opened, n_candidates = pairs.len(), "read plan constructed");

        Ok((Plan::Read(ReadState { shards, config }), n_opened))
    }

    /// Creates every `(module, disk)` candidate path in parallel. A shard
    /// whose creation or initial mapping fails is dropped from the final
    /// plan. Shards are left in enumeration order; they have no data yet
    /// to sort by.
    pub async fn make_write_plan(
        pattern: &str,
        template: &str,
        modules: &[u32],
        disks: &[u32],
        config: EngineConfig,
    ) -> Result<(Plan, usize), PlanError> {
        validate_template(template)?;

        let pairs = module_disk_pairs(modules, disks);
        let mut slots: Vec<Option<(PathBuf, SgWriter)>> = (0..pairs.len()).map(|_| None).collect();

        let mut joinset = JoinSet::new();
        for (idx, &(m, d)) in pairs.iter().enumerate() {
            let path = format_path(template, m, d, pattern);
            joinset.spawn_blocking(move || (idx, path.clone(), SgWriter::create(&path, &config)));
        }

        while let Some(res) = joinset.join_next().await {
            let (idx, path, outcome) = res.map_err(|source| PlanError::TaskJoin { source })?;
            match outcome {
                Ok(sg) => slots[idx] = Some((path, sg)),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "dropping sg shard that failed to create/map");
                }
            }
        }

        let shards: Vec<WriteShard> = slots
            .into_iter()
            .flatten()
            .map(|(path, sg)| WriteShard::new(path, sg))
            .collect();

        let n_created = shards.len();
        debug!(n_created, n_candidates = pairs.len(), "write plan constructed");

        Ok((
            Plan::Write(WriteState {
                shards,
                config,
                packet_size: None,
                frames_per_block: None,
            }),
            n_created,
        ))
    }

    /// Delegates to [`ReadState`]; fails with
    /// [`crate::error::ReadError::WrongMode`] on a write plan.
    pub async fn read_next_block(
        &mut self,
    ) -> Result<(Vec<u8>, crate::read::FrameCount), crate::error::ReadError> {
        match self {
            Plan::Read(state) => state.read_next_block().await,
            Plan::Write(_) => Err(crate::error::ReadError::WrongMode),
        }
    }

    /// Single-shot random-access read by block index.
    pub async fn read_block_at(
        &self,
        index: u32,
    ) -> Result<(Vec<u8>, crate::read::FrameCount), crate::error::ReadError> {
        match self {
            Plan::Read(state) => state.read_block_at(index).await,
            Plan::Write(_) => Err(crate::error::ReadError::WrongMode),
        }
    }

    /// Stripes an incoming frame run across shards and writes it.
    pub async fn write_frames(
        &mut self,
        buffer: &[u8],
        n_frames: u32,
    ) -> Result<crate::write::FrameCount, crate::error::WriteError> {
        match self {
            Plan::Write(state) => state.write_frames(buffer, n_frames).await,
            Plan::Read(_) => Err(crate::error::WriteError::WrongMode),
        }
    }

    /// Closes a plan, whichever mode it's in: finalizes shard files per
    /// mode and releases every shard. A no-op (never fails) for a read
    /// plan, since read plans have nothing to finalize on disk.
    pub fn close(self) -> Result<(), crate::error::CloseError> {
        match self {
            Plan::Read(state) => {
                state.close();
                Ok(())
            }
            Plan::Write(state) => state.close(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_path_substitutes_in_order() {
        let path = format_path("/mnt/disks/%d/%d/data/%s", 3, 7, "recording.sg");
        assert_eq!(path, PathBuf::from("/mnt/disks/3/7/data/recording.sg"));
    }

    #[test]
    fn format_path_handles_reordered_literal_text() {
        let path = format_path("/srv/m%d-d%d/%s.sg", 1, 2, "stream");
        assert_eq!(path, PathBuf::from("/srv/m1-d2/stream.sg"));
    }

    #[test]
    fn validate_template_accepts_two_ints_one_string() {
        assert!(validate_template("/mnt/disks/%d/%d/data/%s").is_ok());
        assert!(validate_template("/srv/m%d-d%d/%s.sg").is_ok());
    }

    #[test]
    fn validate_template_rejects_extra_int_field() {
        let err = validate_template("/mnt/%d/%d/%d/%s").unwrap_err();
        assert!(matches!(err, PlanError::InvalidTemplate { .. }));
    }

    #[test]
    fn validate_template_rejects_missing_string_field() {
        let err = validate_template("/mnt/%d/%d/data").unwrap_err();
        assert!(matches!(err, PlanError::InvalidTemplate { .. }));
    }

    #[test]
    fn validate_template_rejects_missing_int_field() {
        let err = validate_template("/mnt/%d/data/%s").unwrap_err();
        assert!(matches!(err, PlanError::InvalidTemplate { .. }));
    }
}
