//! End-to-end round-trip scenarios against real temp-file shards.

use pretty_assertions::assert_eq;
use sg_vdif::{EngineConfigBuilder, Plan};

const PACKET_SIZE: u32 = 64;

/// Builds `count` contiguous VDIF frames starting at `(secs, start_df)`,
/// each `packet_size` bytes, with the frame's 0-based sequence number
/// stamped into the first four bytes of its payload for later verification.
fn make_frames(secs: u32, start_df: u32, count: u32, packet_size: u32) -> Vec<u8> {
    let mut buf = vec![0u8; count as usize * packet_size as usize];
    for i in 0..count {
        let frame = &mut buf[i as usize * packet_size as usize..(i as usize + 1) * packet_size as usize];
        let w0 = secs & 0x3FFF_FFFF;
        let w1 = (3u32 & 0x3F) << 24 | ((start_df + i) & 0x00FF_FFFF);
        let w2 = (packet_size / 8) & 0x00FF_FFFF;
        frame[0..4].copy_from_slice(&w0.to_le_bytes());
        frame[4..8].copy_from_slice(&w1.to_le_bytes());
        frame[8..12].copy_from_slice(&w2.to_le_bytes());
        frame[32..36].copy_from_slice(&i.to_le_bytes());
    }
    buf
}

fn payload_markers(bytes: &[u8], packet_size: u32) -> Vec<u32> {
    bytes
        .chunks_exact(packet_size as usize)
        .map(|frame| u32::from_le_bytes(frame[32..36].try_into().unwrap()))
        .collect()
}

async fn drain_all(plan: &mut Plan) -> (Vec<u8>, u32) {
    let mut out = Vec::new();
    let mut total = 0u32;
    loop {
        let (bytes, frames) = plan.read_next_block().await.unwrap();
        if frames == 0 {
            break;
        }
        out.extend_from_slice(&bytes);
        total += frames;
    }
    (out, total)
}

// Trivial round trip: a single shard, one write-block worth of frames.
#[tokio::test]
async fn single_shard_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let template = format!("{}/m%d_d%d_%s.sg", dir.path().display());

    let config = EngineConfigBuilder::new()
        .wblock_size((PACKET_SIZE as u64) * 8)
        .build()
        .unwrap();

    let (mut write_plan, n_created) =
        Plan::make_write_plan("recording", &template, &[0], &[0], config)
            .await
            .unwrap();
    assert_eq!(n_created, 1);

    let frames = make_frames(1000, 0, 8, PACKET_SIZE);
    let written = write_plan.write_frames(&frames, 8).await.unwrap();
    assert_eq!(written, 8);
    write_plan.close().unwrap();

    let (mut read_plan, n_opened) =
        Plan::make_read_plan("recording", &template, &[0], &[0], config)
            .await
            .unwrap();
    assert_eq!(n_opened, 1);

    let (out, total_frames) = drain_all(&mut read_plan).await;
    assert_eq!(total_frames, 8);
    assert_eq!(payload_markers(&out, PACKET_SIZE), (0..8).collect::<Vec<_>>());
    read_plan.close().unwrap();
}

// Parallel round trip: four shards (2 modules x 2 disks), two full
// write cycles each, reassembled in original frame order.
#[tokio::test]
async fn four_shard_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let template = format!("{}/m%d_d%d_%s.sg", dir.path().display());

    let config = EngineConfigBuilder::new()
        .wblock_size((PACKET_SIZE as u64) * 4) // 4 frames per write-block
        .build()
        .unwrap();

    let modules = [0u32, 1];
    let disks = [0u32, 1];

    let (mut write_plan, n_created) =
        Plan::make_write_plan("recording", &template, &modules, &disks, config)
            .await
            .unwrap();
    assert_eq!(n_created, 4);

    // 2 full cycles across 4 shards at 4 frames/block == 32 frames.
    let frames = make_frames(2000, 0, 32, PACKET_SIZE);
    let written = write_plan.write_frames(&frames, 32).await.unwrap();
    assert_eq!(written, 32);
    write_plan.close().unwrap();

    let (mut read_plan, n_opened) =
        Plan::make_read_plan("recording", &template, &modules, &disks, config)
            .await
            .unwrap();
    assert_eq!(n_opened, 4);

    let (out, total_frames) = drain_all(&mut read_plan).await;
    assert_eq!(total_frames, 32);
    assert_eq!(payload_markers(&out, PACKET_SIZE), (0..32).collect::<Vec<_>>());
    read_plan.close().unwrap();
}

// A write plan that is closed having never been written to leaves no
// files behind on disk.
#[tokio::test]
async fn unwritten_plan_leaves_no_files() {
    let dir = tempfile::tempdir().unwrap();
    let template = format!("{}/m%d_d%d_%s.sg", dir.path().display());
    let config = EngineConfigBuilder::new().build().unwrap();

    let (write_plan, n_created) =
        Plan::make_write_plan("recording", &template, &[0, 1], &[0], config)
            .await
            .unwrap();
    assert_eq!(n_created, 2);

    write_plan.close().unwrap();

    let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert!(entries.is_empty(), "expected no shard files to remain on disk");
}

// A tiny initial mapping and growth step force several mmap resizes over
// the course of one write call; the round trip must still reproduce the
// exact ordered frame stream once the region has grown repeatedly.
#[tokio::test]
async fn write_past_initial_mapping_forces_growth_and_still_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let template = format!("{}/m%d_d%d_%s.sg", dir.path().display());

    // One write-block fits 2 frames; the shard starts with room for only
    // one block and grows by one block at a time, so writing 40 frames
    // to a single shard spans ~20 blocks and several growth calls.
    let config = EngineConfigBuilder::new()
        .wblock_size((PACKET_SIZE as u64) * 2)
        .initial_blocks(1)
        .growth_blocks(1)
        .build()
        .unwrap();

    let (mut write_plan, n_created) =
        Plan::make_write_plan("recording", &template, &[0], &[0], config)
            .await
            .unwrap();
    assert_eq!(n_created, 1);

    let frames = make_frames(3000, 0, 40, PACKET_SIZE);
    let written = write_plan.write_frames(&frames, 40).await.unwrap();
    assert_eq!(written, 40);
    write_plan.close().unwrap();

    let (mut read_plan, n_opened) =
        Plan::make_read_plan("recording", &template, &[0], &[0], config)
            .await
            .unwrap();
    assert_eq!(n_opened, 1);

    let (out, total_frames) = drain_all(&mut read_plan).await;
    assert_eq!(total_frames, 40);
    assert_eq!(payload_markers(&out, PACKET_SIZE), (0..40).collect::<Vec<_>>());
    read_plan.close().unwrap();
}

// A path template with a third '%d' field or a missing '%s' field is
// rejected up front, rather than silently reusing `disk`'s value or
// dropping the suffix.
#[tokio::test]
async fn malformed_template_is_rejected_by_both_plan_constructors() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfigBuilder::new().build().unwrap();

    let extra_int_field = format!("{}/m%d_d%d_x%d_%s.sg", dir.path().display());
    let err = Plan::make_read_plan("recording", &extra_int_field, &[0], &[0], config)
        .await
        .unwrap_err();
    assert!(matches!(err, sg_vdif::PlanError::InvalidTemplate { .. }));

    let missing_string_field = format!("{}/m%d_d%d.sg", dir.path().display());
    let err = Plan::make_write_plan("recording", &missing_string_field, &[0], &[0], config)
        .await
        .unwrap_err();
    assert!(matches!(err, sg_vdif::PlanError::InvalidTemplate { .. }));

    // Neither constructor creates any files when rejecting the template.
    let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert!(entries.is_empty());
}
