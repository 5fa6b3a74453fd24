//! The contiguity merger.
//!
//! Given a span per shard -- `Some((first, last))` for a live shard with
//! `frame_count > 0`, `None` for a dead one -- orders the live spans
//! ascending by first-frame timestamp with an explicit selection sort
//! (a deliberate implementation detail, not an incidental choice of sort
//! algorithm), then walks the sorted prefix looking for the first
//! non-adjacent pair.

use crate::header::{adjacent, TimeStamp};

/// Result of a merge: `order` holds the 0-based shard indices that form
/// the time-contiguous prefix, in time order, and `k == order.len()`.
pub struct MergeResult {
    pub order: Vec<usize>,
}

/// Runs the merger over `spans`, one entry per shard in shard order.
///
/// Also returns the full 1-based/negated index mapping -- positive
/// 1-based index for a shard in the merged prefix, negated 1-based index
/// otherwise -- for callers (and tests) that want to inspect dead and
/// non-adjacent shards as well as the contiguous prefix.
pub fn contiguity_merge(spans: &[Option<(TimeStamp, TimeStamp)>]) -> (MergeResult, Vec<i64>) {
    let n = spans.len();

    let mut live: Vec<usize> = (0..n).filter(|&i| spans[i].is_some()).collect();
    let dead: Vec<usize> = (0..n).filter(|&i| spans[i].is_none()).collect();

    // Selection-sort the live prefix by (first_secs, first_df) ascending.
    for i in 0..live.len() {
        let mut min_idx = i;
        for j in (i + 1)..live.len() {
            let candidate = spans[live[j]].unwrap().0;
            let current_min = spans[live[min_idx]].unwrap().0;
            if candidate < current_min {
                min_idx = j;
            }
        }
        live.swap(i, min_idx);
    }

    // Walk the sorted prefix; stop at the first non-adjacent pair.
    let mut k = live.len();
    for i in 1..live.len() {
        let (a_first, a_last) = spans[live[i - 1]].unwrap();
        let (b_first, _b_last) = spans[live[i]].unwrap();
        if !adjacent(a_first, a_last, b_first) {
            k = i;
            break;
        }
    }

    let mut mapping = Vec::with_capacity(n);
    for &idx in &live[..k] {
        mapping.push((idx + 1) as i64);
    }
    for &idx in &live[k..] {
        mapping.push(-((idx as i64) + 1));
    }
    for &idx in &dead {
        mapping.push(-((idx as i64) + 1));
    }

    let order = live[..k].to_vec();
    (MergeResult { order }, mapping)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// Builds back-to-back 250-frame spans at second 100, one per entry of
    /// `chain_order`, where `chain_order[shard_idx]` is that shard's
    /// position in the chain. Whatever the shard-to-position assignment,
    /// every shard is mutually adjacent to its chain neighbor, so the
    /// merge should always produce all shards regardless of shard order.
    fn chained_spans(chain_order: &[usize]) -> Vec<Option<(TimeStamp, TimeStamp)>> {
        chain_order
            .iter()
            .map(|&chain_pos| {
                let first_df = chain_pos as u32 * 250;
                Some(((100, first_df), (100, first_df + 249)))
            })
            .collect()
    }

    proptest! {
        #[test]
        fn chained_spans_always_merge_fully(priorities in proptest::collection::vec(0u32..1000, 1..8)) {
            // `chain_order[i]` = i's rank among `priorities` ascending,
            // giving a random permutation of 0..n with no duplicate ranks.
            let n = priorities.len();
            let mut ranked: Vec<usize> = (0..n).collect();
            ranked.sort_by_key(|&i| priorities[i]);
            let mut chain_order = vec![0usize; n];
            for (rank, &i) in ranked.iter().enumerate() {
                chain_order[i] = rank;
            }

            let spans = chained_spans(&chain_order);
            let (result, _mapping) = contiguity_merge(&spans);
            prop_assert_eq!(result.order.len(), n);
        }

        /// The merged prefix is always ascending by first-frame timestamp,
        /// whatever subset of the input ends up contiguous.
        #[test]
        fn merged_prefix_is_always_time_ordered(
            firsts in proptest::collection::vec((0u32..5, 0u32..2000), 0..8)
        ) {
            let spans: Vec<Option<(TimeStamp, TimeStamp)>> = firsts
                .iter()
                .map(|&(secs, df)| Some(((secs, df), (secs, df))))
                .collect();
            let (result, _mapping) = contiguity_merge(&spans);
            let timestamps: Vec<TimeStamp> = result
                .order
                .iter()
                .map(|&idx| spans[idx].unwrap().0)
                .collect();
            prop_assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
        }
    }
}
