use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{ChunkRange, ReplayState, TabKey, TimeMs};

/// Sorted, non-overlapping chunk ranges per tab
///
/// Ranges are normalized once on ingestion so the hot-path queries can
/// binary search without re-checking order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<TabKey, Vec<ChunkRange>>", into = "BTreeMap<TabKey, Vec<ChunkRange>>")]
pub struct TimelineIndex {
	ranges_by_tab: BTreeMap<TabKey, Vec<ChunkRange>>,
}

impl TimelineIndex {
	pub fn new(ranges_by_tab: BTreeMap<TabKey, Vec<ChunkRange>>) -> Self {
		let ranges_by_tab = ranges_by_tab.into_iter().map(|(tab, ranges)| (tab, normalize(ranges))).collect();
		Self { ranges_by_tab }
	}

	pub fn is_empty(&self) -> bool {
		self.ranges_by_tab.values().all(Vec::is_empty)
	}

	pub fn ranges(&self, tab_key: &str) -> &[ChunkRange] {
		self.ranges_by_tab.get(tab_key).map(Vec::as_slice).unwrap_or(&[])
	}

	/// Whether absolute timestamp `ts` falls inside one of the tab's ranges
	pub fn covers(&self, tab_key: &str, ts: TimeMs) -> bool {
		self
			.ranges(tab_key)
			.binary_search_by(|range| {
				if ts < range.start_ts {
					Ordering::Greater
				} else if ts > range.end_ts {
					Ordering::Less
				} else {
					Ordering::Equal
				}
			})
			.is_ok()
	}

	/// Start of the first range beginning strictly after `ts`
	pub fn first_start_after(&self, tab_key: &str, ts: TimeMs) -> Option<TimeMs> {
		let ranges = self.ranges(tab_key);
		let idx = ranges.partition_point(|range| range.start_ts <= ts);
		ranges.get(idx).map(|range| range.start_ts)
	}
}

impl From<BTreeMap<TabKey, Vec<ChunkRange>>> for TimelineIndex {
	fn from(ranges_by_tab: BTreeMap<TabKey, Vec<ChunkRange>>) -> Self {
		Self::new(ranges_by_tab)
	}
}

impl From<TimelineIndex> for BTreeMap<TabKey, Vec<ChunkRange>> {
	fn from(index: TimelineIndex) -> Self {
		index.ranges_by_tab
	}
}

fn normalize(mut ranges: Vec<ChunkRange>) -> Vec<ChunkRange> {
	ranges.retain(|r| r.end_ts >= r.start_ts);
	ranges.sort_by_key(|r| (r.start_ts, r.end_ts));

	let mut merged: Vec<ChunkRange> = Vec::with_capacity(ranges.len());
	for range in ranges {
		match merged.last_mut() {
			Some(last) if range.start_ts <= last.end_ts => last.end_ts = last.end_ts.max(range.end_ts),
			_ => merged.push(range),
		}
	}
	merged
}

// ============================================================================
// Global <-> local offset conversion
// ============================================================================

/// Map a point on the shared timeline to a stream's own offset (clamped at 0)
pub fn global_offset_to_local_offset(global_start_ts: TimeMs, stream_start_ts: TimeMs, global_offset_ms: TimeMs) -> TimeMs {
	global_offset_ms.saturating_add(global_start_ts).saturating_sub(stream_start_ts).max(0)
}

pub fn local_offset_to_global_offset(global_start_ts: TimeMs, stream_start_ts: TimeMs, local_offset_ms: TimeMs) -> TimeMs {
	local_offset_ms.saturating_add(stream_start_ts).saturating_sub(global_start_ts)
}

// ============================================================================
// Queries over a state snapshot
// ============================================================================

/// Next range start found by [`find_next_tab_start_after_global_offset`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextTabStart {
	pub tab_key: TabKey,
	pub global_offset_ms: TimeMs,
}

/// Pick the stream that owns a moment of the global timeline.
///
/// Candidates must not be `exclude`, must have a full snapshot and must
/// cover the instant. Lowest label index wins, a missing label sorts last,
/// remaining ties go to the lexicographically smaller key.
pub fn find_best_tab_at_global_offset(state: &ReplayState, global_offset_ms: TimeMs, exclude: Option<&str>) -> Option<TabKey> {
	let ts = state.global_start_ts.saturating_add(global_offset_ms);

	state
		.streams
		.iter()
		.filter(|s| exclude != Some(s.tab_key.as_str()))
		.filter(|s| state.has_full_snapshot_by_tab.contains(&s.tab_key))
		.filter(|s| state.chunk_ranges_by_tab.covers(&s.tab_key, ts))
		.min_by(|a, b| {
			let a_label = state.tab_label_index.get(&a.tab_key);
			let b_label = state.tab_label_index.get(&b.tab_key);
			label_order(a_label, b_label).then_with(|| a.tab_key.cmp(&b.tab_key))
		})
		.map(|s| s.tab_key.clone())
}

fn label_order(a: Option<&u32>, b: Option<&u32>) -> Ordering {
	match (a, b) {
		(Some(a), Some(b)) => a.cmp(b),
		(Some(_), None) => Ordering::Less,
		(None, Some(_)) => Ordering::Greater,
		(None, None) => Ordering::Equal,
	}
}

pub fn is_tab_in_range_at_global_offset(state: &ReplayState, tab_key: &str, global_offset_ms: TimeMs) -> bool {
	state.has_full_snapshot_by_tab.contains(tab_key) && state.chunk_ranges_by_tab.covers(tab_key, state.global_start_ts.saturating_add(global_offset_ms))
}

/// Earliest range start strictly after the given instant, across playable streams
pub fn find_next_tab_start_after_global_offset(state: &ReplayState, global_offset_ms: TimeMs) -> Option<NextTabStart> {
	let ts = state.global_start_ts.saturating_add(global_offset_ms);
	let mut best: Option<(TimeMs, &TabKey)> = None;

	for stream in state.streams.iter() {
		if !state.has_full_snapshot_by_tab.contains(&stream.tab_key) {
			continue;
		}
		let Some(start) = state.chunk_ranges_by_tab.first_start_after(&stream.tab_key, ts) else {
			continue;
		};
		// strict: the earlier stream in list order keeps a tie
		if best.map_or(true, |(best_start, _)| start < best_start) {
			best = Some((start, &stream.tab_key));
		}
	}

	best.map(|(start, tab_key)| NextTabStart {
		tab_key: tab_key.clone(),
		global_offset_ms: start.saturating_sub(state.global_start_ts),
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::core::StreamInfo;
	use std::sync::Arc;

	fn index(entries: &[(&str, Vec<(TimeMs, TimeMs)>)]) -> TimelineIndex {
		let map = entries
			.iter()
			.map(|(tab, ranges)| (tab.to_string(), ranges.iter().map(|&(s, e)| ChunkRange::new(s, e)).collect()))
			.collect();
		TimelineIndex::new(map)
	}

	fn two_tab_state() -> ReplayState {
		let mut state = ReplayState::default();
		state.streams = Arc::new(vec![StreamInfo::new("a", 1000, 5000), StreamInfo::new("b", 6000, 10000)]);
		state.global_start_ts = 1000;
		state.global_total_ms = 9000;
		state.chunk_ranges_by_tab = Arc::new(index(&[("a", vec![(1000, 5000)]), ("b", vec![(6000, 10000)])]));
		state.tab_label_index = [("a".to_string(), 1), ("b".to_string(), 2)].into_iter().collect();
		state.has_full_snapshot_by_tab = ["a".to_string(), "b".to_string()].into_iter().collect();
		state
	}

	#[test]
	fn normalizes_unsorted_and_overlapping_ranges() {
		let idx = index(&[("a", vec![(50, 60), (0, 10), (5, 20), (30, 25)])]);
		assert_eq!(idx.ranges("a"), &[ChunkRange::new(0, 20), ChunkRange::new(50, 60)]);
	}

	#[test]
	fn covers_is_inclusive_on_both_ends() {
		let idx = index(&[("a", vec![(0, 10), (20, 30)])]);
		assert!(idx.covers("a", 0));
		assert!(idx.covers("a", 10));
		assert!(!idx.covers("a", 15));
		assert!(idx.covers("a", 30));
		assert!(!idx.covers("a", 31));
		assert!(!idx.covers("missing", 5));
	}

	#[test]
	fn first_start_after_is_strict() {
		let idx = index(&[("a", vec![(0, 10), (20, 30), (40, 50)])]);
		assert_eq!(idx.first_start_after("a", 0), Some(20));
		assert_eq!(idx.first_start_after("a", 19), Some(20));
		assert_eq!(idx.first_start_after("a", 20), Some(40));
		assert_eq!(idx.first_start_after("a", 40), None);
	}

	#[test]
	fn offset_conversion_anchors_on_stream_start() {
		assert_eq!(global_offset_to_local_offset(1000, 6000, 5500), 500);
		assert_eq!(global_offset_to_local_offset(1000, 6000, 2000), 0);
		assert_eq!(local_offset_to_global_offset(1000, 6000, 500), 5500);
	}

	#[test]
	fn best_tab_follows_coverage() {
		let state = two_tab_state();
		assert_eq!(find_best_tab_at_global_offset(&state, 2000, None).as_deref(), Some("a"));
		assert_eq!(find_best_tab_at_global_offset(&state, 6000, None).as_deref(), Some("b"));
		assert_eq!(find_best_tab_at_global_offset(&state, 4500, None), None);
	}

	#[test]
	fn best_tab_honours_exclusion_and_snapshot() {
		let mut state = two_tab_state();
		assert_eq!(find_best_tab_at_global_offset(&state, 2000, Some("a")), None);

		state.has_full_snapshot_by_tab.remove("b");
		assert_eq!(find_best_tab_at_global_offset(&state, 6000, None), None);
		assert!(!is_tab_in_range_at_global_offset(&state, "b", 6000));
	}

	#[test]
	fn best_tab_prefers_lower_label_then_key() {
		let mut state = two_tab_state();
		state.streams = Arc::new(vec![StreamInfo::new("a", 1000, 5000), StreamInfo::new("b", 1000, 5000), StreamInfo::new("c", 1000, 5000)]);
		state.chunk_ranges_by_tab = Arc::new(index(&[("a", vec![(1000, 5000)]), ("b", vec![(1000, 5000)]), ("c", vec![(1000, 5000)])]));
		state.has_full_snapshot_by_tab.insert("c".to_string());
		state.tab_label_index = [("a".to_string(), 3), ("b".to_string(), 1), ("c".to_string(), 1)].into_iter().collect();
		assert_eq!(find_best_tab_at_global_offset(&state, 100, None).as_deref(), Some("b"));

		state.tab_label_index.clear();
		assert_eq!(find_best_tab_at_global_offset(&state, 100, None).as_deref(), Some("a"));

		state.tab_label_index = [("c".to_string(), 7)].into_iter().collect();
		assert_eq!(find_best_tab_at_global_offset(&state, 100, None).as_deref(), Some("c"));
	}

	#[test]
	fn next_tab_start_skips_unplayable_tabs() {
		let mut state = two_tab_state();
		assert_eq!(
			find_next_tab_start_after_global_offset(&state, 4000),
			Some(NextTabStart {
				tab_key: "b".to_string(),
				global_offset_ms: 5000,
			})
		);
		assert_eq!(find_next_tab_start_after_global_offset(&state, 6000), None);

		state.has_full_snapshot_by_tab.remove("b");
		assert_eq!(find_next_tab_start_after_global_offset(&state, 4000), None);
	}

	#[test]
	fn offset_conversion_saturates_on_extreme_inputs() {
		assert_eq!(local_offset_to_global_offset(1000, 1000, TimeMs::MAX), TimeMs::MAX - 1000);
		assert_eq!(global_offset_to_local_offset(0, TimeMs::MIN, TimeMs::MAX), TimeMs::MAX);
		assert_eq!(global_offset_to_local_offset(TimeMs::MIN, 0, TimeMs::MIN), 0);
	}
}
