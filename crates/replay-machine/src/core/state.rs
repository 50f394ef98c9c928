use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::error::InvariantViolation;
use super::{global_offset_to_local_offset, local_offset_to_global_offset};
use super::{GapFastForward, Generation, Phase, PlaybackMode, ReplaySettings, StreamInfo, TabKey, TimeMs, TimelineIndex};

/// Single source of truth for one replay session.
///
/// Snapshots are never mutated once handed out: the reducer clones, edits
/// the clone and returns a fresh `Arc`. `streams` and the timeline index are
/// immutable after install and shared between snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayState {
	pub generation: Generation,
	pub phase: Phase,

	pub playback_mode: PlaybackMode,
	pub active_tab_key: Option<TabKey>,
	pub paused_at_global_ms: TimeMs,
	pub current_global_time_ms_for_ui: TimeMs,

	pub streams: Arc<Vec<StreamInfo>>,
	pub global_start_ts: TimeMs,
	pub global_total_ms: TimeMs,

	pub chunk_ranges_by_tab: Arc<TimelineIndex>,
	pub tab_label_index: BTreeMap<TabKey, u32>,
	pub has_full_snapshot_by_tab: BTreeSet<TabKey>,
	pub loaded_duration_by_tab_ms: BTreeMap<TabKey, TimeMs>,
	pub tabs_with_events: BTreeSet<TabKey>,

	/// Tabs whose external renderer instance is initialized
	pub replayer_ready: BTreeSet<TabKey>,

	pub settings: ReplaySettings,
	pub auto_play_triggered: bool,
	pub suppress_auto_follow_until_wall_ms: TimeMs,
	pub auto_resume_after_buffering: bool,
	pub buffering_at_global_ms: Option<TimeMs>,

	pub gap_fast_forward: Option<GapFastForward>,

	/// Local position of the last premature-finish nudge, used to detect a
	/// renderer that keeps reporting "finished" at the same spot
	pub premature_finish_retry_local_ms: Option<TimeMs>,

	/// Wall-clock time playing started without any renderer progress report
	pub playing_without_progress_since_ms: Option<TimeMs>,

	pub download_error: Option<String>,
	pub player_error: Option<String>,
}

impl ReplayState {
	pub fn new(settings: ReplaySettings) -> Self {
		Self {
			generation: 0,
			phase: Phase::Idle,
			playback_mode: PlaybackMode::Paused,
			active_tab_key: None,
			paused_at_global_ms: 0,
			current_global_time_ms_for_ui: 0,
			streams: Arc::default(),
			global_start_ts: 0,
			global_total_ms: 0,
			chunk_ranges_by_tab: Arc::default(),
			tab_label_index: BTreeMap::new(),
			has_full_snapshot_by_tab: BTreeSet::new(),
			loaded_duration_by_tab_ms: BTreeMap::new(),
			tabs_with_events: BTreeSet::new(),
			replayer_ready: BTreeSet::new(),
			settings,
			auto_play_triggered: false,
			suppress_auto_follow_until_wall_ms: 0,
			auto_resume_after_buffering: false,
			buffering_at_global_ms: None,
			gap_fast_forward: None,
			premature_finish_retry_local_ms: None,
			playing_without_progress_since_ms: None,
			download_error: None,
			player_error: None,
		}
	}

	/// Fresh idle state, optionally seeded with persisted settings
	pub fn initial(settings: Option<ReplaySettings>) -> Arc<Self> {
		Arc::new(Self::new(settings.unwrap_or_default()))
	}

	pub fn stream(&self, tab_key: &str) -> Option<&StreamInfo> {
		self.streams.iter().find(|s| s.tab_key == tab_key)
	}

	pub fn has_stream(&self, tab_key: &str) -> bool {
		self.stream(tab_key).is_some()
	}

	pub fn loaded_duration_ms(&self, tab_key: &str) -> TimeMs {
		self.loaded_duration_by_tab_ms.get(tab_key).copied().unwrap_or(0)
	}

	/// A tab can play once its renderer is up or it has a full snapshot to build one from
	pub fn is_playable(&self, tab_key: &str) -> bool {
		self.replayer_ready.contains(tab_key) || self.has_full_snapshot_by_tab.contains(tab_key)
	}

	pub fn is_active(&self, tab_key: &str) -> bool {
		self.active_tab_key.as_deref() == Some(tab_key)
	}

	pub fn is_downloading(&self) -> bool {
		self.phase == Phase::Downloading
	}

	/// Local offset of `tab_key` at a global offset, `None` for an unknown tab
	pub fn local_offset_of(&self, tab_key: &str, global_offset_ms: TimeMs) -> Option<TimeMs> {
		self.stream(tab_key).map(|s| global_offset_to_local_offset(self.global_start_ts, s.first_event_at_ms, global_offset_ms))
	}

	/// Global offset of a tab-local position, falling back to the global
	/// start for an unknown tab and never negative
	pub fn global_offset_of(&self, tab_key: &str, local_offset_ms: TimeMs) -> TimeMs {
		let stream_start = self.stream(tab_key).map_or(self.global_start_ts, |s| s.first_event_at_ms);
		local_offset_to_global_offset(self.global_start_ts, stream_start, local_offset_ms).max(0)
	}

	/// Verify the invariants every transition must preserve
	pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
		if let Some(active) = &self.active_tab_key {
			if !self.has_stream(active) {
				return Err(InvariantViolation::UnknownActiveTab(active.clone()));
			}
		}
		if self.paused_at_global_ms < 0 {
			return Err(InvariantViolation::NegativeOffset("pausedAtGlobalMs", self.paused_at_global_ms));
		}
		if self.current_global_time_ms_for_ui < 0 {
			return Err(InvariantViolation::NegativeOffset("currentGlobalTimeMsForUi", self.current_global_time_ms_for_ui));
		}
		if let Some(gap) = &self.gap_fast_forward {
			if gap.to_global_ms <= gap.from_global_ms {
				return Err(InvariantViolation::EmptyGap {
					from: gap.from_global_ms,
					to: gap.to_global_ms,
				});
			}
		}
		Ok(())
	}

	/// [`Self::check_invariants`] plus the rules linking a snapshot to the one it replaced
	pub fn check_successor_of(&self, previous: &Self) -> Result<(), InvariantViolation> {
		if self.generation < previous.generation {
			return Err(InvariantViolation::GenerationRegressed {
				before: previous.generation,
				after: self.generation,
			});
		}
		self.check_invariants()
	}
}

impl Default for ReplayState {
	fn default() -> Self {
		Self::new(ReplaySettings::default())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn initial_state_is_idle_and_paused() {
		let state = ReplayState::initial(None);
		assert_eq!(state.phase, Phase::Idle);
		assert_eq!(state.playback_mode, PlaybackMode::Paused);
		assert_eq!(state.generation, 0);
		assert!(state.active_tab_key.is_none());
		assert_eq!(state.settings, ReplaySettings::default());
		assert!(state.check_invariants().is_ok());
	}

	#[test]
	fn initial_state_accepts_custom_settings() {
		let settings = ReplaySettings {
			player_speed: 2.0,
			skip_inactivity: false,
			follow_active_tab: true,
		};
		let state = ReplayState::initial(Some(settings.clone()));
		assert_eq!(state.settings, settings);
	}

	#[test]
	fn invariants_reject_unknown_active_tab() {
		let mut state = ReplayState::default();
		state.active_tab_key = Some("ghost".to_string());
		assert!(matches!(state.check_invariants(), Err(InvariantViolation::UnknownActiveTab(_))));
	}

	#[test]
	fn invariants_reject_empty_gap() {
		let mut state = ReplayState::default();
		state.gap_fast_forward = Some(GapFastForward {
			from_global_ms: 10,
			to_global_ms: 10,
			wall_ms: 0,
			next_tab_key: "a".to_string(),
			gen: 0,
		});
		assert!(matches!(state.check_invariants(), Err(InvariantViolation::EmptyGap { .. })));
	}

	#[test]
	fn successor_may_not_lower_generation() {
		let mut previous = ReplayState::default();
		previous.generation = 3;
		let mut next = ReplayState::default();
		next.generation = 2;
		assert_eq!(next.check_successor_of(&previous), Err(InvariantViolation::GenerationRegressed { before: 3, after: 2 }));
		assert_eq!(previous.check_successor_of(&next), Ok(()));
	}

	#[test]
	fn global_offset_of_clamps_at_zero() {
		let mut state = ReplayState::default();
		state.global_start_ts = 1000;
		state.streams = Arc::new(vec![StreamInfo::new("a", 1000, 2000)]);
		assert_eq!(state.global_offset_of("a", -50), 0);
		assert_eq!(state.global_offset_of("a", 250), 250);
		assert_eq!(state.local_offset_of("a", 250), Some(250));
		assert_eq!(state.local_offset_of("b", 250), None);
	}
}
