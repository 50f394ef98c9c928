use std::collections::BTreeMap;
use std::sync::Arc;

use smallvec::smallvec;
use tracing::{info, trace, warn};

use super::{push_play_effects, ReplayMachine, Transition};
use crate::core::{find_best_tab_at_global_offset, global_offset_to_local_offset, ChunkRange, Effects, Generation, Phase, PlaybackMode, ReplayEffect, ReplayState, StreamInfo, TabKey, TimeMs, TimelineIndex};

impl ReplayMachine {
	pub(super) fn select_recording(&self, state: &Arc<ReplayState>, generation: Generation) -> Transition {
		if generation < state.generation {
			warn!(generation, current = state.generation, "Recording selected with an older generation, keeping current");
		}

		let mut next = ReplayState::new(state.settings.clone());
		next.generation = generation.max(state.generation);
		next.phase = Phase::Downloading;

		info!(generation = next.generation, "Recording selected");
		Transition::to(next, smallvec![ReplayEffect::DestroyAllReplayers])
	}

	pub(super) fn streams_computed(
		&self,
		state: &Arc<ReplayState>,
		streams: &[StreamInfo],
		global_start_ts: TimeMs,
		global_total_ms: TimeMs,
		chunk_ranges_by_tab: &BTreeMap<TabKey, Vec<ChunkRange>>,
		tab_label_index: &BTreeMap<TabKey, u32>,
	) -> Transition {
		let initial_active = streams
			.iter()
			.find(|s| s.first_event_at_ms == global_start_ts)
			.or_else(|| streams.first())
			.map(|s| s.tab_key.clone());

		let mut next = ReplayState::clone(state);
		next.streams = Arc::new(streams.to_vec());
		next.global_start_ts = global_start_ts;
		next.global_total_ms = global_total_ms.max(0);
		next.chunk_ranges_by_tab = Arc::new(TimelineIndex::new(chunk_ranges_by_tab.clone()));
		next.tab_label_index = tab_label_index.clone();
		next.active_tab_key = initial_active;
		next.paused_at_global_ms = 0;
		next.current_global_time_ms_for_ui = 0;
		// a gap computed against the previous stream list is meaningless now
		next.gap_fast_forward = None;
		if next.playback_mode == PlaybackMode::GapFastForward {
			next.playback_mode = PlaybackMode::Paused;
		}

		info!(
			streams = streams.len(),
			global_start_ts,
			global_total_ms = next.global_total_ms,
			active = ?next.active_tab_key,
			"Streams computed"
		);
		Transition::to(next, Effects::new())
	}

	pub(super) fn download_complete(&self, state: &Arc<ReplayState>) -> Transition {
		let mut next = ReplayState::clone(state);
		let mut effects = Effects::new();

		next.phase = Phase::Ready;
		settle_drained_buffering(state, &mut next, &mut effects);

		info!(generation = state.generation, mode = ?next.playback_mode, "Download complete");
		Transition::to(next, effects)
	}

	pub(super) fn download_error(&self, state: &Arc<ReplayState>, message: &str) -> Transition {
		warn!(generation = state.generation, message, "Download failed, playing what is loaded");

		let mut next = ReplayState::clone(state);
		let mut effects = Effects::new();

		next.phase = Phase::Ready;
		next.download_error = Some(message.to_string());
		settle_drained_buffering(state, &mut next, &mut effects);

		Transition::to(next, effects)
	}

	pub(super) fn chunk_loaded(&self, state: &Arc<ReplayState>, tab_key: &str, has_full_snapshot: bool, loaded_duration_ms: TimeMs, had_events_before: bool) -> Transition {
		trace!(tab_key, has_full_snapshot, loaded_duration_ms, had_events_before, "Chunk loaded");

		let mut next = ReplayState::clone(state);
		let mut effects = Effects::new();
		let loaded_duration_ms = loaded_duration_ms.max(0);

		if has_full_snapshot {
			next.has_full_snapshot_by_tab.insert(tab_key.to_string());
		}
		next.loaded_duration_by_tab_ms.insert(tab_key.to_string(), loaded_duration_ms);
		next.tabs_with_events.insert(tab_key.to_string());

		// ensure_replayer is idempotent on the executor side, but never re-request a ready one
		if next.has_full_snapshot_by_tab.contains(tab_key) && !state.replayer_ready.contains(tab_key) {
			effects.push(ReplayEffect::EnsureReplayer {
				tab_key: tab_key.to_string(),
				generation: state.generation,
			});
		}

		// An active tab without a snapshot can never render; hand over to the first one that can
		let first_snapshot = has_full_snapshot && !state.has_full_snapshot_by_tab.contains(tab_key);
		if first_snapshot && state.has_stream(tab_key) {
			if let Some(active) = state.active_tab_key.as_deref() {
				if active != tab_key && !next.has_full_snapshot_by_tab.contains(active) {
					info!(from = active, to = tab_key, "Active tab has no snapshot, switching");
					next.active_tab_key = Some(tab_key.to_string());
				}
			}
		}

		if next.is_active(tab_key) {
			if let (Some(target), Some(stream)) = (state.buffering_at_global_ms, state.stream(tab_key)) {
				let target_local = global_offset_to_local_offset(state.global_start_ts, stream.first_event_at_ms, target);
				let buffer_ahead = if state.is_downloading() { self.config.buffer_ahead_ms } else { 0 };

				if loaded_duration_ms >= target_local.saturating_add(buffer_ahead) {
					next.buffering_at_global_ms = None;
					if state.auto_resume_after_buffering {
						next.auto_resume_after_buffering = false;
						next.playback_mode = PlaybackMode::Playing;
						next.paused_at_global_ms = target;
						push_play_effects(&next, Some(tab_key), target, &mut effects);
						info!(tab_key, target, "Buffering resolved, resuming");
					} else {
						next.playback_mode = PlaybackMode::Paused;
					}
				}
			}
		}

		if has_full_snapshot && next.is_active(tab_key) {
			next.player_error = None;
		}

		Transition::to(next, effects)
	}

	pub(super) fn reset(&self, state: &Arc<ReplayState>) -> Transition {
		let mut next = ReplayState::new(state.settings.clone());
		next.generation = state.generation;

		info!(generation = state.generation, "Replay reset");
		Transition::to(next, smallvec![ReplayEffect::DestroyAllReplayers])
	}
}

/// No more chunks will arrive: a buffering engine resumes at its target if it was
/// playing before, otherwise it parks.
fn settle_drained_buffering(state: &ReplayState, next: &mut ReplayState, effects: &mut Effects) {
	if next.playback_mode == PlaybackMode::Buffering {
		next.playback_mode = PlaybackMode::Paused;
	}

	if let (Some(seek_to), true) = (state.buffering_at_global_ms, state.auto_resume_after_buffering) {
		let mut resume_tab = state.active_tab_key.clone();
		if resume_tab.as_deref().is_some_and(|tab| !state.is_playable(tab)) {
			resume_tab = find_best_tab_at_global_offset(state, seek_to, None);
		}

		if let Some(tab) = resume_tab.filter(|tab| state.is_playable(tab)) {
			if !state.is_active(&tab) {
				effects.push(ReplayEffect::EnsureReplayer {
					tab_key: tab.clone(),
					generation: state.generation,
				});
			}
			next.playback_mode = PlaybackMode::Playing;
			next.paused_at_global_ms = seek_to;
			next.active_tab_key = Some(tab);
			push_play_effects(&*next, next.active_tab_key.as_deref(), seek_to, effects);
		}
	}

	next.buffering_at_global_ms = None;
	next.auto_resume_after_buffering = false;
}
