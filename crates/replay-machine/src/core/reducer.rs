mod recording;
mod replayer;
mod tick;
mod transport;

use std::sync::Arc;

use tracing::{debug, trace};

use super::error::Result;
use super::{global_offset_to_local_offset, Effects, MachineConfig, ReplayAction, ReplayEffect, ReplayState, TimeMs};

/// Outcome of one transition: the next snapshot and the effects to run
#[derive(Debug, Clone)]
pub struct Transition {
	pub state: Arc<ReplayState>,
	pub effects: Effects,
}

impl Transition {
	/// Keep the very same snapshot and emit nothing
	pub fn unchanged(state: &Arc<ReplayState>) -> Self {
		Self {
			state: Arc::clone(state),
			effects: Effects::new(),
		}
	}

	fn to(state: ReplayState, effects: Effects) -> Self {
		Self {
			state: Arc::new(state),
			effects,
		}
	}

	/// True when the transition handed back the previous snapshot itself
	pub fn is_unchanged_from(&self, previous: &Arc<ReplayState>) -> bool {
		Arc::ptr_eq(&self.state, previous)
	}
}

/// The pure transition function, parameterized by its tunables.
///
/// `reduce` never blocks, never performs I/O and never reads the clock; all
/// time comes from `now_ms` on the action.
#[derive(Debug, Clone, Default)]
pub struct ReplayMachine {
	config: MachineConfig,
}

impl ReplayMachine {
	pub fn new(config: MachineConfig) -> Result<Self> {
		config.validate()?;
		Ok(Self { config })
	}

	pub fn config(&self) -> &MachineConfig {
		&self.config
	}

	pub fn reduce(&self, state: &Arc<ReplayState>, action: &ReplayAction) -> Transition {
		if let Some(generation) = action.generation() {
			if generation != state.generation {
				debug!(action = action.name(), generation, current = state.generation, "Dropping stale action");
				return Transition::unchanged(state);
			}
		}

		let transition = match action {
			ReplayAction::SelectRecording { generation } => self.select_recording(state, *generation),
			ReplayAction::StreamsComputed {
				streams,
				global_start_ts,
				global_total_ms,
				chunk_ranges_by_tab,
				tab_label_index,
				..
			} => self.streams_computed(state, streams, *global_start_ts, *global_total_ms, chunk_ranges_by_tab, tab_label_index),
			ReplayAction::DownloadComplete { .. } => self.download_complete(state),
			ReplayAction::DownloadError { message, .. } => self.download_error(state, message),
			ReplayAction::ChunkLoaded {
				tab_key,
				has_full_snapshot,
				loaded_duration_ms,
				had_events_before_this_chunk,
				..
			} => self.chunk_loaded(state, tab_key, *has_full_snapshot, *loaded_duration_ms, *had_events_before_this_chunk),
			ReplayAction::ReplayerReady { tab_key, .. } => self.replayer_ready(state, tab_key),
			ReplayAction::ReplayerInitError { message, .. } => self.replayer_init_error(state, message),
			ReplayAction::ReplayerFinish {
				tab_key, local_time_ms, now_ms, ..
			} => self.replayer_finish(state, tab_key, *local_time_ms, *now_ms),
			ReplayAction::TogglePlayPause { now_ms } => self.toggle_play_pause(state, *now_ms),
			ReplayAction::Seek { global_offset_ms, now_ms } => self.seek(state, *global_offset_ms, *now_ms),
			ReplayAction::SelectTab { tab_key, now_ms } => self.select_tab(state, tab_key, *now_ms),
			ReplayAction::UpdateSpeed { speed } => self.update_speed(state, *speed),
			ReplayAction::UpdateSettings { updates } => self.update_settings(state, updates),
			ReplayAction::Tick {
				now_ms,
				active_replayer_local_time_ms,
			} => self.tick(state, *now_ms, *active_replayer_local_time_ms),
			ReplayAction::BufferCheck { tab_key, .. } => self.buffer_check(state, tab_key),
			ReplayAction::Reset => self.reset(state),
		};

		if !transition.is_unchanged_from(state) && transition.state.playback_mode != state.playback_mode {
			debug!(
				action = action.name(),
				from = ?state.playback_mode,
				to = ?transition.state.playback_mode,
				active = ?transition.state.active_tab_key,
				"Playback mode changed"
			);
		}
		trace!(action = action.name(), effects = transition.effects.len(), "Transition applied");

		transition
	}
}

/// Reduce with the default tunables
pub fn replay_reducer(state: &Arc<ReplayState>, action: &ReplayAction) -> Transition {
	ReplayMachine::default().reduce(state, action)
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Play the active tab and park every other ready renderer at the same instant
fn push_play_effects(state: &ReplayState, active: Option<&str>, global_offset_ms: TimeMs, effects: &mut Effects) {
	for stream in state.streams.iter() {
		let local_offset_ms = global_offset_to_local_offset(state.global_start_ts, stream.first_event_at_ms, global_offset_ms);
		if active == Some(stream.tab_key.as_str()) {
			effects.push(ReplayEffect::PlayReplayer {
				tab_key: stream.tab_key.clone(),
				local_offset_ms,
			});
		} else if state.replayer_ready.contains(&stream.tab_key) {
			effects.push(ReplayEffect::PauseReplayerAt {
				tab_key: stream.tab_key.clone(),
				local_offset_ms,
			});
		}
	}
}

/// Block playback at `global_offset_ms` until enough data arrives, then resume
fn enter_buffering(next: &mut ReplayState, global_offset_ms: TimeMs) {
	next.playback_mode = super::PlaybackMode::Buffering;
	next.paused_at_global_ms = global_offset_ms;
	next.buffering_at_global_ms = Some(global_offset_ms);
	next.auto_resume_after_buffering = true;
	next.playing_without_progress_since_ms = None;
	next.gap_fast_forward = None;
}
