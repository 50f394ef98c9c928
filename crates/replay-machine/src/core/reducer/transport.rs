use std::sync::Arc;

use smallvec::smallvec;
use tracing::{debug, info, warn};

use super::{enter_buffering, push_play_effects, ReplayMachine, Transition};
use crate::core::{find_best_tab_at_global_offset, is_allowed_speed, Effects, PlaybackMode, ReplayEffect, ReplaySettingsUpdate, ReplayState, TimeMs};

const UNPLAYABLE_MESSAGE: &str = "Unable to play: recording data may be incomplete. Try reloading.";

impl ReplayMachine {
	pub(super) fn toggle_play_pause(&self, state: &Arc<ReplayState>, now_ms: TimeMs) -> Transition {
		let mut next = ReplayState::clone(state);

		if state.playback_mode.is_advancing() || state.playback_mode == PlaybackMode::Buffering {
			next.playback_mode = PlaybackMode::Paused;
			next.paused_at_global_ms = state.current_global_time_ms_for_ui;
			next.gap_fast_forward = None;
			next.buffering_at_global_ms = None;
			next.auto_resume_after_buffering = false;
			next.playing_without_progress_since_ms = None;
			next.player_error = None;
			debug!(at = next.paused_at_global_ms, "Paused");
			return Transition::to(next, smallvec![ReplayEffect::PauseAll]);
		}

		let mut target = state.paused_at_global_ms;
		let mut play_tab = state.active_tab_key.clone();

		if play_tab.as_deref().is_some_and(|tab| !state.is_playable(tab)) {
			if let Some(alternative) = find_best_tab_at_global_offset(state, target, None) {
				play_tab = Some(alternative);
			} else if let Some(ready) = state.streams.iter().find(|s| state.replayer_ready.contains(&s.tab_key)) {
				// nothing covers the position; start over from the beginning of any live renderer
				target = state.global_offset_of(&ready.tab_key, 0);
				play_tab = Some(ready.tab_key.clone());
			}
		}

		let Some(tab) = play_tab.clone().filter(|tab| state.is_playable(tab)) else {
			if let (true, Some(tab)) = (state.is_downloading(), play_tab) {
				let local_time_ms = state.local_offset_of(&tab, target).unwrap_or(0);
				debug!(tab_key = tab.as_str(), target, "Nothing playable yet, buffering");
				next.active_tab_key = Some(tab.clone());
				next.player_error = None;
				enter_buffering(&mut next, target);
				return Transition::to(
					next,
					smallvec![ReplayEffect::ScheduleBufferPoll {
						generation: state.generation,
						tab_key: tab,
						local_time_ms,
						delay_ms: self.config.buffer_poll_delay_ms,
					}],
				);
			}

			warn!(generation = state.generation, "Play requested but no tab is playable");
			next.playback_mode = PlaybackMode::Paused;
			next.player_error = Some(UNPLAYABLE_MESSAGE.to_string());
			next.playing_without_progress_since_ms = None;
			return Transition::to(next, Effects::new());
		};

		if state.is_downloading() {
			let local_target = state.local_offset_of(&tab, target).unwrap_or(0);
			if local_target > state.loaded_duration_ms(&tab) {
				debug!(tab_key = tab.as_str(), local_target, loaded = state.loaded_duration_ms(&tab), "Play target not loaded, buffering");
				next.active_tab_key = Some(tab.clone());
				enter_buffering(&mut next, target);
				return Transition::to(
					next,
					smallvec![ReplayEffect::ScheduleBufferPoll {
						generation: state.generation,
						tab_key: tab,
						local_time_ms: local_target,
						delay_ms: self.config.buffer_poll_delay_ms,
					}],
				);
			}
		}

		next.active_tab_key = Some(tab);
		next.playback_mode = PlaybackMode::Playing;
		next.paused_at_global_ms = target;
		next.buffering_at_global_ms = None;
		next.auto_resume_after_buffering = false;
		next.gap_fast_forward = None;
		next.suppress_auto_follow_until_wall_ms = now_ms.saturating_add(self.config.manual_play_suppression_ms);
		next.playing_without_progress_since_ms = None;
		next.player_error = None;

		let mut effects = Effects::new();
		push_play_effects(&next, next.active_tab_key.as_deref(), target, &mut effects);
		debug!(at = target, active = ?next.active_tab_key, "Playing");
		Transition::to(next, effects)
	}

	pub(super) fn seek(&self, state: &Arc<ReplayState>, global_offset_ms: TimeMs, now_ms: TimeMs) -> Transition {
		let target = global_offset_ms.min(state.global_total_ms).max(0);
		let mut next = ReplayState::clone(state);
		let mut effects = Effects::new();

		if let Some(desired) = find_best_tab_at_global_offset(state, target, None) {
			if !state.is_active(&desired) {
				effects.push(ReplayEffect::EnsureReplayer {
					tab_key: desired.clone(),
					generation: state.generation,
				});
				next.active_tab_key = Some(desired);
			}
		}

		next.gap_fast_forward = None;
		next.premature_finish_retry_local_ms = None;
		next.playing_without_progress_since_ms = None;
		next.player_error = None;
		next.paused_at_global_ms = target;

		if state.is_downloading() {
			if let Some(active) = next.active_tab_key.clone() {
				let local_target = next.local_offset_of(&active, target).unwrap_or(0);
				if local_target > next.loaded_duration_ms(&active) {
					debug!(tab_key = active.as_str(), target, "Seek target not loaded, buffering");
					effects.push(ReplayEffect::PauseAll);
					enter_buffering(&mut next, target);
					return Transition::to(next, effects);
				}
			}
		}

		push_play_effects(&next, next.active_tab_key.as_deref(), target, &mut effects);
		next.playback_mode = PlaybackMode::Playing;
		next.buffering_at_global_ms = None;
		next.auto_resume_after_buffering = false;
		next.current_global_time_ms_for_ui = target;
		next.suppress_auto_follow_until_wall_ms = now_ms.saturating_add(self.config.manual_play_suppression_ms);

		debug!(target, active = ?next.active_tab_key, "Seeked");
		Transition::to(next, effects)
	}

	pub(super) fn select_tab(&self, state: &Arc<ReplayState>, tab_key: &str, now_ms: TimeMs) -> Transition {
		if !state.has_stream(tab_key) {
			warn!(tab_key, "Ignoring selection of unknown tab");
			return Transition::unchanged(state);
		}

		let was_playing = state.playback_mode.is_advancing();
		let target = state.paused_at_global_ms;

		let mut next = ReplayState::clone(state);
		next.active_tab_key = Some(tab_key.to_string());
		next.gap_fast_forward = None;
		next.premature_finish_retry_local_ms = None;
		next.playing_without_progress_since_ms = None;
		next.player_error = None;
		next.suppress_auto_follow_until_wall_ms = now_ms.saturating_add(self.config.tab_select_suppression_ms);

		let mut effects: Effects = smallvec![
			ReplayEffect::PauseAll,
			ReplayEffect::EnsureReplayer {
				tab_key: tab_key.to_string(),
				generation: state.generation,
			},
		];

		if state.is_downloading() {
			let local_target = state.local_offset_of(tab_key, target).unwrap_or(0);
			if local_target > state.loaded_duration_ms(tab_key) {
				debug!(tab_key, target, "Selected tab not loaded at position, buffering");
				enter_buffering(&mut next, target);
				return Transition::to(next, effects);
			}
		}

		if was_playing {
			push_play_effects(&next, Some(tab_key), target, &mut effects);
		}
		next.playback_mode = if was_playing { PlaybackMode::Playing } else { PlaybackMode::Paused };
		next.buffering_at_global_ms = None;
		next.auto_resume_after_buffering = false;

		info!(tab_key, was_playing, "Tab selected");
		Transition::to(next, effects)
	}

	pub(super) fn update_speed(&self, state: &Arc<ReplayState>, speed: f64) -> Transition {
		if !is_allowed_speed(speed) {
			debug!(speed, "Ignoring unsupported playback speed");
			return Transition::unchanged(state);
		}

		let mut next = ReplayState::clone(state);
		next.settings.player_speed = speed;
		let settings = next.settings.clone();
		Transition::to(next, smallvec![ReplayEffect::SetReplayerSpeed { speed }, ReplayEffect::SaveSettings { settings }])
	}

	pub(super) fn update_settings(&self, state: &Arc<ReplayState>, updates: &ReplaySettingsUpdate) -> Transition {
		let mut next = ReplayState::clone(state);
		next.settings = state.settings.merged(updates);

		let mut effects: Effects = smallvec![ReplayEffect::SaveSettings {
			settings: next.settings.clone()
		}];
		if let Some(skip_inactive) = updates.skip_inactivity {
			effects.push(ReplayEffect::SetReplayerSkipInactive { skip_inactive });
		}
		Transition::to(next, effects)
	}

	pub(super) fn buffer_check(&self, state: &Arc<ReplayState>, tab_key: &str) -> Transition {
		if !state.is_active(tab_key) || state.playback_mode != PlaybackMode::Buffering {
			return Transition::unchanged(state);
		}
		let Some(target) = state.buffering_at_global_ms else {
			return Transition::unchanged(state);
		};
		let Some(local_target) = state.local_offset_of(tab_key, target) else {
			return Transition::unchanged(state);
		};

		let loaded = state.loaded_duration_ms(tab_key);
		if loaded <= local_target.saturating_add(self.config.buffer_ahead_ms) && state.is_downloading() {
			return Transition {
				state: Arc::clone(state),
				effects: smallvec![ReplayEffect::ScheduleBufferPoll {
					generation: state.generation,
					tab_key: tab_key.to_string(),
					local_time_ms: local_target,
					delay_ms: self.config.buffer_poll_delay_ms,
				}],
			};
		}

		let mut next = ReplayState::clone(state);
		let mut effects = Effects::new();
		next.buffering_at_global_ms = None;
		next.auto_resume_after_buffering = false;
		next.paused_at_global_ms = target;

		let play_tab = if state.is_playable(tab_key) {
			Some(tab_key.to_string())
		} else {
			find_best_tab_at_global_offset(state, target, None)
		};

		match play_tab {
			Some(tab) => {
				if !state.is_active(&tab) {
					effects.push(ReplayEffect::EnsureReplayer {
						tab_key: tab.clone(),
						generation: state.generation,
					});
				}
				next.active_tab_key = Some(tab);
				next.playback_mode = PlaybackMode::Playing;
				push_play_effects(&next, next.active_tab_key.as_deref(), target, &mut effects);
				info!(target, active = ?next.active_tab_key, "Buffer filled, resuming");
			}
			None => {
				warn!(tab_key, target, "Buffer filled but nothing is playable");
				next.playback_mode = PlaybackMode::Paused;
				effects.push(ReplayEffect::PauseAll);
			}
		}
		Transition::to(next, effects)
	}
}
