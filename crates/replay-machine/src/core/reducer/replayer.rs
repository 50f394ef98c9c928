use std::sync::Arc;

use smallvec::smallvec;
use tracing::{debug, info, warn};

use super::{enter_buffering, push_play_effects, ReplayMachine, Transition};
use crate::core::{
	find_best_tab_at_global_offset, find_next_tab_start_after_global_offset, finish_decision, global_offset_to_local_offset, local_offset_to_global_offset, Effects, FinishDecision,
	GapFastForward, PlaybackMode, ReplayEffect, ReplayState, TimeMs,
};

impl ReplayMachine {
	pub(super) fn replayer_ready(&self, state: &Arc<ReplayState>, tab_key: &str) -> Transition {
		let mut next = ReplayState::clone(state);
		next.replayer_ready.insert(tab_key.to_string());

		let is_active = state.is_active(tab_key);
		// The active tab may never get a snapshot; the first renderer to come up takes over
		let active_tab_stuck = !is_active
			&& !state.auto_play_triggered
			&& state.has_stream(tab_key)
			&& state.active_tab_key.as_deref().is_some_and(|active| !state.has_full_snapshot_by_tab.contains(active));
		let effective_active = is_active || active_tab_stuck;

		let should_auto_play = effective_active && !state.auto_play_triggered;
		let should_play = effective_active && (should_auto_play || state.playback_mode == PlaybackMode::Playing);

		let stream_start = state.stream(tab_key).map_or(state.global_start_ts, |s| s.first_event_at_ms);
		let target_global = if active_tab_stuck {
			local_offset_to_global_offset(state.global_start_ts, stream_start, 0).max(0)
		} else {
			state.paused_at_global_ms
		};
		let local_offset_ms = global_offset_to_local_offset(state.global_start_ts, stream_start, target_global);

		if active_tab_stuck {
			info!(from = ?state.active_tab_key, to = tab_key, "Active tab never became playable, taking over");
			next.active_tab_key = Some(tab_key.to_string());
			next.paused_at_global_ms = target_global;
		}
		if should_auto_play {
			next.auto_play_triggered = true;
			// buffering resumes on its own; a running gap skip finishes first
			if !matches!(state.playback_mode, PlaybackMode::Buffering | PlaybackMode::GapFastForward) {
				next.playback_mode = PlaybackMode::Playing;
			}
		}
		next.playing_without_progress_since_ms = None;

		let effect = if should_play {
			ReplayEffect::PlayReplayer {
				tab_key: tab_key.to_string(),
				local_offset_ms,
			}
		} else {
			ReplayEffect::PauseReplayerAt {
				tab_key: tab_key.to_string(),
				local_offset_ms,
			}
		};

		debug!(tab_key, should_play, local_offset_ms, "Replayer ready");
		Transition::to(next, smallvec![effect])
	}

	pub(super) fn replayer_init_error(&self, state: &Arc<ReplayState>, message: &str) -> Transition {
		warn!(generation = state.generation, message, "Replayer failed to initialize");

		let mut next = ReplayState::clone(state);
		next.player_error = Some(message.to_string());
		Transition::to(next, Effects::new())
	}

	pub(super) fn replayer_finish(&self, state: &Arc<ReplayState>, tab_key: &str, local_time_ms: TimeMs, now_ms: TimeMs) -> Transition {
		// only the active renderer's end matters
		if !state.is_active(tab_key) {
			return Transition::unchanged(state);
		}

		let config = &self.config;
		let local_time_ms = local_time_ms.max(0);
		let generation = state.generation;

		// A renderer reporting its end while data is loaded past that point is wrong
		if state.loaded_duration_ms(tab_key) > local_time_ms.saturating_add(config.premature_finish_slack_ms) {
			let repeated = state
				.premature_finish_retry_local_ms
				.is_some_and(|previous| previous.saturating_sub(local_time_ms).saturating_abs() < config.premature_finish_repeat_window_ms);

			let mut next = ReplayState::clone(state);
			next.playing_without_progress_since_ms = None;

			if repeated {
				warn!(tab_key, local_time_ms, "Replayer keeps finishing at the same position, recreating it");
				next.replayer_ready.remove(tab_key);
				next.premature_finish_retry_local_ms = None;
				return Transition::to(
					next,
					smallvec![ReplayEffect::RecreateReplayer {
						tab_key: tab_key.to_string(),
						generation,
					}],
				);
			}

			debug!(tab_key, local_time_ms, "Premature finish, nudging replayer");
			next.premature_finish_retry_local_ms = Some(local_time_ms);
			return Transition::to(
				next,
				smallvec![ReplayEffect::PlayReplayer {
					tab_key: tab_key.to_string(),
					local_offset_ms: local_time_ms,
				}],
			);
		}

		let expects_more = state
			.stream(tab_key)
			.is_some_and(|s| s.expected_duration_ms() > local_time_ms.saturating_add(config.expected_data_slack_ms));

		if state.is_downloading() && expects_more {
			let at = state.global_offset_of(tab_key, local_time_ms);
			debug!(tab_key, local_time_ms, at, "Replayer ran out of data, buffering");

			let mut next = ReplayState::clone(state);
			enter_buffering(&mut next, at);
			return Transition::to(
				next,
				smallvec![ReplayEffect::ScheduleBufferPoll {
					generation,
					tab_key: tab_key.to_string(),
					local_time_ms,
					delay_ms: config.buffer_poll_delay_ms,
				}],
			);
		}

		// Hand off to another stream covering the same instant
		let mut global_offset_ms = state.global_offset_of(tab_key, local_time_ms);
		let mut handoff = find_best_tab_at_global_offset(state, global_offset_ms, Some(tab_key));
		if handoff.is_none() && global_offset_ms.saturating_add(config.renderer_staleness_tolerance_ms) <= state.current_global_time_ms_for_ui {
			global_offset_ms = state.current_global_time_ms_for_ui;
			handoff = find_best_tab_at_global_offset(state, global_offset_ms, Some(tab_key));
		}

		if let Some(handoff) = handoff {
			info!(from = tab_key, to = handoff.as_str(), global_offset_ms, "Handing off to overlapping stream");

			let mut next = ReplayState::clone(state);
			next.active_tab_key = Some(handoff.clone());
			next.playback_mode = PlaybackMode::Playing;
			next.paused_at_global_ms = global_offset_ms;
			next.gap_fast_forward = None;
			next.buffering_at_global_ms = None;
			next.auto_resume_after_buffering = false;
			next.suppress_auto_follow_until_wall_ms = now_ms.saturating_add(config.manual_play_suppression_ms);
			next.playing_without_progress_since_ms = None;

			let mut effects: Effects = smallvec![ReplayEffect::EnsureReplayer {
				tab_key: handoff.clone(),
				generation,
			}];
			push_play_effects(&next, Some(&handoff), global_offset_ms, &mut effects);
			return Transition::to(next, effects);
		}

		let next_start = find_next_tab_start_after_global_offset(state, global_offset_ms);
		let current_global_ms = global_offset_ms.max(state.current_global_time_ms_for_ui);
		let decision = finish_decision(state.is_downloading(), next_start.as_ref().map(|n| n.global_offset_ms), current_global_ms, expects_more);

		let mut next = ReplayState::clone(state);
		next.playing_without_progress_since_ms = None;

		match (decision, next_start) {
			(FinishDecision::GapFastForward { to_global_ms }, Some(next_start)) => {
				info!(from = global_offset_ms, to = to_global_ms, next_tab = next_start.tab_key.as_str(), "Fast-forwarding through gap");
				next.playback_mode = PlaybackMode::GapFastForward;
				next.paused_at_global_ms = global_offset_ms;
				next.buffering_at_global_ms = None;
				next.auto_resume_after_buffering = false;
				next.gap_fast_forward = Some(GapFastForward {
					from_global_ms: global_offset_ms,
					to_global_ms,
					wall_ms: now_ms,
					next_tab_key: next_start.tab_key,
					gen: generation,
				});
				Transition::to(next, Effects::new())
			}
			(FinishDecision::BufferAtCurrent, _) => {
				debug!(tab_key, global_offset_ms, "Waiting for other streams to download");
				enter_buffering(&mut next, global_offset_ms);
				Transition::to(next, Effects::new())
			}
			_ => {
				info!(generation, total = state.global_total_ms, "Replay finished");
				next.playback_mode = PlaybackMode::Finished;
				next.paused_at_global_ms = state.global_total_ms;
				next.current_global_time_ms_for_ui = state.global_total_ms;
				next.gap_fast_forward = None;
				next.buffering_at_global_ms = None;
				next.auto_resume_after_buffering = false;
				Transition::to(next, smallvec![ReplayEffect::PauseAll])
			}
		}
	}
}
