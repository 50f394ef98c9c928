use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{push_play_effects, ReplayMachine, Transition};
use crate::core::{desired_global_offset, find_best_tab_at_global_offset, is_tab_in_range_at_global_offset, Effects, PlaybackMode, ReplayEffect, ReplayState, TimeMs};

const STALLED_MESSAGE: &str = "Playback stalled: unable to recover. Try seeking or switching tabs.";

impl ReplayMachine {
	pub(super) fn tick(&self, state: &Arc<ReplayState>, now_ms: TimeMs, active_local_time_ms: Option<TimeMs>) -> Transition {
		let config = &self.config;
		let active_local_time_ms = active_local_time_ms.map(|local| local.max(0));

		let previous_ms = state.current_global_time_ms_for_ui;
		let mut global_offset_ms = desired_global_offset(state, now_ms, active_local_time_ms, config.gap_fast_forward_multiplier);

		// a lagging renderer reading must not drag the UI clock backwards
		if state.playback_mode == PlaybackMode::Playing
			&& state.gap_fast_forward.is_none()
			&& now_ms >= state.suppress_auto_follow_until_wall_ms
			&& global_offset_ms.saturating_add(config.renderer_staleness_tolerance_ms) <= previous_ms
		{
			global_offset_ms = previous_ms;
		}

		let mut next = ReplayState::clone(state);
		let mut effects = Effects::new();
		next.current_global_time_ms_for_ui = global_offset_ms;

		if state.playback_mode == PlaybackMode::Playing {
			effects.push(ReplayEffect::SyncMiniTabs { global_offset_ms });
		}

		if let Some(gap) = &state.gap_fast_forward {
			if global_offset_ms >= gap.to_global_ms {
				next.gap_fast_forward = None;
				next.buffering_at_global_ms = None;
				next.auto_resume_after_buffering = false;
				next.playing_without_progress_since_ms = None;
				next.paused_at_global_ms = gap.to_global_ms;
				next.current_global_time_ms_for_ui = gap.to_global_ms;

				if !state.has_stream(&gap.next_tab_key) {
					warn!(next_tab = gap.next_tab_key.as_str(), "Gap target stream vanished, pausing");
					next.playback_mode = PlaybackMode::Paused;
					return Transition::to(next, effects);
				}

				info!(next_tab = gap.next_tab_key.as_str(), at = gap.to_global_ms, "Gap fast-forward complete");
				next.active_tab_key = Some(gap.next_tab_key.clone());
				next.playback_mode = PlaybackMode::Playing;
				next.suppress_auto_follow_until_wall_ms = now_ms.saturating_add(config.auto_switch_suppression_ms);
				effects.push(ReplayEffect::EnsureReplayer {
					tab_key: gap.next_tab_key.clone(),
					generation: gap.gen,
				});
				push_play_effects(&next, Some(&gap.next_tab_key), gap.to_global_ms, &mut effects);
				return Transition::to(next, effects);
			}
		}

		if state.settings.follow_active_tab
			&& state.playback_mode == PlaybackMode::Playing
			&& state.streams.len() > 1
			&& now_ms >= state.suppress_auto_follow_until_wall_ms
		{
			let active_in_range = state
				.active_tab_key
				.as_deref()
				.is_some_and(|active| is_tab_in_range_at_global_offset(state, active, global_offset_ms));

			if !active_in_range {
				if let Some(best) = find_best_tab_at_global_offset(state, global_offset_ms, None).filter(|best| !state.is_active(best)) {
					info!(from = ?state.active_tab_key, to = best.as_str(), global_offset_ms, "Following active tab");
					next.active_tab_key = Some(best.clone());
					next.paused_at_global_ms = global_offset_ms;
					next.suppress_auto_follow_until_wall_ms = now_ms.saturating_add(config.auto_switch_suppression_ms);
					effects.push(ReplayEffect::EnsureReplayer {
						tab_key: best.clone(),
						generation: state.generation,
					});
					push_play_effects(&next, Some(&best), global_offset_ms, &mut effects);
				}
			}
		}

		self.track_progress(&mut next, &mut effects, now_ms, active_local_time_ms.is_some());
		Transition::to(next, effects)
	}

	/// Watch for a playing engine whose renderer never reports a position
	fn track_progress(&self, next: &mut ReplayState, effects: &mut Effects, now_ms: TimeMs, has_progress: bool) {
		if next.playback_mode != PlaybackMode::Playing || has_progress {
			next.playing_without_progress_since_ms = None;
			return;
		}

		match next.playing_without_progress_since_ms {
			None => next.playing_without_progress_since_ms = Some(now_ms),
			Some(since) if now_ms.saturating_sub(since) >= self.config.stall_threshold_ms => {
				warn!(stalled_for = now_ms.saturating_sub(since), active = ?next.active_tab_key, "Playback stalled, recovering");
				next.playing_without_progress_since_ms = None;
				self.recover_stall(next, effects, now_ms);
			}
			Some(_) => {}
		}
	}

	/// Try progressively heavier remedies for a stalled renderer, ending in a
	/// user-visible error when nothing can play
	fn recover_stall(&self, next: &mut ReplayState, effects: &mut Effects, now_ms: TimeMs) {
		let stall_offset = next.paused_at_global_ms;
		let active = next.active_tab_key.clone();

		// another live renderer owns this instant
		if let Some(alternative) = find_best_tab_at_global_offset(next, stall_offset, active.as_deref()).filter(|tab| next.replayer_ready.contains(tab)) {
			debug!(to = alternative.as_str(), "Stall recovery: switching to covering tab");
			next.active_tab_key = Some(alternative.clone());
			push_play_effects(next, Some(&alternative), stall_offset, effects);
			return;
		}

		if let Some(active) = active {
			if next.replayer_ready.remove(&active) {
				debug!(tab_key = active.as_str(), "Stall recovery: recreating renderer");
				effects.push(ReplayEffect::RecreateReplayer {
					tab_key: active,
					generation: next.generation,
				});
				return;
			}
			if next.has_full_snapshot_by_tab.contains(&active) {
				debug!(tab_key = active.as_str(), "Stall recovery: requesting renderer");
				effects.push(ReplayEffect::EnsureReplayer {
					tab_key: active,
					generation: next.generation,
				});
				return;
			}
		}

		// any other live renderer, from its own start
		let ready = next
			.streams
			.iter()
			.find(|s| next.replayer_ready.contains(&s.tab_key))
			.map(|s| s.tab_key.clone());
		if let Some(ready) = ready {
			let start = next.global_offset_of(&ready, 0);
			debug!(to = ready.as_str(), start, "Stall recovery: jumping to live renderer");
			next.active_tab_key = Some(ready.clone());
			next.paused_at_global_ms = start;
			next.current_global_time_ms_for_ui = start;
			next.suppress_auto_follow_until_wall_ms = now_ms.saturating_add(self.config.manual_play_suppression_ms);
			push_play_effects(next, Some(&ready), start, effects);
			return;
		}

		effects.push(ReplayEffect::PauseAll);
		if next.is_downloading() {
			debug!(at = stall_offset, "Stall recovery: waiting for data");
			next.playback_mode = PlaybackMode::Buffering;
			next.buffering_at_global_ms = Some(stall_offset);
			next.auto_resume_after_buffering = true;
		} else {
			warn!(at = stall_offset, "Stall recovery exhausted");
			next.playback_mode = PlaybackMode::Paused;
			next.player_error = Some(STALLED_MESSAGE.to_string());
		}
	}
}
