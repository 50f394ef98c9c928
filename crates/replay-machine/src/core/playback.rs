use super::{GapFastForward, ReplayState, TimeMs};

/// Where the UI clock should be right now.
///
/// An active gap fast-forward interpolates from its start toward its target
/// at `speed × multiplier` wall time. Otherwise a playing engine trusts the
/// renderer's reported position, and everything else sits at the seek
/// position.
pub fn desired_global_offset(state: &ReplayState, now_ms: TimeMs, active_local_time_ms: Option<TimeMs>, gap_multiplier: f64) -> TimeMs {
	if let Some(gap) = &state.gap_fast_forward {
		return gap_position(gap, now_ms, state.settings.player_speed, gap_multiplier);
	}

	let offset = match (state.playback_mode, active_local_time_ms, state.active_tab_key.as_deref()) {
		(mode, Some(local), Some(active)) if mode.is_advancing() && state.has_stream(active) => state.global_offset_of(active, local),
		_ => state.paused_at_global_ms,
	};
	offset.max(0)
}

fn gap_position(gap: &GapFastForward, now_ms: TimeMs, speed: f64, multiplier: f64) -> TimeMs {
	let elapsed = now_ms.saturating_sub(gap.wall_ms).max(0) as f64;
	let advanced = (elapsed * speed * multiplier).round() as TimeMs;
	gap.from_global_ms.saturating_add(advanced).min(gap.to_global_ms)
}

/// What to do when the active stream ends and nothing else covers the instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishDecision {
	GapFastForward { to_global_ms: TimeMs },
	BufferAtCurrent,
	FinishReplay,
}

/// Decide between skipping ahead, waiting for data, and ending the replay.
///
/// Waiting wins while the current stream still expects data; then a later
/// stream start triggers a gap skip; then any ongoing download is waited
/// for, since another stream may still receive its first chunk.
pub fn finish_decision(is_downloading: bool, next_start_global_ms: Option<TimeMs>, current_global_ms: TimeMs, current_tab_expects_more: bool) -> FinishDecision {
	if is_downloading && current_tab_expects_more {
		return FinishDecision::BufferAtCurrent;
	}
	if let Some(next) = next_start_global_ms.filter(|next| *next > current_global_ms) {
		return FinishDecision::GapFastForward { to_global_ms: next };
	}
	if is_downloading {
		return FinishDecision::BufferAtCurrent;
	}
	FinishDecision::FinishReplay
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::core::{PlaybackMode, ReplaySettings, StreamInfo};
	use std::sync::Arc;

	fn state_with(mode: PlaybackMode, paused_at: TimeMs) -> ReplayState {
		let mut state = ReplayState::new(ReplaySettings::default());
		state.streams = Arc::new(vec![StreamInfo::new("a", 500, 5000)]);
		state.global_start_ts = 100;
		state.active_tab_key = Some("a".to_string());
		state.playback_mode = mode;
		state.paused_at_global_ms = paused_at;
		state
	}

	#[test]
	fn paused_uses_seek_position() {
		let state = state_with(PlaybackMode::Paused, 5000);
		assert_eq!(desired_global_offset(&state, 1000, Some(3000), 12.0), 5000);
	}

	#[test]
	fn playing_converts_renderer_reading() {
		let state = state_with(PlaybackMode::Playing, 0);
		assert_eq!(desired_global_offset(&state, 1000, Some(2000), 12.0), 2000 + (500 - 100));
	}

	#[test]
	fn playing_without_reading_holds_seek_position() {
		let state = state_with(PlaybackMode::Playing, 3000);
		assert_eq!(desired_global_offset(&state, 1000, None, 12.0), 3000);
	}

	#[test]
	fn gap_interpolates_and_clamps() {
		let mut state = state_with(PlaybackMode::GapFastForward, 0);
		state.settings.player_speed = 2.0;
		state.gap_fast_forward = Some(GapFastForward {
			from_global_ms: 5000,
			to_global_ms: 20000,
			wall_ms: 1000,
			next_tab_key: "a".to_string(),
			gen: 0,
		});
		assert_eq!(desired_global_offset(&state, 1100, None, 12.0), 5000 + 100 * 2 * 12);
		assert_eq!(desired_global_offset(&state, 1100, None, 1.0), 5200);
		assert_eq!(desired_global_offset(&state, 999_999, None, 12.0), 20000);
		assert_eq!(desired_global_offset(&state, 0, None, 12.0), 5000);
	}

	#[test]
	fn finish_prefers_buffering_for_current_tab() {
		assert_eq!(finish_decision(true, Some(10000), 5000, true), FinishDecision::BufferAtCurrent);
	}

	#[test]
	fn finish_skips_gap_to_later_start() {
		assert_eq!(finish_decision(false, Some(10000), 5000, false), FinishDecision::GapFastForward { to_global_ms: 10000 });
		assert_eq!(finish_decision(true, Some(10000), 5000, false), FinishDecision::GapFastForward { to_global_ms: 10000 });
	}

	#[test]
	fn finish_waits_while_downloading() {
		assert_eq!(finish_decision(true, None, 5000, false), FinishDecision::BufferAtCurrent);
	}

	#[test]
	fn finish_ends_when_nothing_left() {
		assert_eq!(finish_decision(false, None, 5000, false), FinishDecision::FinishReplay);
		assert_eq!(finish_decision(false, Some(3000), 5000, false), FinishDecision::FinishReplay);
	}
}
