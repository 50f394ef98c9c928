use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::{Generation, ReplaySettings, TabKey, TimeMs};

/// Descriptive command for the effect executor. The machine never waits on
/// an effect; anything whose outcome matters comes back as a new action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ReplayEffect {
	PlayReplayer {
		tab_key: TabKey,
		local_offset_ms: TimeMs,
	},
	PauseReplayerAt {
		tab_key: TabKey,
		local_offset_ms: TimeMs,
	},
	PauseAll,
	EnsureReplayer {
		tab_key: TabKey,
		generation: Generation,
	},
	DestroyAllReplayers,
	RecreateReplayer {
		tab_key: TabKey,
		generation: Generation,
	},
	SetReplayerSpeed {
		speed: f64,
	},
	SetReplayerSkipInactive {
		skip_inactive: bool,
	},
	SyncMiniTabs {
		global_offset_ms: TimeMs,
	},
	ScheduleBufferPoll {
		generation: Generation,
		tab_key: TabKey,
		local_time_ms: TimeMs,
		delay_ms: TimeMs,
	},
	SaveSettings {
		settings: ReplaySettings,
	},
}

impl ReplayEffect {
	pub fn name(&self) -> &'static str {
		match self {
			Self::PlayReplayer { .. } => "play_replayer",
			Self::PauseReplayerAt { .. } => "pause_replayer_at",
			Self::PauseAll => "pause_all",
			Self::EnsureReplayer { .. } => "ensure_replayer",
			Self::DestroyAllReplayers => "destroy_all_replayers",
			Self::RecreateReplayer { .. } => "recreate_replayer",
			Self::SetReplayerSpeed { .. } => "set_replayer_speed",
			Self::SetReplayerSkipInactive { .. } => "set_replayer_skip_inactive",
			Self::SyncMiniTabs { .. } => "sync_mini_tabs",
			Self::ScheduleBufferPoll { .. } => "schedule_buffer_poll",
			Self::SaveSettings { .. } => "save_settings",
		}
	}
}

/// Effect list of one transition, rarely more than a handful
pub type Effects = SmallVec<[ReplayEffect; 4]>;
