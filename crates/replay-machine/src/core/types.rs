use serde::{Deserialize, Serialize};

/// Time in milliseconds
pub type TimeMs = i64;

/// Identity of one recorded tab stream
pub type TabKey = String;

/// Recording selection counter, used to drop stale async callbacks
pub type Generation = u64;

/// Player speeds the renderer supports
pub const ALLOWED_PLAYER_SPEEDS: [f64; 4] = [0.5, 1.0, 2.0, 4.0];

pub fn is_allowed_speed(speed: f64) -> bool {
	ALLOWED_PLAYER_SPEEDS.contains(&speed)
}

/// One recorded tab, bounded by its first and last event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamInfo {
	pub tab_key: TabKey,
	pub first_event_at_ms: TimeMs,
	pub last_event_at_ms: TimeMs,
}

impl StreamInfo {
	pub fn new(tab_key: impl Into<TabKey>, first_event_at_ms: TimeMs, last_event_at_ms: TimeMs) -> Self {
		Self {
			tab_key: tab_key.into(),
			first_event_at_ms,
			last_event_at_ms,
		}
	}

	/// Full local duration the stream will have once every chunk is loaded
	pub fn expected_duration_ms(&self) -> TimeMs {
		self.last_event_at_ms.saturating_sub(self.first_event_at_ms)
	}
}

/// Inclusive `[start_ts, end_ts]` interval of absolute time known to be renderable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRange {
	pub start_ts: TimeMs,
	pub end_ts: TimeMs,
}

impl ChunkRange {
	pub fn new(start_ts: TimeMs, end_ts: TimeMs) -> Self {
		Self { start_ts, end_ts }
	}

	pub fn contains(&self, ts: TimeMs) -> bool {
		ts >= self.start_ts && ts <= self.end_ts
	}
}

/// User-facing playback preferences, the only thing that survives a recording switch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaySettings {
	pub player_speed: f64,
	pub skip_inactivity: bool,
	pub follow_active_tab: bool,
}

impl Default for ReplaySettings {
	fn default() -> Self {
		Self {
			player_speed: 1.0,
			skip_inactivity: true,
			follow_active_tab: false,
		}
	}
}

impl ReplaySettings {
	/// Merge a partial update. A disallowed speed is ignored.
	pub fn merged(&self, updates: &ReplaySettingsUpdate) -> Self {
		let mut next = self.clone();
		if let Some(speed) = updates.player_speed.filter(|s| is_allowed_speed(*s)) {
			next.player_speed = speed;
		}
		if let Some(skip) = updates.skip_inactivity {
			next.skip_inactivity = skip;
		}
		if let Some(follow) = updates.follow_active_tab {
			next.follow_active_tab = follow;
		}
		next
	}
}

/// Partial settings update, absent fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaySettingsUpdate {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub player_speed: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub skip_inactivity: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub follow_active_tab: Option<bool>,
}

impl ReplaySettingsUpdate {
	pub fn skip_inactivity(value: bool) -> Self {
		Self {
			skip_inactivity: Some(value),
			..Self::default()
		}
	}

	pub fn follow_active_tab(value: bool) -> Self {
		Self {
			follow_active_tab: Some(value),
			..Self::default()
		}
	}
}

/// Whether the data source is still producing chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
	#[default]
	Idle,
	Downloading,
	Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackMode {
	#[default]
	Paused,
	Playing,
	Buffering,
	GapFastForward,
	Finished,
}

impl PlaybackMode {
	/// Playing or animating across a gap, i.e. the clock is running
	pub fn is_advancing(self) -> bool {
		matches!(self, Self::Playing | Self::GapFastForward)
	}
}

/// In-progress skip across a region no stream covers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GapFastForward {
	pub from_global_ms: TimeMs,
	pub to_global_ms: TimeMs,
	pub wall_ms: TimeMs,
	pub next_tab_key: TabKey,
	pub gen: Generation,
}
