use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{ChunkRange, Generation, ReplaySettingsUpdate, StreamInfo, TabKey, TimeMs};

/// Everything that can happen to a replay session.
///
/// Actions coming from asynchronous collaborators (downloader, renderer,
/// buffer poll) carry the generation they were issued against; user actions
/// and ticks do not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum ReplayAction {
	SelectRecording {
		generation: Generation,
	},
	StreamsComputed {
		generation: Generation,
		streams: Vec<StreamInfo>,
		global_start_ts: TimeMs,
		global_total_ms: TimeMs,
		#[serde(default)]
		chunk_ranges_by_tab: BTreeMap<TabKey, Vec<ChunkRange>>,
		#[serde(default)]
		tab_label_index: BTreeMap<TabKey, u32>,
	},
	DownloadComplete {
		generation: Generation,
	},
	DownloadError {
		generation: Generation,
		message: String,
	},
	ChunkLoaded {
		generation: Generation,
		tab_key: TabKey,
		has_full_snapshot: bool,
		loaded_duration_ms: TimeMs,
		#[serde(default)]
		had_events_before_this_chunk: bool,
	},
	ReplayerReady {
		generation: Generation,
		tab_key: TabKey,
	},
	ReplayerInitError {
		generation: Generation,
		message: String,
	},
	ReplayerFinish {
		generation: Generation,
		tab_key: TabKey,
		local_time_ms: TimeMs,
		now_ms: TimeMs,
	},
	TogglePlayPause {
		now_ms: TimeMs,
	},
	Seek {
		global_offset_ms: TimeMs,
		now_ms: TimeMs,
	},
	SelectTab {
		tab_key: TabKey,
		now_ms: TimeMs,
	},
	UpdateSpeed {
		speed: f64,
	},
	UpdateSettings {
		updates: ReplaySettingsUpdate,
	},
	Tick {
		now_ms: TimeMs,
		#[serde(default)]
		active_replayer_local_time_ms: Option<TimeMs>,
	},
	BufferCheck {
		generation: Generation,
		tab_key: TabKey,
	},
	Reset,
}

impl ReplayAction {
	/// Generation tag for actions produced by async collaborators
	pub fn generation(&self) -> Option<Generation> {
		match self {
			Self::StreamsComputed { generation, .. }
			| Self::DownloadComplete { generation }
			| Self::DownloadError { generation, .. }
			| Self::ChunkLoaded { generation, .. }
			| Self::ReplayerReady { generation, .. }
			| Self::ReplayerInitError { generation, .. }
			| Self::ReplayerFinish { generation, .. }
			| Self::BufferCheck { generation, .. } => Some(*generation),
			Self::SelectRecording { .. }
			| Self::TogglePlayPause { .. }
			| Self::Seek { .. }
			| Self::SelectTab { .. }
			| Self::UpdateSpeed { .. }
			| Self::UpdateSettings { .. }
			| Self::Tick { .. }
			| Self::Reset => None,
		}
	}

	pub fn name(&self) -> &'static str {
		match self {
			Self::SelectRecording { .. } => "SELECT_RECORDING",
			Self::StreamsComputed { .. } => "STREAMS_COMPUTED",
			Self::DownloadComplete { .. } => "DOWNLOAD_COMPLETE",
			Self::DownloadError { .. } => "DOWNLOAD_ERROR",
			Self::ChunkLoaded { .. } => "CHUNK_LOADED",
			Self::ReplayerReady { .. } => "REPLAYER_READY",
			Self::ReplayerInitError { .. } => "REPLAYER_INIT_ERROR",
			Self::ReplayerFinish { .. } => "REPLAYER_FINISH",
			Self::TogglePlayPause { .. } => "TOGGLE_PLAY_PAUSE",
			Self::Seek { .. } => "SEEK",
			Self::SelectTab { .. } => "SELECT_TAB",
			Self::UpdateSpeed { .. } => "UPDATE_SPEED",
			Self::UpdateSettings { .. } => "UPDATE_SETTINGS",
			Self::Tick { .. } => "TICK",
			Self::BufferCheck { .. } => "BUFFER_CHECK",
			Self::Reset => "RESET",
		}
	}
}
