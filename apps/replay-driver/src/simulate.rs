use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use replay_machine::core::{ChunkRange, Generation, PlaybackMode, ReplayAction, ReplayEffect, ReplayState, StreamInfo, TabKey, TimeMs};
use replay_machine::host::{ActionSink, EffectExecutor, HostConfig, ReplayPlayer};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Delay between a renderer request and its ready callback
const RENDERER_STARTUP_MS: u64 = 50;

// ============================================================================
// Recording description
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedTab {
	pub tab_key: TabKey,
	pub first_event_at_ms: TimeMs,
	pub last_event_at_ms: TimeMs,
	#[serde(default)]
	pub label: Option<u32>,
	/// Renderable ranges; the whole stream when empty
	#[serde(default)]
	pub ranges: Vec<ChunkRange>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recording {
	pub tabs: Vec<RecordedTab>,
}

impl Recording {
	/// Three tabs: two overlapping at the start, a quiet stretch, then a late one
	pub fn demo() -> Self {
		Self {
			tabs: vec![
				RecordedTab {
					tab_key: "checkout".into(),
					first_event_at_ms: 1_000,
					last_event_at_ms: 9_000,
					label: Some(1),
					ranges: vec![ChunkRange::new(1_000, 9_000)],
				},
				RecordedTab {
					tab_key: "docs".into(),
					first_event_at_ms: 4_000,
					last_event_at_ms: 12_000,
					label: Some(2),
					ranges: vec![ChunkRange::new(4_000, 6_000), ChunkRange::new(8_000, 12_000)],
				},
				RecordedTab {
					tab_key: "support".into(),
					first_event_at_ms: 16_000,
					last_event_at_ms: 20_000,
					label: Some(3),
					ranges: Vec::new(),
				},
			],
		}
	}

	pub fn global_start_ts(&self) -> TimeMs {
		self.tabs.iter().map(|t| t.first_event_at_ms).min().unwrap_or(0)
	}

	pub fn global_total_ms(&self) -> TimeMs {
		let end = self.tabs.iter().map(|t| t.last_event_at_ms).max().unwrap_or(0);
		(end - self.global_start_ts()).max(0)
	}

	pub fn streams_computed(&self, generation: Generation) -> ReplayAction {
		let chunk_ranges_by_tab = self
			.tabs
			.iter()
			.map(|t| {
				let ranges = if t.ranges.is_empty() {
					vec![ChunkRange::new(t.first_event_at_ms, t.last_event_at_ms)]
				} else {
					t.ranges.clone()
				};
				(t.tab_key.clone(), ranges)
			})
			.collect();
		let tab_label_index = self.tabs.iter().filter_map(|t| t.label.map(|label| (t.tab_key.clone(), label))).collect();

		ReplayAction::StreamsComputed {
			generation,
			streams: self.tabs.iter().map(|t| StreamInfo::new(t.tab_key.clone(), t.first_event_at_ms, t.last_event_at_ms)).collect(),
			global_start_ts: self.global_start_ts(),
			global_total_ms: self.global_total_ms(),
			chunk_ranges_by_tab,
			tab_label_index,
		}
	}

	pub fn validate(&self) -> Result<()> {
		if self.tabs.is_empty() {
			bail!("recording has no tabs");
		}
		for tab in &self.tabs {
			if tab.last_event_at_ms < tab.first_event_at_ms {
				bail!("tab {} ends before it starts", tab.tab_key);
			}
		}
		Ok(())
	}
}

// ============================================================================
// Simulated downloader
// ============================================================================

/// Loads every tab in parallel, `chunk_ms` of recorded time per round
pub fn download_plan(recording: &Recording, generation: Generation, chunk_ms: TimeMs) -> Vec<Vec<ReplayAction>> {
	let chunk_ms = chunk_ms.max(1);
	let mut loaded: BTreeMap<&str, TimeMs> = BTreeMap::new();
	let mut rounds = Vec::new();

	loop {
		let mut round = Vec::new();
		for tab in &recording.tabs {
			let duration = tab.last_event_at_ms - tab.first_event_at_ms;
			let before = loaded.get(tab.tab_key.as_str()).copied();
			if before.is_some_and(|b| b >= duration) {
				continue;
			}
			let now = before.map_or(chunk_ms, |b| b + chunk_ms).min(duration);
			loaded.insert(&tab.tab_key, now);
			round.push(ReplayAction::ChunkLoaded {
				generation,
				tab_key: tab.tab_key.clone(),
				has_full_snapshot: true,
				loaded_duration_ms: now,
				had_events_before_this_chunk: before.is_some(),
			});
		}
		if round.is_empty() {
			break;
		}
		rounds.push(round);
	}

	rounds
}

async fn run_downloader(sink: ActionSink, recording: Recording, generation: Generation, chunk_ms: TimeMs, interval: Duration, cancel: CancellationToken) {
	let rounds = download_plan(&recording, generation, chunk_ms);
	info!(rounds = rounds.len(), "Simulated download started");

	for round in rounds {
		tokio::select! {
			() = tokio::time::sleep(interval) => {}
			() = cancel.cancelled() => return,
		}
		for action in round {
			if sink.dispatch(action).is_err() {
				return;
			}
		}
	}

	if sink.dispatch(ReplayAction::DownloadComplete { generation }).is_ok() {
		info!("Simulated download complete");
	}
}

// ============================================================================
// Simulated renderer
// ============================================================================

struct Playing {
	tab_key: TabKey,
	from_local_ms: TimeMs,
	since_ms: TimeMs,
}

/// Renderer stand-in: comes up after a short delay, plays in wall time
/// scaled by the player speed and reports its end like a real one would
#[derive(Default)]
pub struct SimulatedRenderer {
	sink: Option<ActionSink>,
	playing: Option<Playing>,
	speed: f64,
}

impl SimulatedRenderer {
	pub fn new() -> Self {
		Self { speed: 1.0, ..Self::default() }
	}
}

/// Report the renderer ready once its simulated startup elapses
fn spawn_ready(sink: &ActionSink, tab_key: &str, generation: Generation) {
	let sink = sink.clone();
	let tab_key = tab_key.to_string();
	tokio::spawn(async move {
		tokio::time::sleep(Duration::from_millis(RENDERER_STARTUP_MS)).await;
		let _ = sink.dispatch(ReplayAction::ReplayerReady { generation, tab_key });
	});
}

impl EffectExecutor for SimulatedRenderer {
	fn execute(&mut self, effect: &ReplayEffect, _state: &ReplayState, sink: &ActionSink) {
		self.sink.get_or_insert_with(|| sink.clone());

		match effect {
			ReplayEffect::EnsureReplayer { tab_key, generation } | ReplayEffect::RecreateReplayer { tab_key, generation } => {
				debug!(tab_key = tab_key.as_str(), generation, "Starting renderer");
				spawn_ready(sink, tab_key, *generation);
			}
			ReplayEffect::PlayReplayer { tab_key, local_offset_ms } => {
				self.playing = Some(Playing {
					tab_key: tab_key.clone(),
					from_local_ms: *local_offset_ms,
					since_ms: sink.now_ms(),
				});
			}
			ReplayEffect::PauseReplayerAt { tab_key, .. } => {
				if self.playing.as_ref().is_some_and(|p| &p.tab_key == tab_key) {
					self.playing = None;
				}
			}
			ReplayEffect::PauseAll | ReplayEffect::DestroyAllReplayers => self.playing = None,
			ReplayEffect::SetReplayerSpeed { speed } => self.speed = *speed,
			ReplayEffect::SetReplayerSkipInactive { .. } | ReplayEffect::SyncMiniTabs { .. } | ReplayEffect::ScheduleBufferPoll { .. } | ReplayEffect::SaveSettings { .. } => {}
		}
	}

	fn sample_local_time_ms(&mut self, state: &ReplayState, now_ms: TimeMs) -> Option<TimeMs> {
		let playing = self.playing.as_ref().filter(|p| state.is_active(&p.tab_key))?;
		let elapsed = ((now_ms - playing.since_ms) as f64 * self.speed).round() as TimeMs;
		let local = playing.from_local_ms + elapsed;

		// a renderer stops where its data stops
		let end = state.loaded_duration_ms(&playing.tab_key);
		if local < end {
			return Some(local);
		}

		let tab_key = playing.tab_key.clone();
		self.playing = None;
		if let Some(sink) = &self.sink {
			let _ = sink.dispatch(ReplayAction::ReplayerFinish {
				generation: state.generation,
				tab_key,
				local_time_ms: end,
				now_ms,
			});
		}
		Some(end)
	}
}

// ============================================================================
// Driver
// ============================================================================

pub struct SimulationOptions {
	pub chunk_ms: TimeMs,
	pub chunk_interval: Duration,
	pub speed: f64,
	pub timeout: Duration,
}

pub async fn run(config: HostConfig, recording: Recording, options: SimulationOptions, shutdown: CancellationToken) -> Result<Arc<ReplayState>> {
	recording.validate()?;

	let player = ReplayPlayer::new(config, SimulatedRenderer::new())?;
	let generation = player.select_recording().await?;
	player.dispatch(recording.streams_computed(generation))?;
	if (options.speed - player.current_state().settings.player_speed).abs() > f64::EPSILON {
		player.update_speed(options.speed)?;
	}

	let downloader = tokio::spawn(run_downloader(
		player.action_sink(),
		recording,
		generation,
		options.chunk_ms,
		options.chunk_interval,
		shutdown.child_token(),
	));

	let outcome = tokio::select! {
		state = watch_until_finished(player.subscribe()) => state,
		() = tokio::time::sleep(options.timeout) => {
			warn!(timeout = ?options.timeout, "Simulation timed out");
			None
		}
		() = shutdown.cancelled() => {
			info!("Simulation interrupted");
			None
		}
	};

	shutdown.cancel();
	let _ = downloader.await;
	let last = player.current_state();
	player.shutdown().await;

	match outcome {
		Some(state) => Ok(state),
		None => Ok(last),
	}
}

/// Log mode changes until the replay finishes
async fn watch_until_finished(mut rx: watch::Receiver<Arc<ReplayState>>) -> Option<Arc<ReplayState>> {
	let mut last_mode = None;
	let mut last_tab = None;

	loop {
		let state = Arc::clone(&rx.borrow_and_update());
		if last_mode != Some(state.playback_mode) || last_tab != state.active_tab_key {
			info!(
				mode = ?state.playback_mode,
				active = ?state.active_tab_key,
				at = state.current_global_time_ms_for_ui,
				total = state.global_total_ms,
				"Playback"
			);
			last_mode = Some(state.playback_mode);
			last_tab.clone_from(&state.active_tab_key);
		}
		if let Some(error) = &state.player_error {
			warn!(error = error.as_str(), "Player error");
		}
		if state.playback_mode == PlaybackMode::Finished {
			return Some(state);
		}
		if rx.changed().await.is_err() {
			return None;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn demo_recording_spans_all_tabs() {
		let recording = Recording::demo();
		assert_eq!(recording.global_start_ts(), 1_000);
		assert_eq!(recording.global_total_ms(), 19_000);
		assert!(recording.validate().is_ok());
	}

	#[test]
	fn download_plan_loads_every_tab_to_its_end() {
		let recording = Recording::demo();
		let rounds = download_plan(&recording, 1, 3000);

		let mut last = BTreeMap::new();
		for action in rounds.iter().flatten() {
			if let ReplayAction::ChunkLoaded { tab_key, loaded_duration_ms, .. } = action {
				last.insert(tab_key.clone(), *loaded_duration_ms);
			}
		}
		assert_eq!(last.get("checkout"), Some(&8_000));
		assert_eq!(last.get("docs"), Some(&8_000));
		assert_eq!(last.get("support"), Some(&4_000));
		assert_eq!(rounds.len(), 3);
	}

	#[test]
	fn empty_ranges_cover_the_whole_stream() {
		let ReplayAction::StreamsComputed { chunk_ranges_by_tab, .. } = Recording::demo().streams_computed(1) else {
			panic!("expected STREAMS_COMPUTED");
		};
		assert_eq!(chunk_ranges_by_tab["support"], vec![ChunkRange::new(16_000, 20_000)]);
	}

	#[tokio::test(start_paused = true)]
	async fn demo_recording_plays_to_the_end() {
		let options = SimulationOptions {
			chunk_ms: 4000,
			chunk_interval: Duration::from_millis(100),
			speed: 4.0,
			timeout: Duration::from_secs(120),
		};
		let config = HostConfig::default().with_tick_interval(50);

		let state = run(config, Recording::demo(), options, CancellationToken::new()).await.unwrap();
		assert_eq!(state.playback_mode, PlaybackMode::Finished);
		assert_eq!(state.current_global_time_ms_for_ui, 19_000);
		assert!(state.player_error.is_none());
	}
}
