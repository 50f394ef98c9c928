use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{ActionSink, EffectExecutor, HostClock, HostCommand, HostConfig, JsonFileSettingsStore, MemorySettingsStore, ReplayEngine, SettingsStore};
use super::{Generation, ReplayAction, ReplayEffect, ReplayError, ReplaySettingsUpdate, ReplayState, Result, TabKey, TimeMs};

/// The replay actor façade
pub struct ReplayPlayer {
	sink: ActionSink,
	state_rx: watch::Receiver<Arc<ReplayState>>,
	effect_tx: broadcast::Sender<ReplayEffect>,
	task_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
	cancel_token: CancellationToken,
}

impl ReplayPlayer {
	/// Spawn an engine persisting settings to `config.settings_path`, or in memory without one
	pub fn new<E: EffectExecutor>(config: HostConfig, executor: E) -> Result<Self> {
		let store: Arc<dyn SettingsStore> = match &config.settings_path {
			Some(path) => Arc::new(JsonFileSettingsStore::new(path)),
			None => Arc::new(MemorySettingsStore::default()),
		};
		Self::with_store(config, executor, store)
	}

	pub fn with_store<E: EffectExecutor>(config: HostConfig, executor: E, store: Arc<dyn SettingsStore>) -> Result<Self> {
		let settings = match store.load() {
			Ok(settings) => settings,
			Err(e) if e.is_recoverable() => {
				warn!(error = %e, "Ignoring unreadable settings, using defaults");
				None
			}
			Err(e) => return Err(e),
		};

		let engine = ReplayEngine::new(config, settings)?;
		let state_rx = engine.subscribe();
		let effect_tx = engine.effect_sender();

		let cancel_token = CancellationToken::new();
		let (command_tx, command_rx) = mpsc::unbounded_channel();
		let sink = ActionSink::new(command_tx, HostClock::start());

		let task_handle = tokio::spawn(engine.run(executor, store, sink.clone(), command_rx, cancel_token.clone()));

		info!("ReplayPlayer created");

		Ok(Self {
			sink,
			state_rx,
			effect_tx,
			task_handle: Arc::new(Mutex::new(Some(task_handle))),
			cancel_token,
		})
	}

	/// Start a new recording and return the generation collaborators must tag their actions with
	pub async fn select_recording(&self) -> Result<Generation> {
		let (tx, rx) = oneshot::channel();
		self.sink.send(HostCommand::SelectRecording { response: tx })?;
		rx.await.map_err(|_| ReplayError::EngineClosed)
	}

	pub fn dispatch(&self, action: ReplayAction) -> Result<()> {
		self.sink.dispatch(action)
	}

	// User actions, stamped with the host clock
	pub fn toggle_play_pause(&self) -> Result<()> {
		self.dispatch(ReplayAction::TogglePlayPause { now_ms: self.now_ms() })
	}

	pub fn seek(&self, global_offset_ms: TimeMs) -> Result<()> {
		self.dispatch(ReplayAction::Seek {
			global_offset_ms,
			now_ms: self.now_ms(),
		})
	}

	pub fn select_tab(&self, tab_key: impl Into<TabKey>) -> Result<()> {
		self.dispatch(ReplayAction::SelectTab {
			tab_key: tab_key.into(),
			now_ms: self.now_ms(),
		})
	}

	pub fn update_speed(&self, speed: f64) -> Result<()> {
		self.dispatch(ReplayAction::UpdateSpeed { speed })
	}

	pub fn update_settings(&self, updates: ReplaySettingsUpdate) -> Result<()> {
		self.dispatch(ReplayAction::UpdateSettings { updates })
	}

	pub fn reset(&self) -> Result<()> {
		self.dispatch(ReplayAction::Reset)
	}

	// Access state
	pub fn subscribe(&self) -> watch::Receiver<Arc<ReplayState>> {
		self.state_rx.clone()
	}

	pub fn subscribe_effects(&self) -> broadcast::Receiver<ReplayEffect> {
		self.effect_tx.subscribe()
	}

	pub fn current_state(&self) -> Arc<ReplayState> {
		Arc::clone(&self.state_rx.borrow())
	}

	pub fn action_sink(&self) -> ActionSink {
		self.sink.clone()
	}

	pub fn now_ms(&self) -> TimeMs {
		self.sink.now_ms()
	}

	// Shutdown the engine and wait for it to stop
	pub async fn shutdown(&self) {
		self.cancel_token.cancel();
		if let Some(handle) = self.task_handle.lock().await.take() {
			let _ = handle.await;
		}
		info!("ReplayPlayer shut down");
	}
}
