use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ActionSink, EffectExecutor, HostCommand, HostConfig, SettingsStore};
use super::{Generation, ReplayAction, ReplayEffect, ReplayMachine, ReplaySettings, ReplayState, Result, TabKey, TimeMs};

// ============================================================================
// Session - what the run loop carries between commands
// ============================================================================

struct Session<E> {
	state: Arc<ReplayState>,
	executor: E,
	settings_tx: mpsc::UnboundedSender<ReplaySettings>,
	sink: ActionSink,
	cancel: CancellationToken,
}

// ============================================================================
// ReplayEngine
// ============================================================================

/// Owns the one replay state and is the only place transitions are applied
pub struct ReplayEngine {
	machine: ReplayMachine,
	config: HostConfig,
	state_tx: watch::Sender<Arc<ReplayState>>,
	state_rx: watch::Receiver<Arc<ReplayState>>,
	effect_tx: broadcast::Sender<ReplayEffect>,
}

impl ReplayEngine {
	pub fn new(config: HostConfig, settings: Option<ReplaySettings>) -> Result<Self> {
		config.validate()?;
		let machine = ReplayMachine::new(config.machine.clone())?;

		let (state_tx, state_rx) = watch::channel(ReplayState::initial(settings));
		let (effect_tx, _) = broadcast::channel(config.effect_channel_capacity);

		info!(tick_interval_ms = config.tick_interval_ms, "ReplayEngine created");
		Ok(Self {
			machine,
			config,
			state_tx,
			state_rx,
			effect_tx,
		})
	}

	pub fn subscribe(&self) -> watch::Receiver<Arc<ReplayState>> {
		self.state_rx.clone()
	}

	pub fn effect_sender(&self) -> broadcast::Sender<ReplayEffect> {
		self.effect_tx.clone()
	}

	pub fn current_state(&self) -> Arc<ReplayState> {
		Arc::clone(&self.state_rx.borrow())
	}

	pub async fn run<E: EffectExecutor>(
		self,
		executor: E,
		store: Arc<dyn SettingsStore>,
		sink: ActionSink,
		mut command_rx: mpsc::UnboundedReceiver<HostCommand>,
		cancel: CancellationToken,
	) {
		let mut ticker = interval(self.config.tick_interval());
		ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

		let (settings_tx, settings_rx) = mpsc::unbounded_channel();
		let writer = spawn_settings_writer(store, settings_rx);

		let mut session = Session {
			state: self.current_state(),
			executor,
			settings_tx,
			sink,
			cancel: cancel.clone(),
		};

		info!("Replay engine started");

		loop {
			tokio::select! {
				_ = ticker.tick() => {
					let now_ms = session.sink.now_ms();
					let local = session.executor.sample_local_time_ms(&session.state, now_ms);
					self.apply(
						&mut session,
						&ReplayAction::Tick {
							now_ms,
							active_replayer_local_time_ms: local,
						},
					);
				}

				Some(cmd) = command_rx.recv() => match cmd {
					HostCommand::Dispatch(action) => self.apply(&mut session, &action),
					HostCommand::SelectRecording { response } => {
						let generation = session.state.generation.saturating_add(1);
						self.apply(&mut session, &ReplayAction::SelectRecording { generation });
						let _ = response.send(generation);
					}
				},

				() = cancel.cancelled() => {
					info!("Replay engine cancelled");
					break;
				}
			}
		}

		// closing the channel lets the writer finish what is queued
		drop(session);
		if let Err(e) = writer.await {
			warn!(error = %e, "Settings writer did not finish");
		}
	}

	/// Reduce, run the effects, then publish the new snapshot
	fn apply<E: EffectExecutor>(&self, session: &mut Session<E>, action: &ReplayAction) {
		let transition = self.machine.reduce(&session.state, action);
		let changed = !transition.is_unchanged_from(&session.state) && *transition.state != *session.state;
		session.state = transition.state;

		for effect in transition.effects {
			// nobody listening is fine
			let _ = self.effect_tx.send(effect.clone());

			match &effect {
				ReplayEffect::ScheduleBufferPoll {
					generation, tab_key, delay_ms, ..
				} => schedule_buffer_poll(&session.sink, &session.cancel, *generation, tab_key.clone(), *delay_ms),
				ReplayEffect::SaveSettings { settings } => {
					if session.settings_tx.send(settings.clone()).is_err() {
						warn!("Settings writer gone, preference not persisted");
					}
				}
				_ => session.executor.execute(&effect, &session.state, &session.sink),
			}
		}

		if changed {
			self.state_tx.send_replace(Arc::clone(&session.state));
		}
	}
}

/// Feed a `BUFFER_CHECK` back after `delay_ms`, unless the engine shuts down first
fn schedule_buffer_poll(sink: &ActionSink, cancel: &CancellationToken, generation: Generation, tab_key: TabKey, delay_ms: TimeMs) {
	let sink = sink.clone();
	let cancel = cancel.child_token();
	let delay = Duration::from_millis(u64::try_from(delay_ms).unwrap_or(0));

	tokio::spawn(async move {
		tokio::select! {
			() = tokio::time::sleep(delay) => {
				if sink.dispatch(ReplayAction::BufferCheck { generation, tab_key }).is_err() {
					debug!(generation, "Engine gone before buffer poll fired");
				}
			}
			() = cancel.cancelled() => {}
		}
	});
}

/// Persist settings on the blocking pool so file I/O never stalls the run loop.
/// Saves run in order and a burst collapses to its newest value.
fn spawn_settings_writer(store: Arc<dyn SettingsStore>, mut settings_rx: mpsc::UnboundedReceiver<ReplaySettings>) -> JoinHandle<()> {
	tokio::spawn(async move {
		while let Some(mut settings) = settings_rx.recv().await {
			while let Ok(newer) = settings_rx.try_recv() {
				settings = newer;
			}

			let store = Arc::clone(&store);
			match tokio::task::spawn_blocking(move || store.save(&settings)).await {
				Ok(Ok(())) => {}
				Ok(Err(e)) => warn!(error = %e, "Failed to persist settings"),
				Err(e) => warn!(error = %e, "Settings save task failed"),
			}
		}
		debug!("Settings writer stopped");
	})
}
