use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use super::{Generation, ReplayAction, ReplayError, Result, TimeMs};

/// Internal command type used inside the replay engine
#[derive(Debug)]
pub enum HostCommand {
	Dispatch(ReplayAction),
	/// Start a new recording; the engine assigns the next generation
	SelectRecording { response: oneshot::Sender<Generation> },
}

/// Wall clock shared by the engine and everything that stamps actions
#[derive(Debug, Clone, Copy)]
pub struct HostClock {
	origin: Instant,
}

impl HostClock {
	pub fn start() -> Self {
		Self { origin: Instant::now() }
	}

	/// Milliseconds since the host started
	pub fn now_ms(&self) -> TimeMs {
		TimeMs::try_from(self.origin.elapsed().as_millis()).unwrap_or(TimeMs::MAX)
	}
}

/// Handle collaborators use to feed actions back into the engine
#[derive(Debug, Clone)]
pub struct ActionSink {
	command_tx: mpsc::UnboundedSender<HostCommand>,
	clock: HostClock,
}

impl ActionSink {
	pub(super) fn new(command_tx: mpsc::UnboundedSender<HostCommand>, clock: HostClock) -> Self {
		Self { command_tx, clock }
	}

	pub fn dispatch(&self, action: ReplayAction) -> Result<()> {
		self.send(HostCommand::Dispatch(action))
	}

	pub fn now_ms(&self) -> TimeMs {
		self.clock.now_ms()
	}

	pub fn clock(&self) -> HostClock {
		self.clock
	}

	pub(super) fn send(&self, command: HostCommand) -> Result<()> {
		self.command_tx.send(command).map_err(|_| ReplayError::EngineClosed)
	}
}
