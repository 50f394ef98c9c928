use thiserror::Error;

use super::{TabKey, TimeMs};

pub type Result<T> = std::result::Result<T, ReplayError>;

#[derive(Debug, Error)]
pub enum ReplayError {
	#[error("Invalid configuration: {0}")]
	InvalidConfig(String),

	#[error("Settings storage failed: {0}")]
	SettingsIo(#[from] std::io::Error),

	#[error("Settings could not be encoded or decoded: {0}")]
	SettingsFormat(#[from] serde_json::Error),

	#[error("Replay engine is not running")]
	EngineClosed,

	#[error("Internal error: {0}")]
	Internal(String),
}

impl ReplayError {
	pub fn is_recoverable(&self) -> bool {
		matches!(self, Self::SettingsIo(_) | Self::SettingsFormat(_))
	}
}

/// A state snapshot that breaks one of the machine's invariants
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
	#[error("active tab {0:?} is not one of the streams")]
	UnknownActiveTab(TabKey),

	#[error("{0} is negative: {1}")]
	NegativeOffset(&'static str, TimeMs),

	#[error("gap fast-forward does not move forward: {from} -> {to}")]
	EmptyGap { from: TimeMs, to: TimeMs },

	#[error("generation went backwards: {before} -> {after}")]
	GenerationRegressed { before: u64, after: u64 },
}
