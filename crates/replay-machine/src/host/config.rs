use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{ReplayError, Result};
use crate::core::MachineConfig;

/// Host configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostConfig {
	#[serde(default = "default_tick_interval")]
	pub tick_interval_ms: u64,

	/// Where settings are persisted; in memory when absent
	#[serde(default)]
	pub settings_path: Option<PathBuf>,

	/// Buffered effects per subscriber before the slowest one starts lagging
	#[serde(default = "default_effect_channel_capacity")]
	pub effect_channel_capacity: usize,

	#[serde(default)]
	pub machine: MachineConfig,
}

fn default_tick_interval() -> u64 {
	200
}

fn default_effect_channel_capacity() -> usize {
	256
}

impl HostConfig {
	pub fn new() -> Self {
		Self {
			tick_interval_ms: default_tick_interval(),
			settings_path: None,
			effect_channel_capacity: default_effect_channel_capacity(),
			machine: MachineConfig::default(),
		}
	}

	pub fn with_tick_interval(mut self, ms: u64) -> Self {
		self.tick_interval_ms = ms;
		self
	}

	pub fn with_settings_path(mut self, path: impl Into<PathBuf>) -> Self {
		self.settings_path = Some(path.into());
		self
	}

	pub fn with_machine(mut self, machine: MachineConfig) -> Self {
		self.machine = machine;
		self
	}

	pub fn tick_interval(&self) -> Duration {
		Duration::from_millis(self.tick_interval_ms)
	}

	pub fn validate(&self) -> Result<()> {
		if self.tick_interval_ms == 0 {
			return Err(ReplayError::InvalidConfig("tickIntervalMs must be positive".to_string()));
		}
		if self.effect_channel_capacity == 0 {
			return Err(ReplayError::InvalidConfig("effectChannelCapacity must be positive".to_string()));
		}
		self.machine.validate()
	}
}

impl Default for HostConfig {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn decodes_nested_machine_overrides() {
		let config: HostConfig = serde_json::from_str(r#"{"tickIntervalMs": 50, "machine": {"stallThresholdMs": 1000}}"#).unwrap();
		assert_eq!(config.tick_interval(), Duration::from_millis(50));
		assert_eq!(config.machine.stall_threshold_ms, 1000);
		assert_eq!(config.machine.buffer_ahead_ms, 2000);
		assert!(config.settings_path.is_none());
		assert!(config.validate().is_ok());
	}

	#[test]
	fn zero_tick_interval_is_rejected() {
		assert!(HostConfig::new().with_tick_interval(0).validate().is_err());
	}
}
