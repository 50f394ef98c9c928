use serde::{Deserialize, Serialize};

use super::error::{ReplayError, Result};
use super::TimeMs;

/// Tunables of the transition function.
///
/// Defaults reproduce the behaviour the renderer adapters were tuned
/// against; every threshold can be overridden from a config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfig {
	/// How much faster than real time a gap between streams is animated
	#[serde(default = "default_gap_fast_forward_multiplier")]
	pub gap_fast_forward_multiplier: f64,

	/// Loaded data must exceed the reported finish position by this much
	/// before a finish is treated as premature
	#[serde(default = "default_premature_finish_slack")]
	pub premature_finish_slack_ms: TimeMs,

	/// Two premature finishes closer than this are the same stuck position
	#[serde(default = "default_premature_finish_repeat_window")]
	pub premature_finish_repeat_window_ms: TimeMs,

	/// A stream "expects more data" when its full duration exceeds the
	/// current position by more than this
	#[serde(default = "default_expected_data_slack")]
	pub expected_data_slack_ms: TimeMs,

	/// Renderer readings trailing the UI clock by at least this much are stale
	#[serde(default = "default_renderer_staleness_tolerance")]
	pub renderer_staleness_tolerance_ms: TimeMs,

	/// Data that must be loaded past the buffering target while downloading
	#[serde(default = "default_buffer_ahead")]
	pub buffer_ahead_ms: TimeMs,

	#[serde(default = "default_buffer_poll_delay")]
	pub buffer_poll_delay_ms: TimeMs,

	/// Auto-follow quiet period after a manual play, seek or hand-off
	#[serde(default = "default_manual_play_suppression")]
	pub manual_play_suppression_ms: TimeMs,

	/// Auto-follow quiet period after the user picks a tab explicitly
	#[serde(default = "default_tab_select_suppression")]
	pub tab_select_suppression_ms: TimeMs,

	/// Auto-follow quiet period after an automatic tab switch
	#[serde(default = "default_auto_switch_suppression")]
	pub auto_switch_suppression_ms: TimeMs,

	/// Playing without any renderer progress for this long is a stall
	#[serde(default = "default_stall_threshold")]
	pub stall_threshold_ms: TimeMs,
}

fn default_gap_fast_forward_multiplier() -> f64 {
	12.0
}

fn default_premature_finish_slack() -> TimeMs {
	100
}

fn default_premature_finish_repeat_window() -> TimeMs {
	200
}

fn default_expected_data_slack() -> TimeMs {
	500
}

fn default_renderer_staleness_tolerance() -> TimeMs {
	500
}

fn default_buffer_ahead() -> TimeMs {
	2000
}

fn default_buffer_poll_delay() -> TimeMs {
	500
}

fn default_manual_play_suppression() -> TimeMs {
	400
}

fn default_tab_select_suppression() -> TimeMs {
	5000
}

fn default_auto_switch_suppression() -> TimeMs {
	200
}

fn default_stall_threshold() -> TimeMs {
	3000
}

impl MachineConfig {
	pub fn with_gap_fast_forward_multiplier(mut self, multiplier: f64) -> Self {
		self.gap_fast_forward_multiplier = multiplier;
		self
	}

	pub fn with_renderer_staleness_tolerance(mut self, ms: TimeMs) -> Self {
		self.renderer_staleness_tolerance_ms = ms;
		self
	}

	pub fn with_stall_threshold(mut self, ms: TimeMs) -> Self {
		self.stall_threshold_ms = ms;
		self
	}

	pub fn validate(&self) -> Result<()> {
		if !self.gap_fast_forward_multiplier.is_finite() || self.gap_fast_forward_multiplier <= 0.0 {
			return Err(ReplayError::InvalidConfig(format!(
				"gapFastForwardMultiplier must be a positive number, got {}",
				self.gap_fast_forward_multiplier
			)));
		}

		let thresholds = [
			("prematureFinishSlackMs", self.premature_finish_slack_ms),
			("prematureFinishRepeatWindowMs", self.premature_finish_repeat_window_ms),
			("expectedDataSlackMs", self.expected_data_slack_ms),
			("rendererStalenessToleranceMs", self.renderer_staleness_tolerance_ms),
			("bufferAheadMs", self.buffer_ahead_ms),
			("manualPlaySuppressionMs", self.manual_play_suppression_ms),
			("tabSelectSuppressionMs", self.tab_select_suppression_ms),
			("autoSwitchSuppressionMs", self.auto_switch_suppression_ms),
		];
		for (name, value) in thresholds {
			if value < 0 {
				return Err(ReplayError::InvalidConfig(format!("{name} must not be negative, got {value}")));
			}
		}

		if self.buffer_poll_delay_ms <= 0 {
			return Err(ReplayError::InvalidConfig("bufferPollDelayMs must be positive".to_string()));
		}
		if self.stall_threshold_ms <= 0 {
			return Err(ReplayError::InvalidConfig("stallThresholdMs must be positive".to_string()));
		}
		Ok(())
	}
}

impl Default for MachineConfig {
	fn default() -> Self {
		Self {
			gap_fast_forward_multiplier: default_gap_fast_forward_multiplier(),
			premature_finish_slack_ms: default_premature_finish_slack(),
			premature_finish_repeat_window_ms: default_premature_finish_repeat_window(),
			expected_data_slack_ms: default_expected_data_slack(),
			renderer_staleness_tolerance_ms: default_renderer_staleness_tolerance(),
			buffer_ahead_ms: default_buffer_ahead(),
			buffer_poll_delay_ms: default_buffer_poll_delay(),
			manual_play_suppression_ms: default_manual_play_suppression(),
			tab_select_suppression_ms: default_tab_select_suppression(),
			auto_switch_suppression_ms: default_auto_switch_suppression(),
			stall_threshold_ms: default_stall_threshold(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_validate() {
		assert!(MachineConfig::default().validate().is_ok());
	}

	#[test]
	fn missing_fields_fall_back_to_defaults() {
		let config: MachineConfig = serde_json::from_str(r#"{"rendererStalenessToleranceMs": 750}"#).unwrap();
		assert_eq!(config.renderer_staleness_tolerance_ms, 750);
		assert_eq!(config.buffer_ahead_ms, 2000);
		assert_eq!(config.gap_fast_forward_multiplier, 12.0);
	}

	#[test]
	fn rejects_bad_values() {
		assert!(MachineConfig::default().with_gap_fast_forward_multiplier(0.0).validate().is_err());
		assert!(MachineConfig::default().with_renderer_staleness_tolerance(-1).validate().is_err());
		assert!(MachineConfig::default().with_stall_threshold(0).validate().is_err());
	}
}
