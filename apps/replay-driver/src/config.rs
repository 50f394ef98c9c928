use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use replay_machine::core::MachineConfig;
use replay_machine::host::HostConfig;
use serde::de::DeserializeOwned;

#[derive(Parser, Debug, Clone)]
#[command(name = "replay-driver")]
#[command(about = "Drive the session replay machine from scripts or a live simulation", long_about = None)]
pub struct Cli {
	/// JSON file overriding the transition thresholds
	#[arg(long, global = true, env = "REPLAY_MACHINE_CONFIG")]
	pub machine_config: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
	/// Fold an action script through the machine and print every transition as a JSON line
	Replay {
		/// JSON array of actions, or one action per line
		script: PathBuf,

		/// Include the full state snapshot on each line
		#[arg(long)]
		states: bool,
	},

	/// Run the host actor against a simulated downloader and renderer
	Simulate {
		/// Recording to simulate; a built-in three-tab recording when absent
		#[arg(long, env = "REPLAY_RECORDING")]
		recording: Option<PathBuf>,

		/// JSON host configuration
		#[arg(long, env = "REPLAY_HOST_CONFIG")]
		host_config: Option<PathBuf>,

		/// Where playback preferences are persisted
		#[arg(long, env = "REPLAY_SETTINGS_PATH")]
		settings_path: Option<PathBuf>,

		/// Wall time between two simulated chunk downloads
		#[arg(long, env = "REPLAY_CHUNK_INTERVAL_MS", default_value = "250")]
		chunk_interval_ms: u64,

		/// Recorded time each simulated chunk adds to a tab
		#[arg(long, env = "REPLAY_CHUNK_MS", default_value = "2000")]
		chunk_ms: i64,

		/// Playback speed requested once the recording starts
		#[arg(long, default_value = "1")]
		speed: f64,

		/// Give up after this many seconds
		#[arg(long, env = "REPLAY_TIMEOUT_SECS", default_value = "120")]
		timeout_secs: u64,
	},
}

impl Cli {
	pub fn machine_config(&self) -> Result<MachineConfig> {
		let config = match &self.machine_config {
			Some(path) => load_json(path)?,
			None => MachineConfig::default(),
		};
		config.validate()?;
		Ok(config)
	}

	/// Host config from file, with the CLI's machine config and settings path layered on top
	pub fn host_config(&self, file: Option<&Path>, settings_path: Option<&Path>) -> Result<HostConfig> {
		let mut config: HostConfig = match file {
			Some(path) => load_json(path)?,
			None => HostConfig::default(),
		};
		if self.machine_config.is_some() {
			config = config.with_machine(self.machine_config()?);
		}
		if let Some(path) = settings_path {
			config = config.with_settings_path(path);
		}
		config.validate()?;
		Ok(config)
	}
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
	let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
	serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn machine_config_file_overrides_defaults() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("machine.json");
		std::fs::write(&path, r#"{"gapFastForwardMultiplier": 4.0}"#).unwrap();

		let cli = Cli::parse_from(["replay-driver", "--machine-config", path.to_str().unwrap(), "replay", "script.json"]);
		let config = cli.machine_config().unwrap();
		assert!((config.gap_fast_forward_multiplier - 4.0).abs() < f64::EPSILON);
		assert_eq!(config.buffer_ahead_ms, MachineConfig::default().buffer_ahead_ms);
	}

	#[test]
	fn invalid_machine_config_is_rejected() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("machine.json");
		std::fs::write(&path, r#"{"gapFastForwardMultiplier": -1.0}"#).unwrap();

		let cli = Cli::parse_from(["replay-driver", "--machine-config", path.to_str().unwrap(), "replay", "script.json"]);
		assert!(cli.machine_config().is_err());
	}

	#[test]
	fn settings_path_flag_reaches_host_config() {
		let cli = Cli::parse_from(["replay-driver", "simulate"]);
		let config = cli.host_config(None, Some(Path::new("/tmp/settings.json"))).unwrap();
		assert_eq!(config.settings_path.as_deref(), Some(Path::new("/tmp/settings.json")));
		assert_eq!(config.tick_interval_ms, 200);
	}
}
