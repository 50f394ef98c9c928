mod config;
mod script;
mod simulate;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::{load_json, Cli, Command};
use simulate::{Recording, SimulationOptions};

#[tokio::main]
async fn main() -> Result<()> {
	init_tracing();

	let cli = Cli::parse();
	match &cli.command {
		Command::Replay { script, states } => script::run(script, cli.machine_config()?, *states),
		Command::Simulate {
			recording,
			host_config,
			settings_path,
			chunk_interval_ms,
			chunk_ms,
			speed,
			timeout_secs,
		} => {
			let config = cli.host_config(host_config.as_deref(), settings_path.as_deref())?;
			let recording = match recording {
				Some(path) => load_json(path)?,
				None => Recording::demo(),
			};
			let options = SimulationOptions {
				chunk_ms: *chunk_ms,
				chunk_interval: Duration::from_millis(*chunk_interval_ms),
				speed: *speed,
				timeout: Duration::from_secs(*timeout_secs),
			};

			let shutdown = CancellationToken::new();
			tokio::spawn(cancel_on_ctrl_c(shutdown.clone()));

			let state = simulate::run(config, recording, options, shutdown).await?;
			info!(
				mode = ?state.playback_mode,
				at = state.current_global_time_ms_for_ui,
				total = state.global_total_ms,
				"Simulation ended"
			);
			println!("{}", serde_json::to_string_pretty(&*state)?);
			Ok(())
		}
	}
}

fn init_tracing() {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::registry()
		.with(filter)
		.with(tracing_subscriber::fmt::layer().with_target(true).with_writer(std::io::stderr))
		.init();
}

async fn cancel_on_ctrl_c(shutdown: CancellationToken) {
	match tokio::signal::ctrl_c().await {
		Ok(()) => {
			info!("Received shutdown signal (Ctrl+C)");
			shutdown.cancel();
		}
		Err(e) => error!("Failed to listen for shutdown signal: {}", e),
	}
}
