use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use replay_machine::core::{MachineConfig, ReplayAction, ReplayEffect, ReplayMachine, ReplayState};
use serde::Serialize;
use tracing::{debug, info};

/// One transition as printed by `replay`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord<'a> {
	pub step: usize,
	pub action: &'static str,
	pub unchanged: bool,
	pub effects: &'a [ReplayEffect],
	#[serde(skip_serializing_if = "Option::is_none")]
	pub state: Option<&'a ReplayState>,
}

/// Parse a script: either a JSON array or one JSON action per line
pub fn parse_script(raw: &str) -> Result<Vec<ReplayAction>> {
	if raw.trim_start().starts_with('[') {
		return serde_json::from_str(raw).context("parsing action array");
	}

	raw.lines()
		.enumerate()
		.filter(|(_, line)| !line.trim().is_empty() && !line.trim_start().starts_with("//"))
		.map(|(n, line)| serde_json::from_str(line).with_context(|| format!("parsing action on line {}", n + 1)))
		.collect()
}

/// Fold every action through the machine, writing one JSON line per step
pub fn replay<W: Write>(machine: &ReplayMachine, actions: &[ReplayAction], with_states: bool, out: &mut W) -> Result<Arc<ReplayState>> {
	let mut state = ReplayState::initial(None);

	for (step, action) in actions.iter().enumerate() {
		let transition = machine.reduce(&state, action);
		if let Err(violation) = transition.state.check_successor_of(&state) {
			bail!("step {step} ({}) left an inconsistent state: {violation}", action.name());
		}

		let record = StepRecord {
			step,
			action: action.name(),
			unchanged: transition.is_unchanged_from(&state),
			effects: &transition.effects,
			state: with_states.then_some(&*transition.state),
		};
		serde_json::to_writer(&mut *out, &record)?;
		writeln!(out)?;

		debug!(step, action = action.name(), mode = ?transition.state.playback_mode, "Step applied");
		state = transition.state;
	}

	Ok(state)
}

pub fn run(path: &Path, config: MachineConfig, with_states: bool) -> Result<()> {
	let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
	let actions = parse_script(&raw)?;
	info!(actions = actions.len(), script = %path.display(), "Replaying script");

	let machine = ReplayMachine::new(config)?;
	let stdout = std::io::stdout();
	let mut out = stdout.lock();
	let last = replay(&machine, &actions, with_states, &mut out)?;
	out.flush()?;

	info!(
		generation = last.generation,
		phase = ?last.phase,
		mode = ?last.playback_mode,
		at = last.current_global_time_ms_for_ui,
		"Script finished"
	);
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use replay_machine::core::PlaybackMode;

	const SCRIPT: &str = r#"
{"type": "SELECT_RECORDING", "generation": 1}
// a single tab, fully loaded
{"type": "STREAMS_COMPUTED", "generation": 1, "streams": [{"tabKey": "a", "firstEventAtMs": 0, "lastEventAtMs": 3000}], "globalStartTs": 0, "globalTotalMs": 3000, "chunkRangesByTab": {"a": [{"startTs": 0, "endTs": 3000}]}}
{"type": "CHUNK_LOADED", "generation": 1, "tabKey": "a", "hasFullSnapshot": true, "loadedDurationMs": 3000}
{"type": "DOWNLOAD_COMPLETE", "generation": 1}
{"type": "REPLAYER_READY", "generation": 1, "tabKey": "a"}
{"type": "REPLAYER_FINISH", "generation": 1, "tabKey": "a", "localTimeMs": 3000, "nowMs": 3100}
{"type": "CHUNK_LOADED", "generation": 0, "tabKey": "a", "hasFullSnapshot": true, "loadedDurationMs": 1}
"#;

	#[test]
	fn line_script_plays_to_the_end() {
		let actions = parse_script(SCRIPT).unwrap();
		assert_eq!(actions.len(), 7);

		let mut out = Vec::new();
		let last = replay(&ReplayMachine::default(), &actions, false, &mut out).unwrap();
		assert_eq!(last.playback_mode, PlaybackMode::Finished);
		assert_eq!(last.current_global_time_ms_for_ui, 3000);

		let lines: Vec<serde_json::Value> = String::from_utf8(out)
			.unwrap()
			.lines()
			.map(|line| serde_json::from_str(line).unwrap())
			.collect();
		assert_eq!(lines.len(), 7);
		assert_eq!(lines[0]["effects"][0]["type"], "destroy_all_replayers");
		assert_eq!(lines[5]["effects"][0]["type"], "pause_all");
		assert_eq!(lines[6]["unchanged"], true);
		assert!(lines[6].get("state").is_none());
	}

	#[test]
	fn array_script_is_accepted() {
		let actions = parse_script(r#"[{"type": "RESET"}, {"type": "UPDATE_SPEED", "speed": 2.0}]"#).unwrap();
		assert_eq!(actions, vec![ReplayAction::Reset, ReplayAction::UpdateSpeed { speed: 2.0 }]);
	}

	#[test]
	fn bad_line_reports_its_number() {
		let err = parse_script("{\"type\": \"RESET\"}\n{\"type\": \"NOPE\"}").unwrap_err();
		assert!(err.to_string().contains("line 2"));
	}
}
