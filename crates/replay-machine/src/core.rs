mod action;
mod config;
mod effect;
mod error;
mod playback;
mod reducer;
mod state;
mod timeline;
mod types;

pub use action::ReplayAction;
pub use config::MachineConfig;
pub use effect::{Effects, ReplayEffect};
pub use error::{InvariantViolation, ReplayError, Result};
pub use playback::{desired_global_offset, finish_decision, FinishDecision};
pub use reducer::{replay_reducer, ReplayMachine, Transition};
pub use state::ReplayState;
pub use timeline::{find_best_tab_at_global_offset, find_next_tab_start_after_global_offset, is_tab_in_range_at_global_offset, NextTabStart, TimelineIndex};
pub use timeline::{global_offset_to_local_offset, local_offset_to_global_offset};
pub use types::{is_allowed_speed, ChunkRange, GapFastForward, Generation, Phase, PlaybackMode, ReplaySettings, ReplaySettingsUpdate, StreamInfo, TabKey, TimeMs};
pub use types::ALLOWED_PLAYER_SPEEDS;
