mod commands;
mod config;
mod engine;
mod executor;
mod player;
mod settings_store;

use crate::core::{Generation, ReplayAction, ReplayEffect, ReplayError, ReplayMachine, ReplaySettings, ReplaySettingsUpdate, ReplayState, Result, TabKey, TimeMs};

pub use commands::{ActionSink, HostClock};
pub use config::HostConfig;
pub use engine::ReplayEngine;
pub use executor::EffectExecutor;
pub use player::ReplayPlayer;
pub use settings_store::{JsonFileSettingsStore, MemorySettingsStore, SettingsStore};

use commands::HostCommand;
