use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use super::{ReplayError, ReplaySettings, Result};

/// Persistence for playback preferences
pub trait SettingsStore: Send + Sync + 'static {
	/// `None` when nothing was saved yet
	fn load(&self) -> Result<Option<ReplaySettings>>;

	fn save(&self, settings: &ReplaySettings) -> Result<()>;
}

/// Settings kept as a pretty-printed JSON file
#[derive(Debug, Clone)]
pub struct JsonFileSettingsStore {
	path: PathBuf,
}

impl JsonFileSettingsStore {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}
}

impl SettingsStore for JsonFileSettingsStore {
	fn load(&self) -> Result<Option<ReplaySettings>> {
		let raw = match std::fs::read_to_string(&self.path) {
			Ok(raw) => raw,
			Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(e.into()),
		};
		Ok(Some(serde_json::from_str(&raw)?))
	}

	fn save(&self, settings: &ReplaySettings) -> Result<()> {
		if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
			std::fs::create_dir_all(parent)?;
		}

		// write beside the target and rename so a crash never leaves half a file
		let tmp = self.path.with_extension("json.tmp");
		std::fs::write(&tmp, serde_json::to_vec_pretty(settings)?)?;
		std::fs::rename(&tmp, &self.path)?;

		debug!(path = %self.path.display(), "Settings saved");
		Ok(())
	}
}

/// In-memory store, the default when no settings path is configured
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
	settings: Mutex<Option<ReplaySettings>>,
}

impl MemorySettingsStore {
	pub fn new(initial: Option<ReplaySettings>) -> Self {
		Self { settings: Mutex::new(initial) }
	}

	/// Last saved value
	pub fn saved(&self) -> Option<ReplaySettings> {
		self.settings.lock().ok().and_then(|guard| guard.clone())
	}
}

impl SettingsStore for MemorySettingsStore {
	fn load(&self) -> Result<Option<ReplaySettings>> {
		let guard = self.settings.lock().map_err(|_| ReplayError::Internal("settings lock poisoned".into()))?;
		Ok(guard.clone())
	}

	fn save(&self, settings: &ReplaySettings) -> Result<()> {
		let mut guard = self.settings.lock().map_err(|_| ReplayError::Internal("settings lock poisoned".into()))?;
		*guard = Some(settings.clone());
		Ok(())
	}
}
