use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, RwLock};
use std::time::Duration;

pub const APP_NAME: &str = "pageflow";
const SETTINGS_FILENAME: &str = "config.yaml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Blank columns left of the text.
    #[serde(default = "default_margin")]
    pub margin: u16,

    #[serde(default = "default_margin")]
    pub right_margin: u16,

    /// How long transient status messages stay visible.
    #[serde(default = "default_status_seconds")]
    pub status_seconds: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

fn default_margin() -> u16 {
    2
}

fn default_status_seconds() -> u64 {
    5
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            margin: default_margin(),
            right_margin: default_margin(),
            status_seconds: default_status_seconds(),
            log_level: None,
        }
    }
}

impl Settings {
    pub fn status_duration(&self) -> Duration {
        Duration::from_secs(self.status_seconds)
    }

    /// Reads `path`, writing a file with the defaults first when there is
    /// none. A malformed or unreadable file yields the defaults.
    pub fn load_or_create(path: &Path) -> (Self, LoadOutcome) {
        if !path.exists() {
            let defaults = Self::default();
            let outcome = match defaults.save_to(path) {
                Ok(()) => LoadOutcome::Created(path.to_path_buf()),
                Err(e) => LoadOutcome::CreateFailed(path.to_path_buf(), e.to_string()),
            };
            return (defaults, outcome);
        }
        let parsed = fs::read_to_string(path)
            .map_err(anyhow::Error::from)
            .and_then(|content| serde_yaml::from_str::<Settings>(&content).map_err(anyhow::Error::from));
        match parsed {
            Ok(settings) => (settings, LoadOutcome::Loaded(path.to_path_buf())),
            Err(e) => (
                Self::default(),
                LoadOutcome::Malformed(path.to_path_buf(), e.to_string()),
            ),
        }
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, generate_settings_yaml(self))?;
        debug!("Saved settings to {path:?}");
        Ok(())
    }
}

/// How the settings were obtained. Settings load before the logger exists,
/// so the outcome is kept and logged afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    NoConfigDir,
    Created(PathBuf),
    CreateFailed(PathBuf, String),
    Loaded(PathBuf),
    Malformed(PathBuf, String),
}

impl LoadOutcome {
    pub fn log(&self) {
        match self {
            LoadOutcome::NoConfigDir => {
                warn!("Could not determine config directory, using default settings")
            }
            LoadOutcome::Created(path) => {
                info!("Settings file not found, created one with defaults at {path:?}")
            }
            LoadOutcome::CreateFailed(path, e) => {
                error!("Failed to save settings to {path:?}: {e}")
            }
            LoadOutcome::Loaded(path) => debug!("Loaded settings from {path:?}"),
            LoadOutcome::Malformed(path, e) => {
                error!("Malformed settings file {path:?}, using defaults: {e}")
            }
        }
    }
}

static SETTINGS: LazyLock<RwLock<Settings>> = LazyLock::new(|| RwLock::new(Settings::default()));

/// `<config dir>/pageflow`, where settings and reading state live.
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME))
}

fn preferred_config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join(SETTINGS_FILENAME))
}

/// Loads the settings file into the global settings, writing one with the
/// defaults when none exists yet.
pub fn load_settings() -> LoadOutcome {
    let Some(path) = preferred_config_path() else {
        return LoadOutcome::NoConfigDir;
    };
    let (loaded, outcome) = Settings::load_or_create(&path);
    if let Ok(mut global) = SETTINGS.write() {
        *global = loaded;
    }
    outcome
}

fn generate_settings_yaml(settings: &Settings) -> String {
    let mut content = String::new();
    content.push_str("# Columns kept free left and right of the text\n");
    content.push_str(&format!("margin: {}\n", settings.margin));
    content.push_str(&format!("right_margin: {}\n", settings.right_margin));
    content.push_str("# Seconds a status message stays on screen\n");
    content.push_str(&format!("status_seconds: {}\n", settings.status_seconds));
    match &settings.log_level {
        Some(level) => content.push_str(&format!("log_level: {level}\n")),
        None => content.push_str("# log_level: debug\n"),
    }
    content
}

pub fn current() -> Settings {
    SETTINGS
        .read()
        .map(|s| s.clone())
        .unwrap_or_default()
}
