//! User configuration stored as TOML under the platform config directory

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

const APP_DIR: &str = "amerpire";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Downloaded songs and preference records
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Mirror playback to the OS media session
    #[serde(default = "default_media_session")]
    pub media_session: bool,
}

fn base_dir(dir: Option<PathBuf>) -> PathBuf {
    dir.unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR)
}

fn default_data_dir() -> PathBuf {
    base_dir(dirs::data_dir())
}

fn default_log_dir() -> PathBuf {
    base_dir(dirs::cache_dir()).join("logs")
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_media_session() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_dir: default_log_dir(),
            poll_interval_ms: default_poll_interval_ms(),
            media_session: default_media_session(),
        }
    }
}

impl Config {
    pub fn config_path() -> PathBuf {
        base_dir(dirs::config_dir()).join(CONFIG_FILE)
    }

    /// Load from the default location, writing the defaults there if the
    /// file does not exist yet.
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Never fails: anything unreadable falls back to the defaults.
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Invalid config, using defaults");
                    Self::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                if let Err(e) = config.save_to(path) {
                    tracing::warn!(path = %path.display(), error = %e, "Could not write default config");
                }
                config
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Unreadable config, using defaults");
                Self::default()
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn songs_dir(&self) -> PathBuf {
        self.data_dir.join("songs")
    }

    pub fn preferences_dir(&self) -> PathBuf {
        self.data_dir.join("preferences")
    }
}
