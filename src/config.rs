use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::Deserialize;

use crate::analyzer::decode::DecodeOptions;
use crate::analyzer::task::Gender;

/// Application configuration loaded from TOML config file.
/// All fields have defaults; the config file is optional.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Number of parallel workers for `batch`. 0 = auto-detect (cores / 2, min 1).
    pub workers: usize,
    /// Gender hint used when the CLI does not give one.
    pub default_gender: Gender,
    pub decode: DecodeConfig,
}

/// External decoder settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    /// Wall-clock budget for decoding one file, seconds.
    pub timeout_secs: u64,
    /// ffmpeg binary for containers symphonia can't read.
    pub ffmpeg_path: PathBuf,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            ffmpeg_path: PathBuf::from("ffmpeg"),
        }
    }
}

impl AppConfig {
    /// Load config from `~/.config/vocalmark/config.toml`.
    /// Returns default config if file doesn't exist.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Parse a config file, logging a warning and falling back to defaults
    /// if it can't be read or parsed.
    pub fn load_from(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                return Self::default();
            }
        };
        match toml::from_str::<AppConfig>(&contents) {
            Ok(config) => {
                log::info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                Self::default()
            }
        }
    }

    /// Resolve worker count: 0 → auto-detect (cores / 2, min 1).
    pub fn resolve_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            let cores = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2);
            (cores / 2).max(1)
        }
    }

    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            timeout: Duration::from_secs(self.decode.timeout_secs.max(1)),
            ffmpeg: self.decode.ffmpeg_path.clone(),
        }
    }

    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
