//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\chip-radio\config.toml
//! - macOS: ~/Library/Application Support/chip-radio/config.toml
//! - Linux: ~/.config/chip-radio/config.toml
//!
//! `--config <PATH>` points the CLI at another file. A missing or broken
//! file never stops playback: we log and fall back to defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::player::{LoopMode, Pacing, PlaybackSettings};

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub playback: PlaybackConfig,
    pub library: LibraryConfig,
}

/// Playback settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Initial volume (0.0 - 1.0)
    pub volume: f32,

    /// PCM bytes pulled from the decoder per worker iteration
    pub buffer_bytes: usize,

    /// Worker tick in milliseconds
    pub tick_ms: u64,

    pub pacing: Pacing,

    pub loop_mode: LoopMode,

    /// Selected output device name (empty = system default)
    pub output_device: String,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        let settings = PlaybackSettings::default();
        Self {
            volume: settings.volume,
            buffer_bytes: settings.buffer_bytes,
            tick_ms: settings.tick.as_millis() as u64,
            pacing: settings.pacing,
            loop_mode: settings.loop_mode,
            output_device: String::new(),
        }
    }
}

impl PlaybackConfig {
    /// Controller settings for these values.
    pub fn settings(&self) -> PlaybackSettings {
        PlaybackSettings {
            buffer_bytes: self.buffer_bytes,
            tick: Duration::from_millis(self.tick_ms.max(1)),
            pacing: self.pacing,
            loop_mode: self.loop_mode,
            volume: self.volume,
        }
    }

    /// Output device to request, `None` for the system default.
    pub fn output_device(&self) -> Option<String> {
        let name = self.output_device.trim();
        (!name.is_empty()).then(|| name.to_string())
    }
}

/// Track source settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Directory played when no directory is given on the command line
    pub music_dir: Option<PathBuf>,

    /// Seconds each track plays in radio mode
    pub play_seconds: u64,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            music_dir: None,
            play_seconds: 10,
        }
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("chip-radio"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from the default location
///
/// Returns default config if the file doesn't exist or can't be parsed.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };
    load_from(&path)
}

/// Load configuration from `path`, falling back to defaults.
pub fn load_from(path: &Path) -> Config {
    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::error!("Failed to parse config file {:?}: {}", path, e);
                tracing::warn!("Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file {:?}: {}", path, e);
            Config::default()
        }
    }
}

/// Save configuration to the default location
pub fn save(config: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path().ok_or(ConfigError::NoConfigDir)?;
    save_to(config, &path)?;
    Ok(path)
}

/// Save configuration to `path`, creating its directory.
pub fn save_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[playback]"));
        assert!(toml.contains("[library]"));
        assert!(toml.contains("pacing = \"fixed\""));
        assert!(toml.contains("loop_mode = \"forever\""));
    }

    #[test]
    fn test_defaults_match_controller() {
        let settings = Config::default().playback.settings();
        assert_eq!(settings, PlaybackSettings::default());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml = r#"
[playback]
pacing = "device-latency"
loop_mode = "song"
buffer_bytes = 4096
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.playback.pacing, Pacing::DeviceLatency);
        assert_eq!(config.playback.loop_mode, LoopMode::Song);
        assert_eq!(config.playback.buffer_bytes, 4096);

        assert_eq!(config.playback.volume, 0.9);
        assert_eq!(config.playback.tick_ms, 10);
        assert_eq!(config.library.play_seconds, 10);
        assert!(config.library.music_dir.is_none());
    }

    #[test]
    fn test_zero_tick_is_raised() {
        let config = PlaybackConfig {
            tick_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.settings().tick, Duration::from_millis(1));
    }

    #[test]
    fn test_output_device_blank_is_default() {
        let mut config = PlaybackConfig::default();
        assert_eq!(config.output_device(), None);
        config.output_device = "  ".to_string();
        assert_eq!(config.output_device(), None);
        config.output_device = "USB DAC".to_string();
        assert_eq!(config.output_device(), Some("USB DAC".to_string()));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.playback.volume = 0.5;
        config.library.music_dir = Some(PathBuf::from("/music/sap"));
        save_to(&config, &path).unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("toml.tmp").exists());
        assert_eq!(load_from(&path), config);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_from(&dir.path().join("absent.toml")), Config::default());
    }

    #[test]
    fn test_broken_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[playback\nvolume = ").unwrap();
        assert_eq!(load_from(&path), Config::default());
    }
}
