//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Default export settings.
    pub export: ExportDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default export parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportDefaults {
    /// Output frame rate.
    pub fps: u32,

    /// Extra frames appended to every looped overlay still so the loop
    /// outlasts the trimmed video by a small margin.
    pub loop_buffer_frames: u32,

    /// Seconds added to the export duration before the streaming
    /// watchdog forces a stop.
    pub watchdog_buffer_secs: f64,

    /// Padding (pixels, each side) around rasterized text.
    pub text_padding_px: u32,

    /// Render tick rate of the streaming backend (Hz).
    pub display_refresh_hz: u32,

    /// Video encoder passed to the transcoding engine.
    pub video_codec: String,

    /// Constant rate factor for the video encoder.
    pub crf: u32,

    /// Encoder speed preset.
    pub preset: String,

    /// Font family used when a text layer names an unavailable family.
    pub default_font_family: String,

    /// Directory for pre-rendered stills and temporary outputs.
    /// Defaults to the system temp directory.
    pub scratch_dir: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "overlaycut=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            fps: 30,
            loop_buffer_frames: 10,
            watchdog_buffer_secs: 5.0,
            text_padding_px: 8,
            display_refresh_hz: 60,
            video_codec: "libx264".to_string(),
            crf: 20,
            preset: "veryfast".to_string(),
            default_font_family: "sans-serif".to_string(),
            scratch_dir: None,
        }
    }
}

impl ExportDefaults {
    /// Resolved scratch directory.
    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("overlaycut"))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        self.save_to(&config_file_path())
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, config_path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("overlaycut").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let parsed: AppConfig =
            serde_json::from_str(r#"{"export":{"fps":24},"logging":{"json":true}}"#).unwrap();
        assert_eq!(parsed.export.fps, 24);
        assert_eq!(parsed.export.loop_buffer_frames, 10);
        assert_eq!(parsed.export.video_codec, "libx264");
        assert!(parsed.logging.json);
        assert_eq!(parsed.logging.level, "info");
    }

    #[test]
    fn test_save_and_load_roundtrip_via_path() {
        let dir = std::env::temp_dir().join("overlaycut_test_config");
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("config.json");

        let mut config = AppConfig::default();
        config.export.crf = 28;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded.export.crf, 28);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unparseable_config_falls_back_to_defaults() {
        let dir = std::env::temp_dir().join("overlaycut_test_bad_config");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded.export.fps, 30);

        std::fs::remove_dir_all(&dir).ok();
    }
}
