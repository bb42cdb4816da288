//! Application settings and configuration management

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Highest inter-slide delay the engine accepts, in milliseconds.
pub const MAX_AUTOPLAY_DELAY_MS: u64 = 10_000;

/// Application settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Settings {
    /// Speech-synthesis service endpoint URL
    pub synthesis_url: String,
    /// Presentation-level default narration voice
    #[serde(default = "default_voice")]
    pub default_voice: String,
    /// Delay between the end of one slide's narration and the next slide
    #[serde(default = "default_autoplay_delay_ms")]
    pub autoplay_delay_ms: u64,
    /// Bound on how long audio resolution may remain unresolved
    #[serde(default = "default_resolve_timeout_ms")]
    pub resolve_timeout_ms: u64,
    /// Sample rate of the raw PCM the synthesis service returns
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Channel count of the raw PCM the synthesis service returns
    #[serde(default = "default_channel_count")]
    pub channel_count: usize,
}

fn default_voice() -> String {
    "nova".to_string()
}

fn default_autoplay_delay_ms() -> u64 {
    2_000
}

fn default_resolve_timeout_ms() -> u64 {
    10_000
}

fn default_sample_rate() -> u32 {
    24_000
}

fn default_channel_count() -> usize {
    1
}

/// Error types for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    IoError(io::Error),
    ParseError(String),
    ValidationError(String),
}

impl From<io::Error> for ConfigError {
    fn from(err: io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "I/O error: {}", e),
            ConfigError::ParseError(s) => write!(f, "Parse error: {}", s),
            ConfigError::ValidationError(s) => write!(f, "Validation error: {}", s),
        }
    }
}

impl Error for ConfigError {}

impl Settings {
    /// Create default settings
    pub fn default() -> Self {
        Settings {
            synthesis_url: "http://localhost:8080/synthesize".to_string(),
            default_voice: default_voice(),
            autoplay_delay_ms: default_autoplay_delay_ms(),
            resolve_timeout_ms: default_resolve_timeout_ms(),
            sample_rate: default_sample_rate(),
            channel_count: default_channel_count(),
        }
    }

    /// Load settings from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        Ok(settings)
    }

    /// Save settings to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(&self)?;

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config").join("slidecast").join("config.json")
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.synthesis_url.is_empty() {
            return Err(ConfigError::ValidationError("Synthesis URL cannot be empty".to_string()));
        }

        if self.default_voice.is_empty() {
            return Err(ConfigError::ValidationError("Default voice cannot be empty".to_string()));
        }

        if self.autoplay_delay_ms > MAX_AUTOPLAY_DELAY_MS {
            return Err(ConfigError::ValidationError(format!(
                "Autoplay delay must be at most {} ms",
                MAX_AUTOPLAY_DELAY_MS
            )));
        }

        if self.sample_rate == 0 || self.channel_count == 0 {
            return Err(ConfigError::ValidationError(
                "PCM sample rate and channel count must be non-zero".to_string(),
            ));
        }

        Ok(())
    }
}
