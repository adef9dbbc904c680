use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;

/// Top-level configuration for the Hark listener.
///
/// Loaded from `~/.hark/config.toml` by default. Every value is read once at
/// startup and immutable for the process lifetime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarkConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub decoder: DecoderConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl HarkConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: HarkConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Audio capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Name or substring of the input device. "default" selects the system
    /// default input device.
    pub device_name: String,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Samples per frame handed to the decoder.
    pub frame_samples: usize,
    /// Maximum frames buffered between the capture callback and the session
    /// loop. 50 frames of 512 samples at 16 kHz is ~1.6 s of audio.
    pub queue_capacity: usize,
    /// Post-pop queue depth above which a backlog warning is emitted.
    pub backlog_threshold: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device_name: "default".to_string(),
            sample_rate: 16000,
            frame_samples: 512,
            queue_capacity: 50,
            backlog_threshold: 10,
        }
    }
}

/// Speech decoder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Path to the acoustic model directory.
    pub model_path: String,
    /// Path to a pronunciation dictionary, for decoders that require one.
    /// The Vosk backend derives pronunciations from its model and ignores it.
    pub dictionary_path: String,
    /// Path to the command grammar definition, read once at startup.
    /// One command phrase per line; blank lines and `#` comments are skipped.
    pub grammar_path: String,
    /// The wake phrase that opens a command window.
    pub wake_phrase: String,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            model_path: String::new(),
            dictionary_path: String::new(),
            grammar_path: "grammar.jsgf".to_string(),
            wake_phrase: "hey butler".to_string(),
        }
    }
}

/// Session state machine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Seconds after a recognized wake phrase during which a command
    /// utterance may start before the window is abandoned.
    pub command_window_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_window_secs: 5,
        }
    }
}
