//! Configuration for the voice chat engine
//!
//! Loaded from a TOML file (default location under the platform config
//! directory), with API keys overridable from the environment so secrets
//! never need to live in the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{Error, Result};

/// Environment variable for the recognition service API key
const RECOGNITION_KEY_ENV: &str = "DEEPGRAM_API_KEY";

/// Environment variable for the synthesis service API key
const SYNTHESIS_KEY_ENV: &str = "ELEVENLABS_API_KEY";

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Session behavior (silence timeout)
    pub session: SessionConfig,

    /// Speech recognition service
    pub recognition: RecognitionConfig,

    /// Chat backend
    pub chat: ChatConfig,

    /// Speech synthesis and playback
    pub speech: SpeechConfig,
}

/// Session behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Silence duration after the last transcript update before the pending
    /// utterance is submitted, in milliseconds
    pub silence_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            silence_timeout_ms: 5000,
        }
    }
}

impl SessionConfig {
    /// Silence timeout as a [`Duration`]
    #[must_use]
    pub const fn silence_timeout(&self) -> Duration {
        Duration::from_millis(self.silence_timeout_ms)
    }
}

/// Speech recognition service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// API key (or set `DEEPGRAM_API_KEY`)
    pub api_key: Option<String>,

    /// Recognition model (e.g. "nova-2")
    pub model: String,

    /// Spoken language tag (e.g. "en-US")
    pub language: String,

    /// Sample rate of the PCM audio fed to the service
    pub sample_rate: u32,

    /// Report provisional (interim) transcripts as the user speaks
    pub interim_results: bool,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "nova-2".to_string(),
            language: "en-US".to_string(),
            sample_rate: 16000,
            interim_results: true,
        }
    }
}

/// How to reach the chat backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMode {
    /// One POST per utterance, one complete reply per response
    Http,
    /// Persistent socket streaming reply fragments
    Socket,
}

/// Chat backend configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Transport mode
    pub mode: ChatMode,

    /// Message endpoint for `http` mode
    pub http_url: String,

    /// WebSocket endpoint for `socket` mode
    pub socket_url: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            mode: ChatMode::Http,
            http_url: "http://localhost:3000/api/chat/message".to_string(),
            socket_url: "ws://localhost:3000/api/chat".to_string(),
        }
    }
}

/// Speech synthesis configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Speak assistant replies out loud
    pub enabled: bool,

    /// API key (or set `ELEVENLABS_API_KEY`)
    pub api_key: Option<String>,

    /// Voice identifier
    pub voice_id: String,

    /// Synthesis model identifier
    pub model_id: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            voice_id: "21m00Tcm4TlvDq8ikWAM".to_string(),
            model_id: "eleven_monolingual_v1".to_string(),
        }
    }
}

impl Config {
    /// Load configuration
    ///
    /// Reads `path` when given, otherwise the default config file if one
    /// exists, otherwise starts from defaults. API keys found in the
    /// environment override the file in either case.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed, or if an
    /// explicitly given path does not exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => match Self::default_path() {
                Some(p) if p.exists() => Self::from_file(&p)?,
                _ => Self::default(),
            },
        };

        config.apply_env();
        Ok(config)
    }

    /// Parse configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Default config file location (`<config dir>/voxchat/config.toml`)
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "omni", "voxchat")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Overlay API keys from the environment
    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(RECOGNITION_KEY_ENV) {
            if !key.is_empty() {
                self.recognition.api_key = Some(key);
            }
        }
        if let Ok(key) = std::env::var(SYNTHESIS_KEY_ENV) {
            if !key.is_empty() {
                self.speech.api_key = Some(key);
            }
        }
    }

    /// Validate that required fields for the selected modes are present
    ///
    /// # Errors
    ///
    /// Returns error if a required URL or key is missing.
    pub fn validate(&self) -> Result<()> {
        match self.chat.mode {
            ChatMode::Http if self.chat.http_url.is_empty() => {
                return Err(Error::Config("chat.http_url is required".to_string()));
            }
            ChatMode::Socket if self.chat.socket_url.is_empty() => {
                return Err(Error::Config("chat.socket_url is required".to_string()));
            }
            _ => {}
        }

        if self.session.silence_timeout_ms == 0 {
            return Err(Error::Config(
                "session.silence_timeout_ms must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
