//! Configuration management
//!
//! Environment variables are the primary source (matching how the gateway is
//! deployed); `~/.config/parley/config.toml` is an optional partial overlay
//! underneath them. All file fields are optional.

use std::path::PathBuf;

use serde::Deserialize;

use crate::{Error, Result};

/// Maximum retained history entries (6 turns of user+assistant)
pub const MAX_HISTORY_MESSAGES: usize = 12;

/// Character budget for page context inserted into the system instruction
pub const PAGE_CONTEXT_BUDGET: usize = 5000;

/// Character budget applied by the client before sending page context
pub const CLIENT_CONTEXT_BUDGET: usize = 4500;

/// Recordings smaller than this (encoded WAV bytes) are accidental taps
pub const MIN_RECORDING_BYTES: usize = 1000;

/// Default STT model
pub const DEFAULT_STT_MODEL: &str = "scribe_v2";

/// Default chat completion model
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4.1-nano";

/// Default TTS model
pub const DEFAULT_TTS_MODEL: &str = "eleven_multilingual_v2";

/// Parley configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Chat completion API key (`OPENAI_API_KEY`)
    pub openai_api_key: Option<String>,

    /// Transcription/synthesis API key (`ELEVEN_API_KEY`)
    pub eleven_api_key: Option<String>,

    /// Target voice identity (`ELEVEN_VOICE_ID`)
    pub voice_id: Option<String>,

    /// Custom persona prompt (`SYSTEM_PROMPT`); falls back to the default
    pub system_prompt: Option<String>,

    /// Allowed-origin override for CORS (`ALLOW_ORIGIN`)
    pub allow_origin: Option<String>,

    /// STT model identifier (`ELEVEN_STT_MODEL_ID`)
    pub stt_model: String,

    /// Chat completion model identifier
    pub chat_model: String,

    /// TTS model identifier
    pub tts_model: String,

    /// Static site directory served by the gateway, if any
    pub static_dir: Option<PathBuf>,

    /// Data directory for the client's persisted history
    pub data_dir: PathBuf,

    /// History cap applied on append and before sending
    pub max_history_messages: usize,
}

/// Optional TOML overlay file schema
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    system_prompt: Option<String>,

    #[serde(default)]
    allow_origin: Option<String>,

    #[serde(default)]
    api_keys: ApiKeysFile,

    #[serde(default)]
    models: ModelsFile,

    #[serde(default)]
    server: ServerFile,
}

#[derive(Debug, Default, Deserialize)]
struct ApiKeysFile {
    openai: Option<String>,
    elevenlabs: Option<String>,
    voice_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ModelsFile {
    stt: Option<String>,
    chat: Option<String>,
    tts: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerFile {
    static_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the overlay file and environment
    ///
    /// Missing API keys are not an error here; the service constructors
    /// reject empty keys with a descriptive message when they are needed.
    ///
    /// # Errors
    ///
    /// Returns error if the config file exists but cannot be parsed, or if
    /// no data directory can be determined.
    pub fn load() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("", "", "parley")
            .ok_or_else(|| Error::Config("could not determine project directories".to_string()))?;

        let file = load_file(&dirs.config_dir().join("config.toml"))?;

        let data_dir = dirs.data_dir().to_path_buf();

        Ok(Self {
            openai_api_key: env_or("OPENAI_API_KEY", file.api_keys.openai),
            eleven_api_key: env_or("ELEVEN_API_KEY", file.api_keys.elevenlabs),
            voice_id: env_or("ELEVEN_VOICE_ID", file.api_keys.voice_id),
            system_prompt: env_or("SYSTEM_PROMPT", file.system_prompt),
            allow_origin: env_or("ALLOW_ORIGIN", file.allow_origin),
            stt_model: env_or("ELEVEN_STT_MODEL_ID", file.models.stt)
                .unwrap_or_else(|| DEFAULT_STT_MODEL.to_string()),
            chat_model: env_or("PARLEY_CHAT_MODEL", file.models.chat)
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            tts_model: env_or("PARLEY_TTS_MODEL", file.models.tts)
                .unwrap_or_else(|| DEFAULT_TTS_MODEL.to_string()),
            static_dir: std::env::var("PARLEY_STATIC_DIR")
                .ok()
                .map(PathBuf::from)
                .or(file.server.static_dir),
            data_dir,
            max_history_messages: MAX_HISTORY_MESSAGES,
        })
    }

    /// Path of the client's persisted history file
    #[must_use]
    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join("history.json")
    }
}

/// Read the overlay file if present; a missing file is not an error
fn load_file(path: &std::path::Path) -> Result<ConfigFile> {
    if !path.exists() {
        return Ok(ConfigFile::default());
    }

    let raw = std::fs::read_to_string(path)?;
    let parsed = toml::from_str(&raw)?;
    tracing::debug!(path = %path.display(), "loaded config overlay");
    Ok(parsed)
}

/// Environment variable if set and non-empty, else the file value
fn env_or(key: &str, fallback: Option<String>) -> Option<String> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => fallback,
    }
}
