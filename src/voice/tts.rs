//! Text-to-speech (TTS) processing

use async_trait::async_trait;

use crate::{Error, Result};

/// Synthesized speech with its declared media type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechAudio {
    pub bytes: Vec<u8>,
    pub mime: String,
}

/// Synthesizes speech from text
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize the reply text. Empty text is synthesized as-is rather
    /// than special-cased; the upstream produces short/silent audio.
    async fn synthesize(&self, text: &str) -> Result<SpeechAudio>;
}

/// ElevenLabs text-to-speech client
#[derive(Debug)]
pub struct ElevenLabsTts {
    client: reqwest::Client,
    api_key: String,
    voice_id: String,
    model: String,
    base_url: String,
}

impl ElevenLabsTts {
    /// Create a new TTS client
    ///
    /// # Errors
    ///
    /// Returns error if the API key or the voice identity is missing
    pub fn new(api_key: String, voice_id: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "ElevenLabs API key required for TTS".to_string(),
            ));
        }
        if voice_id.is_empty() {
            return Err(Error::Config("Missing ELEVEN_VOICE_ID".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice_id,
            model,
            base_url: "https://api.elevenlabs.io".to_string(),
        })
    }

    /// Point the client at a different server (used by tests)
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Synthesizer for ElevenLabsTts {
    async fn synthesize(&self, text: &str) -> Result<SpeechAudio> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
        }

        tracing::debug!(chars = text.len(), voice = %self.voice_id, "starting synthesis");

        let request = TtsRequest {
            text,
            model_id: &self.model,
        };

        let response = self
            .client
            .post(format!(
                "{}/v1/text-to-speech/{}",
                self.base_url, self.voice_id
            ))
            .header("xi-api-key", &self.api_key)
            .header("Accept", "audio/mpeg")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "TTS API error");
            return Err(Error::Tts(format!(
                "ElevenLabs TTS failed ({status}): {body}"
            )));
        }

        let bytes = response.bytes().await?.to_vec();
        tracing::info!(audio_bytes = bytes.len(), "synthesis complete");

        Ok(SpeechAudio {
            bytes,
            mime: "audio/mpeg".to_string(),
        })
    }
}
