//! Speech-to-text (STT) processing

use async_trait::async_trait;

use crate::{Error, Result};

/// Transcribes recorded speech to text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe audio bytes; the filename hints the container format
    /// (e.g. `speech.webm`, `speech.wav`)
    async fn transcribe(&self, audio: &[u8], filename: &str) -> Result<String>;
}

/// Response from the ElevenLabs transcription API
///
/// The transcript field name has varied across model versions, so this is a
/// tagged fallback: `text` first, then `transcript`, then empty.
#[derive(Debug, Default, serde::Deserialize)]
struct SttResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    transcript: Option<String>,
}

impl SttResponse {
    fn into_text(self) -> String {
        self.text.or(self.transcript).unwrap_or_default()
    }
}

/// ElevenLabs speech-to-text client
#[derive(Debug)]
pub struct ElevenLabsStt {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl ElevenLabsStt {
    /// Create a new STT client
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "ElevenLabs API key required for STT".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
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
impl Transcriber for ElevenLabsStt {
    async fn transcribe(&self, audio: &[u8], filename: &str) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), filename, "starting transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio.to_vec())
                    .file_name(filename.to_string()),
            )
            .text("model_id", self.model.clone());

        let response = self
            .client
            .post(format!("{}/v1/speech-to-text", self.base_url))
            .header("xi-api-key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "STT request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "STT API error");
            return Err(Error::Stt(format!(
                "ElevenLabs STT failed ({status}): {body}"
            )));
        }

        let result: SttResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse STT response");
            e
        })?;

        let transcript = result.into_text().trim().to_string();
        tracing::info!(transcript = %transcript, "transcription complete");
        Ok(transcript)
    }
}
