//! Turn request transport to the gateway

use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;

use crate::history::ConversationTurn;
use crate::voice::SpeechAudio;
use crate::{Error, Result};

/// One turn's request payload: the recording plus conversation context
#[derive(Debug, Clone)]
pub struct TurnRequest {
    /// WAV-encoded recording
    pub audio_wav: Vec<u8>,
    /// Recent history, already truncated to the cap
    pub history: Vec<ConversationTurn>,
    /// Bounded page context, if any
    pub page_context: Option<String>,
}

/// The gateway's reply to one turn
#[derive(Debug, Clone)]
pub struct TurnReply {
    pub user_text: String,
    pub assistant_text: String,
    /// Synthesized reply audio; absent when the gateway sent none
    pub audio: Option<SpeechAudio>,
}

/// Sends one turn to the gateway and returns its reply
#[async_trait]
pub trait TurnTransport: Send + Sync {
    async fn send_turn(&self, request: TurnRequest) -> Result<TurnReply>;
}

/// HTTP transport posting multipart turns to `/api/voice-chat`
pub struct GatewayTransport {
    client: reqwest::Client,
    url: String,
}

impl GatewayTransport {
    /// Create a transport for the given endpoint URL
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

/// Wire shape of the gateway response
#[derive(Debug, Default, Deserialize)]
struct WireReply {
    #[serde(default)]
    user_text: String,
    #[serde(default)]
    assistant_text: String,
    #[serde(default)]
    audio_base64: String,
    #[serde(default)]
    audio_mime: String,
}

#[async_trait]
impl TurnTransport for GatewayTransport {
    async fn send_turn(&self, request: TurnRequest) -> Result<TurnReply> {
        let history_json = serde_json::to_string(&request.history)?;

        let audio_part = reqwest::multipart::Part::bytes(request.audio_wav)
            .file_name("speech.wav")
            .mime_str("audio/wav")
            .map_err(|e| Error::Gateway(e.to_string()))?;

        let mut form = reqwest::multipart::Form::new()
            .part("audio", audio_part)
            .text("history", history_json);
        if let Some(context) = request.page_context {
            form = form.text("page_context", context);
        }

        tracing::debug!(url = %self.url, "sending turn");

        let response = self.client.post(&self.url).multipart(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Gateway(format!("API error {status}: {body}")));
        }

        let wire: WireReply = response.json().await?;

        let audio = if wire.audio_base64.is_empty() || wire.audio_mime.is_empty() {
            None
        } else {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(&wire.audio_base64)
                .map_err(|e| Error::Gateway(format!("invalid audio payload: {e}")))?;
            Some(SpeechAudio {
                bytes,
                mime: wire.audio_mime,
            })
        };

        Ok(TurnReply {
            user_text: wire.user_text,
            assistant_text: wire.assistant_text,
            audio,
        })
    }
}
