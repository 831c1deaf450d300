//! Request orchestration: STT → chat completion → TTS
//!
//! One stateless sequence per request. Each step depends on the previous
//! one's output, so the calls are strictly sequential, and the first
//! failure aborts the whole turn — there is no partial-success response
//! and no retry (deliberate: surface upstream failures, don't mask them).

use std::sync::Arc;

use crate::chat::{ChatCompleter, ChatMessage, MessageRole};
use crate::history::{self, ConversationTurn, Role};
use crate::prompt;
use crate::voice::{SpeechAudio, Synthesizer, Transcriber};
use crate::{Error, Result};

/// The user's input for one turn
#[derive(Debug, Clone)]
pub enum TurnInput {
    /// Recorded audio to be transcribed first
    Audio { bytes: Vec<u8>, filename: String },
    /// Raw text, skipping transcription
    Text(String),
}

/// Result of one completed turn
#[derive(Debug)]
pub struct TurnOutcome {
    pub user_text: String,
    pub assistant_text: String,
    pub audio: SpeechAudio,
}

/// The voice-chat orchestration pipeline
pub struct ChatPipeline {
    transcriber: Arc<dyn Transcriber>,
    completer: Arc<dyn ChatCompleter>,
    synthesizer: Arc<dyn Synthesizer>,
    base_prompt: String,
    context_budget: usize,
}

impl ChatPipeline {
    /// Create a pipeline over the three upstream services
    #[must_use]
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        completer: Arc<dyn ChatCompleter>,
        synthesizer: Arc<dyn Synthesizer>,
        base_prompt: Option<String>,
        context_budget: usize,
    ) -> Self {
        Self {
            transcriber,
            completer,
            synthesizer,
            base_prompt: base_prompt
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| prompt::DEFAULT_SYSTEM_PROMPT.to_string()),
            context_budget,
        }
    }

    /// Run one turn through the pipeline
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyTranscript`] when the resolved utterance is
    /// empty after trimming, or the first upstream failure otherwise.
    pub async fn run(
        &self,
        input: TurnInput,
        wire_history: &[serde_json::Value],
        page_context: Option<&str>,
    ) -> Result<TurnOutcome> {
        let user_text = match input {
            TurnInput::Audio { bytes, filename } => {
                self.transcriber.transcribe(&bytes, &filename).await?
            }
            TurnInput::Text(text) => text,
        };
        let user_text = user_text.trim().to_string();
        if user_text.is_empty() {
            return Err(Error::EmptyTranscript);
        }

        let turns = history::sanitize_wire_history(wire_history);
        let messages = self.build_messages(&user_text, &turns, page_context);

        let assistant_text = self.completer.complete(&messages).await?;

        // Synthesize even an empty reply; short audio beats a special case.
        let audio = self.synthesizer.synthesize(&assistant_text).await?;

        tracing::info!(
            user_chars = user_text.len(),
            assistant_chars = assistant_text.len(),
            audio_bytes = audio.bytes.len(),
            "turn complete"
        );

        Ok(TurnOutcome {
            user_text,
            assistant_text,
            audio,
        })
    }

    /// Assemble the message sequence: system instruction, prior history,
    /// then the new utterance last
    #[must_use]
    pub fn build_messages(
        &self,
        user_text: &str,
        turns: &[ConversationTurn],
        page_context: Option<&str>,
    ) -> Vec<ChatMessage> {
        let system =
            prompt::build_system_instruction(&self.base_prompt, page_context, self.context_budget);

        let mut messages = Vec::with_capacity(turns.len() + 2);
        messages.push(ChatMessage::new(MessageRole::System, system));

        for turn in turns {
            let role = match turn.role {
                Role::User => MessageRole::User,
                Role::Assistant => MessageRole::Assistant,
            };
            messages.push(ChatMessage::new(role, turn.content.clone()));
        }

        messages.push(ChatMessage::new(MessageRole::User, user_text));
        messages
    }
}
