//! Parley - voice chat gateway and hold-to-talk client for a website assistant
//!
//! Two cooperating components live in this crate:
//! - The **gateway**: an HTTP endpoint that chains speech-to-text, a chat
//!   completion service, and text-to-speech into one stateless request
//!   (`POST /api/voice-chat`), optionally fronting the static site itself.
//! - The **client**: a native hold-to-talk controller that records the
//!   microphone, sends an abortable turn request, plays the synthesized
//!   reply, and keeps a bounded, persisted conversation history.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │              Voice Client (hold-to-talk)          │
//! │   Microphone │ Controller │ Playback │ History   │
//! └───────────────────────┬──────────────────────────┘
//!                         │ multipart / JSON
//! ┌───────────────────────▼──────────────────────────┐
//! │              Parley Gateway                       │
//! │   /api/voice-chat │ CORS │ static site           │
//! └───────────────────────┬──────────────────────────┘
//!                         │ sequential
//! ┌───────────────────────▼──────────────────────────┐
//! │   STT (ElevenLabs) → Chat (OpenAI) → TTS         │
//! └──────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod chat;
pub mod client;
pub mod config;
pub mod error;
pub mod history;
pub mod pipeline;
pub mod prompt;
pub mod voice;

pub use chat::{ChatCompleter, ChatMessage, MessageRole, OpenAiResponses};
pub use client::{
    GatewayTransport, HistoryStore, Microphone, Phase, Speaker, TurnReply, TurnRequest,
    TurnTransport, VoiceController,
};
pub use config::Config;
pub use error::{Error, Result};
pub use history::{ConversationTurn, History, Role};
pub use pipeline::{ChatPipeline, TurnInput, TurnOutcome};
pub use voice::{ElevenLabsStt, ElevenLabsTts, SpeechAudio, Synthesizer, Transcriber};
