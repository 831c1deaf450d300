//! Upstream speech services: transcription and synthesis

pub mod stt;
pub mod tts;

pub use stt::{ElevenLabsStt, Transcriber};
pub use tts::{ElevenLabsTts, SpeechAudio, Synthesizer};
