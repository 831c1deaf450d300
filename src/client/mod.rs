//! The native hold-to-talk voice client
//!
//! Owns microphone access, recording start/stop, request dispatch and
//! cancellation, audio playback, and the persisted conversation history.

pub mod capture;
pub mod controller;
pub mod playback;
pub mod store;
pub mod transport;

pub use capture::{samples_to_wav, Microphone, SAMPLE_RATE};
pub use controller::{AudioSink, AudioSource, Phase, PlaybackControl, VoiceController};
pub use playback::{PlaybackHandle, Speaker};
pub use store::HistoryStore;
pub use transport::{GatewayTransport, TurnReply, TurnRequest, TurnTransport};
