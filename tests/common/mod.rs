//! Shared test doubles for the pipeline and the client controller

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use parley_gateway::chat::{ChatCompleter, ChatMessage};
use parley_gateway::client::controller::{AudioSink, AudioSource, PlaybackControl};
use parley_gateway::client::{TurnReply, TurnRequest, TurnTransport};
use parley_gateway::voice::{SpeechAudio, Synthesizer, Transcriber};
use parley_gateway::{Error, Result};

// --- pipeline doubles ---

/// Transcriber returning canned text (or a canned failure)
pub struct MockTranscriber {
    pub text: String,
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl MockTranscriber {
    pub fn returning(text: &str) -> Self {
        Self {
            text: text.to_string(),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            text: String::new(),
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, _audio: &[u8], _filename: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Stt("transcription unavailable".to_string()));
        }
        Ok(self.text.clone())
    }
}

/// Completer returning a canned reply and recording the messages it saw
pub struct MockCompleter {
    pub reply: String,
    pub fail: bool,
    pub calls: AtomicUsize,
    pub seen: Mutex<Vec<ChatMessage>>,
}

impl MockCompleter {
    pub fn returning(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            fail: false,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: String::new(),
            fail: true,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn last_messages(&self) -> Vec<ChatMessage> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatCompleter for MockCompleter {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.seen.lock().unwrap() = messages.to_vec();
        if self.fail {
            return Err(Error::Chat("completion unavailable".to_string()));
        }
        Ok(self.reply.clone())
    }
}

/// Synthesizer returning a fixed MP3-shaped payload
pub struct MockSynthesizer {
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl MockSynthesizer {
    pub fn ok() -> Self {
        Self {
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn synthesize(&self, _text: &str) -> Result<SpeechAudio> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Tts("synthesis unavailable".to_string()));
        }
        Ok(SpeechAudio {
            bytes: vec![0xFF, 0xFB, 0x90, 0x00],
            mime: "audio/mpeg".to_string(),
        })
    }
}

// --- client doubles ---

/// Audio source yielding a canned recording
///
/// An optional gate holds `acquire` open until the test releases it, to
/// exercise the release-during-permission-prompt path.
pub struct MockSource {
    pub recording: Mutex<Vec<u8>>,
    pub acquired: AtomicBool,
    pub acquire_gate: Option<Arc<Notify>>,
    pub start_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
    pub take_calls: AtomicUsize,
    pub closed: AtomicBool,
}

impl MockSource {
    pub fn with_recording(bytes: Vec<u8>) -> Self {
        Self {
            recording: Mutex::new(bytes),
            acquired: AtomicBool::new(false),
            acquire_gate: None,
            start_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            take_calls: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn gated(gate: Arc<Notify>) -> Self {
        let mut source = Self::with_recording(vec![0u8; 4000]);
        source.acquire_gate = Some(gate);
        source
    }
}

#[async_trait]
impl AudioSource for MockSource {
    async fn acquire(&self) -> Result<()> {
        if let Some(gate) = &self.acquire_gate {
            gate.notified().await;
        }
        self.acquired.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_acquired(&self) -> bool {
        self.acquired.load(Ordering::SeqCst)
    }

    fn start(&self) -> Result<()> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn take_recording(&self) -> Result<Vec<u8>> {
        self.take_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.recording.lock().unwrap().clone())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Flags behind one mock playback
pub struct PlaybackFlags {
    pub stopped: AtomicBool,
    pub finished: AtomicBool,
}

struct MockPlayback {
    flags: Arc<PlaybackFlags>,
}

impl PlaybackControl for MockPlayback {
    fn stop(&self) {
        self.flags.stopped.store(true, Ordering::SeqCst);
        self.flags.finished.store(true, Ordering::SeqCst);
    }

    fn is_finished(&self) -> bool {
        self.flags.finished.load(Ordering::SeqCst)
    }
}

/// Audio sink recording every start and exposing the active playback's
/// flags to the test
#[derive(Default)]
pub struct MockSink {
    pub starts: AtomicUsize,
    pub current: Mutex<Option<Arc<PlaybackFlags>>>,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the active playback as naturally finished
    pub fn finish_current(&self) {
        if let Some(flags) = self.current.lock().unwrap().as_ref() {
            flags.finished.store(true, Ordering::SeqCst);
        }
    }

    pub fn current_was_stopped(&self) -> bool {
        self.current
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|f| f.stopped.load(Ordering::SeqCst))
    }
}

impl AudioSink for MockSink {
    fn start(&self, _audio: &SpeechAudio) -> Result<Box<dyn PlaybackControl>> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let flags = Arc::new(PlaybackFlags {
            stopped: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        });
        *self.current.lock().unwrap() = Some(Arc::clone(&flags));
        Ok(Box::new(MockPlayback { flags }))
    }
}

/// Transport returning a canned reply, optionally held open by a gate
pub struct MockTransport {
    pub reply: TurnReply,
    pub gate: Option<Arc<Notify>>,
    pub calls: AtomicUsize,
    pub last_request: Mutex<Option<TurnRequest>>,
}

impl MockTransport {
    pub fn returning(user_text: &str, assistant_text: &str) -> Self {
        Self {
            reply: TurnReply {
                user_text: user_text.to_string(),
                assistant_text: assistant_text.to_string(),
                audio: Some(SpeechAudio {
                    bytes: vec![0xFF, 0xFB, 0x90, 0x00],
                    mime: "audio/mpeg".to_string(),
                }),
            },
            gate: None,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn gated(user_text: &str, assistant_text: &str, gate: Arc<Notify>) -> Self {
        let mut transport = Self::returning(user_text, assistant_text);
        transport.gate = Some(gate);
        transport
    }
}

#[async_trait]
impl TurnTransport for MockTransport {
    async fn send_turn(&self, request: TurnRequest) -> Result<TurnReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Ok(self.reply.clone())
    }
}
