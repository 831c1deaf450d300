//! The voice interaction controller
//!
//! An explicit state machine over the hold-to-talk gesture:
//!
//! ```text
//! Idle → AwaitingPermission → Recording → Processing → Playing → Idle
//! ```
//!
//! Interruption contract: a new press, at any point, synchronously stops
//! and discards any playing audio, aborts any in-flight request, and
//! resets the busy flags so a new recording starts without delay. Every
//! press bumps a turn generation counter; a response carrying a stale
//! generation arrives into state it no longer owns and is ignored.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{AbortHandle, Abortable, Aborted};

use super::store::HistoryStore;
use super::transport::{TurnReply, TurnRequest, TurnTransport};
use crate::config::{CLIENT_CONTEXT_BUDGET, MIN_RECORDING_BYTES};
use crate::history::{History, Role};
use crate::prompt::truncate_chars;
use crate::voice::SpeechAudio;
use crate::Result;

/// Controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Ready; no recording or turn in progress
    Idle,
    /// Hold started, waiting on microphone access
    AwaitingPermission,
    /// Hold active, accumulating audio
    Recording,
    /// Hold released, turn request in flight
    Processing,
    /// Reply audio playing
    Playing,
}

/// Microphone seam
///
/// Acquisition happens once (the permission prompt); the device is then
/// reused across turns.
#[async_trait]
pub trait AudioSource: Send + Sync {
    /// Request access to the capture device
    async fn acquire(&self) -> Result<()>;

    /// Whether the device has been acquired
    fn is_acquired(&self) -> bool;

    /// Begin accumulating a new recording
    fn start(&self) -> Result<()>;

    /// Stop accumulating
    fn stop(&self);

    /// The encoded (WAV) recording accumulated since `start`
    fn take_recording(&self) -> Result<Vec<u8>>;

    /// Release the device entirely
    fn close(&self);
}

/// A playback in progress
pub trait PlaybackControl: Send {
    /// Stop immediately and release playback resources
    fn stop(&self);

    /// Whether playback ran to completion (or error)
    fn is_finished(&self) -> bool;
}

/// Speaker seam
pub trait AudioSink: Send + Sync {
    /// Start playing; returns a control for interruption
    fn start(&self, audio: &SpeechAudio) -> Result<Box<dyn PlaybackControl>>;
}

/// Mutable controller state, guarded by one lock
struct ControllerCore {
    phase: Phase,
    /// Gesture currently held down
    held: bool,
    /// Bumped on every press; stale turns check against it
    generation: u64,
    history: History,
    playback: Option<Box<dyn PlaybackControl>>,
    abort: Option<AbortHandle>,
    status: String,
}

impl ControllerCore {
    /// The interruption contract: tear down playback and the in-flight
    /// request, and clear busy state. Runs synchronously under the lock.
    fn interrupt(&mut self) {
        if let Some(playback) = self.playback.take() {
            playback.stop();
        }
        if let Some(abort) = self.abort.take() {
            abort.abort();
        }
        if matches!(self.phase, Phase::Processing | Phase::Playing) {
            self.phase = Phase::Idle;
        }
    }
}

/// The hold-to-talk controller
pub struct VoiceController {
    core: Arc<Mutex<ControllerCore>>,
    source: Arc<dyn AudioSource>,
    sink: Arc<dyn AudioSink>,
    transport: Arc<dyn TurnTransport>,
    store: Arc<HistoryStore>,
    page_context: Option<String>,
}

impl Clone for VoiceController {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            source: Arc::clone(&self.source),
            sink: Arc::clone(&self.sink),
            transport: Arc::clone(&self.transport),
            store: Arc::clone(&self.store),
            page_context: self.page_context.clone(),
        }
    }
}

impl VoiceController {
    /// Create a controller, loading persisted history
    #[must_use]
    pub fn new(
        source: Arc<dyn AudioSource>,
        sink: Arc<dyn AudioSink>,
        transport: Arc<dyn TurnTransport>,
        store: HistoryStore,
        page_context: Option<String>,
        max_history: usize,
    ) -> Self {
        let history = History::from_turns(store.load(), max_history);

        Self {
            core: Arc::new(Mutex::new(ControllerCore {
                phase: Phase::Idle,
                held: false,
                generation: 0,
                history,
                playback: None,
                abort: None,
                status: "Ready".to_string(),
            })),
            source,
            sink,
            transport,
            store: Arc::new(store),
            page_context: page_context.map(bound_context),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ControllerCore> {
        self.core.lock().unwrap()
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    /// User-visible status line
    #[must_use]
    pub fn status(&self) -> String {
        self.lock().status.clone()
    }

    /// Retained history, oldest first
    #[must_use]
    pub fn history(&self) -> Vec<crate::history::ConversationTurn> {
        self.lock().history.turns().to_vec()
    }

    /// Hold-to-talk gesture started
    ///
    /// Interrupts any previous turn first, then acquires the microphone
    /// (first press only) and starts recording. If the hold ended while
    /// the permission prompt was open, no recording starts.
    ///
    /// # Errors
    ///
    /// Returns error if microphone access is denied or capture fails to
    /// start; the controller returns to `Idle` either way.
    pub async fn press(&self) -> Result<()> {
        {
            let mut core = self.lock();
            core.interrupt();
            if core.held {
                return Ok(());
            }
            core.held = true;
            core.generation += 1;
        }

        if !self.source.is_acquired() {
            {
                let mut core = self.lock();
                core.phase = Phase::AwaitingPermission;
                core.status = "Mic permission...".to_string();
            }

            if let Err(e) = self.source.acquire().await {
                let mut core = self.lock();
                core.held = false;
                core.phase = Phase::Idle;
                core.status = "Microphone blocked".to_string();
                return Err(e);
            }

            // A slow permission prompt often makes the user release the
            // hold. In that case do not start recording after the fact.
            let mut core = self.lock();
            if !core.held {
                core.phase = Phase::Idle;
                core.status = "Mic ready. Hold to talk.".to_string();
                return Ok(());
            }
        }

        {
            let mut core = self.lock();
            core.phase = Phase::Recording;
            core.status = "Recording...".to_string();
        }

        if let Err(e) = self.source.start() {
            let mut core = self.lock();
            core.held = false;
            core.phase = Phase::Idle;
            core.status = format!("Error: {e}");
            return Err(e);
        }

        Ok(())
    }

    /// Hold-to-talk gesture ended
    ///
    /// Stops the recording and, unless it was too short, dispatches the
    /// turn as an abortable background task. Returns a handle to that
    /// task when one was started; the turn itself reports through the
    /// controller state.
    pub async fn release(&self) -> Option<tokio::task::JoinHandle<()>> {
        let (generation, request, abort_registration) = {
            let mut core = self.lock();
            if !core.held {
                return None;
            }
            core.held = false;
            if core.phase != Phase::Recording {
                // Still awaiting permission; press() backs out on its own.
                return None;
            }
            core.phase = Phase::Processing;
            core.status = "Processing...".to_string();

            // The drain shares the critical section with the guards: a
            // concurrent press lands before them or after the drain,
            // never between.
            self.source.stop();
            let wav = match self.source.take_recording() {
                Ok(wav) => wav,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read recording");
                    core.phase = Phase::Idle;
                    core.status = format!("Error: {e}");
                    return None;
                }
            };

            if wav.len() < MIN_RECORDING_BYTES {
                core.phase = Phase::Idle;
                core.status = "Too short. Hold longer.".to_string();
                return None;
            }

            let request = TurnRequest {
                audio_wav: wav,
                history: core.history.turns().to_vec(),
                page_context: self.page_context.clone(),
            };

            let (abort_handle, abort_registration) = AbortHandle::new_pair();
            core.abort = Some(abort_handle);
            (core.generation, request, abort_registration)
        };

        let this = self.clone();
        let transport = Arc::clone(&self.transport);
        Some(tokio::spawn(async move {
            let outcome = Abortable::new(transport.send_turn(request), abort_registration).await;
            this.finish_turn(generation, outcome).await;
        }))
    }

    /// Complete a turn: append history, persist, and play the reply
    async fn finish_turn(
        &self,
        generation: u64,
        outcome: std::result::Result<Result<TurnReply>, Aborted>,
    ) {
        let reply = match outcome {
            Err(Aborted) => {
                // User interrupted; press() already reset the state.
                tracing::debug!("turn aborted by a new gesture");
                return;
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "turn failed");
                let mut core = self.lock();
                if core.generation == generation {
                    core.abort = None;
                    core.phase = Phase::Idle;
                    core.status = format!("Error: {e}");
                }
                return;
            }
            Ok(Ok(reply)) => reply,
        };

        let turns = {
            let mut core = self.lock();
            if core.generation != generation {
                // Stale turn: a newer gesture owns the state now.
                return;
            }
            core.abort = None;
            core.history.push(Role::User, &reply.user_text);
            core.history.push(Role::Assistant, &reply.assistant_text);
            core.history.turns().to_vec()
        };

        // Best-effort persistence; a failed write never loses the turn
        // in memory or fails the interaction.
        if let Err(e) = self.store.save(&turns) {
            tracing::warn!(error = %e, "failed to persist history");
        }

        let Some(audio) = reply.audio else {
            let mut core = self.lock();
            if core.generation == generation {
                core.phase = Phase::Idle;
                core.status = "Done".to_string();
            }
            return;
        };

        match self.sink.start(&audio) {
            Ok(control) => {
                {
                    let mut core = self.lock();
                    if core.generation != generation {
                        control.stop();
                        return;
                    }
                    core.playback = Some(control);
                    core.phase = Phase::Playing;
                    core.status = "Playing...".to_string();
                }
                self.watch_playback(generation).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "playback failed");
                let mut core = self.lock();
                if core.generation == generation {
                    core.phase = Phase::Idle;
                    core.status = "Ready".to_string();
                }
            }
        }
    }

    /// Poll the active playback until it completes or a newer gesture
    /// takes over
    async fn watch_playback(&self, generation: u64) {
        loop {
            tokio::time::sleep(Duration::from_millis(50)).await;

            let mut core = self.lock();
            if core.generation != generation {
                return;
            }
            let finished = core.playback.as_ref().is_none_or(|p| p.is_finished());
            if finished {
                core.playback = None;
                core.phase = Phase::Idle;
                core.status = "Ready".to_string();
                return;
            }
        }
    }

    /// Release the microphone and tear down any pending audio or request
    pub fn dispose(&self) {
        {
            let mut core = self.lock();
            core.interrupt();
            core.held = false;
            core.phase = Phase::Idle;
        }
        self.source.stop();
        self.source.close();
    }
}

/// Bound page context to the client budget, marking truncation
fn bound_context(context: String) -> String {
    let trimmed = context.trim();
    let bounded = truncate_chars(trimmed, CLIENT_CONTEXT_BUDGET);
    if bounded.len() < trimmed.len() {
        format!("{bounded}…")
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_context_is_untouched() {
        assert_eq!(bound_context("  hello page  ".to_string()), "hello page");
    }

    #[test]
    fn long_context_is_bounded_with_ellipsis() {
        let long = "x".repeat(CLIENT_CONTEXT_BUDGET + 100);
        let bounded = bound_context(long);
        assert_eq!(bounded.chars().count(), CLIENT_CONTEXT_BUDGET + 1);
        assert!(bounded.ends_with('…'));
    }
}
