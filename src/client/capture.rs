//! Microphone capture
//!
//! cpal input streams are not `Send`, so the device lives on a dedicated
//! thread driven by commands; the sample buffer is shared with the stream
//! callback. Acquisition happens once and the device is reused across
//! turns.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, StreamConfig};

use super::controller::AudioSource;
use crate::{Error, Result};

/// Sample rate for capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16_000;

enum MicCommand {
    Start,
    Stop,
    Close,
}

/// Captures audio from the default input device
pub struct Microphone {
    buffer: Arc<Mutex<Vec<f32>>>,
    commands: Mutex<Option<mpsc::Sender<MicCommand>>>,
}

impl Default for Microphone {
    fn default() -> Self {
        Self::new()
    }
}

impl Microphone {
    /// Create an unacquired microphone; the device opens on `acquire`
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Arc::new(Mutex::new(Vec::new())),
            commands: Mutex::new(None),
        }
    }

    /// Samples captured so far, without clearing (diagnostics)
    #[must_use]
    pub fn peek_samples(&self) -> Vec<f32> {
        self.buffer.lock().map(|buf| buf.clone()).unwrap_or_default()
    }

    /// Clear the capture buffer
    pub fn clear(&self) {
        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }
    }

    fn send(&self, command: MicCommand) -> bool {
        self.commands
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|tx| tx.send(command).is_ok()))
            .unwrap_or(false)
    }
}

#[async_trait]
impl AudioSource for Microphone {
    async fn acquire(&self) -> Result<()> {
        if self.is_acquired() {
            return Ok(());
        }

        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let buffer = Arc::clone(&self.buffer);

        std::thread::spawn(move || run_capture_thread(&buffer, &command_rx, &ready_tx));

        // Device opening can block (first-time permission prompts).
        let opened = tokio::task::spawn_blocking(move || ready_rx.recv())
            .await
            .map_err(|e| Error::Audio(format!("capture thread join: {e}")))?
            .map_err(|_| Error::Audio("capture thread exited".to_string()))?;

        opened?;

        if let Ok(mut guard) = self.commands.lock() {
            *guard = Some(command_tx);
        }

        tracing::debug!("microphone acquired");
        Ok(())
    }

    fn is_acquired(&self) -> bool {
        self.commands
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    fn start(&self) -> Result<()> {
        self.clear();
        if self.send(MicCommand::Start) {
            Ok(())
        } else {
            Err(Error::Audio("microphone not acquired".to_string()))
        }
    }

    fn stop(&self) {
        self.send(MicCommand::Stop);
    }

    fn take_recording(&self) -> Result<Vec<u8>> {
        let samples = self
            .buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default();

        samples_to_wav(&samples, SAMPLE_RATE)
    }

    fn close(&self) {
        self.send(MicCommand::Close);
        if let Ok(mut guard) = self.commands.lock() {
            *guard = None;
        }
    }
}

/// Owns the cpal device and stream for the microphone's lifetime
fn run_capture_thread(
    buffer: &Arc<Mutex<Vec<f32>>>,
    commands: &mpsc::Receiver<MicCommand>,
    ready: &mpsc::Sender<Result<()>>,
) {
    let host = cpal::default_host();
    let Some(device) = host.default_input_device() else {
        let _ = ready.send(Err(Error::Audio("no input device available".to_string())));
        return;
    };

    let config = match find_input_config(&device) {
        Ok(config) => config,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate = SAMPLE_RATE,
        channels = config.channels,
        "audio capture initialized"
    );

    let _ = ready.send(Ok(()));

    let mut stream: Option<cpal::Stream> = None;
    while let Ok(command) = commands.recv() {
        match command {
            MicCommand::Start => {
                if stream.is_some() {
                    continue;
                }
                match build_input_stream(&device, &config, Arc::clone(buffer)) {
                    Ok(s) => {
                        tracing::debug!("audio capture started");
                        stream = Some(s);
                    }
                    Err(e) => tracing::error!(error = %e, "failed to start capture"),
                }
            }
            MicCommand::Stop => {
                if stream.take().is_some() {
                    tracing::debug!("audio capture stopped");
                }
            }
            MicCommand::Close => break,
        }
    }
}

fn find_input_config(device: &Device) -> Result<StreamConfig> {
    let supported = device
        .supported_input_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
        })
        .ok_or_else(|| Error::Audio("no suitable input config found".to_string()))?;

    Ok(supported.with_sample_rate(SampleRate(SAMPLE_RATE)).config())
}

fn build_input_stream(
    device: &Device,
    config: &StreamConfig,
    buffer: Arc<Mutex<Vec<f32>>>,
) -> Result<cpal::Stream> {
    let stream = device
        .build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buf) = buffer.lock() {
                    buf.extend_from_slice(data);
                }
            },
            |err| {
                tracing::error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;
    Ok(stream)
}

/// Convert f32 samples to WAV bytes for the turn request
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
