//! Reply audio playback
//!
//! MP3 bytes are decoded up front, then fed to the output device from a
//! dedicated thread (cpal streams are not `Send`). The returned handle
//! stops playback synchronously; the thread observes the flag, drops the
//! stream, and releases the device.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, StreamConfig};

use super::controller::{AudioSink, PlaybackControl};
use crate::voice::SpeechAudio;
use crate::{Error, Result};

/// Sample rate for playback (matches common TTS output)
const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// Plays reply audio on the default output device
pub struct Speaker;

/// Control over one playback in progress
pub struct PlaybackHandle {
    stop: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

impl PlaybackControl for PlaybackHandle {
    fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

impl Speaker {
    /// Create a playback instance
    ///
    /// # Errors
    ///
    /// Returns error if no output device is available
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        host.default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;
        Ok(Self)
    }

    /// Start playing raw f32 samples; returns immediately
    ///
    /// # Errors
    ///
    /// Returns error if the output device cannot be opened
    pub fn start_samples(&self, samples: Vec<f32>) -> Result<PlaybackHandle> {
        let stop = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));

        if samples.is_empty() {
            finished.store(true, Ordering::SeqCst);
            return Ok(PlaybackHandle { stop, finished });
        }

        let handle = PlaybackHandle {
            stop: Arc::clone(&stop),
            finished: Arc::clone(&finished),
        };

        std::thread::spawn(move || {
            if let Err(e) = run_playback_thread(samples, &stop, &finished) {
                tracing::error!(error = %e, "playback thread failed");
            }
            finished.store(true, Ordering::SeqCst);
        });

        Ok(handle)
    }
}

impl AudioSink for Speaker {
    fn start(&self, audio: &SpeechAudio) -> Result<Box<dyn PlaybackControl>> {
        if !audio.mime.starts_with("audio/mpeg") {
            return Err(Error::Audio(format!(
                "unsupported media type: {}",
                audio.mime
            )));
        }

        let samples = decode_mp3(&audio.bytes)?;
        Ok(Box::new(self.start_samples(samples)?))
    }
}

/// Owns the output stream until completion, stop, or timeout
fn run_playback_thread(
    samples: Vec<f32>,
    stop: &Arc<AtomicBool>,
    finished: &Arc<AtomicBool>,
) -> Result<()> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device".to_string()))?;

    let config = find_output_config(&device)?;
    let channels = config.channels as usize;

    let sample_count = samples.len();
    let samples = Arc::new(samples);
    let position = Arc::new(Mutex::new(0usize));
    let done = Arc::new(AtomicBool::new(false));

    let samples_cb = Arc::clone(&samples);
    let position_cb = Arc::clone(&position);
    let done_cb = Arc::clone(&done);

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut pos = position_cb.lock().unwrap();

                for frame in data.chunks_mut(channels) {
                    let sample = if *pos < samples_cb.len() {
                        let s = samples_cb[*pos];
                        *pos += 1;
                        s
                    } else {
                        done_cb.store(true, Ordering::SeqCst);
                        0.0
                    };

                    for out in frame.iter_mut() {
                        *out = sample;
                    }
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    let duration_ms = (sample_count as u64 * 1000) / u64::from(PLAYBACK_SAMPLE_RATE);
    let deadline = std::time::Instant::now() + Duration::from_millis(duration_ms + 500);

    while !done.load(Ordering::SeqCst) && !stop.load(Ordering::SeqCst) {
        if std::time::Instant::now() > deadline {
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    drop(stream);
    finished.store(true, Ordering::SeqCst);
    tracing::debug!(samples = sample_count, "playback finished");
    Ok(())
}

fn find_output_config(device: &Device) -> Result<StreamConfig> {
    let supported = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
        })
        .or_else(|| {
            // Fallback: stereo
            device.supported_output_configs().ok()?.find(|c| {
                c.channels() == 2
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
        })
        .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

    Ok(supported
        .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
        .config())
}

/// Decode MP3 bytes to mono f32 samples
fn decode_mp3(mp3_data: &[u8]) -> Result<Vec<f32>> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if frame.channels == 2 {
                    // Stereo: average channels
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(samples)
}
