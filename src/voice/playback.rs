//! Audio playback to speakers

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleRate;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::audio::{DecodedAudio, decode_wav};
use crate::config::{PlaybackBackend, PlaybackConfig};
use crate::{Error, Result};

/// Poll interval while waiting for a cpal stream to drain
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Extra time allowed past the nominal clip length
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// How a playback call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// The clip played to the end
    Completed,
    /// Playback was cancelled before the end
    Interrupted,
}

/// Sink for synthesized speech
#[async_trait]
pub trait PlaybackSink: Send + Sync {
    /// Play a WAV clip until it ends or `cancel` fires
    ///
    /// # Errors
    ///
    /// Returns error if the clip cannot be decoded or the device fails
    async fn play(&self, wav: Vec<u8>, cancel: CancellationToken) -> Result<PlaybackOutcome>;
}

/// Build the playback sink selected in configuration
///
/// # Errors
///
/// Returns error if the backend is misconfigured
pub fn from_config(config: &PlaybackConfig) -> Result<Arc<dyn PlaybackSink>> {
    match config.backend {
        PlaybackBackend::Cpal => Ok(Arc::new(CpalPlayback::new(config.device.clone()))),
        PlaybackBackend::Command => {
            let command = config.command.clone().ok_or_else(|| {
                Error::Config("playback.command required for command backend".to_string())
            })?;
            Ok(Arc::new(CommandPlayback::new(command)?))
        }
    }
}

/// Plays audio to an output device through cpal
pub struct CpalPlayback {
    device_name: Option<String>,
}

impl CpalPlayback {
    /// Play on the named device, or the default output when `None`
    #[must_use]
    pub const fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }
}

#[async_trait]
impl PlaybackSink for CpalPlayback {
    async fn play(&self, wav: Vec<u8>, cancel: CancellationToken) -> Result<PlaybackOutcome> {
        let audio = decode_wav(&wav)?;
        if audio.samples.is_empty() {
            return Ok(PlaybackOutcome::Completed);
        }

        let device_name = self.device_name.clone();
        tokio::task::spawn_blocking(move || {
            play_samples_blocking(device_name.as_deref(), &audio, &cancel)
        })
        .await
        .map_err(|e| Error::Playback(e.to_string()))?
    }
}

/// Play samples in a blocking manner
#[allow(clippy::cast_possible_truncation)]
fn play_samples_blocking(
    device_name: Option<&str>,
    audio: &DecodedAudio,
    cancel: &CancellationToken,
) -> Result<PlaybackOutcome> {
    let host = cpal::default_host();
    let device = match device_name {
        Some(name) => host
            .output_devices()
            .map_err(|e| Error::Playback(e.to_string()))?
            .find(|d| d.name().is_ok_and(|n| n == name))
            .ok_or_else(|| Error::Playback(format!("output device not found: {name}")))?,
        None => host
            .default_output_device()
            .ok_or_else(|| Error::Playback("no output device".to_string()))?,
    };

    let rate = SampleRate(audio.sample_rate);
    let supported_config = device
        .supported_output_configs()
        .map_err(|e| Error::Playback(e.to_string()))?
        .find(|c| c.channels() == 1 && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
        .or_else(|| {
            // Fallback: try stereo
            device.supported_output_configs().ok()?.find(|c| {
                c.channels() == 2 && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
            })
        })
        .ok_or_else(|| {
            Error::Playback(format!("no output config for {} Hz", audio.sample_rate))
        })?;

    let config = supported_config.with_sample_rate(rate).config();
    let channels = config.channels as usize;

    let samples: Arc<[f32]> = Arc::from(audio.samples.as_slice());
    let position = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicBool::new(false));

    let stream = {
        let samples = Arc::clone(&samples);
        let position = Arc::clone(&position);
        let finished = Arc::clone(&finished);
        device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut pos = position.load(Ordering::Relaxed);
                    for frame in data.chunks_mut(channels) {
                        let sample = samples.get(pos).copied().unwrap_or_else(|| {
                            finished.store(true, Ordering::Relaxed);
                            0.0
                        });
                        frame.fill(sample);
                        if pos < samples.len() {
                            pos += 1;
                        }
                    }
                    position.store(pos, Ordering::Relaxed);
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Playback(e.to_string()))?
    };

    stream.play().map_err(|e| Error::Playback(e.to_string()))?;

    let duration_ms = (samples.len() as u64 * 1000) / u64::from(audio.sample_rate.max(1));
    let deadline = Instant::now() + Duration::from_millis(duration_ms) + DRAIN_GRACE;

    let outcome = loop {
        if cancel.is_cancelled() {
            break PlaybackOutcome::Interrupted;
        }
        if finished.load(Ordering::Relaxed) || Instant::now() > deadline {
            break PlaybackOutcome::Completed;
        }
        std::thread::sleep(DRAIN_POLL_INTERVAL);
    };

    drop(stream);
    tracing::debug!(
        samples = samples.len(),
        played = position.load(Ordering::Relaxed),
        ?outcome,
        "playback finished"
    );

    Ok(outcome)
}

/// Plays audio by handing a temporary WAV file to an external player
/// (e.g. `aplay -q` or `afplay`)
pub struct CommandPlayback {
    program: String,
    args: Vec<String>,
}

impl CommandPlayback {
    /// Create from a whitespace-separated command line; the WAV path is
    /// appended as the last argument
    ///
    /// # Errors
    ///
    /// Returns error if the command line is empty
    pub fn new(command_line: String) -> Result<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| Error::Config("playback command is empty".to_string()))?;

        Ok(Self {
            program,
            args: parts.collect(),
        })
    }
}

#[async_trait]
impl PlaybackSink for CommandPlayback {
    async fn play(&self, wav: Vec<u8>, cancel: CancellationToken) -> Result<PlaybackOutcome> {
        let mut file = tempfile::Builder::new()
            .prefix("beacon-talk-")
            .suffix(".wav")
            .tempfile()?;
        file.write_all(&wav)?;
        file.flush()?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(file.path())
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Playback(format!("{}: {e}", self.program)))?;

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                if let Err(e) = child.kill().await {
                    tracing::debug!(error = %e, "player already exited");
                }
                Ok(PlaybackOutcome::Interrupted)
            }
            status = child.wait() => {
                let status = status?;
                if status.success() {
                    Ok(PlaybackOutcome::Completed)
                } else {
                    Err(Error::Playback(format!("{} exited with {status}", self.program)))
                }
            }
        }
    }
}
