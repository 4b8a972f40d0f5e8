//! Audio capture from microphone
//!
//! A capture session is a bounded channel of [`AudioFrame`]s plus a release
//! signal. The stream ends when the session is cancelled or the underlying
//! device/process dies; the caller decides whether to open a new one, and
//! waits for the release signal before anyone else opens the device.

use std::sync::Arc;
use std::sync::mpsc as std_mpsc;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::audio::{AudioFrame, FRAME_BYTES, FRAME_SAMPLES, SAMPLE_RATE};
use crate::config::{CaptureBackend, CaptureConfig};
use crate::{Error, Result};

/// Frames buffered between the device and the consuming loop (~2.5s)
const FRAME_QUEUE: usize = 128;

/// An open capture session
#[derive(Debug)]
pub struct CaptureSession {
    frames: mpsc::Receiver<AudioFrame>,
    released: oneshot::Receiver<()>,
}

impl CaptureSession {
    /// Pair a frame channel with its release signal
    ///
    /// The source drops (or fires) the sending half of `released` once the
    /// device or process behind the session has been let go.
    #[must_use]
    pub const fn new(frames: mpsc::Receiver<AudioFrame>, released: oneshot::Receiver<()>) -> Self {
        Self { frames, released }
    }

    /// Next frame, or `None` once the stream has ended
    pub async fn recv(&mut self) -> Option<AudioFrame> {
        self.frames.recv().await
    }

    /// Stop receiving and wait until the source has freed the device
    ///
    /// Only completes promptly after the session's cancel token has fired or
    /// the stream has ended on its own.
    pub async fn release(self) {
        drop(self.frames);
        // Either outcome means the sender is gone
        let _ = self.released.await;
    }
}

/// Source of microphone frames
#[async_trait]
pub trait CaptureSource: Send + Sync {
    /// Open a capture session
    ///
    /// Frames flow until `cancel` fires or the source fails, at which point
    /// the stream ends and the device is released.
    ///
    /// # Errors
    ///
    /// Returns error if the device or process cannot be started
    async fn open(&self, cancel: CancellationToken) -> Result<CaptureSession>;

    /// Short label for logs
    fn name(&self) -> &'static str;
}

/// Build the capture source selected in configuration
///
/// # Errors
///
/// Returns error if the backend is misconfigured
pub fn from_config(config: &CaptureConfig) -> Result<Arc<dyn CaptureSource>> {
    match config.backend {
        CaptureBackend::Cpal => Ok(Arc::new(CpalCapture::new(config.device.clone()))),
        CaptureBackend::Command => {
            let command = config.command.clone().ok_or_else(|| {
                Error::Config("capture.command required for command backend".to_string())
            })?;
            Ok(Arc::new(CommandCapture::new(command)?))
        }
    }
}

/// Captures audio from an input device through cpal
pub struct CpalCapture {
    device_name: Option<String>,
}

impl CpalCapture {
    /// Capture from the named device, or the default input when `None`
    #[must_use]
    pub const fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }
}

#[async_trait]
impl CaptureSource for CpalCapture {
    async fn open(&self, cancel: CancellationToken) -> Result<CaptureSession> {
        let (tx, rx) = mpsc::channel(FRAME_QUEUE);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (released_tx, released_rx) = oneshot::channel::<()>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let device_name = self.device_name.clone();

        // The capture thread blocks on `stop_rx`; cancellation wakes it
        let cancel_stop = stop_tx.clone();
        let watcher = tokio::spawn(async move {
            cancel.cancelled().await;
            let _ = cancel_stop.send(());
        });

        // cpal streams aren't Send, so the stream lives on its own thread
        let spawned = std::thread::Builder::new()
            .name("beacon-capture".to_string())
            .spawn(move || {
                run_cpal_capture(device_name.as_deref(), tx, stop_tx, &stop_rx, ready_tx);
                drop(released_tx);
            });
        if let Err(e) = spawned {
            watcher.abort();
            return Err(e.into());
        }

        let started = ready_rx
            .await
            .map_err(|_| Error::Capture("capture thread exited during startup".to_string()))
            .and_then(|ready| ready);
        if let Err(e) = started {
            watcher.abort();
            return Err(e);
        }

        Ok(CaptureSession::new(rx, released_rx))
    }

    fn name(&self) -> &'static str {
        "cpal"
    }
}

/// Own the cpal stream until cancellation or a stream error
///
/// Returns only after the stream (and with it the device) has been dropped.
fn run_cpal_capture(
    device_name: Option<&str>,
    tx: mpsc::Sender<AudioFrame>,
    stop_tx: std_mpsc::Sender<()>,
    stop_rx: &std_mpsc::Receiver<()>,
    ready: oneshot::Sender<Result<()>>,
) {
    let stream = match build_input_stream(device_name, tx, stop_tx) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    let _ = ready.send(Ok(()));

    // Woken by the cancel watcher or the error callback
    let _ = stop_rx.recv();

    drop(stream);
    tracing::debug!("audio capture stopped");
}

fn build_input_stream(
    device_name: Option<&str>,
    tx: mpsc::Sender<AudioFrame>,
    stop_tx: std_mpsc::Sender<()>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();

    let device = match device_name {
        Some(name) => host
            .input_devices()
            .map_err(|e| Error::Capture(e.to_string()))?
            .find(|d| d.name().is_ok_and(|n| n == name))
            .ok_or_else(|| Error::Capture(format!("input device not found: {name}")))?,
        None => host
            .default_input_device()
            .ok_or_else(|| Error::Capture("no input device available".to_string()))?,
    };

    let supported_config = device
        .supported_input_configs()
        .map_err(|e| Error::Capture(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
        })
        .ok_or_else(|| Error::Capture("no suitable audio config found".to_string()))?;

    let config: StreamConfig = supported_config
        .with_sample_rate(SampleRate(SAMPLE_RATE))
        .config();

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate = SAMPLE_RATE,
        channels = config.channels,
        "audio capture initialized"
    );

    let mut pending: Vec<f32> = Vec::with_capacity(FRAME_SAMPLES * 2);

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                pending.extend_from_slice(data);
                while pending.len() >= FRAME_SAMPLES {
                    if let Some(frame) = AudioFrame::from_f32(&pending[..FRAME_SAMPLES])
                        && tx.try_send(frame).is_err()
                    {
                        tracing::trace!("capture queue full, dropping frame");
                    }
                    pending.drain(..FRAME_SAMPLES);
                }
            },
            move |err| {
                tracing::error!(error = %err, "audio capture error");
                let _ = stop_tx.send(());
            },
            None,
        )
        .map_err(|e| Error::Capture(e.to_string()))?;

    stream.play().map_err(|e| Error::Capture(e.to_string()))?;
    Ok(stream)
}

/// Captures audio from an external process writing raw `s16le` 16kHz mono
/// PCM to stdout (e.g. `arecord -q -f S16_LE -r 16000 -c 1 -t raw`)
pub struct CommandCapture {
    program: String,
    args: Vec<String>,
}

impl CommandCapture {
    /// Create from a whitespace-separated command line
    ///
    /// # Errors
    ///
    /// Returns error if the command line is empty
    pub fn new(command_line: String) -> Result<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| Error::Config("capture command is empty".to_string()))?;

        Ok(Self {
            program,
            args: parts.collect(),
        })
    }
}

#[async_trait]
impl CaptureSource for CommandCapture {
    async fn open(&self, cancel: CancellationToken) -> Result<CaptureSession> {
        let program = which::which(&self.program)
            .map_err(|e| Error::Capture(format!("{}: {e}", self.program)))?;

        let mut child = Command::new(&program)
            .args(&self.args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Capture("capture process has no stdout".to_string()))?;

        tracing::debug!(program = %program.display(), pid = ?child.id(), "capture process started");

        let (tx, rx) = mpsc::channel(FRAME_QUEUE);
        let (released_tx, released_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let mut buf = [0u8; FRAME_BYTES];
            loop {
                let read = tokio::select! {
                    () = cancel.cancelled() => break,
                    read = stdout.read_exact(&mut buf) => read,
                };

                match read {
                    Ok(_) => {
                        let Some(frame) = AudioFrame::from_le_bytes(&buf) else {
                            continue;
                        };
                        if tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "capture process stream ended");
                        break;
                    }
                }
            }

            // Frames stop before the device is freed
            drop(tx);
            if let Err(e) = child.kill().await {
                tracing::debug!(error = %e, "capture process already exited");
            }
            tracing::debug!("capture process stopped");
            drop(released_tx);
        });

        Ok(CaptureSession::new(rx, released_rx))
    }

    fn name(&self) -> &'static str {
        "command"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_capture_parses_args() {
        let capture =
            CommandCapture::new("arecord -q -f S16_LE -r 16000 -c 1 -t raw".to_string()).unwrap();
        assert_eq!(capture.program, "arecord");
        assert_eq!(capture.args.len(), 10);
    }

    #[test]
    fn test_command_capture_rejects_empty() {
        assert!(CommandCapture::new("   ".to_string()).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_release_waits_for_capture_process() {
        let capture = CommandCapture::new("sleep 30".to_string()).unwrap();
        let cancel = CancellationToken::new();
        let session = capture.open(cancel.clone()).await.unwrap();

        cancel.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(5), session.release())
            .await
            .expect("capture process was not released");
    }

    #[tokio::test]
    async fn test_command_capture_missing_program() {
        let capture = CommandCapture::new("definitely-not-a-real-recorder-binary".to_string()).unwrap();
        let err = capture.open(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::Capture(_)));
    }
}
