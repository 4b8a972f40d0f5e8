//! Capture session driver shared by the conversation and the wake listener

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{CaptureOwner, TalkRuntime};
use crate::voice::AudioFrame;
use crate::{Error, Result};

/// Run a collaborator call under a deadline
pub(super) async fn with_timeout<T, F>(limit: Duration, what: &'static str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| Error::Timeout(what))?
}

/// Consumer of a capture session
pub(super) trait FrameSink {
    /// Handle one captured frame
    fn frame(&mut self, frame: AudioFrame);

    /// The stream ended and is about to be reopened
    fn restarted(&mut self);
}

/// Feed capture frames to `sink` for as long as `owner` holds capture
///
/// Opens the device once the previous owner's task has finished, and does
/// not return before its own session has released the device. When the
/// stream ends while still owned and not cancelled, waits the restart delay
/// and reopens it.
pub(super) async fn drive_capture<S: FrameSink>(
    runtime: &TalkRuntime,
    owner: CaptureOwner,
    cancel: &CancellationToken,
    previous: Option<JoinHandle<()>>,
    sink: &mut S,
) {
    let timings = &runtime.options().timings;
    let capture = &runtime.deps().capture;

    if let Some(previous) = previous
        && tokio::time::timeout(timings.handoff_timeout, previous)
            .await
            .is_err()
    {
        tracing::warn!(?owner, "previous capture owner did not release in time");
    }

    while runtime.owns_capture(owner) && !cancel.is_cancelled() {
        let session_cancel = cancel.child_token();
        match capture.open(session_cancel.clone()).await {
            Ok(mut session) => {
                tracing::debug!(?owner, source = capture.name(), "capture opened");
                loop {
                    let frame = tokio::select! {
                        () = cancel.cancelled() => None,
                        frame = session.recv() => frame,
                    };
                    let Some(frame) = frame else {
                        break;
                    };
                    if !runtime.owns_capture(owner) {
                        break;
                    }
                    sink.frame(frame);
                }

                session_cancel.cancel();
                if tokio::time::timeout(timings.handoff_timeout, session.release())
                    .await
                    .is_err()
                {
                    tracing::warn!(?owner, "capture device not released in time");
                }
            }
            Err(e) => tracing::warn!(?owner, error = %e, "failed to open capture"),
        }

        if cancel.is_cancelled() || !runtime.owns_capture(owner) {
            break;
        }

        tracing::warn!(
            ?owner,
            delay_ms = timings.capture_restart_delay.as_millis(),
            "capture stream ended, restarting"
        );
        sink.restarted();
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(timings.capture_restart_delay) => {}
        }
    }

    tracing::debug!(?owner, "capture released");
}
