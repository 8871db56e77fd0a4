//! Device seams.
//!
//! Capture and playback are the only asynchronous event sources. Each is
//! single-subscriber: `start`/`play` hands it the [`EventSink`] for the
//! current session, and `stop` must make it drop that sink.

use crate::machine::{Epoch, Event, Input};
use crate::{AudioClip, ConversationError};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Posts events into the session queue, stamped with the epoch of the
/// conversation start that created it.
#[derive(Debug, Clone)]
pub struct EventSink {
    epoch: Epoch,
    tx: mpsc::UnboundedSender<Input>,
}

impl EventSink {
    pub(crate) fn new(epoch: Epoch, tx: mpsc::UnboundedSender<Input>) -> Self {
        Self { epoch, tx }
    }

    /// Returns `false` once the session has shut down.
    pub fn emit(&self, event: Event) -> bool {
        self.tx
            .send(Input::Event {
                epoch: self.epoch,
                event,
            })
            .is_ok()
    }
}

/// Speech recognizer plus microphone access.
///
/// Every recognition run that emits `RecognitionStarted` must finish with
/// exactly one `RecognitionEnded`, including runs cut short by `stop`.
#[async_trait]
pub trait SpeechCapture: Send {
    /// Requests the microphone and releases it straight away.
    ///
    /// # Errors
    ///
    /// `PermissionDenied` or `RecognitionUnsupported`.
    async fn check_microphone(&mut self) -> Result<(), ConversationError>;

    fn start(&mut self, sink: EventSink);

    /// Idempotent.
    fn stop(&mut self);
}

pub trait AudioPlayback: Send {
    /// Plays `clip`, then emits `PlaybackEnded` (or `PlaybackFailed`).
    fn play(&mut self, clip: AudioClip, sink: EventSink);

    /// Halts playback without emitting anything. Idempotent.
    fn stop(&mut self);
}
