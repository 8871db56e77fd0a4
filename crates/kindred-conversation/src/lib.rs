//! Voice conversation turn-taking.
//!
//! A conversation alternates between the user speaking and the friend
//! replying. [`machine`] holds the pure transition function; [`session`]
//! drives it from a single event queue, executing the effects it asks for
//! against the capture/playback adapters and the reply service.

pub mod adapters;
pub mod client;
pub mod machine;
pub mod session;

use thiserror::Error;

pub use adapters::{AudioPlayback, EventSink, SpeechCapture};
pub use client::{HttpReplyClient, ReplyError, ReplyRequest, ReplySource};
pub use machine::{
    transition, Command, ConversationState, Effect, Epoch, Event, Input, Phase, TurnPolicy,
    NO_SPEECH,
};
pub use session::{spawn_session, ConversationHandle, SessionConfig, Snapshot};

/// Audio returned by the reply service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Why a conversation stopped in the error state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversationError {
    #[error("Microphone permission was denied.")]
    PermissionDenied,

    #[error("Speech recognition is not supported in this environment.")]
    RecognitionUnsupported,

    #[error("Speech recognition error: {0}")]
    Recognition(String),

    /// The reply service's own message, surfaced verbatim.
    #[error("{0}")]
    Reply(String),

    #[error("Audio playback failed: {0}")]
    Playback(String),

    #[error("conversation session has ended")]
    SessionClosed,
}
