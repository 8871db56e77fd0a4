//! Turn-taking state machine.
//!
//! ```text
//! Start ─check─> Idle ─started─> Listening ─final─> Thinking ─reply─> Speaking
//!                 ^                  │ no-speech                          │
//!                 └──────────────────┴──────────────── playback ended ────┘
//! ```
//!
//! [`transition`] never performs I/O. Device and network work is requested
//! through [`Effect`]s; their outcomes come back as [`Event`]s stamped with
//! the [`Epoch`] of the session start that produced them. Events from any
//! other epoch are dropped, as is everything after a stop.

use crate::{AudioClip, ConversationError};
use kindred_types::ConversationStatus;

/// Recognition error code for "heard nothing". Recovered locally.
pub const NO_SPEECH: &str = "no-speech";

/// What happens once the friend has finished speaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnPolicy {
    /// Re-arm the recognizer after playback, and restart it whenever it
    /// ends without a final transcript.
    #[default]
    Continuous,
    /// Return to idle and wait for [`Command::Listen`].
    OneShot,
}

/// Counter bumped on every conversation start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Epoch(u64);

impl Epoch {
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }

    #[must_use]
    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    NotStarted,
    /// Waiting on the microphone check.
    Starting { greet: bool },
    /// Recognizer not yet listening. `recognizer_requested` is set once a
    /// start has been asked of the capture adapter; until then a reported
    /// recognition start is ignored and [`Command::Listen`] is what arms it.
    Idle { recognizer_requested: bool },
    /// `rearm` is set when the current recognition run is known to end
    /// without a usable transcript.
    Listening { rearm: bool },
    Thinking,
    Speaking,
    Error(ConversationError),
    /// Stopped by the user. Inert until the next start.
    Closed,
}

impl Phase {
    #[must_use]
    pub fn status(&self) -> ConversationStatus {
        match self {
            Self::NotStarted | Self::Starting { .. } | Self::Idle { .. } | Self::Closed => {
                ConversationStatus::Idle
            }
            Self::Listening { .. } => ConversationStatus::Listening,
            Self::Thinking => ConversationStatus::Thinking,
            Self::Speaking => ConversationStatus::Speaking,
            Self::Error(_) => ConversationStatus::Error,
        }
    }

    fn accepts_events(&self) -> bool {
        !matches!(self, Self::NotStarted | Self::Error(_) | Self::Closed)
    }
}

/// User actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start { has_history: bool },
    Listen,
    Stop,
}

/// Outcomes reported by adapters and the reply request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    PermissionGranted,
    StartFailed(ConversationError),
    RecognitionStarted,
    RecognitionResult { transcript: String, is_final: bool },
    RecognitionError { code: String },
    RecognitionEnded,
    ReplyReceived(AudioClip),
    ReplyFailed { message: String },
    PlaybackEnded,
    PlaybackFailed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Command(Command),
    Event { epoch: Epoch, event: Event },
}

/// Work the driver must carry out after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    CheckMicrophone,
    StartRecognition,
    StopRecognition,
    RequestReply { transcript: String },
    Play(AudioClip),
    StopPlayback,
    CancelReply,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConversationState {
    pub phase: Phase,
    pub epoch: Epoch,
    pub policy: TurnPolicy,
}

impl ConversationState {
    #[must_use]
    pub fn new(policy: TurnPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }
}

/// Applies one input. Inputs that make no sense in the current phase are
/// dropped: the state comes back unchanged with no effects.
#[must_use]
pub fn transition(mut state: ConversationState, input: Input) -> (ConversationState, Vec<Effect>) {
    let effects = match input {
        Input::Command(command) => on_command(&mut state, command),
        Input::Event { epoch, event } => {
            if epoch != state.epoch || !state.phase.accepts_events() {
                Vec::new()
            } else {
                on_event(&mut state, event)
            }
        }
    };
    (state, effects)
}

fn on_command(state: &mut ConversationState, command: Command) -> Vec<Effect> {
    match command {
        Command::Start { has_history } => match state.phase {
            Phase::NotStarted | Phase::Closed | Phase::Error(_) => {
                state.epoch = state.epoch.next();
                state.phase = Phase::Starting {
                    greet: !has_history,
                };
                vec![Effect::CheckMicrophone]
            }
            _ => Vec::new(),
        },
        Command::Listen => match state.phase {
            Phase::Idle {
                recognizer_requested: false,
            } => {
                state.phase = Phase::Idle {
                    recognizer_requested: true,
                };
                vec![Effect::StartRecognition]
            }
            _ => Vec::new(),
        },
        Command::Stop => match state.phase {
            Phase::NotStarted | Phase::Closed => Vec::new(),
            Phase::Thinking => {
                state.phase = Phase::Closed;
                vec![
                    Effect::StopRecognition,
                    Effect::StopPlayback,
                    Effect::CancelReply,
                ]
            }
            _ => {
                state.phase = Phase::Closed;
                vec![Effect::StopRecognition, Effect::StopPlayback]
            }
        },
    }
}

fn on_event(state: &mut ConversationState, event: Event) -> Vec<Effect> {
    match (state.phase.clone(), event) {
        (Phase::Starting { greet }, Event::PermissionGranted) => {
            if greet {
                state.phase = Phase::Thinking;
                vec![Effect::RequestReply {
                    transcript: String::new(),
                }]
            } else {
                state.phase = Phase::Idle {
                    recognizer_requested: true,
                };
                vec![Effect::StartRecognition]
            }
        }
        (Phase::Starting { .. }, Event::StartFailed(err)) => fail(state, err),

        (
            Phase::Idle {
                recognizer_requested: true,
            },
            Event::RecognitionStarted,
        ) => {
            state.phase = Phase::Listening { rearm: false };
            Vec::new()
        }

        (Phase::Listening { .. }, Event::RecognitionResult { transcript, is_final }) => {
            if !is_final {
                return Vec::new();
            }
            let transcript = transcript.trim();
            if transcript.is_empty() {
                state.phase = Phase::Listening { rearm: true };
                return vec![Effect::StopRecognition];
            }
            let transcript = transcript.to_string();
            state.phase = Phase::Thinking;
            vec![
                Effect::StopRecognition,
                Effect::RequestReply { transcript },
            ]
        }

        (Phase::Idle { .. } | Phase::Listening { .. }, Event::RecognitionError { code })
            if code == NO_SPEECH =>
        {
            if let Phase::Listening { .. } = state.phase {
                state.phase = Phase::Listening { rearm: true };
            }
            Vec::new()
        }
        (Phase::Idle { .. } | Phase::Listening { .. }, Event::RecognitionError { code }) => {
            fail(state, ConversationError::Recognition(code))
        }

        (Phase::Listening { rearm }, Event::RecognitionEnded) => {
            if rearm || state.policy == TurnPolicy::Continuous {
                state.phase = Phase::Idle {
                    recognizer_requested: true,
                };
                vec![Effect::StartRecognition]
            } else {
                state.phase = Phase::Idle {
                    recognizer_requested: false,
                };
                Vec::new()
            }
        }

        (Phase::Thinking, Event::ReplyReceived(clip)) => {
            state.phase = Phase::Speaking;
            vec![Effect::Play(clip)]
        }
        (Phase::Thinking, Event::ReplyFailed { message }) => {
            fail(state, ConversationError::Reply(message))
        }

        (Phase::Speaking, Event::PlaybackEnded) => match state.policy {
            TurnPolicy::Continuous => {
                state.phase = Phase::Idle {
                    recognizer_requested: true,
                };
                vec![Effect::StartRecognition]
            }
            TurnPolicy::OneShot => {
                state.phase = Phase::Idle {
                    recognizer_requested: false,
                };
                Vec::new()
            }
        },
        (Phase::Speaking, Event::PlaybackFailed { message }) => {
            fail(state, ConversationError::Playback(message))
        }

        _ => Vec::new(),
    }
}

fn fail(state: &mut ConversationState, err: ConversationError) -> Vec<Effect> {
    state.phase = Phase::Error(err);
    vec![Effect::StopRecognition, Effect::StopPlayback]
}
