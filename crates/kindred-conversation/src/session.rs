//! Single-queue driver for the turn-taking machine.
//!
//! User commands, device events, and reply outcomes all arrive on one
//! unbounded channel and are applied in order. The driver owns the adapters
//! and executes every effect before taking the next input.

use crate::adapters::{AudioPlayback, EventSink, SpeechCapture};
use crate::client::{ReplyRequest, ReplySource};
use crate::machine::{
    transition, Command, ConversationState, Effect, Epoch, Event, Input, Phase, TurnPolicy,
};
use crate::ConversationError;
use kindred_types::ConversationStatus;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub friend_id: String,
    pub users_name: String,
    pub policy: TurnPolicy,
}

/// State published after each input has been fully processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub phase: Phase,
    pub epoch: Epoch,
}

impl Snapshot {
    pub fn status(&self) -> ConversationStatus {
        self.phase.status()
    }

    pub fn error(&self) -> Option<&ConversationError> {
        match &self.phase {
            Phase::Error(err) => Some(err),
            _ => None,
        }
    }
}

/// Control surface for a running session. Dropping every handle shuts the
/// session down once adapters release their sinks.
#[derive(Debug, Clone)]
pub struct ConversationHandle {
    tx: mpsc::UnboundedSender<Input>,
    snapshot: watch::Receiver<Snapshot>,
}

impl ConversationHandle {
    pub fn start(&self, has_history: bool) -> Result<(), ConversationError> {
        self.send(Command::Start { has_history })
    }

    pub fn listen(&self) -> Result<(), ConversationError> {
        self.send(Command::Listen)
    }

    pub fn stop(&self) -> Result<(), ConversationError> {
        self.send(Command::Stop)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.clone()
    }

    fn send(&self, command: Command) -> Result<(), ConversationError> {
        self.tx
            .send(Input::Command(command))
            .map_err(|_| ConversationError::SessionClosed)
    }
}

/// Spawns the driver on the current tokio runtime.
pub fn spawn_session<C, P>(
    config: SessionConfig,
    capture: C,
    playback: P,
    replies: Arc<dyn ReplySource>,
) -> ConversationHandle
where
    C: SpeechCapture + 'static,
    P: AudioPlayback + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let state = ConversationState::new(config.policy);
    let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot {
        phase: state.phase.clone(),
        epoch: state.epoch,
    });

    let driver = Driver {
        state,
        config,
        capture,
        playback,
        replies,
        tx: tx.downgrade(),
        snapshot: snapshot_tx,
        reply_task: None,
    };
    tokio::spawn(driver.run(rx));

    ConversationHandle {
        tx,
        snapshot: snapshot_rx,
    }
}

struct Driver<C, P> {
    state: ConversationState,
    config: SessionConfig,
    capture: C,
    playback: P,
    replies: Arc<dyn ReplySource>,
    tx: mpsc::WeakUnboundedSender<Input>,
    snapshot: watch::Sender<Snapshot>,
    reply_task: Option<JoinHandle<()>>,
}

impl<C: SpeechCapture, P: AudioPlayback> Driver<C, P> {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Input>) {
        while let Some(input) = rx.recv().await {
            self.step(input).await;
        }
        self.capture.stop();
        self.playback.stop();
        if let Some(task) = self.reply_task.take() {
            task.abort();
        }
        tracing::debug!(friend_id = %self.config.friend_id, "conversation session ended");
    }

    async fn step(&mut self, input: Input) {
        let was_error = matches!(self.state.phase, Phase::Error(_));
        let (next, effects) = transition(std::mem::take(&mut self.state), input);
        self.state = next;

        if !was_error {
            if let Phase::Error(err) = &self.state.phase {
                tracing::warn!(
                    friend_id = %self.config.friend_id,
                    epoch = self.state.epoch.value(),
                    error = %err,
                    "conversation entered error state"
                );
            }
        }

        for effect in effects {
            tracing::trace!(?effect, "executing effect");
            self.execute(effect).await;
        }

        self.snapshot.send_replace(Snapshot {
            phase: self.state.phase.clone(),
            epoch: self.state.epoch,
        });
    }

    fn sink(&self) -> Option<EventSink> {
        self.tx
            .upgrade()
            .map(|tx| EventSink::new(self.state.epoch, tx))
    }

    async fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::CheckMicrophone => {
                let outcome = self.capture.check_microphone().await;
                let Some(sink) = self.sink() else { return };
                match outcome {
                    Ok(()) => sink.emit(Event::PermissionGranted),
                    Err(err) => sink.emit(Event::StartFailed(err)),
                };
            }
            Effect::StartRecognition => {
                if let Some(sink) = self.sink() {
                    self.capture.start(sink);
                }
            }
            Effect::StopRecognition => self.capture.stop(),
            Effect::RequestReply { transcript } => {
                let Some(sink) = self.sink() else { return };
                let replies = Arc::clone(&self.replies);
                let request = ReplyRequest {
                    friend_id: self.config.friend_id.clone(),
                    transcript,
                    users_name: self.config.users_name.clone(),
                };
                self.reply_task = Some(tokio::spawn(async move {
                    let event = match replies.reply(request).await {
                        Ok(clip) => Event::ReplyReceived(clip),
                        Err(err) => Event::ReplyFailed {
                            message: err.to_string(),
                        },
                    };
                    sink.emit(event);
                }));
            }
            Effect::Play(clip) => {
                if let Some(sink) = self.sink() {
                    self.playback.play(clip, sink);
                }
            }
            Effect::StopPlayback => self.playback.stop(),
            Effect::CancelReply => {
                if let Some(task) = self.reply_task.take() {
                    task.abort();
                }
            }
        }
    }
}
