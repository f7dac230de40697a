//! Voice session state machine
//!
//! The single coordination point: one event-loop task owns the listening
//! state, the pending utterance, the silence timer, the chat log, and the
//! wiring between recognition, transport, and playback. All session state
//! mutates here and nowhere else, so no locking is needed; components talk
//! to the loop over channels.
//!
//! Restart-after-submission is sequenced explicitly: submitting puts the
//! session into `Restarting`, which waits for the recognition service to
//! report `Ended` before issuing a fresh start. Recognition events that
//! arrive while `Idle` (late callbacks from a session that is shutting
//! down) are discarded.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::chat::{ChatConnection, ChatLog, ChatMessage, TransportEvent};
use crate::debounce::DebouncedSubmitter;
use crate::recognition::{RecognitionEvent, RecognitionSession, TranscriptAccumulator};
use crate::speech::{PlaybackHandle, SentenceSegmenter};
use crate::{Error, Result};

/// Buffer size for command and event channels
const SESSION_CHANNEL_CAPACITY: usize = 64;

/// Listening state of the single microphone session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListeningState {
    /// Not listening
    Idle,
    /// Recognition active, accumulating the pending utterance
    Listening,
    /// Stop requested after a submission; waiting for `Ended` before a
    /// fresh start
    Restarting,
}

/// Command from the embedding surface (button presses, shutdown)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// Toggle listening on or off
    ToggleListening,
    /// Submit the pending utterance immediately, cancelling the timer
    SubmitNow,
    /// Stop the session loop
    Shutdown,
}

/// State change published to the rendering surface
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Listening state changed
    ListeningChanged(ListeningState),

    /// The live transcript display text changed
    TranscriptChanged(String),

    /// A new message entered the chat log
    MessageAppended(ChatMessage),

    /// The open assistant message grew by a fragment
    MessageUpdated(ChatMessage),

    /// A recognition failure to surface inline (never a crash)
    RecognitionError(String),
}

/// Handle for driving a running session
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Toggle listening on or off
    ///
    /// # Errors
    ///
    /// Returns error if the session loop is gone.
    pub async fn toggle_listening(&self) -> Result<()> {
        self.send(SessionCommand::ToggleListening).await
    }

    /// Submit the pending utterance now
    ///
    /// # Errors
    ///
    /// Returns error if the session loop is gone.
    pub async fn submit_now(&self) -> Result<()> {
        self.send(SessionCommand::SubmitNow).await
    }

    /// Stop the session
    ///
    /// # Errors
    ///
    /// Returns error if the session loop is gone.
    pub async fn shutdown(&self) -> Result<()> {
        self.send(SessionCommand::Shutdown).await
    }

    async fn send(&self, command: SessionCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| Error::Channel("session loop stopped".to_string()))
    }
}

/// The voice session event loop
pub struct VoiceSession {
    state: ListeningState,
    recognition: RecognitionSession,
    submitter: DebouncedSubmitter,
    utterance: TranscriptAccumulator,
    log: ChatLog,
    transport: ChatConnection,
    transport_open: bool,
    playback: Option<PlaybackHandle>,
    segmenter: SentenceSegmenter,
    commands_rx: mpsc::Receiver<SessionCommand>,
    events_tx: mpsc::Sender<SessionEvent>,
}

impl VoiceSession {
    /// Create a session
    ///
    /// Returns the session (to be `run`), the control handle, and the
    /// receiver of rendering events.
    #[must_use]
    pub fn new(
        recognition: RecognitionSession,
        transport: ChatConnection,
        silence_timeout: Duration,
        playback: Option<PlaybackHandle>,
    ) -> (Self, SessionHandle, mpsc::Receiver<SessionEvent>) {
        let (commands_tx, commands_rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);

        let session = Self {
            state: ListeningState::Idle,
            recognition,
            submitter: DebouncedSubmitter::new(silence_timeout),
            utterance: TranscriptAccumulator::new(),
            log: ChatLog::new(),
            transport,
            transport_open: true,
            playback,
            segmenter: SentenceSegmenter::new(),
            commands_rx,
            events_tx,
        };

        (session, SessionHandle { commands: commands_tx }, events_rx)
    }

    /// Current listening state
    #[must_use]
    pub const fn state(&self) -> ListeningState {
        self.state
    }

    /// Run the session until shutdown
    pub async fn run(mut self) {
        tracing::debug!("voice session started");

        loop {
            tokio::select! {
                command = self.commands_rx.recv() => {
                    match command {
                        Some(SessionCommand::ToggleListening) => self.toggle_listening().await,
                        Some(SessionCommand::SubmitNow) => self.submit_current().await,
                        Some(SessionCommand::Shutdown) | None => break,
                    }
                }
                event = self.recognition.next_event() => {
                    self.on_recognition_event(event).await;
                }
                text = self.submitter.fired() => {
                    self.on_silence_timeout(text).await;
                }
                event = self.transport.events.recv(), if self.transport_open => {
                    match event {
                        Some(event) => self.on_transport_event(event).await,
                        None => self.transport_open = false,
                    }
                }
            }
        }

        self.recognition.stop().await;
        tracing::debug!("voice session stopped");
    }

    /// Toggle between `Idle` and listening
    async fn toggle_listening(&mut self) {
        match self.state {
            ListeningState::Idle => {
                self.utterance.reset();
                self.emit(SessionEvent::TranscriptChanged(String::new())).await;

                match self.recognition.start().await {
                    Ok(()) => self.set_state(ListeningState::Listening).await,
                    Err(e) => {
                        tracing::warn!(error = %e, "could not start recognition");
                        self.emit(SessionEvent::RecognitionError(e.to_string())).await;
                    }
                }
            }
            ListeningState::Listening => {
                // the partial utterance is discarded, never submitted later
                self.recognition.stop().await;
                self.submitter.cancel();
                self.utterance.reset();
                self.emit(SessionEvent::TranscriptChanged(String::new())).await;
                self.set_state(ListeningState::Idle).await;
            }
            ListeningState::Restarting => {
                // abandon the pending restart; the Ended we are waiting for
                // will arrive in Idle and be ignored
                self.submitter.cancel();
                self.set_state(ListeningState::Idle).await;
            }
        }
    }

    /// Handle a normalized recognition event
    async fn on_recognition_event(&mut self, event: RecognitionEvent) {
        // Stale-callback guard: a session that is shutting down can still
        // deliver events after the user toggled off.
        if self.state == ListeningState::Idle {
            if !matches!(event, RecognitionEvent::Ended) {
                tracing::trace!(?event, "ignoring recognition event while idle");
            }
            return;
        }

        match event {
            RecognitionEvent::Transcript(segments) => {
                self.utterance.apply(&segments);
                let text = self.utterance.current();
                self.emit(SessionEvent::TranscriptChanged(text.clone())).await;

                // the silence timer only runs while actively listening; a
                // session that is restarting already submitted
                if self.state == ListeningState::Listening {
                    self.submitter.notify_activity(&text);
                }
            }
            RecognitionEvent::Ended => match self.state {
                ListeningState::Restarting => match self.recognition.start().await {
                    Ok(()) => self.set_state(ListeningState::Listening).await,
                    Err(e) => {
                        tracing::warn!(error = %e, "restart failed");
                        self.emit(SessionEvent::RecognitionError(e.to_string())).await;
                        self.set_state(ListeningState::Idle).await;
                    }
                },
                ListeningState::Listening => {
                    // the service ended on its own (idle or platform
                    // timeout); it does not self-resume
                    tracing::debug!("recognition ended unexpectedly");
                    self.submitter.cancel();
                    self.set_state(ListeningState::Idle).await;
                }
                ListeningState::Idle => {}
            },
            RecognitionEvent::Error(kind) => {
                self.emit(SessionEvent::RecognitionError(kind.to_string())).await;

                if kind.is_fatal() {
                    tracing::warn!(error = %kind, "fatal recognition error, stopping");
                    self.submitter.cancel();
                    self.recognition.stop().await;
                    self.set_state(ListeningState::Idle).await;
                }
            }
        }
    }

    /// The silence timer fired with the snapshot taken at the last update
    async fn on_silence_timeout(&mut self, text: String) {
        if self.state != ListeningState::Listening {
            return;
        }
        self.finalize_utterance(&text).await;
    }

    /// Manual submission: cancel the timer, submit whatever is accumulated
    async fn submit_current(&mut self) {
        let text = self.submitter.submit_now(self.utterance.current());
        self.finalize_utterance(&text).await;
    }

    /// Turn the pending utterance into a chat message and restart listening
    async fn finalize_utterance(&mut self, text: &str) {
        let trimmed = text.trim();

        self.utterance.reset();
        self.emit(SessionEvent::TranscriptChanged(String::new())).await;

        if trimmed.is_empty() {
            tracing::debug!("empty utterance discarded");
            return;
        }

        let message = self.log.push_user(trimmed).clone();
        self.emit(SessionEvent::MessageAppended(message)).await;

        tracing::info!(utterance = %trimmed, "utterance submitted");
        if self.transport.outgoing.send(trimmed.to_string()).await.is_err() {
            tracing::warn!("chat transport gone, utterance not delivered");
            let error = self.log.push_assistant_error("chat connection closed").clone();
            self.emit(SessionEvent::MessageAppended(error)).await;
        }

        // clear-and-resume: stop the current recognition session and start a
        // fresh one once it reports Ended
        if self.state == ListeningState::Listening {
            self.set_state(ListeningState::Restarting).await;
            self.recognition.stop().await;
        }
    }

    /// Handle a reply-channel event
    async fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Fragment(raw) => {
                let message = self.log.append_assistant_fragment(&raw).clone();
                self.emit(SessionEvent::MessageUpdated(message)).await;

                // playback speaks the raw text; sanitization is a display
                // concern
                if let Some(playback) = &self.playback {
                    if let Some(segment) = self.segmenter.feed(&raw) {
                        playback.enqueue(segment).await;
                    }
                }
            }
            TransportEvent::Closed => {
                self.log.close_assistant();
                if let Some(playback) = &self.playback {
                    if let Some(rest) = self.segmenter.take_remainder() {
                        playback.enqueue(rest).await;
                    }
                } else {
                    self.segmenter.reset();
                }
            }
            TransportEvent::Failed(error) => {
                tracing::warn!(error = %error, "chat transport failure");
                self.segmenter.reset();
                let message = self.log.push_assistant_error(&error).clone();
                self.emit(SessionEvent::MessageAppended(message)).await;
            }
        }
    }

    async fn set_state(&mut self, state: ListeningState) {
        if self.state != state {
            tracing::debug!(from = ?self.state, to = ?state, "listening state change");
            self.state = state;
            self.emit(SessionEvent::ListeningChanged(state)).await;
        }
    }

    async fn emit(&self, event: SessionEvent) {
        // a detached rendering surface is not an error
        let _ = self.events_tx.send(event).await;
    }
}
