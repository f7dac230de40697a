//! Speech recognition session
//!
//! Wraps an external continuous recognition service behind
//! [`RecognitionBackend`] and normalizes its event stream: idempotent start,
//! asynchronous stop (termination is only ever signaled by [`RecognitionEvent::Ended`]),
//! and non-fatal `no-speech` errors swallowed before they reach the session.

mod capture;
mod deepgram;
mod transcript;

pub use capture::{MicCapture, pcm16_bytes};
pub use deepgram::{AudioChunk, DeepgramBackend, audio_channel};
pub use transcript::TranscriptAccumulator;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::Result;

/// Buffer size for recognition event channels
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// One transcript segment from the recognition service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptSegment {
    /// Recognized text
    pub text: String,

    /// Whether the service will no longer revise this segment
    pub is_final: bool,
}

impl TranscriptSegment {
    /// Create a finalized segment
    #[must_use]
    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }

    /// Create a provisional (interim) segment
    #[must_use]
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }
}

/// Classified recognition failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionErrorKind {
    /// Silence with no detected speech; never surfaced
    NoSpeech,
    /// Microphone or capture failure; stops the session
    AudioCapture(String),
    /// Authorization rejected by the service; stops the session
    NotAuthorized(String),
    /// Connection-level failure; surfaced, session keeps going
    Network(String),
    /// Service-reported failure; surfaced, session keeps going
    Service(String),
}

impl RecognitionErrorKind {
    /// Whether this kind is the ignorable silence error
    #[must_use]
    pub const fn is_no_speech(&self) -> bool {
        matches!(self, Self::NoSpeech)
    }

    /// Whether this kind forces listening off
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::AudioCapture(_) | Self::NotAuthorized(_))
    }
}

impl std::fmt::Display for RecognitionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoSpeech => write!(f, "no speech detected"),
            Self::AudioCapture(msg) => write!(f, "audio capture failed: {msg}"),
            Self::NotAuthorized(msg) => write!(f, "not authorized: {msg}"),
            Self::Network(msg) => write!(f, "connection failed: {msg}"),
            Self::Service(msg) => write!(f, "recognition service error: {msg}"),
        }
    }
}

/// Event emitted by a recognition backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// New transcript segments (partial or final)
    Transcript(Vec<TranscriptSegment>),

    /// The underlying session terminated. Fired on explicit stop, on the
    /// service's own idle/error timeout, and after a fatal error. The
    /// session does not self-resume; it must be started again.
    Ended,

    /// A recognition failure
    Error(RecognitionErrorKind),
}

/// A continuous speech recognition service
///
/// Backends deliver events through the sender handed to [`start`]. Every
/// terminal condition (stop request honored, service timeout, fatal error)
/// MUST be followed by exactly one [`RecognitionEvent::Ended`].
///
/// [`start`]: RecognitionBackend::start
#[async_trait]
pub trait RecognitionBackend: Send + Sync {
    /// Begin a continuous recognition session
    ///
    /// # Errors
    ///
    /// Returns error if the session cannot be established; no `Ended` event
    /// follows a failed start.
    async fn start(&mut self, events: mpsc::Sender<RecognitionEvent>) -> Result<()>;

    /// Request termination. Asynchronous: completion is signaled by a later
    /// [`RecognitionEvent::Ended`], never synchronously.
    async fn stop(&mut self);
}

/// Owned recognition session with a normalized event stream
///
/// One instance per microphone session, constructed and held by the voice
/// session; no process-wide shared recognizer.
pub struct RecognitionSession {
    backend: Box<dyn RecognitionBackend>,
    events_tx: mpsc::Sender<RecognitionEvent>,
    events_rx: mpsc::Receiver<RecognitionEvent>,
    active: bool,
}

impl RecognitionSession {
    /// Create a session around a backend
    #[must_use]
    pub fn new(backend: Box<dyn RecognitionBackend>) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            backend,
            events_tx,
            events_rx,
            active: false,
        }
    }

    /// Start listening
    ///
    /// Starting while already active is a no-op.
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot establish a session.
    pub async fn start(&mut self) -> Result<()> {
        if self.active {
            tracing::debug!("recognition already active, ignoring start");
            return Ok(());
        }

        self.backend.start(self.events_tx.clone()).await?;
        self.active = true;
        tracing::debug!("recognition session started");
        Ok(())
    }

    /// Request the session to stop
    ///
    /// Termination is signaled later by [`RecognitionEvent::Ended`] from
    /// [`next_event`]; stopping while inactive is a no-op.
    ///
    /// [`next_event`]: RecognitionSession::next_event
    pub async fn stop(&mut self) {
        if !self.active {
            return;
        }
        self.backend.stop().await;
        tracing::debug!("recognition stop requested");
    }

    /// Next normalized event
    ///
    /// `no-speech` errors are swallowed here: they set no error state and do
    /// not stop listening. `Ended` marks the session inactive before it is
    /// returned. Cancel-safe.
    pub async fn next_event(&mut self) -> RecognitionEvent {
        loop {
            // The session keeps its own sender clone, so recv never closes.
            let Some(event) = self.events_rx.recv().await else {
                std::future::pending::<()>().await;
                unreachable!();
            };

            match event {
                RecognitionEvent::Error(kind) if kind.is_no_speech() => {
                    tracing::trace!("ignoring no-speech");
                }
                RecognitionEvent::Ended => {
                    self.active = false;
                    return RecognitionEvent::Ended;
                }
                other => return other,
            }
        }
    }

    /// Whether a session is currently established (or stopping)
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }
}
