//! voxchat - Voice chat session engine
//!
//! This library coordinates a continuous speech-recognition stream, a
//! silence-triggered submission timer, a stateful chat session, and an
//! ordered audio-playback queue:
//! - Speech recognition (live STT over an external service)
//! - Debounced utterance submission
//! - Chat transport (request/response or streaming socket)
//! - Sentence-segmented speech synthesis with strictly ordered playback
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                  Rendering surface                    │
//! │        transcript  │  chat log  │  state events       │
//! └──────────────────────────▲───────────────────────────┘
//!                            │ SessionEvent
//! ┌──────────────────────────┴───────────────────────────┐
//! │                    VoiceSession                       │
//! │  ListeningState  │  silence timer  │  chat log        │
//! └──┬──────────────────────┬─────────────────────────┬──┘
//!    │                      │                         │
//! ┌──▼──────────┐   ┌───────▼────────┐   ┌────────────▼──┐
//! │ Recognition │   │ Chat transport │   │ Playback queue │
//! │ (live STT)  │   │ (HTTP/socket)  │   │ (TTS + audio)  │
//! └─────────────┘   └────────────────┘   └───────────────┘
//! ```

pub mod chat;
pub mod config;
pub mod debounce;
pub mod error;
pub mod recognition;
pub mod session;
pub mod speech;

pub use chat::{ChatConnection, ChatLog, ChatMessage, Sender, TransportError, TransportEvent};
pub use config::{ChatMode, Config};
pub use debounce::DebouncedSubmitter;
pub use error::{Error, Result};
pub use recognition::{
    RecognitionBackend, RecognitionErrorKind, RecognitionEvent, RecognitionSession,
    TranscriptAccumulator, TranscriptSegment,
};
pub use session::{ListeningState, SessionCommand, SessionEvent, SessionHandle, VoiceSession};
pub use speech::{
    AudioClip, AudioSink, PlaybackHandle, PlaybackQueue, SentenceSegmenter, SpeechSynthesizer,
    SynthesisClient,
};
