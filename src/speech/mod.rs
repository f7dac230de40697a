//! Speech synthesis and ordered playback
//!
//! Reply text is segmented at sentence boundaries, synthesized through an
//! external TTS service, and played strictly one clip at a time in sentence
//! order, however the synthesis fetches happen to complete.

mod output;
mod queue;
mod segment;
mod synth;

pub use output::CpalSink;
pub use queue::{PlaybackHandle, PlaybackQueue};
pub use segment::SentenceSegmenter;
pub use synth::SpeechSynthesizer;

use async_trait::async_trait;

use crate::Result;

/// A synthesized audio clip together with its source sentence
///
/// Ownership moves from the synthesis fetch into the playback queue, then to
/// the player, and the clip is dropped once playback completes.
#[derive(Debug, Clone)]
pub struct AudioClip {
    /// The sentence this clip speaks
    pub text: String,

    /// Encoded audio bytes (MP3)
    pub audio: Vec<u8>,
}

/// Converts text into audio
#[async_trait]
pub trait SynthesisClient: Send + Sync {
    /// Synthesize one text segment
    ///
    /// # Errors
    ///
    /// Returns error if the synthesis service fails.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

/// Plays one clip to completion
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Play a clip, returning once it has finished
    ///
    /// # Errors
    ///
    /// Returns error if the audio device fails; the queue logs it and moves
    /// on to the next clip either way.
    async fn play(&self, clip: &AudioClip) -> Result<()>;
}
