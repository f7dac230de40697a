//! Transcript accumulation
//!
//! Reduces a stream of recognition segments into the current utterance text:
//! the concatenation of every finalized segment so far, plus the latest
//! interim text. Finalized text is never retracted; only the trailing
//! interim portion is replaced on each update.

use super::TranscriptSegment;

/// The pending (not yet submitted) utterance
#[derive(Debug, Clone, Default)]
pub struct TranscriptAccumulator {
    finals: String,
    interim: String,
}

impl TranscriptAccumulator {
    /// Create an empty accumulator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one update batch from the recognition service
    ///
    /// Final segments append to the committed text. The interim tail is
    /// recomputed from the batch: segments that became final stop being
    /// interim, so each batch replaces the previous interim wholesale
    /// (possibly with nothing).
    pub fn apply(&mut self, segments: &[TranscriptSegment]) {
        let mut interim = String::new();
        for segment in segments {
            if segment.is_final {
                self.finals.push_str(&segment.text);
            } else {
                interim.push_str(&segment.text);
            }
        }
        self.interim = interim;
    }

    /// Current display text: finals followed by the interim tail
    #[must_use]
    pub fn current(&self) -> String {
        let mut text = String::with_capacity(self.finals.len() + self.interim.len());
        text.push_str(&self.finals);
        text.push_str(&self.interim);
        text
    }

    /// Whether nothing (not even interim text) has accumulated
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.finals.is_empty() && self.interim.is_empty()
    }

    /// Clear everything; used on submission and on toggle-on
    pub fn reset(&mut self) {
        self.finals.clear();
        self.interim.clear();
    }
}
