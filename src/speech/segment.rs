//! Sentence segmentation over streamed reply text
//!
//! Fragments accumulate in a buffer; whenever the buffer ends in
//! sentence-terminal punctuation the whole buffer is flushed as one playable
//! segment. Text still in the buffer when the reply stream closes is taken
//! with [`SentenceSegmenter::take_remainder`] so trailing words get spoken.

/// Characters that end a sentence
const SENTENCE_TERMINALS: [char; 3] = ['.', '!', '?'];

/// Accumulates reply fragments into sentence-sized segments
#[derive(Debug, Default)]
pub struct SentenceSegmenter {
    buffer: String,
}

impl SentenceSegmenter {
    /// Create an empty segmenter
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one fragment; returns a segment when the buffer now ends a
    /// sentence
    pub fn feed(&mut self, fragment: &str) -> Option<String> {
        self.buffer.push_str(fragment);

        let ends_sentence = self
            .buffer
            .chars()
            .last()
            .is_some_and(|c| SENTENCE_TERMINALS.contains(&c));

        if !ends_sentence {
            return None;
        }

        let segment = std::mem::take(&mut self.buffer);
        let trimmed = segment.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(trimmed.to_string())
    }

    /// Take whatever is buffered when the reply stream ends
    pub fn take_remainder(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let trimmed = rest.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// Discard any buffered text
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flushes_on_terminal_punctuation() {
        let mut seg = SentenceSegmenter::new();
        assert_eq!(seg.feed("Hello "), None);
        assert_eq!(seg.feed("world"), None);
        assert_eq!(seg.feed("."), Some("Hello world.".to_string()));
    }

    #[test]
    fn test_each_terminal_flushes_whole_buffer() {
        let mut seg = SentenceSegmenter::new();
        assert_eq!(seg.feed("One."), Some("One.".to_string()));
        assert_eq!(seg.feed(" Two!"), Some("Two!".to_string()));
        assert_eq!(seg.feed(" Three?"), Some("Three?".to_string()));
    }

    #[test]
    fn test_mid_fragment_terminal_waits_for_trailing_one() {
        // only the *trailing* character decides; a period mid-buffer does
        // not split the segment
        let mut seg = SentenceSegmenter::new();
        assert_eq!(seg.feed("First. Second"), None);
        assert_eq!(
            seg.feed(" part."),
            Some("First. Second part.".to_string())
        );
    }

    #[test]
    fn test_remainder_taken_at_stream_close() {
        let mut seg = SentenceSegmenter::new();
        assert_eq!(seg.feed("Done. And trailing words"), None);
        // wait: trailing char is 's', nothing flushed yet
        assert_eq!(
            seg.take_remainder(),
            Some("Done. And trailing words".to_string())
        );
        assert_eq!(seg.take_remainder(), None);
    }

    #[test]
    fn test_whitespace_only_never_emitted() {
        let mut seg = SentenceSegmenter::new();
        assert_eq!(seg.feed("   "), None);
        assert_eq!(seg.take_remainder(), None);
    }

    #[test]
    fn test_reset_discards_buffer() {
        let mut seg = SentenceSegmenter::new();
        seg.feed("abandoned tail");
        seg.reset();
        assert_eq!(seg.take_remainder(), None);
    }
}
