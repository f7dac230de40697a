//! Debounced utterance submission
//!
//! A single-shot silence timer: every transcript update re-arms it, and it
//! fires with the text snapshot taken at the last update. At most one
//! schedule exists at a time; re-arming strictly supersedes the previous
//! deadline, so overlapping or duplicate fires cannot happen.

use std::time::Duration;

use tokio::time::Instant;

/// A pending submission
#[derive(Debug)]
struct Pending {
    deadline: Instant,
    text: String,
}

/// Silence-triggered submission timer
#[derive(Debug)]
pub struct DebouncedSubmitter {
    timeout: Duration,
    pending: Option<Pending>,
}

impl DebouncedSubmitter {
    /// Create a submitter with the given silence timeout
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            pending: None,
        }
    }

    /// Record activity: re-arm the timer and snapshot the current text
    ///
    /// The snapshot is what [`fired`] eventually yields; later mutations of
    /// the caller's text do not leak into an armed schedule.
    ///
    /// [`fired`]: DebouncedSubmitter::fired
    pub fn notify_activity(&mut self, current_text: &str) {
        self.pending = Some(Pending {
            deadline: Instant::now() + self.timeout,
            text: current_text.to_string(),
        });
    }

    /// Drop any pending schedule without firing
    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// Cancel the pending schedule and hand back `text` for the synchronous
    /// submission path
    #[must_use]
    pub fn submit_now(&mut self, text: impl Into<String>) -> String {
        self.pending = None;
        text.into()
    }

    /// Whether a submission is currently scheduled
    #[must_use]
    pub const fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Resolve with the snapshot once the silence deadline elapses
    ///
    /// Pending forever while nothing is scheduled, so it can sit in a
    /// `tokio::select!` arm. Cancel-safe: dropping the future leaves the
    /// schedule intact; the snapshot is only consumed when the deadline is
    /// actually reached.
    pub async fn fired(&mut self) -> String {
        let Some(deadline) = self.pending.as_ref().map(|p| p.deadline) else {
            return std::future::pending().await;
        };
        tokio::time::sleep_until(deadline).await;
        self.pending.take().map(|p| p.text).unwrap_or_default()
    }
}
