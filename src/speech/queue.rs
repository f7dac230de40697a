//! Ordered audio playback queue
//!
//! Segments are numbered at enqueue time and synthesized concurrently, but
//! playback is strictly FIFO by enqueue order: completions land in a reorder
//! buffer and a clip only plays once every earlier sequence is resolved.
//! At most one clip is ever active; when it finishes (or fails) the queue
//! advances on its own. A failed synthesis is logged, its slot is skipped,
//! and later segments are unaffected.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{AudioClip, AudioSink, SynthesisClient};

/// Buffer size for the queue's channels
const QUEUE_CHANNEL_CAPACITY: usize = 64;

/// Completion reports from fetch and playback tasks
enum Completion {
    /// A synthesis fetch resolved; `None` means it failed and the slot is
    /// skipped
    FetchDone { seq: u64, clip: Option<AudioClip> },

    /// The active clip finished (successfully or not)
    PlaybackDone,
}

/// Handle for feeding the playback queue
#[derive(Clone)]
pub struct PlaybackHandle {
    tx: mpsc::Sender<String>,
}

impl PlaybackHandle {
    /// Queue a text segment for synthesis and ordered playback
    pub async fn enqueue(&self, segment: impl Into<String>) {
        if self.tx.send(segment.into()).await.is_err() {
            tracing::warn!("playback queue is gone, segment dropped");
        }
    }
}

/// The queue worker; owns all ordering state
pub struct PlaybackQueue {
    synthesis: Arc<dyn SynthesisClient>,
    sink: Arc<dyn AudioSink>,
    enqueue_rx: mpsc::Receiver<String>,
    done_tx: mpsc::Sender<Completion>,
    done_rx: mpsc::Receiver<Completion>,

    /// Sequence number handed to the next enqueued segment
    next_enqueue_seq: u64,

    /// Lowest sequence that has not yet been played or skipped
    next_play_seq: u64,

    /// Resolved fetches waiting for their turn
    ready: BTreeMap<u64, Option<AudioClip>>,

    /// Synthesis fetches still outstanding
    fetches_in_flight: usize,

    /// Whether a clip is currently playing
    playing: bool,
}

impl PlaybackQueue {
    /// Create a queue over a synthesis client and an audio sink
    #[must_use]
    pub fn new(
        synthesis: Arc<dyn SynthesisClient>,
        sink: Arc<dyn AudioSink>,
    ) -> (Self, PlaybackHandle) {
        let (enqueue_tx, enqueue_rx) = mpsc::channel(QUEUE_CHANNEL_CAPACITY);
        let (done_tx, done_rx) = mpsc::channel(QUEUE_CHANNEL_CAPACITY);
        let queue = Self {
            synthesis,
            sink,
            enqueue_rx,
            done_tx,
            done_rx,
            next_enqueue_seq: 0,
            next_play_seq: 0,
            ready: BTreeMap::new(),
            fetches_in_flight: 0,
            playing: false,
        };
        (queue, PlaybackHandle { tx: enqueue_tx })
    }

    /// Spawn the queue worker
    ///
    /// The worker drains outstanding work and stops once every handle is
    /// dropped.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        let mut accepting = true;

        loop {
            tokio::select! {
                segment = self.enqueue_rx.recv(), if accepting => {
                    match segment {
                        Some(text) => self.start_fetch(text),
                        None => accepting = false,
                    }
                }
                Some(done) = self.done_rx.recv() => {
                    match done {
                        Completion::FetchDone { seq, clip } => {
                            self.fetches_in_flight -= 1;
                            self.ready.insert(seq, clip);
                            self.advance();
                        }
                        Completion::PlaybackDone => {
                            self.playing = false;
                            self.advance();
                        }
                    }
                }
            }

            let drained =
                !accepting && !self.playing && self.fetches_in_flight == 0 && self.ready.is_empty();
            if drained {
                break;
            }
        }

        tracing::debug!("playback queue stopped");
    }

    /// Assign the next sequence number and spawn the synthesis fetch
    fn start_fetch(&mut self, segment: String) {
        let seq = self.next_enqueue_seq;
        self.next_enqueue_seq += 1;
        self.fetches_in_flight += 1;

        let synthesis = Arc::clone(&self.synthesis);
        let tx = self.done_tx.clone();
        tokio::spawn(async move {
            let clip = match synthesis.synthesize(&segment).await {
                Ok(audio) => Some(AudioClip {
                    text: segment,
                    audio,
                }),
                Err(e) => {
                    // dropped, never retried; later segments are unaffected
                    tracing::warn!(error = %e, seq, "synthesis failed, dropping segment");
                    None
                }
            };
            let _ = tx.send(Completion::FetchDone { seq, clip }).await;
        });
    }

    /// Play the next in-order clip if nothing is active
    ///
    /// No-op while a clip is playing or while the head-of-line fetch is
    /// still outstanding; skipped slots are consumed without playing.
    fn advance(&mut self) {
        while !self.playing {
            match self.ready.remove(&self.next_play_seq) {
                Some(Some(clip)) => {
                    self.next_play_seq += 1;
                    self.playing = true;
                    self.start_playback(clip);
                }
                Some(None) => {
                    self.next_play_seq += 1;
                }
                None => break,
            }
        }
    }

    /// Hand the clip to the sink; completion re-enters [`advance`]
    ///
    /// [`advance`]: PlaybackQueue::advance
    fn start_playback(&self, clip: AudioClip) {
        let sink = Arc::clone(&self.sink);
        let tx = self.done_tx.clone();
        tokio::spawn(async move {
            tracing::debug!(text = %clip.text, "playing clip");
            if let Err(e) = sink.play(&clip).await {
                tracing::warn!(error = %e, "clip playback failed");
            }
            let _ = tx.send(Completion::PlaybackDone).await;
        });
    }
}
