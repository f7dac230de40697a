//! Shared test utilities

// not every test binary uses every helper
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use voxchat::chat::{ChatConnection, TransportEvent};
use voxchat::{RecognitionBackend, RecognitionEvent, Result};

/// A scripted recognition backend: tests drive its event stream by hand
pub struct FakeRecognition {
    shared: Arc<RecognitionShared>,
}

/// Remote control for a [`FakeRecognition`] owned by a running session
#[derive(Clone)]
pub struct RecognitionRemote {
    shared: Arc<RecognitionShared>,
}

#[derive(Default)]
struct RecognitionShared {
    starts: AtomicUsize,
    stops: AtomicUsize,
    events: Mutex<Option<mpsc::Sender<RecognitionEvent>>>,
}

/// Build a fake backend and its remote control
#[must_use]
pub fn fake_recognition() -> (FakeRecognition, RecognitionRemote) {
    let shared = Arc::new(RecognitionShared::default());
    (
        FakeRecognition {
            shared: Arc::clone(&shared),
        },
        RecognitionRemote { shared },
    )
}

#[async_trait]
impl RecognitionBackend for FakeRecognition {
    async fn start(&mut self, events: mpsc::Sender<RecognitionEvent>) -> Result<()> {
        self.shared.starts.fetch_add(1, Ordering::SeqCst);
        *self.shared.events.lock().unwrap() = Some(events);
        Ok(())
    }

    async fn stop(&mut self) {
        // asynchronous contract: no Ended here, the test decides when the
        // service actually terminates
        self.shared.stops.fetch_add(1, Ordering::SeqCst);
    }
}

impl RecognitionRemote {
    /// Deliver an event as if it came from the recognition service
    ///
    /// Waits for the session to have started the backend at least once.
    pub async fn emit(&self, event: RecognitionEvent) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let sender = self.shared.events.lock().unwrap().clone();
            if let Some(tx) = sender {
                tx.send(event).await.expect("session dropped its events");
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "backend was never started"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Number of `start` calls observed
    #[must_use]
    pub fn starts(&self) -> usize {
        self.shared.starts.load(Ordering::SeqCst)
    }

    /// Number of `stop` calls observed
    #[must_use]
    pub fn stops(&self) -> usize {
        self.shared.stops.load(Ordering::SeqCst)
    }
}

/// An in-test chat backend: collects submitted utterances, injects events
pub struct FakeTransport {
    /// Utterances the session submitted
    pub submitted: mpsc::Receiver<String>,

    /// Inject reply fragments / closure / failures
    pub events: mpsc::Sender<TransportEvent>,
}

/// Build a test transport and the connection half the session owns
#[must_use]
pub fn fake_transport() -> (ChatConnection, FakeTransport) {
    let (outgoing_tx, outgoing_rx) = mpsc::channel(32);
    let (events_tx, events_rx) = mpsc::channel(32);
    (
        ChatConnection::from_parts(outgoing_tx, events_rx),
        FakeTransport {
            submitted: outgoing_rx,
            events: events_tx,
        },
    )
}

/// Receive with a deadline, panicking on timeout
pub async fn recv_within<T: std::fmt::Debug>(
    rx: &mut mpsc::Receiver<T>,
    what: &str,
) -> T {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
        .unwrap_or_else(|| panic!("channel closed waiting for {what}"))
}
