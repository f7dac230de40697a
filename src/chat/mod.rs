//! Chat backend transport and chat log
//!
//! Two transport modes produce the same shape: a sender for outgoing
//! utterances and a receiver of [`TransportEvent`]s. Reply text arrives as
//! ordered fragments (one whole reply per fragment in HTTP mode) that the
//! session coalesces into the chat log.

mod http;
mod log;
mod socket;

pub use http::connect as connect_http;
pub use log::{ChatLog, ChatMessage, Sender, sanitize};
pub use socket::connect as connect_socket;

use thiserror::Error;
use tokio::sync::mpsc;

/// Buffer size for transport channels
const TRANSPORT_CHANNEL_CAPACITY: usize = 32;

/// A chat backend failure
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Could not reach the backend
    #[error("network error: {0}")]
    Network(String),

    /// The backend answered with an error
    #[error("server error {status}: {message}")]
    Server {
        /// HTTP status (or close code)
        status: u16,
        /// Response body or reason
        message: String,
    },
}

/// Event from the chat backend
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// One ordered fragment of reply text
    Fragment(String),

    /// The reply channel closed; no further fragments will arrive and the
    /// open assistant message must stop coalescing
    Closed,

    /// A send or receive failed; rendered into the chat log, never raised
    Failed(TransportError),
}

/// A live connection to the chat backend
pub struct ChatConnection {
    /// Finalized utterances go here
    pub outgoing: mpsc::Sender<String>,

    /// Reply fragments and lifecycle events come back here
    pub events: mpsc::Receiver<TransportEvent>,
}

impl ChatConnection {
    /// Build a connection from raw channel halves
    ///
    /// Transports use this internally; tests use it to stand in for a
    /// backend without any network.
    #[must_use]
    pub fn from_parts(
        outgoing: mpsc::Sender<String>,
        events: mpsc::Receiver<TransportEvent>,
    ) -> Self {
        Self { outgoing, events }
    }

    /// Create the channel pair a transport task needs
    #[must_use]
    pub(crate) fn channels() -> (
        Self,
        mpsc::Receiver<String>,
        mpsc::Sender<TransportEvent>,
    ) {
        let (outgoing_tx, outgoing_rx) = mpsc::channel(TRANSPORT_CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(TRANSPORT_CHANNEL_CAPACITY);
        (
            Self::from_parts(outgoing_tx, events_rx),
            outgoing_rx,
            events_tx,
        )
    }
}
