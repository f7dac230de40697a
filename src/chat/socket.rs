//! Streaming chat transport
//!
//! A persistent WebSocket to the chat backend: finalized utterances go out
//! as raw text frames; the server streams `{"reply": "..."}` frames back,
//! each one an ordered fragment of the growing assistant message. There is
//! no explicit end-of-reply signal; closure of the socket is the only
//! terminal event.

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::{ChatConnection, TransportError, TransportEvent};
use crate::{Error, Result};

/// Fragment frame from the backend
#[derive(Deserialize)]
struct ReplyFrame {
    reply: String,
}

/// Connect to a WebSocket chat backend
///
/// # Errors
///
/// Returns error if the socket cannot be established.
pub async fn connect(url: String) -> Result<ChatConnection> {
    let (stream, _) = connect_async(url.as_str())
        .await
        .map_err(|e| Error::Transport(format!("chat socket connect failed: {e}")))?;

    tracing::debug!(url = %url, "chat socket connected");

    let (connection, mut outgoing_rx, events_tx) = ChatConnection::channels();
    let (mut sink, mut source) = stream.split();

    tokio::spawn(async move {
        let mut outgoing_open = true;

        loop {
            tokio::select! {
                utterance = outgoing_rx.recv(), if outgoing_open => {
                    match utterance {
                        Some(text) => {
                            if let Err(e) = sink.send(Message::Text(text.into())).await {
                                let error = TransportError::Network(e.to_string());
                                tracing::warn!(error = %error, "chat socket send failed");
                                let _ = events_tx.send(TransportEvent::Failed(error)).await;
                                break;
                            }
                        }
                        None => {
                            outgoing_open = false;
                            let _ = sink.close().await;
                        }
                    }
                }
                frame = source.next() => {
                    match frame {
                        Some(Ok(Message::Text(raw))) => {
                            match serde_json::from_str::<ReplyFrame>(&raw) {
                                Ok(frame) => {
                                    if events_tx
                                        .send(TransportEvent::Fragment(frame.reply))
                                        .await
                                        .is_err()
                                    {
                                        return;
                                    }
                                }
                                Err(e) => {
                                    tracing::warn!(error = %e, "unparseable chat frame dropped");
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            let error = TransportError::Network(e.to_string());
                            tracing::warn!(error = %error, "chat socket receive failed");
                            let _ = events_tx.send(TransportEvent::Failed(error)).await;
                            break;
                        }
                    }
                }
            }
        }

        let _ = events_tx.send(TransportEvent::Closed).await;
        tracing::debug!("chat socket transport closed");
    });

    Ok(connection)
}
