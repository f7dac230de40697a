//! Request/response chat transport
//!
//! One `POST /api/chat/message` per utterance; the complete reply is
//! delivered as a single fragment.

use serde::{Deserialize, Serialize};

use super::{ChatConnection, TransportError, TransportEvent};

/// Request body for the message endpoint
#[derive(Serialize)]
struct MessageRequest<'a> {
    message: &'a str,
}

/// Response body from the message endpoint
#[derive(Deserialize)]
struct MessageResponse {
    reply: String,
}

/// Connect to an HTTP chat backend
///
/// Spawns the transport task; the connection is "open" immediately and the
/// first request is made lazily.
#[must_use]
pub fn connect(url: String) -> ChatConnection {
    let (connection, mut outgoing_rx, events_tx) = ChatConnection::channels();
    let client = reqwest::Client::new();

    tokio::spawn(async move {
        while let Some(utterance) = outgoing_rx.recv().await {
            let event = match send_message(&client, &url, &utterance).await {
                Ok(reply) => TransportEvent::Fragment(reply),
                Err(error) => {
                    tracing::warn!(error = %error, "chat request failed");
                    TransportEvent::Failed(error)
                }
            };

            if events_tx.send(event).await.is_err() {
                break;
            }
        }

        let _ = events_tx.send(TransportEvent::Closed).await;
        tracing::debug!("http chat transport closed");
    });

    connection
}

/// Send one utterance and return the complete reply text
async fn send_message(
    client: &reqwest::Client,
    url: &str,
    message: &str,
) -> Result<String, TransportError> {
    let response = client
        .post(url)
        .json(&MessageRequest { message })
        .send()
        .await
        .map_err(|e| TransportError::Network(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(TransportError::Server {
            status: status.as_u16(),
            message: body,
        });
    }

    let parsed: MessageResponse = response
        .json()
        .await
        .map_err(|e| TransportError::Network(e.to_string()))?;

    Ok(parsed.reply)
}
