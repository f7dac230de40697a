//! Deepgram live transcription backend
//!
//! Streams PCM16 audio over a WebSocket to Deepgram's `/v1/listen` endpoint
//! and maps its result frames onto [`RecognitionEvent`]s. The connection is
//! configured continuous with interim results; Deepgram ends the socket on
//! its own after extended silence, which surfaces as a normal `Ended`.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{Message, http};

use super::{RecognitionBackend, RecognitionErrorKind, RecognitionEvent, TranscriptSegment};
use crate::config::RecognitionConfig;
use crate::{Error, Result};

/// Live transcription endpoint
const LISTEN_URL: &str = "wss://api.deepgram.com/v1/listen";

/// Buffer size for the microphone chunk channel
const AUDIO_CHANNEL_CAPACITY: usize = 256;

/// Keepalive cadence while no audio is flowing
const KEEPALIVE_SECS: u64 = 5;

/// A chunk of little-endian PCM16 audio bytes
pub type AudioChunk = Vec<u8>;

/// Result frame from the live API
#[derive(Deserialize)]
struct ResultsFrame {
    #[serde(default)]
    channel: Option<ResultsChannel>,
    #[serde(default)]
    is_final: bool,
}

#[derive(Deserialize)]
struct ResultsChannel {
    alternatives: Vec<ResultsAlternative>,
}

#[derive(Deserialize)]
struct ResultsAlternative {
    transcript: String,
}

/// Create the audio channel that feeds a [`DeepgramBackend`]
#[must_use]
pub fn audio_channel() -> (mpsc::Sender<AudioChunk>, mpsc::Receiver<AudioChunk>) {
    mpsc::channel(AUDIO_CHANNEL_CAPACITY)
}

/// Continuous recognition over Deepgram's live WebSocket API
pub struct DeepgramBackend {
    config: RecognitionConfig,
    api_key: String,
    audio_rx: Arc<Mutex<mpsc::Receiver<AudioChunk>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl DeepgramBackend {
    /// Create a backend reading microphone chunks from `audio_rx`
    ///
    /// # Errors
    ///
    /// Returns error if no API key is configured.
    pub fn new(config: RecognitionConfig, audio_rx: mpsc::Receiver<AudioChunk>) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| Error::Config("Deepgram API key required".to_string()))?;

        Ok(Self {
            config,
            api_key,
            audio_rx: Arc::new(Mutex::new(audio_rx)),
            shutdown_tx: None,
        })
    }

    /// Build the listen URL with the session's configuration flags
    fn listen_url(&self) -> String {
        format!(
            "{LISTEN_URL}?model={}&language={}&encoding=linear16&sample_rate={}&interim_results={}&punctuate=true",
            urlencoding::encode(&self.config.model),
            urlencoding::encode(&self.config.language),
            self.config.sample_rate,
            self.config.interim_results,
        )
    }
}

#[async_trait]
impl RecognitionBackend for DeepgramBackend {
    async fn start(&mut self, events: mpsc::Sender<RecognitionEvent>) -> Result<()> {
        let mut request = self
            .listen_url()
            .into_client_request()
            .map_err(|e| Error::Recognition(e.to_string()))?;
        request.headers_mut().insert(
            http::header::AUTHORIZATION,
            http::HeaderValue::from_str(&format!("Token {}", self.api_key))
                .map_err(|e| Error::Recognition(e.to_string()))?,
        );

        let (stream, _) = connect_async(request)
            .await
            .map_err(|e| Error::Recognition(format!("Deepgram connect failed: {e}")))?;

        tracing::debug!(
            model = %self.config.model,
            sample_rate = self.config.sample_rate,
            interim_results = self.config.interim_results,
            "deepgram session established"
        );

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        self.shutdown_tx = Some(shutdown_tx);

        let audio_rx = Arc::clone(&self.audio_rx);
        tokio::spawn(async move {
            run_connection(stream, audio_rx, shutdown_rx, events).await;
        });

        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
    }
}

/// Pump audio out and result frames in until the socket terminates
async fn run_connection(
    stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    audio_rx: Arc<Mutex<mpsc::Receiver<AudioChunk>>>,
    mut shutdown_rx: mpsc::Receiver<()>,
    events: mpsc::Sender<RecognitionEvent>,
) {
    let (mut sink, mut source) = stream.split();
    let mut audio = audio_rx.lock().await;

    // discard audio buffered while no session was consuming it
    while audio.try_recv().is_ok() {}

    let mut keepalive = tokio::time::interval(std::time::Duration::from_secs(KEEPALIVE_SECS));
    let mut audio_open = true;
    let mut closing = false;

    loop {
        tokio::select! {
            chunk = audio.recv(), if audio_open && !closing => {
                match chunk {
                    Some(bytes) => {
                        if sink.send(Message::Binary(bytes.into())).await.is_err() {
                            break;
                        }
                    }
                    None => audio_open = false,
                }
            }
            _ = shutdown_rx.recv(), if !closing => {
                closing = true;
                let close = Message::Text(r#"{"type":"CloseStream"}"#.into());
                if sink.send(close).await.is_err() {
                    break;
                }
            }
            _ = keepalive.tick(), if !closing => {
                let ping = Message::Text(r#"{"type":"KeepAlive"}"#.into());
                if sink.send(ping).await.is_err() {
                    break;
                }
            }
            message = source.next() => {
                match message {
                    Some(Ok(Message::Text(raw))) => {
                        if let Some(event) = parse_frame(&raw) {
                            if events.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "deepgram socket error");
                        let kind = RecognitionErrorKind::Network(e.to_string());
                        let _ = events.send(RecognitionEvent::Error(kind)).await;
                        break;
                    }
                }
            }
        }
    }

    let _ = events.send(RecognitionEvent::Ended).await;
    tracing::debug!("deepgram session ended");
}

/// Map one text frame to a recognition event, if it carries anything
fn parse_frame(raw: &str) -> Option<RecognitionEvent> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;

    match value.get("type").and_then(|t| t.as_str()) {
        Some("Results") => {
            let frame: ResultsFrame = serde_json::from_value(value).ok()?;
            let transcript = frame
                .channel?
                .alternatives
                .into_iter()
                .next()
                .map(|alt| alt.transcript)?;

            // Silence windows come back as empty results; nothing to report.
            if transcript.is_empty() {
                return None;
            }

            let segment = TranscriptSegment {
                text: transcript,
                is_final: frame.is_final,
            };
            Some(RecognitionEvent::Transcript(vec![segment]))
        }
        Some("Error") => {
            let message = value
                .get("description")
                .or_else(|| value.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error")
                .to_string();
            Some(RecognitionEvent::Error(RecognitionErrorKind::Service(
                message,
            )))
        }
        _ => None,
    }
}
