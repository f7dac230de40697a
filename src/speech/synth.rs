//! Text-to-speech over the ElevenLabs API

use async_trait::async_trait;

use super::SynthesisClient;
use crate::config::SpeechConfig;
use crate::{Error, Result};

/// Synthesis endpoint root
const TTS_URL: &str = "https://api.elevenlabs.io/v1/text-to-speech";

/// Synthesizes speech from text
pub struct SpeechSynthesizer {
    client: reqwest::Client,
    api_key: String,
    voice_id: String,
    model_id: String,
}

impl SpeechSynthesizer {
    /// Create a synthesizer from configuration
    ///
    /// # Errors
    ///
    /// Returns error if no API key is configured.
    pub fn new(config: &SpeechConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| Error::Config("ElevenLabs API key required for speech".to_string()))?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice_id: config.voice_id.clone(),
            model_id: config.model_id.clone(),
        })
    }
}

#[async_trait]
impl SynthesisClient for SpeechSynthesizer {
    /// Synthesize one text segment to MP3 bytes
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
        }

        let url = format!("{TTS_URL}/{}", self.voice_id);

        let request = TtsRequest {
            text,
            model_id: &self.model_id,
        };

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!(
                "ElevenLabs error {status}: {body}"
            )));
        }

        let audio = response.bytes().await?;
        tracing::debug!(text_len = text.len(), audio_bytes = audio.len(), "segment synthesized");
        Ok(audio.to_vec())
    }
}
