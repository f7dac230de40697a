//! Microphone capture feeding the live recognition backend

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use tokio::sync::mpsc;

use super::deepgram::AudioChunk;
use crate::{Error, Result};

/// Sample rate for speech capture (16kHz mono)
pub const SAMPLE_RATE: u32 = 16000;

/// Captures audio from the default input device and pushes PCM16 chunks
/// into the recognition audio channel
pub struct MicCapture {
    #[allow(dead_code)]
    device: Device,
    config: StreamConfig,
    chunks: mpsc::Sender<AudioChunk>,
    stream: Option<Stream>,
}

impl MicCapture {
    /// Create a capture instance for the default input device
    ///
    /// # Errors
    ///
    /// Returns error if no suitable input device or config is available.
    pub fn new(chunks: mpsc::Sender<AudioChunk>) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .ok_or_else(|| Error::Audio("no suitable input config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            channels = config.channels,
            "microphone capture initialized"
        );

        Ok(Self {
            device,
            config,
            chunks,
            stream: None,
        })
    }

    /// Start capturing
    ///
    /// Chunks are converted to PCM16 in the audio callback and handed to the
    /// channel without blocking; chunks are dropped if the consumer falls
    /// behind.
    ///
    /// # Errors
    ///
    /// Returns error if the input stream cannot be opened.
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let chunks = self.chunks.clone();
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device".to_string()))?;

        let config = self.config.clone();

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if chunks.try_send(pcm16_bytes(data)).is_err() {
                        tracing::trace!("recognition backpressure, dropping audio chunk");
                    }
                },
                |err| {
                    tracing::error!(error = %err, "microphone capture error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("microphone capture started");
        Ok(())
    }

    /// Stop capturing
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("microphone capture stopped");
        }
    }

    /// Check if currently capturing
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }
}

/// Convert f32 samples to little-endian PCM16 bytes
#[must_use]
pub fn pcm16_bytes(samples: &[f32]) -> AudioChunk {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        #[allow(clippy::cast_possible_truncation)]
        let value = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}
