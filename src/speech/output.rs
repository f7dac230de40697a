//! Speaker output for synthesized clips

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use super::{AudioClip, AudioSink};
use crate::{Error, Result};

/// Sample rate for playback (matches common TTS output)
const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Plays clips on the default output device
///
/// cpal streams are not `Send`, so each clip is decoded and played inside a
/// blocking task that owns its stream for the clip's lifetime.
pub struct CpalSink {
    config: StreamConfig,
}

impl CpalSink {
    /// Create a sink for the default output device
    ///
    /// # Errors
    ///
    /// Returns error if no suitable output device or config is available.
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() <= 2
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self { config })
    }
}

#[async_trait]
impl AudioSink for CpalSink {
    async fn play(&self, clip: &AudioClip) -> Result<()> {
        let samples = decode_mp3(&clip.audio)?;
        if samples.is_empty() {
            return Ok(());
        }

        let config = self.config.clone();
        tokio::task::spawn_blocking(move || play_samples_blocking(&config, samples))
            .await
            .map_err(|e| Error::Audio(format!("playback task failed: {e}")))?
    }
}

/// Play samples to completion on the calling thread
fn play_samples_blocking(config: &StreamConfig, samples: Vec<f32>) -> Result<()> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device".to_string()))?;

    let channels = config.channels as usize;
    let sample_count = samples.len();

    let position = Arc::new(Mutex::new(0usize));
    let finished = Arc::new(Mutex::new(false));
    let samples = Arc::new(samples);

    let cb_samples = Arc::clone(&samples);
    let cb_position = Arc::clone(&position);
    let cb_finished = Arc::clone(&finished);

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut pos = cb_position.lock().unwrap();

                for frame in data.chunks_mut(channels) {
                    let sample = if *pos < cb_samples.len() {
                        let s = cb_samples[*pos];
                        *pos += 1;
                        s
                    } else {
                        *cb_finished.lock().unwrap() = true;
                        0.0
                    };

                    for out in frame.iter_mut() {
                        *out = sample;
                    }
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    // Wait for the callback to run out of samples, bounded by clip length
    let duration_ms = (sample_count as u64 * 1000) / u64::from(PLAYBACK_SAMPLE_RATE);
    let timeout = std::time::Duration::from_millis(duration_ms + 500);
    let start = std::time::Instant::now();

    while !*finished.lock().unwrap() {
        if start.elapsed() > timeout {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(50));
    }

    // Let the device drain the tail of the buffer
    std::thread::sleep(std::time::Duration::from_millis(100));

    drop(stream);
    tracing::debug!(samples = sample_count, "clip playback complete");

    Ok(())
}

/// Decode MP3 bytes to f32 mono samples
fn decode_mp3(mp3_data: &[u8]) -> Result<Vec<f32>> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if frame.channels == 2 {
                    // stereo: average channels
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_rejects_garbage() {
        // minimp3 skips unsyncable junk and yields no frames
        let samples = decode_mp3(&[0x00, 0x01, 0x02, 0x03]).unwrap_or_default();
        assert!(samples.is_empty());
    }
}
