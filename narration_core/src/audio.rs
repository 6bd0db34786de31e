//! WAV helpers for locally produced clips and duration measurement.
//!
//! Provider payloads are otherwise opaque; only WAV carries a header we can
//! read a duration from without decoding.
use std::io::Cursor;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tracing::debug;

use crate::frame::Frame;
use crate::scheduler::{PlaybackSink, SchedulerConfig};
use crate::{SpeechSynthesizer, Voice};

/// Encode mono f32 samples as 16-bit PCM WAV bytes.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> anyhow::Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    // header (44 bytes) + 2 bytes per sample
    let mut cursor = Cursor::new(Vec::<u8>::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).context("wav header")?;
        const I16_MAX_F32: f32 = i16::MAX as f32;
        for &s in samples {
            let v = (s.clamp(-1.0, 1.0) * I16_MAX_F32) as i16;
            writer.write_sample(v).context("wav sample")?;
        }
        writer.finalize().context("wav finalize")?;
    }
    Ok(cursor.into_inner())
}

/// A silent clip of the given length.
pub fn silence_wav(duration: Duration, sample_rate: u32) -> anyhow::Result<Vec<u8>> {
    let n = (duration.as_secs_f64() * sample_rate as f64).round() as usize;
    encode_wav(&vec![0.0; n], sample_rate)
}

/// Playback length of a WAV payload, or `None` if the bytes are not WAV.
pub fn clip_duration(bytes: &[u8]) -> Option<Duration> {
    let reader = hound::WavReader::new(Cursor::new(bytes)).ok()?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return None;
    }
    // `duration()` counts frames, i.e. samples per channel
    let frames = reader.duration() as f64;
    Some(Duration::from_secs_f64(frames / spec.sample_rate as f64))
}

/// MIME type sniffed from the payload header.
pub fn sniff_content_type(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(b"RIFF") && bytes.get(8..12) == Some(b"WAVE".as_slice()) {
        "audio/wav"
    } else if bytes.starts_with(b"ID3") || bytes.starts_with(&[0xFF, 0xFB]) || bytes.starts_with(&[0xFF, 0xF3]) {
        "audio/mpeg"
    } else if bytes.starts_with(b"OggS") {
        "audio/ogg"
    } else {
        "application/octet-stream"
    }
}

/// Offline provider producing silent WAV clips sized to the text, for running
/// without provider credentials.
#[derive(Debug, Clone)]
pub struct SilentSynthesizer {
    per_char: Duration,
    sample_rate: u32,
}

impl SilentSynthesizer {
    pub fn new(per_char: Duration, sample_rate: u32) -> Self {
        Self { per_char, sample_rate }
    }
}

impl Default for SilentSynthesizer {
    fn default() -> Self {
        Self::new(Duration::from_millis(60), 8_000)
    }
}

#[async_trait]
impl SpeechSynthesizer for SilentSynthesizer {
    async fn synthesize(&self, text: &str, _voice: Voice) -> anyhow::Result<Vec<u8>> {
        let chars = text.chars().count().max(1) as u32;
        silence_wav(self.per_char * chars, self.sample_rate)
    }

    fn content_type(&self) -> &'static str {
        "audio/wav"
    }
}

/// A sink with no audio device: each frame takes as long as its clip would
/// play. Payloads without a readable duration count as
/// [`SchedulerConfig::DEFAULT_CHUNK_ESTIMATE`].
#[derive(Debug, Clone)]
pub struct SimulatedSink {
    fallback: Duration,
}

impl SimulatedSink {
    pub fn new() -> Self {
        Self::with_fallback(SchedulerConfig::DEFAULT_CHUNK_ESTIMATE)
    }

    pub fn with_fallback(fallback: Duration) -> Self {
        Self { fallback }
    }

    pub fn playback_time(&self, audio: &[u8]) -> Duration {
        clip_duration(audio).unwrap_or(self.fallback)
    }
}

impl Default for SimulatedSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlaybackSink for SimulatedSink {
    async fn play(&self, frame: Frame) -> anyhow::Result<()> {
        let length = self.playback_time(&frame.audio);
        debug!(index = frame.index, ms = length.as_millis() as u64, "Simulating chunk playback");
        tokio::time::sleep(length).await;
        Ok(())
    }

    // playback is the pending sleep, which the scheduler drops on cancel
    fn stop(&self) {}
}
