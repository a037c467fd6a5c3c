//! PCM codec: normalized float samples <-> 16-bit little-endian bytes,
//! plus the base64 helpers used by the streaming wire format.
//!
//! Pure functions, no side effects, safe to call from any thread.

use base64::{engine::general_purpose, Engine as _};

use crate::error::AudioError;

/// Microphone capture rate expected by the streaming voice service.
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of synthesized speech returned by the service.
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// A block of normalized mono float samples at a fixed sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Wire-format unit exchanged with the streaming voice service:
/// base64-encoded 16-bit PCM plus a mime descriptor carrying the rate.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBlob {
    pub data: String,
    pub mime_type: String,
}

impl PcmBlob {
    /// Encode a float frame into the wire format.
    pub fn from_samples(samples: &[f32], sample_rate: u32) -> Self {
        Self {
            data: bytes_to_base64(&float_to_pcm16(samples)),
            mime_type: format!("audio/pcm;rate={sample_rate}"),
        }
    }
}

/// Convert normalized floats in [-1, 1] to little-endian 16-bit PCM.
///
/// Each sample maps to `round(s * 32768)`. Out-of-range input clamps to
/// the i16 range; letting it wrap would turn a mild clip into a
/// full-scale pop.
pub fn float_to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let scaled = (f64::from(s) * 32768.0).round();
        let v = scaled.clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16;
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode little-endian 16-bit PCM bytes into normalized floats.
/// Fails on odd-length input.
pub fn pcm16_to_float(bytes: &[u8], sample_rate: u32) -> Result<AudioBuffer, AudioError> {
    if bytes.len() % 2 != 0 {
        return Err(AudioError::MalformedAudio(bytes.len()));
    }
    let samples = bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / 32768.0)
        .collect();
    Ok(AudioBuffer {
        samples,
        sample_rate,
    })
}

pub fn bytes_to_base64(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}

pub fn base64_to_bytes(data: &str) -> Result<Vec<u8>, AudioError> {
    Ok(general_purpose::STANDARD.decode(data)?)
}
