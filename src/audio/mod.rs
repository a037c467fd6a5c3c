//! Audio signal path: PCM codec, microphone capture and speaker playback.

pub mod capture;
pub mod pcm;
pub mod playback;

pub use pcm::{AudioBuffer, PcmBlob, CAPTURE_SAMPLE_RATE, PLAYBACK_SAMPLE_RATE};
