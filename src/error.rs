//! Error taxonomy shared across the crate.
//!
//! A stale-generation discard is deliberately *not* an error anywhere: work
//! that lost the race exits silently. Everything else converges on a
//! user-visible status field at the component that issued the call.

use thiserror::Error;

/// Failures from the external translation/speech service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Network or backend failure from any service call.
    #[error("translation service request failed: {0}")]
    Network(String),

    /// Structured response missing required fields or failing to parse.
    #[error("translation service returned a malformed response: {0}")]
    MalformedResponse(String),

    /// Speech synthesis completed but carried no audio payload.
    #[error("speech synthesis returned no audio data")]
    NoAudioData,
}

/// Codec-level failures. These indicate a protocol mismatch with the
/// service; callers surface them as service failures but log them
/// distinctly for diagnosis.
#[derive(Debug, Error)]
pub enum AudioError {
    /// 16-bit PCM requires an even byte count.
    #[error("PCM payload has odd byte length {0}")]
    MalformedAudio(usize),

    /// Invalid base64 alphabet or padding.
    #[error("invalid base64 audio payload: {0}")]
    Decode(#[from] base64::DecodeError),
}

impl From<AudioError> for ServiceError {
    fn from(err: AudioError) -> Self {
        ServiceError::MalformedResponse(format!("audio decode: {err}"))
    }
}

/// Failures specific to the live voice session.
#[derive(Debug, Error)]
pub enum VoiceError {
    /// Capture-device access denied or no device available. Surfaced
    /// distinctly so the UI can point at microphone permissions.
    #[error("capture device unavailable: {0}")]
    Permission(String),

    #[error(transparent)]
    Service(#[from] ServiceError),
}
