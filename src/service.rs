//! Contract for the external translation/speech backend.
//!
//! The backend is opaque to the core: the orchestrator, voice session and
//! playback pipeline only see these traits. The production implementation
//! lives in [`crate::api`]; tests script their own.

use serde::Deserialize;

use crate::audio::pcm::PcmBlob;
use crate::error::ServiceError;

/// Structured result of a single-shot translation call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationResult {
    pub translated_text: String,
    /// ISO-639-1 code of the detected source language.
    pub detected_language: String,
    /// Detection confidence in [0, 1].
    pub confidence: f64,
}

/// Finite, ordered stream of translation fragments. Fragments concatenate
/// to the full translation; the stream is not restartable.
pub type ChunkStream = Box<dyn Iterator<Item = Result<String, ServiceError>> + Send>;

/// Incoming event on a live voice session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionMessage {
    /// Incremental transcript fragment of the captured speech.
    Transcript(String),
    /// The service finished its current turn.
    TurnComplete,
}

/// Parameters for opening a live voice session.
#[derive(Debug, Clone)]
pub struct VoiceSessionConfig {
    /// Capture sample rate the client will send, in Hz.
    pub sample_rate_hz: u32,
    /// Language hint for transcription ("auto" lets the service decide).
    pub language: String,
}

impl Default for VoiceSessionConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: crate::audio::CAPTURE_SAMPLE_RATE,
            language: crate::orchestrator::AUTO_LANG.to_string(),
        }
    }
}

/// Callbacks fired by a live voice session. All of them may be invoked
/// from the session's reader thread.
pub struct VoiceCallbacks {
    pub on_open: Box<dyn Fn() + Send + Sync>,
    pub on_message: Box<dyn Fn(SessionMessage) + Send + Sync>,
    pub on_error: Box<dyn Fn(ServiceError) + Send + Sync>,
    pub on_close: Box<dyn Fn() + Send + Sync>,
}

/// Handle to an open bidirectional voice session.
pub trait VoiceSessionHandle: Send + Sync {
    /// Forward one encoded audio frame. Fire-and-forget from the caller's
    /// point of view; an error means this frame was dropped.
    fn send(&self, blob: &PcmBlob) -> Result<(), ServiceError>;

    /// Close the session. Idempotent; closing an already-closed session is
    /// a no-op.
    fn close(&self);
}

/// The opaque translation/speech service consumed by the core.
pub trait TranslationService: Send + Sync {
    /// Structured single-shot translation with language detection.
    fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<TranslationResult, ServiceError>;

    /// Streaming translation; fragments arrive in order and concatenate to
    /// the full translation.
    fn translate_stream(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<ChunkStream, ServiceError>;

    /// Whole-document translation. The document arrives pre-encoded as
    /// base64 plus a mime type; parsing the format is the service's job.
    fn translate_document(
        &self,
        base64_content: &str,
        mime_type: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<String, ServiceError>;

    /// Single-shot speech synthesis. Returns raw 16-bit PCM at 24 kHz,
    /// single channel.
    fn synthesize_speech(&self, text: &str) -> Result<Vec<u8>, ServiceError>;

    /// Open a bidirectional voice session.
    fn open_voice_session(
        &self,
        config: VoiceSessionConfig,
        callbacks: VoiceCallbacks,
    ) -> Result<Box<dyn VoiceSessionHandle>, ServiceError>;
}
