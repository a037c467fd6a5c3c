//! Gemini-backed implementation of [`crate::service::TranslationService`].
//!
//! Text translation goes over plain HTTPS (`generateContent` /
//! `streamGenerateContent`); the live voice session and speech synthesis
//! share one blocking WebSocket transport to the Live API
//! (`BidiGenerateContent`).

pub mod client;
mod live;
mod tts;

pub use client::GeminiService;

/// Model for translation and detection calls.
pub(crate) const TEXT_MODEL: &str = "gemini-2.0-flash";

/// Native audio model behind the live voice session and speech synthesis.
pub(crate) const LIVE_MODEL: &str = "gemini-2.5-flash-native-audio-preview-12-2025";
