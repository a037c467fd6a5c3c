//! Interactive translation client core.
//!
//! This crate implements the request-orchestration and audio-signal pipeline
//! behind a live translation UI: a debounce-and-cancel state machine that
//! issues streaming translation requests while the user types, a bounded
//! undo/redo edit history, a live voice session that streams microphone
//! audio to a transcription service, and text-to-speech playback.
//!
//! The external translation/speech backend is abstracted behind
//! [`service::TranslationService`]; a Gemini-backed implementation lives in
//! [`api`]. Rendering, shortcuts and document parsing are out of scope.

pub mod api;
pub mod audio;
pub mod config;
pub mod error;
pub mod generation;
pub mod history;
pub mod orchestrator;
pub mod service;
pub mod speech;
pub mod store;
pub mod voice;

pub use error::{AudioError, ServiceError, VoiceError};
pub use history::{EditHistory, EditSource};
pub use orchestrator::{Orchestrator, OrchestratorOptions, Status, TranslationState, AUTO_LANG};
pub use service::{TranslationResult, TranslationService};
pub use speech::SpeechPlayback;
pub use voice::{LiveVoiceSession, VoiceState};
