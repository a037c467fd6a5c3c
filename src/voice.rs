//! Live voice session: microphone frames stream to the transcription
//! service, transcript fragments flow into the orchestrator's source text.
//!
//! Lifecycle is single-owner: at most one active session per
//! [`LiveVoiceSession`]. Starting tears down any previous session first;
//! session failure, service close and explicit stop all converge on one
//! teardown path that releases the capture device and re-enables
//! typing-driven translation.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::audio::capture::{CaptureHandle, CaptureSource};
use crate::audio::pcm::PcmBlob;
use crate::error::VoiceError;
use crate::orchestrator::Orchestrator;
use crate::service::{
    SessionMessage, TranslationService, VoiceCallbacks, VoiceSessionConfig, VoiceSessionHandle,
};

/// Consecutive frame-send failures tolerated before the connection is
/// declared faulted.
pub const MAX_CONSECUTIVE_SEND_FAILURES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Idle,
    Connecting,
    Open,
    Closing,
    Error,
}

struct ActiveSession {
    session: Arc<dyn VoiceSessionHandle>,
    capture: Box<dyn CaptureHandle>,
    stop_flag: Arc<AtomicBool>,
}

struct VoiceInner {
    state: Mutex<VoiceState>,
    orchestrator: Orchestrator,
    service: Arc<dyn TranslationService>,
    capture_source: Mutex<Box<dyn CaptureSource>>,
    active: Mutex<Option<ActiveSession>>,
}

pub struct LiveVoiceSession {
    inner: Arc<VoiceInner>,
}

impl LiveVoiceSession {
    pub fn new(
        service: Arc<dyn TranslationService>,
        orchestrator: Orchestrator,
        capture_source: Box<dyn CaptureSource>,
    ) -> Self {
        Self {
            inner: Arc::new(VoiceInner {
                state: Mutex::new(VoiceState::Idle),
                orchestrator,
                service,
                capture_source: Mutex::new(capture_source),
                active: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> VoiceState {
        *self.inner.state.lock()
    }

    /// Open the capture device and the service session, then start
    /// forwarding audio. Any previous session is stopped first.
    pub fn start(&self) -> Result<(), VoiceError> {
        self.stop();
        *self.inner.state.lock() = VoiceState::Connecting;

        let stream = match self.inner.capture_source.lock().start() {
            Ok(s) => s,
            Err(e) => {
                *self.inner.state.lock() = VoiceState::Error;
                return Err(e);
            }
        };

        let language = self.inner.orchestrator.state().source_lang;
        let callbacks = build_callbacks(&self.inner);
        let session = match self.inner.service.open_voice_session(
            VoiceSessionConfig {
                sample_rate_hz: stream.sample_rate,
                language,
            },
            callbacks,
        ) {
            Ok(s) => s,
            Err(e) => {
                let mut capture = stream.handle;
                capture.stop();
                *self.inner.state.lock() = VoiceState::Error;
                return Err(e.into());
            }
        };
        let session: Arc<dyn VoiceSessionHandle> = Arc::from(session);

        let stop_flag = Arc::new(AtomicBool::new(false));
        {
            let inner = self.inner.clone();
            let session = session.clone();
            let stop_flag = stop_flag.clone();
            let frames = stream.frames;
            let sample_rate = stream.sample_rate;
            thread::spawn(move || {
                run_forwarder(inner, session, frames, sample_rate, stop_flag)
            });
        }

        *self.inner.active.lock() = Some(ActiveSession {
            session,
            capture: stream.handle,
            stop_flag,
        });
        self.inner.orchestrator.set_voice_active(true);

        // The session may have faulted while we were setting up; make sure
        // a failure callback that raced the store still tears down.
        if *self.inner.state.lock() == VoiceState::Error {
            teardown(&self.inner);
        }
        Ok(())
    }

    /// Stop capture and close the session. Safe to call at any time.
    pub fn stop(&self) {
        {
            let mut state = self.inner.state.lock();
            if *state != VoiceState::Idle {
                *state = VoiceState::Closing;
            }
        }
        teardown(&self.inner);
        *self.inner.state.lock() = VoiceState::Idle;
    }
}

fn build_callbacks(inner: &Arc<VoiceInner>) -> VoiceCallbacks {
    let on_open = {
        let inner = inner.clone();
        Box::new(move || {
            *inner.state.lock() = VoiceState::Open;
        })
    };
    let on_message = {
        let inner = inner.clone();
        Box::new(move |message: SessionMessage| match message {
            SessionMessage::Transcript(text) => {
                inner.orchestrator.append_transcript(&text);
            }
            SessionMessage::TurnComplete => {
                log::debug!("voice session turn complete");
            }
        })
    };
    let on_error = {
        let inner = inner.clone();
        Box::new(move |e: crate::error::ServiceError| {
            log::error!("voice session error: {e}");
            *inner.state.lock() = VoiceState::Error;
            teardown(&inner);
        })
    };
    let on_close = {
        let inner = inner.clone();
        Box::new(move || {
            teardown(&inner);
        })
    };
    VoiceCallbacks {
        on_open,
        on_message,
        on_error,
        on_close,
    }
}

/// Forward capture frames to the session until stopped or the connection
/// faults. Runs on its own thread; does not hold locks across sends.
fn run_forwarder(
    inner: Arc<VoiceInner>,
    session: Arc<dyn VoiceSessionHandle>,
    frames: std::sync::mpsc::Receiver<Vec<f32>>,
    sample_rate: u32,
    stop_flag: Arc<AtomicBool>,
) {
    let failures = AtomicU32::new(0);
    while !stop_flag.load(Ordering::SeqCst) {
        match frames.recv_timeout(Duration::from_millis(100)) {
            Ok(frame) => {
                let blob = PcmBlob::from_samples(&frame, sample_rate);
                match session.send(&blob) {
                    Ok(()) => {
                        failures.store(0, Ordering::SeqCst);
                    }
                    Err(e) => {
                        let count = failures.fetch_add(1, Ordering::SeqCst) + 1;
                        log::warn!("dropping audio frame ({count} consecutive failures): {e}");
                        if count >= MAX_CONSECUTIVE_SEND_FAILURES {
                            log::error!("voice connection faulted, closing session");
                            *inner.state.lock() = VoiceState::Error;
                            teardown(&inner);
                            return;
                        }
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

/// Single teardown path. Takes the active session exactly once; later
/// callers find it gone and return. Leaves an Error state visible, any
/// other state resets to Idle.
fn teardown(inner: &Arc<VoiceInner>) {
    let Some(mut active) = inner.active.lock().take() else {
        return;
    };
    active.stop_flag.store(true, Ordering::SeqCst);
    active.session.close();
    active.capture.stop();
    inner.orchestrator.set_voice_active(false);
    let mut state = inner.state.lock();
    if *state != VoiceState::Error {
        *state = VoiceState::Idle;
    }
}
