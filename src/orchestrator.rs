//! Translation orchestrator: debounces text input, issues one cancellable
//! streaming translation per keystroke burst, and follows up with a
//! structured language-detection call when the source language is "auto".
//!
//! Concurrency model: a worker thread owns the debounce and history timers;
//! each fired request runs on its own thread tagged with a generation from
//! [`GenerationCounter`]. Only the highest-numbered live generation may
//! mutate the shared display state; stale streams keep running but their
//! results are dropped. This replaces locking-order reasoning and
//! preemptive task cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::ServiceError;
use crate::generation::{Generation, GenerationCounter};
use crate::history::{EditHistory, EditSource};
use crate::service::TranslationService;
use crate::store::Store;

/// Sentinel source language meaning "let the service detect it".
pub const AUTO_LANG: &str = "auto";

/// Default debounce before a keystroke burst becomes a request.
pub const DEBOUNCE: Duration = Duration::from_millis(300);

/// Default quiet period before the current text is committed to history.
pub const HISTORY_QUIET: Duration = Duration::from_millis(500);

/// Request-cycle status visible to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Idle,
    Debouncing,
    Streaming,
    Finalizing,
    Success,
    Error,
}

/// A translation request snapshot, immutable once issued.
#[derive(Debug, Clone)]
pub struct TranslationRequest {
    pub source_text: String,
    pub source_lang: String,
    pub target_lang: String,
}

/// Shared display state. Consumers see the target text grow as fragments
/// stream in; it is a prefix of the final translation, not an atomic value.
#[derive(Debug, Clone)]
pub struct TranslationState {
    pub status: Status,
    pub source_text: String,
    pub target_text: String,
    pub source_lang: String,
    pub target_lang: String,
    pub detected_language: Option<String>,
    pub confidence: Option<f64>,
    pub error: Option<String>,
}

/// Construction options. The timing knobs exist so tests can shrink the
/// debounce windows; production callers keep the defaults.
pub struct OrchestratorOptions {
    pub debounce: Duration,
    pub history_quiet: Duration,
    pub source_lang: String,
    pub target_lang: String,
    /// Persists the source text on every change in text mode and restores
    /// it on startup. `None` disables persistence.
    pub store: Option<Store>,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            debounce: DEBOUNCE,
            history_quiet: HISTORY_QUIET,
            source_lang: AUTO_LANG.to_string(),
            target_lang: "en".to_string(),
            store: None,
        }
    }
}

enum Event {
    TextChanged { text: String, source: EditSource },
    SetLanguages { source: String, target: String },
    Swap,
    Clear,
    Shutdown,
}

struct Timings {
    debounce: Duration,
    history_quiet: Duration,
}

struct Inner {
    state: Mutex<TranslationState>,
    history: Mutex<EditHistory>,
    /// Snapshot awaiting its quiet-period commit into history.
    pending_history: Mutex<Option<(Instant, String)>>,
    generations: GenerationCounter,
    service: Arc<dyn TranslationService>,
    store: Option<Store>,
    voice_active: AtomicBool,
    timings: Timings,
}

impl Inner {
    /// Commit any snapshot still waiting out its quiet period. Undo/redo
    /// call this first so the user's latest text is addressable before
    /// the cursor moves.
    fn commit_pending_history(&self) {
        let pending = self.pending_history.lock().take();
        if let Some((_, text)) = pending {
            self.history.lock().push(&text);
        }
    }
}

/// Cheaply cloneable handle; the worker thread exits once every clone is
/// dropped (or after [`Orchestrator::shutdown`]).
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
    tx: mpsc::Sender<Event>,
}

impl Orchestrator {
    pub fn new(service: Arc<dyn TranslationService>, opts: OrchestratorOptions) -> Self {
        let restored = opts
            .store
            .as_ref()
            .and_then(|s| s.load_source_text())
            .unwrap_or_default();

        let inner = Arc::new(Inner {
            state: Mutex::new(TranslationState {
                status: Status::Idle,
                source_text: restored.clone(),
                target_text: String::new(),
                source_lang: opts.source_lang,
                target_lang: opts.target_lang,
                detected_language: None,
                confidence: None,
                error: None,
            }),
            history: Mutex::new(EditHistory::new(restored)),
            pending_history: Mutex::new(None),
            generations: GenerationCounter::new(),
            service,
            store: opts.store,
            voice_active: AtomicBool::new(false),
            timings: Timings {
                debounce: opts.debounce,
                history_quiet: opts.history_quiet,
            },
        });

        let (tx, rx) = mpsc::channel();
        let worker_inner = inner.clone();
        thread::spawn(move || worker_loop(worker_inner, rx));

        Self { inner, tx }
    }

    /// Intake for typed/pasted text.
    pub fn set_source_text(&self, text: impl Into<String>) {
        let _ = self.tx.send(Event::TextChanged {
            text: text.into(),
            source: EditSource::UserEdit,
        });
    }

    /// Intake for a voice-session transcript fragment: appended to the
    /// source buffer, space-joined when the buffer is non-empty, and
    /// routed through the same pipeline as typing. This deliberately
    /// re-triggers the debounce: live dictation feeds straight into
    /// translation.
    pub fn append_transcript(&self, fragment: &str) {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return;
        }
        let joined = {
            let state = self.inner.state.lock();
            if state.source_text.is_empty() {
                fragment.to_string()
            } else {
                format!("{} {}", state.source_text, fragment)
            }
        };
        let _ = self.tx.send(Event::TextChanged {
            text: joined,
            source: EditSource::Transcript,
        });
    }

    pub fn set_languages(&self, source: impl Into<String>, target: impl Into<String>) {
        let _ = self.tx.send(Event::SetLanguages {
            source: source.into(),
            target: target.into(),
        });
    }

    /// Exchange source/target languages and texts in one update, then
    /// re-run the pipeline on the new source. Rejected while the source
    /// language is "auto": a detected language cannot be swapped into the
    /// target slot deterministically.
    pub fn swap(&self) {
        let _ = self.tx.send(Event::Swap);
    }

    /// Reset all request/response state to Idle and silently drop any
    /// in-flight generation. Never produces an error state.
    pub fn clear(&self) {
        let _ = self.tx.send(Event::Clear);
    }

    /// Step back in the edit history and apply the result. The applied
    /// change is tagged [`EditSource::HistoryReplay`] so it is not
    /// re-recorded.
    pub fn undo(&self) -> Option<String> {
        self.inner.commit_pending_history();
        let text = self.inner.history.lock().undo()?;
        let _ = self.tx.send(Event::TextChanged {
            text: text.clone(),
            source: EditSource::HistoryReplay,
        });
        Some(text)
    }

    pub fn redo(&self) -> Option<String> {
        self.inner.commit_pending_history();
        let text = self.inner.history.lock().redo()?;
        let _ = self.tx.send(Event::TextChanged {
            text: text.clone(),
            source: EditSource::HistoryReplay,
        });
        Some(text)
    }

    /// Snapshot of the display state.
    pub fn state(&self) -> TranslationState {
        self.inner.state.lock().clone()
    }

    /// While voice capture is active, typing no longer triggers
    /// translation (transcript intake is the sole driver) and drafts are
    /// not persisted.
    pub fn set_voice_active(&self, active: bool) {
        self.inner.voice_active.store(active, Ordering::SeqCst);
    }

    /// Synchronous whole-document translation with the current language
    /// pair. Does not participate in debounce or generations.
    pub fn translate_document(
        &self,
        base64_content: &str,
        mime_type: &str,
    ) -> Result<String, ServiceError> {
        let (source_lang, target_lang) = {
            let state = self.inner.state.lock();
            (state.source_lang.clone(), state.target_lang.clone())
        };
        self.inner
            .service
            .translate_document(base64_content, mime_type, &source_lang, &target_lang)
    }

    /// Stop the worker thread. Dropping every handle has the same effect.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Event::Shutdown);
    }
}

/// English display name for an ISO-639-1 code, for presenting the
/// detected language.
pub fn language_name(code: &str) -> Option<&'static str> {
    isolang::Language::from_639_1(code).map(|l| l.to_name())
}

// Worker internals. The debounce (deadline, snapshot) pair is worker-local;
// the history snapshot lives in `Inner::pending_history` so undo/redo can
// commit it early. The loop sleeps until the nearest deadline or the next
// event.

fn worker_loop(inner: Arc<Inner>, rx: mpsc::Receiver<Event>) {
    let mut debounce: Option<(Instant, String)> = None;

    loop {
        let now = Instant::now();
        let history_deadline = inner.pending_history.lock().as_ref().map(|h| h.0);
        let deadline = match (debounce.as_ref().map(|d| d.0), history_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        };

        let event = match deadline {
            Some(d) if d <= now => None,
            Some(d) => match rx.recv_timeout(d - now) {
                Ok(ev) => Some(ev),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => return,
            },
            None => match rx.recv() {
                Ok(ev) => Some(ev),
                Err(_) => return,
            },
        };

        match event {
            Some(Event::Shutdown) => return,
            Some(Event::TextChanged { text, source }) => {
                on_text_changed(&inner, &mut debounce, text, source);
            }
            Some(Event::SetLanguages { source, target }) => {
                let snapshot = {
                    let mut state = inner.state.lock();
                    state.source_lang = source;
                    state.target_lang = target;
                    state.detected_language = None;
                    state.confidence = None;
                    state.source_text.clone()
                };
                // A changed pair re-translates whatever is already typed.
                if !snapshot.trim().is_empty() {
                    schedule_debounce(&inner, &mut debounce, snapshot);
                }
            }
            Some(Event::Swap) => {
                let snapshot = {
                    let mut state = inner.state.lock();
                    if state.source_lang == AUTO_LANG {
                        log::warn!("swap ignored: source language is auto-detected");
                        None
                    } else {
                        let state = &mut *state;
                        std::mem::swap(&mut state.source_lang, &mut state.target_lang);
                        std::mem::swap(&mut state.source_text, &mut state.target_text);
                        state.detected_language = None;
                        state.confidence = None;
                        state.error = None;
                        Some(state.source_text.clone())
                    }
                };
                if let Some(text) = snapshot {
                    on_text_changed(&inner, &mut debounce, text, EditSource::UserEdit);
                }
            }
            Some(Event::Clear) => {
                inner.generations.next();
                debounce = None;
                {
                    let mut state = inner.state.lock();
                    state.status = Status::Idle;
                    state.source_text.clear();
                    state.target_text.clear();
                    state.detected_language = None;
                    state.confidence = None;
                    state.error = None;
                }
                persist(&inner, "");
                *inner.pending_history.lock() =
                    Some((Instant::now() + inner.timings.history_quiet, String::new()));
            }
            None => {
                let now = Instant::now();
                if let Some((at, text)) = debounce.take() {
                    if at <= now {
                        fire_translation(&inner, text);
                    } else {
                        debounce = Some((at, text));
                    }
                }
                let expired = {
                    let mut pending = inner.pending_history.lock();
                    match pending.as_ref() {
                        Some((at, _)) if *at <= now => pending.take(),
                        _ => None,
                    }
                };
                if let Some((_, text)) = expired {
                    inner.history.lock().push(&text);
                }
            }
        }
    }
}

fn on_text_changed(
    inner: &Arc<Inner>,
    debounce: &mut Option<(Instant, String)>,
    text: String,
    source: EditSource,
) {
    let is_blank = text.trim().is_empty();
    if source != EditSource::HistoryReplay {
        *inner.pending_history.lock() = Some((
            Instant::now() + inner.timings.history_quiet,
            text.clone(),
        ));
    }
    {
        let mut state = inner.state.lock();
        state.source_text = text.clone();
        if is_blank {
            // Empty input bypasses the debounce entirely.
            state.status = Status::Idle;
            state.target_text.clear();
            state.detected_language = None;
            state.confidence = None;
            state.error = None;
        }
    }

    let voice_active = inner.voice_active.load(Ordering::SeqCst);
    if !voice_active {
        persist(inner, &text);
    }

    if is_blank {
        // Any in-flight stream becomes stale and drops its results.
        inner.generations.next();
        *debounce = None;
    } else {
        let translates = match source {
            EditSource::Transcript => true,
            EditSource::UserEdit | EditSource::HistoryReplay => !voice_active,
        };
        if translates {
            schedule_debounce(inner, debounce, text);
        }
    }
}

fn schedule_debounce(inner: &Arc<Inner>, debounce: &mut Option<(Instant, String)>, text: String) {
    *debounce = Some((Instant::now() + inner.timings.debounce, text));
    inner.state.lock().status = Status::Debouncing;
}

fn persist(inner: &Inner, text: &str) {
    if let Some(store) = &inner.store {
        if let Err(e) = store.save_source_text(text) {
            log::warn!("failed to persist source draft: {e}");
        }
    }
}

/// Debounce expired: stamp a new generation, clear the displayed target and
/// stream the snapshot on a dedicated thread.
fn fire_translation(inner: &Arc<Inner>, text: String) {
    let generation = inner.generations.next();
    let request = {
        let mut state = inner.state.lock();
        state.target_text.clear();
        state.detected_language = None;
        state.confidence = None;
        state.error = None;
        state.status = Status::Streaming;
        TranslationRequest {
            source_text: text,
            source_lang: state.source_lang.clone(),
            target_lang: state.target_lang.clone(),
        }
    };
    let inner = inner.clone();
    thread::spawn(move || run_stream(inner, generation, request));
}

fn run_stream(inner: Arc<Inner>, generation: Generation, request: TranslationRequest) {
    let stream = match inner.service.translate_stream(
        &request.source_text,
        &request.source_lang,
        &request.target_lang,
    ) {
        Ok(stream) => stream,
        Err(e) => {
            fail(&inner, generation, e);
            return;
        }
    };

    let mut received_any = false;
    for item in stream {
        if !inner.generations.is_current(generation) {
            return; // stale: stop consuming, discard silently
        }
        match item {
            Ok(chunk) => {
                received_any = true;
                let mut state = inner.state.lock();
                if !inner.generations.is_current(generation) {
                    return;
                }
                state.target_text.push_str(&chunk);
            }
            Err(e) => {
                fail(&inner, generation, e);
                return;
            }
        }
    }

    if !inner.generations.is_current(generation) {
        return;
    }
    if !received_any {
        fail(
            &inner,
            generation,
            ServiceError::MalformedResponse("empty response".to_string()),
        );
        return;
    }

    // Streaming carries no metadata; when the source language is "auto" a
    // follow-up structured call supplies detection and confidence.
    if request.source_lang == AUTO_LANG {
        {
            let mut state = inner.state.lock();
            if !inner.generations.is_current(generation) {
                return;
            }
            state.status = Status::Finalizing;
        }
        match inner.service.translate(
            &request.source_text,
            &request.source_lang,
            &request.target_lang,
        ) {
            Ok(result) => {
                let mut state = inner.state.lock();
                if !inner.generations.is_current(generation) {
                    return;
                }
                state.detected_language = Some(result.detected_language);
                state.confidence = Some(result.confidence);
            }
            Err(e) => {
                fail(&inner, generation, e);
                return;
            }
        }
    }

    let mut state = inner.state.lock();
    if !inner.generations.is_current(generation) {
        return;
    }
    state.status = Status::Success;
}

/// Publish an error for a still-current generation. Partial target text
/// already streamed stays visible.
fn fail(inner: &Inner, generation: Generation, error: ServiceError) {
    if !inner.generations.is_current(generation) {
        return;
    }
    let mut state = inner.state.lock();
    if !inner.generations.is_current(generation) {
        return;
    }
    state.status = Status::Error;
    state.error = Some(error.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{
        ChunkStream, TranslationResult, VoiceCallbacks, VoiceSessionConfig, VoiceSessionHandle,
    };
    use std::collections::VecDeque;
    use std::sync::mpsc::{Receiver, Sender};

    enum Frag {
        Text(&'static str),
        /// Block until the paired sender is dropped or fires.
        Wait(Receiver<()>),
        Fail(ServiceError),
    }

    struct ScriptedStream {
        frags: std::vec::IntoIter<Frag>,
    }

    impl Iterator for ScriptedStream {
        type Item = Result<String, ServiceError>;
        fn next(&mut self) -> Option<Self::Item> {
            loop {
                match self.frags.next()? {
                    Frag::Text(t) => return Some(Ok(t.to_string())),
                    Frag::Wait(rx) => {
                        let _ = rx.recv();
                    }
                    Frag::Fail(e) => return Some(Err(e)),
                }
            }
        }
    }

    struct MockService {
        streams: Mutex<VecDeque<Vec<Frag>>>,
        structured: Mutex<VecDeque<Result<TranslationResult, ServiceError>>>,
        stream_requests: Mutex<Vec<String>>,
        started: Sender<String>,
    }

    impl MockService {
        fn new() -> (Arc<Self>, Receiver<String>) {
            let (tx, rx) = mpsc::channel();
            (
                Arc::new(Self {
                    streams: Mutex::new(VecDeque::new()),
                    structured: Mutex::new(VecDeque::new()),
                    stream_requests: Mutex::new(Vec::new()),
                    started: tx,
                }),
                rx,
            )
        }

        fn script_stream(&self, frags: Vec<Frag>) {
            self.streams.lock().push_back(frags);
        }

        fn script_structured(&self, result: Result<TranslationResult, ServiceError>) {
            self.structured.lock().push_back(result);
        }

        fn requests(&self) -> Vec<String> {
            self.stream_requests.lock().clone()
        }
    }

    impl TranslationService for MockService {
        fn translate(
            &self,
            _text: &str,
            _source_lang: &str,
            _target_lang: &str,
        ) -> Result<TranslationResult, ServiceError> {
            self.structured
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(ServiceError::Network("unscripted".into())))
        }

        fn translate_stream(
            &self,
            text: &str,
            _source_lang: &str,
            _target_lang: &str,
        ) -> Result<ChunkStream, ServiceError> {
            self.stream_requests.lock().push(text.to_string());
            let frags = self
                .streams
                .lock()
                .pop_front()
                .ok_or_else(|| ServiceError::Network("unscripted stream".into()))?;
            let _ = self.started.send(text.to_string());
            Ok(Box::new(ScriptedStream {
                frags: frags.into_iter(),
            }))
        }

        fn translate_document(
            &self,
            _base64_content: &str,
            _mime_type: &str,
            _source_lang: &str,
            _target_lang: &str,
        ) -> Result<String, ServiceError> {
            Err(ServiceError::Network("not scripted".into()))
        }

        fn synthesize_speech(&self, _text: &str) -> Result<Vec<u8>, ServiceError> {
            Err(ServiceError::NoAudioData)
        }

        fn open_voice_session(
            &self,
            _config: VoiceSessionConfig,
            _callbacks: VoiceCallbacks,
        ) -> Result<Box<dyn VoiceSessionHandle>, ServiceError> {
            Err(ServiceError::Network("no live sessions in this mock".into()))
        }
    }

    fn fast_opts(source_lang: &str, target_lang: &str) -> OrchestratorOptions {
        OrchestratorOptions {
            debounce: Duration::from_millis(40),
            history_quiet: Duration::from_millis(40),
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
            store: None,
        }
    }

    fn wait_for(orch: &Orchestrator, mut pred: impl FnMut(&TranslationState) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if pred(&orch.state()) {
                return;
            }
            assert!(Instant::now() < deadline, "timed out; state={:?}", orch.state());
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn rapid_keystrokes_coalesce_into_one_request() {
        let (service, started) = MockService::new();
        service.script_stream(vec![Frag::Text("¡hola!")]);
        let orch = Orchestrator::new(service.clone(), fast_opts("en", "es"));

        orch.set_source_text("a");
        thread::sleep(Duration::from_millis(15));
        orch.set_source_text("ab");

        let fired_for = started.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(fired_for, "ab");
        wait_for(&orch, |s| s.status == Status::Success);
        assert_eq!(service.requests(), vec!["ab".to_string()]);
        assert_eq!(orch.state().target_text, "¡hola!");
        orch.shutdown();
    }

    #[test]
    fn empty_input_resets_immediately_without_a_request() {
        let (service, started) = MockService::new();
        service.script_stream(vec![Frag::Text("hallo")]);
        let orch = Orchestrator::new(service.clone(), fast_opts("en", "de"));

        orch.set_source_text("hi");
        started.recv_timeout(Duration::from_secs(2)).unwrap();
        wait_for(&orch, |s| s.status == Status::Success);

        orch.set_source_text("");
        wait_for(&orch, |s| s.status == Status::Idle);
        let state = orch.state();
        assert!(state.target_text.is_empty());
        assert!(state.detected_language.is_none());
        assert!(state.error.is_none());
        // No second stream was opened for the empty input.
        assert_eq!(service.requests().len(), 1);
        orch.shutdown();
    }

    #[test]
    fn stale_generation_chunks_never_reach_display() {
        let (service, started) = MockService::new();
        let (gate_tx, gate_rx) = mpsc::channel();
        service.script_stream(vec![
            Frag::Text("old"),
            Frag::Wait(gate_rx),
            Frag::Text(" and stale"),
        ]);
        service.script_stream(vec![Frag::Text("dos")]);
        let orch = Orchestrator::new(service.clone(), fast_opts("en", "es"));

        orch.set_source_text("one");
        started.recv_timeout(Duration::from_secs(2)).unwrap();
        wait_for(&orch, |s| s.target_text == "old");

        orch.set_source_text("two");
        started.recv_timeout(Duration::from_secs(2)).unwrap();
        wait_for(&orch, |s| s.status == Status::Success);
        assert_eq!(orch.state().target_text, "dos");

        // Let the stale stream finish; its late chunk must be dropped.
        gate_tx.send(()).unwrap();
        thread::sleep(Duration::from_millis(80));
        assert_eq!(orch.state().target_text, "dos");
        orch.shutdown();
    }

    #[test]
    fn failure_before_first_chunk_sets_error_and_keeps_target_empty() {
        let (service, started) = MockService::new();
        service.script_stream(vec![Frag::Fail(ServiceError::Network("boom".into()))]);
        let orch = Orchestrator::new(service, fast_opts("en", "es"));

        orch.set_source_text("hello");
        started.recv_timeout(Duration::from_secs(2)).unwrap();
        wait_for(&orch, |s| s.status == Status::Error);
        let state = orch.state();
        assert!(state.target_text.is_empty());
        assert!(state.error.as_deref().unwrap().contains("boom"));
        orch.shutdown();
    }

    #[test]
    fn auto_source_triggers_structured_detection_follow_up() {
        let (service, started) = MockService::new();
        service.script_stream(vec![Frag::Text("Hola")]);
        service.script_structured(Ok(TranslationResult {
            translated_text: "Hola".to_string(),
            detected_language: "en".to_string(),
            confidence: 0.97,
        }));
        let orch = Orchestrator::new(service, fast_opts(AUTO_LANG, "es"));

        orch.set_source_text("Hello");
        started.recv_timeout(Duration::from_secs(2)).unwrap();
        wait_for(&orch, |s| s.status == Status::Success);
        let state = orch.state();
        assert_eq!(state.target_text, "Hola");
        assert_eq!(state.detected_language.as_deref(), Some("en"));
        assert!((state.confidence.unwrap() - 0.97).abs() < 1e-9);
        orch.shutdown();
    }

    #[test]
    fn swap_is_rejected_for_auto_source() {
        let (service, _started) = MockService::new();
        let orch = Orchestrator::new(service, fast_opts(AUTO_LANG, "es"));
        orch.swap();
        thread::sleep(Duration::from_millis(50));
        let state = orch.state();
        assert_eq!(state.source_lang, AUTO_LANG);
        assert_eq!(state.target_lang, "es");
        orch.shutdown();
    }

    #[test]
    fn swap_exchanges_languages_and_texts_then_retranslates() {
        let (service, started) = MockService::new();
        service.script_stream(vec![Frag::Text("bonjour")]);
        service.script_stream(vec![Frag::Text("hello again")]);
        let orch = Orchestrator::new(service.clone(), fast_opts("en", "fr"));

        orch.set_source_text("hello");
        started.recv_timeout(Duration::from_secs(2)).unwrap();
        wait_for(&orch, |s| s.status == Status::Success);

        orch.swap();
        started.recv_timeout(Duration::from_secs(2)).unwrap();
        wait_for(&orch, |s| s.status == Status::Success && s.target_text == "hello again");
        let state = orch.state();
        assert_eq!(state.source_lang, "fr");
        assert_eq!(state.target_lang, "en");
        assert_eq!(state.source_text, "bonjour");
        assert_eq!(service.requests(), vec!["hello".to_string(), "bonjour".to_string()]);
        orch.shutdown();
    }

    #[test]
    fn clear_resets_to_idle_without_error() {
        let (service, started) = MockService::new();
        service.script_stream(vec![Frag::Text("ciao")]);
        let orch = Orchestrator::new(service, fast_opts("en", "it"));

        orch.set_source_text("hi");
        started.recv_timeout(Duration::from_secs(2)).unwrap();
        wait_for(&orch, |s| s.status == Status::Success);

        orch.clear();
        wait_for(&orch, |s| s.status == Status::Idle);
        let state = orch.state();
        assert!(state.source_text.is_empty());
        assert!(state.target_text.is_empty());
        assert!(state.error.is_none());
        orch.shutdown();
    }

    #[test]
    fn undo_redo_replays_without_re_recording() {
        let (service, _started) = MockService::new();
        // Scripted streams for the replays that trigger translation.
        for _ in 0..8 {
            service.script_stream(vec![Frag::Text("x")]);
        }
        let orch = Orchestrator::new(service, fast_opts("en", "es"));

        orch.set_source_text("abc");
        thread::sleep(Duration::from_millis(90)); // past the quiet period
        orch.set_source_text("abcd");
        thread::sleep(Duration::from_millis(90));

        assert_eq!(orch.undo().as_deref(), Some("abc"));
        wait_for(&orch, |s| s.source_text == "abc");
        assert_eq!(orch.redo().as_deref(), Some("abcd"));
        wait_for(&orch, |s| s.source_text == "abcd");
        // The replays did not grow the history: undo still lands on "abc".
        thread::sleep(Duration::from_millis(90));
        assert_eq!(orch.undo().as_deref(), Some("abc"));
        orch.shutdown();
    }

    #[test]
    fn undo_during_quiet_period_still_captures_latest_text() {
        let (service, _started) = MockService::new();
        for _ in 0..8 {
            service.script_stream(vec![Frag::Text("x")]);
        }
        let orch = Orchestrator::new(service, fast_opts("en", "es"));

        orch.set_source_text("abc");
        thread::sleep(Duration::from_millis(90)); // committed to history
        orch.set_source_text("abcd");
        wait_for(&orch, |s| s.source_text == "abcd");

        // The quiet period for "abcd" may still be running; undo must
        // step back exactly one entry, not past it.
        assert_eq!(orch.undo().as_deref(), Some("abc"));
        assert_eq!(orch.redo().as_deref(), Some("abcd"));
        orch.shutdown();
    }

    #[test]
    fn voice_capture_suppresses_typing_debounce_but_not_transcripts() {
        let (service, started) = MockService::new();
        service.script_stream(vec![Frag::Text("ok")]);
        let orch = Orchestrator::new(service.clone(), fast_opts("en", "es"));

        orch.set_voice_active(true);
        orch.set_source_text("typed");
        thread::sleep(Duration::from_millis(120));
        assert!(service.requests().is_empty());

        orch.append_transcript("spoken");
        let fired_for = started.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(fired_for, "typed spoken");
        orch.shutdown();
    }

    #[test]
    fn detected_language_code_maps_to_display_name() {
        assert_eq!(language_name("en"), Some("English"));
        assert_eq!(language_name("es"), Some("Spanish"));
        assert_eq!(language_name("zz"), None);
    }
}
