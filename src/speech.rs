//! Text-to-speech playback of the translated text.
//!
//! Single-flight: a second request while one is playing is refused rather
//! than queued or mixed. Synthesis and playback run on a worker thread so
//! the caller never blocks on the network or the audio device.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::audio::pcm::{pcm16_to_float, PLAYBACK_SAMPLE_RATE};
use crate::audio::playback::AudioSink;
use crate::error::ServiceError;
use crate::service::TranslationService;

pub struct SpeechPlayback {
    service: Arc<dyn TranslationService>,
    sink: Arc<dyn AudioSink>,
    in_flight: Arc<AtomicBool>,
}

impl SpeechPlayback {
    pub fn new(service: Arc<dyn TranslationService>, sink: Arc<dyn AudioSink>) -> Self {
        Self {
            service,
            sink,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Speak the given text. Returns `false` when the text is blank or a
    /// previous request is still playing; `true` means this request was
    /// accepted and runs in the background.
    pub fn speak(&self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        let service = self.service.clone();
        let sink = self.sink.clone();
        let in_flight = self.in_flight.clone();
        let text = text.to_string();
        thread::spawn(move || {
            if let Err(e) = synthesize_and_play(&*service, &*sink, &text) {
                log::warn!("speech playback failed: {e}");
            }
            in_flight.store(false, Ordering::SeqCst);
        });
        true
    }

    pub fn is_speaking(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }
}

fn synthesize_and_play(
    service: &dyn TranslationService,
    sink: &dyn AudioSink,
    text: &str,
) -> Result<(), ServiceError> {
    let pcm = service.synthesize_speech(text)?;
    let buffer = pcm16_to_float(&pcm, PLAYBACK_SAMPLE_RATE)?;
    sink.play(&buffer.samples);
    sink.drain();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{
        ChunkStream, TranslationResult, VoiceCallbacks, VoiceSessionConfig, VoiceSessionHandle,
    };
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicU32;
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::time::{Duration, Instant};

    /// Sink that records what it was asked to play.
    #[derive(Default)]
    struct RecordingSink {
        played: Mutex<Vec<Vec<f32>>>,
    }

    impl AudioSink for RecordingSink {
        fn play(&self, samples: &[f32]) {
            self.played.lock().push(samples.to_vec());
        }

        fn drain(&self) {}
    }

    struct MockSynth {
        calls: AtomicU32,
        result: Mutex<Option<Result<Vec<u8>, ServiceError>>>,
        gate: Mutex<Option<Receiver<()>>>,
    }

    impl MockSynth {
        fn returning(result: Result<Vec<u8>, ServiceError>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                result: Mutex::new(Some(result)),
                gate: Mutex::new(None),
            })
        }

        fn gated(result: Result<Vec<u8>, ServiceError>) -> (Arc<Self>, Sender<()>) {
            let (tx, rx) = mpsc::channel();
            let synth = Arc::new(Self {
                calls: AtomicU32::new(0),
                result: Mutex::new(Some(result)),
                gate: Mutex::new(Some(rx)),
            });
            (synth, tx)
        }
    }

    impl TranslationService for MockSynth {
        fn translate(
            &self,
            _text: &str,
            _source_lang: &str,
            _target_lang: &str,
        ) -> Result<TranslationResult, ServiceError> {
            Err(ServiceError::Network("unused".into()))
        }

        fn translate_stream(
            &self,
            _text: &str,
            _source_lang: &str,
            _target_lang: &str,
        ) -> Result<ChunkStream, ServiceError> {
            Err(ServiceError::Network("unused".into()))
        }

        fn translate_document(
            &self,
            _base64_content: &str,
            _mime_type: &str,
            _source_lang: &str,
            _target_lang: &str,
        ) -> Result<String, ServiceError> {
            Err(ServiceError::Network("unused".into()))
        }

        fn synthesize_speech(&self, _text: &str) -> Result<Vec<u8>, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = self.gate.lock().take() {
                let _ = gate.recv();
            }
            self.result
                .lock()
                .take()
                .unwrap_or(Err(ServiceError::NoAudioData))
        }

        fn open_voice_session(
            &self,
            _config: VoiceSessionConfig,
            _callbacks: VoiceCallbacks,
        ) -> Result<Box<dyn VoiceSessionHandle>, ServiceError> {
            Err(ServiceError::Network("unused".into()))
        }
    }

    fn wait_until(mut pred: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !pred() {
            assert!(Instant::now() < deadline, "timed out");
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn speaks_decoded_audio_through_the_sink() {
        let synth = MockSynth::returning(Ok(vec![0, 0, 0xFF, 0x7F]));
        let sink = Arc::new(RecordingSink::default());
        let playback = SpeechPlayback::new(synth, sink.clone());

        assert!(playback.speak("hola"));
        wait_until(|| !playback.is_speaking());

        let played = sink.played.lock();
        assert_eq!(played.len(), 1);
        assert_eq!(played[0].len(), 2);
        assert_eq!(played[0][0], 0.0);
    }

    #[test]
    fn blank_text_is_refused() {
        let synth = MockSynth::returning(Ok(vec![0, 0]));
        let playback = SpeechPlayback::new(synth.clone(), Arc::new(RecordingSink::default()));
        assert!(!playback.speak("   "));
        assert_eq!(synth.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn second_request_while_playing_is_refused() {
        let (synth, release) = MockSynth::gated(Ok(vec![0, 0]));
        let playback = SpeechPlayback::new(synth.clone(), Arc::new(RecordingSink::default()));

        assert!(playback.speak("first"));
        wait_until(|| synth.calls.load(Ordering::SeqCst) == 1);
        assert!(!playback.speak("second"));

        release.send(()).unwrap();
        wait_until(|| !playback.is_speaking());
        assert_eq!(synth.calls.load(Ordering::SeqCst), 1);
        // Once idle, new requests go through again.
        assert!(playback.speak("third"));
    }

    #[test]
    fn synthesis_failure_clears_the_flag() {
        let synth = MockSynth::returning(Err(ServiceError::NoAudioData));
        let sink = Arc::new(RecordingSink::default());
        let playback = SpeechPlayback::new(synth, sink.clone());

        assert!(playback.speak("hola"));
        wait_until(|| !playback.is_speaking());
        assert!(sink.played.lock().is_empty());
    }

    #[test]
    fn malformed_audio_clears_the_flag() {
        // Odd byte count cannot decode as 16-bit PCM.
        let synth = MockSynth::returning(Ok(vec![1, 2, 3]));
        let sink = Arc::new(RecordingSink::default());
        let playback = SpeechPlayback::new(synth, sink.clone());

        assert!(playback.speak("hola"));
        wait_until(|| !playback.is_speaking());
        assert!(sink.played.lock().is_empty());
    }
}
