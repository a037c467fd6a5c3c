//! Microphone capture for the live voice session.
//!
//! The capture thread owns the cpal input stream (`cpal::Stream` is not
//! `Send`), mixes the device's native format down to mono, resamples to
//! 16 kHz and emits fixed-size frames on a channel. Consumers stop capture
//! through the returned handle; the thread exits and releases the device.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::audio::pcm::CAPTURE_SAMPLE_RATE;
use crate::error::VoiceError;

/// Samples per emitted frame at 16 kHz (128 ms of audio).
pub const FRAME_SAMPLES: usize = 2048;

/// A source of microphone audio. The production implementation is
/// [`MicCapture`]; tests feed frames by hand.
pub trait CaptureSource: Send {
    fn start(&mut self) -> Result<CaptureStream, VoiceError>;
}

/// Running capture: a stream of 16 kHz mono frames plus the handle that
/// stops it.
pub struct CaptureStream {
    pub frames: Receiver<Vec<f32>>,
    pub handle: Box<dyn CaptureHandle>,
    pub sample_rate: u32,
}

pub trait CaptureHandle: Send {
    /// Stop capturing. Idempotent.
    fn stop(&mut self);
}

/// Default-device microphone capture backed by cpal.
pub struct MicCapture;

struct MicHandle {
    stop: Arc<AtomicBool>,
}

impl CaptureHandle for MicHandle {
    fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

impl CaptureSource for MicCapture {
    fn start(&mut self) -> Result<CaptureStream, VoiceError> {
        let stop = Arc::new(AtomicBool::new(false));
        let (frame_tx, frame_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        let stop_flag = stop.clone();
        thread::spawn(move || run_capture_thread(frame_tx, ready_tx, stop_flag));

        // The thread reports device setup success or failure exactly once.
        match ready_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => Ok(CaptureStream {
                frames: frame_rx,
                handle: Box::new(MicHandle { stop }),
                sample_rate: CAPTURE_SAMPLE_RATE,
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(VoiceError::Permission(
                "capture device did not respond".to_string(),
            )),
        }
    }
}

fn run_capture_thread(
    frame_tx: mpsc::Sender<Vec<f32>>,
    ready_tx: mpsc::Sender<Result<(), VoiceError>>,
    stop: Arc<AtomicBool>,
) {
    let host = cpal::default_host();
    let Some(device) = host.default_input_device() else {
        let _ = ready_tx.send(Err(VoiceError::Permission(
            "no audio input device found".to_string(),
        )));
        return;
    };

    let config = match device.default_input_config() {
        Ok(c) => c,
        Err(e) => {
            let _ = ready_tx.send(Err(VoiceError::Permission(format!(
                "no usable input config: {e}"
            ))));
            return;
        }
    };
    let device_rate = config.sample_rate();
    let channels = config.channels() as usize;

    // Raw interleaved chunks flow from the cpal callback to this thread.
    let (raw_tx, raw_rx) = mpsc::channel::<Vec<f32>>();

    macro_rules! build_stream {
        ($sample_type:ty, $converter:expr) => {{
            let raw_tx = raw_tx.clone();
            device.build_input_stream(
                &config.into(),
                move |data: &[$sample_type], _: &_| {
                    let converter = $converter;
                    let chunk: Vec<f32> = data.iter().map(|&s| converter(s)).collect();
                    let _ = raw_tx.send(chunk);
                },
                |e| log::error!("capture stream error: {e}"),
                None,
            )
        }};
    }

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => build_stream!(f32, |s: f32| s),
        cpal::SampleFormat::I16 => build_stream!(i16, |s: i16| (s as f32) / 32768.0),
        cpal::SampleFormat::U16 => build_stream!(u16, |s: u16| (s as f32 - 32768.0) / 32768.0),
        other => {
            let _ = ready_tx.send(Err(VoiceError::Permission(format!(
                "unsupported sample format {other:?}"
            ))));
            return;
        }
    };

    let stream = match stream {
        Ok(s) => s,
        Err(e) => {
            let _ = ready_tx.send(Err(VoiceError::Permission(format!(
                "could not open capture stream: {e}"
            ))));
            return;
        }
    };
    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(VoiceError::Permission(format!(
            "could not start capture stream: {e}"
        ))));
        return;
    }
    let _ = ready_tx.send(Ok(()));

    // Device samples needed to fill one 16 kHz frame.
    let need = FRAME_SAMPLES * device_rate as usize / CAPTURE_SAMPLE_RATE as usize;
    let mut pending: Vec<f32> = Vec::with_capacity(need * 2);

    while !stop.load(Ordering::SeqCst) {
        match raw_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(chunk) => {
                for frame in chunk.chunks_exact(channels) {
                    pending.push(frame.iter().sum::<f32>() / channels as f32);
                }
                while pending.len() >= need {
                    let rest = pending.split_off(need);
                    let block = std::mem::replace(&mut pending, rest);
                    let resampled = resample_linear(&block, device_rate, CAPTURE_SAMPLE_RATE);
                    if frame_tx.send(resampled).is_err() {
                        return;
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

/// Linear-interpolation resampler. Fidelity is sufficient for speech
/// transcription input.
fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let new_len = (samples.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src_pos = i as f64 * ratio;
        let src_idx = src_pos as usize;
        let frac = src_pos - src_idx as f64;

        let s1 = samples.get(src_idx).copied().unwrap_or(0.0);
        let s2 = samples.get(src_idx + 1).copied().unwrap_or(s1);

        output.push((s1 as f64 * (1.0 - frac) + s2 as f64 * frac) as f32);
    }

    output
}
