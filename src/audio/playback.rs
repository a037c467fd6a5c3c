//! Speaker playback for synthesized speech.
//!
//! The output stream runs at 48 kHz stereo; synthesized audio arrives at
//! 24 kHz mono and is upsampled by duplicating each sample into both
//! channels. `cpal::Stream` is not `Send`, so a dedicated thread owns the
//! stream and feeds it from a shared sample queue.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;

const OUTPUT_SAMPLE_RATE: u32 = 48_000;
const OUTPUT_CHANNELS: u16 = 2;

/// Playback endpoint consumed by [`crate::speech::SpeechPlayback`].
/// Implementations must accept samples from any thread.
pub trait AudioSink: Send + Sync {
    /// Queue normalized 24 kHz mono samples for playback.
    fn play(&self, samples: &[f32]);

    /// Block until everything queued so far has been played out.
    fn drain(&self);
}

/// Default speaker sink backed by cpal.
pub struct CpalSink {
    shared: Arc<Mutex<VecDeque<f32>>>,
    shutdown: Arc<AtomicBool>,
    /// Set by the output thread when no stream could be opened; with no
    /// consumer left, queueing and draining become no-ops.
    dead: Arc<AtomicBool>,
}

impl CpalSink {
    pub fn new() -> Self {
        let shared: Arc<Mutex<VecDeque<f32>>> = Arc::new(Mutex::new(VecDeque::new()));
        let shutdown = Arc::new(AtomicBool::new(false));
        let dead = Arc::new(AtomicBool::new(false));

        let buffer = shared.clone();
        let stop = shutdown.clone();
        let failed = dead.clone();
        thread::spawn(move || run_output_thread(buffer, stop, failed));

        Self {
            shared,
            shutdown,
            dead,
        }
    }
}

impl Default for CpalSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSink for CpalSink {
    fn play(&self, samples: &[f32]) {
        if self.dead.load(Ordering::SeqCst) {
            return;
        }
        let mut queue = self.shared.lock();
        for &s in samples {
            // 24kHz -> 48kHz: duplicate each sample.
            queue.push_back(s);
            queue.push_back(s);
        }
    }

    fn drain(&self) {
        loop {
            if self.dead.load(Ordering::SeqCst) {
                return;
            }
            if self.shared.lock().is_empty() {
                break;
            }
            thread::sleep(Duration::from_millis(50));
        }
        // Let the device buffer itself play out.
        thread::sleep(Duration::from_millis(100));
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

fn run_output_thread(
    buffer: Arc<Mutex<VecDeque<f32>>>,
    shutdown: Arc<AtomicBool>,
    dead: Arc<AtomicBool>,
) {
    let abandon = |buffer: &Mutex<VecDeque<f32>>| {
        dead.store(true, Ordering::SeqCst);
        buffer.lock().clear();
    };

    let host = cpal::default_host();
    let Some(device) = host.default_output_device() else {
        log::error!("no audio output device available");
        abandon(&buffer);
        return;
    };

    let config = cpal::StreamConfig {
        channels: OUTPUT_CHANNELS,
        sample_rate: OUTPUT_SAMPLE_RATE,
        buffer_size: cpal::BufferSize::Default,
    };

    let queue = buffer.clone();
    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            let mut queue = queue.lock();
            for frame in data.chunks_mut(OUTPUT_CHANNELS as usize) {
                let sample = queue.pop_front().unwrap_or(0.0);
                for out in frame {
                    *out = sample;
                }
            }
        },
        |e| log::error!("audio output stream error: {e}"),
        None,
    );

    let stream = match stream {
        Ok(s) => s,
        Err(e) => {
            log::error!("could not open audio output stream: {e}");
            abandon(&buffer);
            return;
        }
    };
    if let Err(e) = stream.play() {
        log::error!("could not start audio output stream: {e}");
        abandon(&buffer);
        return;
    }

    // The stream stays alive as long as this thread holds it.
    while !shutdown.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(50));
    }
}
