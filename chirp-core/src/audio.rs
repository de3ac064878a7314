//! Audio backend contract and the in-memory loopback implementation.
//!
//! The protocol stack only ever talks to [`AudioBackend`]: a half-duplex
//! device that delivers capture samples to a registered sink and plays a
//! queued sequence of chords, blocking until the last sample is out. The
//! CLI provides a real duplex device; [`LoopbackBackend`] wires two stacks
//! together in memory for tests and single-process smoke runs.

use std::collections::VecDeque;
use std::f64::consts::TAU;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::errors::Result;

/// One chord: a duration and the frequencies mixed into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sound {
    pub millis: u32,
    pub frequencies: Vec<u32>,
}

/// Capture callback. Invoked serially with mono f32 PCM chunks of
/// arbitrary length, never re-entered, and never invoked while the local
/// backend is playing (half-duplex: the modem must not hear itself).
pub type CaptureSink = Box<dyn FnMut(&[f32]) + Send>;

/// Transformation applied to samples in flight, e.g. injected noise.
pub type MediumFilter = Box<dyn FnMut(&mut [f32]) + Send>;

/// Half-duplex audio device as seen by the physical layer.
pub trait AudioBackend {
    /// Register the capture sink. Must be called before `start`.
    fn set_capture_sink(&mut self, sink: CaptureSink);

    /// Start capture delivery.
    fn start(&mut self) -> Result<()>;

    /// Stop the device. Called on teardown; must wake a blocked playback.
    fn stop(&mut self);

    /// Synthesize and play `sounds` in order, blocking until complete.
    /// Capture delivery is suppressed for the duration.
    fn play_sounds(&mut self, sounds: &[Sound]) -> Result<()>;
}

/// Render a sound sequence to PCM: per chord, equal-mix sine tones clamped
/// to [-1, 1], phase starting at zero (matching a bank of oscillators
/// restarted per sound).
pub fn synthesize_sounds(sounds: &[Sound], sample_rate: u32) -> Vec<f32> {
    let total: usize = sounds
        .iter()
        .map(|sound| sound.millis as usize * sample_rate as usize / 1_000)
        .sum();
    let mut samples = Vec::with_capacity(total);

    for sound in sounds {
        let count = sound.millis as usize * sample_rate as usize / 1_000;
        let gain = 1.0 / sound.frequencies.len().max(1) as f64;
        for i in 0..count {
            let t = i as f64 / f64::from(sample_rate);
            let mix: f64 = sound
                .frequencies
                .iter()
                .map(|&f| (TAU * f64::from(f) * t).sin())
                .sum();
            samples.push((mix * gain).clamp(-1.0, 1.0) as f32);
        }
    }

    samples
}

type SharedSink = Arc<Mutex<Option<CaptureSink>>>;

/// In-memory duplex path: whatever one endpoint plays arrives at the peer
/// endpoint's capture sink, synchronously and chunked like a real device.
pub struct LoopbackBackend {
    sample_rate: u32,
    chunk: usize,
    local_sink: SharedSink,
    peer_sink: SharedSink,
    medium: Option<MediumFilter>,
}

impl LoopbackBackend {
    /// Two connected endpoints. `chunk` is the capture delivery size in
    /// samples; any positive value works, the receiver re-blocks.
    pub fn pair(sample_rate: u32, chunk: usize) -> (Self, Self) {
        let left: SharedSink = Arc::new(Mutex::new(None));
        let right: SharedSink = Arc::new(Mutex::new(None));
        (
            Self {
                sample_rate,
                chunk,
                local_sink: left.clone(),
                peer_sink: right.clone(),
                medium: None,
            },
            Self {
                sample_rate,
                chunk,
                local_sink: right,
                peer_sink: left,
                medium: None,
            },
        )
    }

    /// Install a filter over everything this endpoint transmits.
    pub fn set_medium(&mut self, filter: MediumFilter) {
        self.medium = Some(filter);
    }
}

impl AudioBackend for LoopbackBackend {
    fn set_capture_sink(&mut self, sink: CaptureSink) {
        *self.local_sink.lock() = Some(sink);
    }

    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) {
        *self.local_sink.lock() = None;
    }

    fn play_sounds(&mut self, sounds: &[Sound]) -> Result<()> {
        let mut samples = synthesize_sounds(sounds, self.sample_rate);
        if let Some(medium) = self.medium.as_mut() {
            medium(&mut samples);
        }

        // The sink mutex serializes delivery with the peer's own playback,
        // keeping the capture contract (serial, non-reentrant).
        let mut guard = self.peer_sink.lock();
        if let Some(sink) = guard.as_mut() {
            for chunk in samples.chunks(self.chunk) {
                sink(chunk);
            }
        }
        Ok(())
    }
}

/// Sample queue drained by a playback callback; signals once empty.
/// Shared between `play_sounds` and the device output thread.
pub struct PlaybackQueue {
    samples: VecDeque<f32>,
    finished: Option<Box<dyn FnOnce() + Send>>,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::new(),
            finished: None,
        }
    }

    pub fn load(&mut self, samples: Vec<f32>, finished: Box<dyn FnOnce() + Send>) {
        self.samples = samples.into();
        self.finished = Some(finished);
    }

    pub fn is_idle(&self) -> bool {
        self.samples.is_empty() && self.finished.is_none()
    }

    /// Fill `out` from the queue, zero-padding past the end. Fires the
    /// completion hook on the call that drains the final sample.
    pub fn fill(&mut self, out: &mut [f32]) {
        for slot in out.iter_mut() {
            *slot = self.samples.pop_front().unwrap_or(0.0);
        }
        if self.samples.is_empty() {
            if let Some(finished) = self.finished.take() {
                finished();
            }
        }
    }

    /// Drop queued samples and fire the completion hook, waking a blocked
    /// sender during teardown.
    pub fn abort(&mut self) {
        self.samples.clear();
        if let Some(finished) = self.finished.take() {
            finished();
        }
    }
}

impl Default for PlaybackQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesis_length_and_bounds() {
        let sounds = [
            Sound {
                millis: 300,
                frequencies: vec![175, 325, 475],
            },
            Sound {
                millis: 150,
                frequencies: vec![475, 625, 775],
            },
        ];
        let samples = synthesize_sounds(&sounds, 48_000);
        assert_eq!(samples.len(), (300 + 150) * 48);
        assert!(samples.iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn synthesis_carries_signal_energy() {
        let sounds = [Sound {
            millis: 75,
            frequencies: vec![175, 325, 475],
        }];
        let samples = synthesize_sounds(&sounds, 48_000);
        let power: f32 = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
        assert!(power > 0.01, "chord power {power} too low");
    }

    #[test]
    fn loopback_delivers_to_peer_only() {
        let (mut left, mut right) = LoopbackBackend::pair(48_000, 512);
        let left_heard = Arc::new(Mutex::new(0usize));
        let right_heard = Arc::new(Mutex::new(0usize));

        let counter = left_heard.clone();
        left.set_capture_sink(Box::new(move |chunk| *counter.lock() += chunk.len()));
        let counter = right_heard.clone();
        right.set_capture_sink(Box::new(move |chunk| *counter.lock() += chunk.len()));

        left.play_sounds(&[Sound {
            millis: 10,
            frequencies: vec![175],
        }])
        .unwrap();

        assert_eq!(*left_heard.lock(), 0, "endpoint heard itself");
        assert_eq!(*right_heard.lock(), 480);
    }

    #[test]
    fn playback_queue_signals_once_drained() {
        let fired = Arc::new(Mutex::new(false));
        let mut queue = PlaybackQueue::new();
        let flag = fired.clone();
        queue.load(vec![0.5; 100], Box::new(move || *flag.lock() = true));

        let mut out = [0.0f32; 60];
        queue.fill(&mut out);
        assert!(!*fired.lock());
        assert_eq!(out[0], 0.5);

        queue.fill(&mut out);
        assert!(*fired.lock());
        assert_eq!(out[40], 0.0, "tail not zero-padded");
        assert!(queue.is_idle());
    }
}
