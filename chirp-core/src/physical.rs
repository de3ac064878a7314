//! Physical layer: octet frames over chords of audible tones.
//!
//! Transmit side renders a frame as a preamble chord, a data/separator
//! chord pair per byte, and a post chord, then blocks on playback.
//! Receive side runs entirely inside the capture callback: samples are
//! re-blocked into FFT windows, each window decodes to a symbol, and a
//! small state machine assembles frames byte by byte, with a majority vote
//! across the windows of each data chord absorbing boundary misreads.
//! Completed frames cross to the user thread through a bounded SPSC ring.

use std::thread;
use std::time::Duration;

use ringbuf::{HeapConsumer, HeapProducer, HeapRb};

use crate::audio::{AudioBackend, Sound};
use crate::config::ModemConfig;
use crate::encoding::{decode_frequencies, encode_frequencies};
use crate::errors::{ModemError, Result};
use crate::spectrum::SpectrumAnalyzer;
use crate::symbols::{Signal, SIGNAL_POST, SIGNAL_PREAMBLE, SIGNAL_SEPARATOR, SIGNAL_TX_OFFSET};

/// Frame-level transport contract the upper layers build on. Implemented
/// by [`PhysicalSocket`]; test suites substitute scripted transports.
pub trait FrameTransport {
    /// Send one frame, blocking until it is fully on the wire.
    fn send_frame(&mut self, frame: &[u8]) -> Result<()>;

    /// Head frame without consuming it. `Ok(None)` means nothing ready
    /// (non-blocking only); blocking calls time out instead.
    fn peek_frame(&mut self, blocking: bool) -> Result<Option<Vec<u8>>>;

    /// Drop the head frame if one is ready.
    fn pop_frame(&mut self) -> bool;

    /// Blocking receive: peek + pop.
    fn recv_frame(&mut self) -> Result<Vec<u8>>;
}

/// Render the sound sequence for one frame: preamble, data/separator pair
/// per byte, post. `2 + 2 * len` sounds in total.
pub fn frame_sounds(frame: &[u8], config: &ModemConfig) -> Result<Vec<Sound>> {
    if frame.is_empty() || frame.len() > config.phy_mtu {
        return Err(ModemError::invalid(format!(
            "frame of {} bytes, physical MTU is {}",
            frame.len(),
            config.phy_mtu
        )));
    }

    let chord = |value: u64, millis: u32| -> Result<Sound> {
        Ok(Sound {
            millis,
            frequencies: encode_frequencies(value, config)?,
        })
    };

    let mut sounds = Vec::with_capacity(2 + 2 * frame.len());
    // Control chords sound one step into their accepted range for edge
    // tolerance at the receiver.
    sounds.push(chord(SIGNAL_PREAMBLE + SIGNAL_TX_OFFSET, config.preamble_ms)?);
    for &byte in frame {
        sounds.push(chord(u64::from(byte), config.symbol_ms)?);
        sounds.push(chord(SIGNAL_SEPARATOR + SIGNAL_TX_OFFSET, config.sep_ms)?);
    }
    sounds.push(chord(SIGNAL_POST + SIGNAL_TX_OFFSET, config.post_ms)?);
    Ok(sounds)
}

/// Receive state, advanced once per decoded capture window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxState {
    /// Waiting for a preamble chord.
    Preamble,
    /// Collecting data chords into the pending frame.
    Word,
    /// Frame ring saturated; swallowing symbols until the stream resets.
    Discarding,
}

/// Everything the capture callback owns: window re-blocking, spectrum
/// analysis, the vote histogram, and the producer half of the frame ring.
struct FrameAssembler {
    config: ModemConfig,
    analyzer: SpectrumAnalyzer,
    window: Vec<f32>,
    state: RxState,
    votes: [u32; 256],
    voted: bool,
    pending: Vec<u8>,
    frames: HeapProducer<Vec<u8>>,
}

impl FrameAssembler {
    fn new(config: ModemConfig, frames: HeapProducer<Vec<u8>>) -> Self {
        let analyzer = SpectrumAnalyzer::new(config.fft_frame, config.sample_rate);
        let window = Vec::with_capacity(config.fft_frame);
        let pending = Vec::with_capacity(config.phy_mtu);
        Self {
            config,
            analyzer,
            window,
            state: RxState::Preamble,
            votes: [0; 256],
            voted: false,
            pending,
            frames,
        }
    }

    /// Capture entry point. Devices deliver chunks of arbitrary size; the
    /// decoder needs exact FFT windows, so buffer and re-block here.
    fn ingest(&mut self, samples: &[f32]) {
        self.window.extend_from_slice(samples);
        let size = self.config.fft_frame;
        while self.window.len() >= size {
            let window: Vec<f32> = self.window.drain(..size).collect();
            self.process_window(&window);
        }
    }

    fn process_window(&mut self, window: &[f32]) {
        let bins = match self.analyzer.magnitudes(window) {
            Ok(bins) => bins,
            Err(err) => {
                log::error!("spectrum analysis failed: {err}");
                return;
            }
        };
        match decode_frequencies(&bins, &self.config) {
            Ok(Some(value)) => self.step(Signal::classify(value)),
            Ok(None) => {} // quiet
            Err(err) => log::error!("chord decode failed: {err}"),
        }
    }

    /// One state machine transition. Quiet windows never reach here;
    /// unknown symbols fall through every arm.
    fn step(&mut self, signal: Signal) {
        match (self.state, signal) {
            (RxState::Word, Signal::Data(byte)) => {
                self.votes[byte as usize] += 1;
                self.voted = true;
            }

            (RxState::Preamble, Signal::Preamble) => {
                if self.frames.is_full() {
                    // Nobody is consuming; don't overwrite undelivered frames.
                    log::debug!("preamble with saturated ring, discarding");
                    self.state = RxState::Discarding;
                } else {
                    log::debug!("preamble");
                    self.pending.clear();
                    self.state = RxState::Word;
                }
            }
            (RxState::Discarding, Signal::Preamble) => {
                if !self.frames.is_full() {
                    self.pending.clear();
                    self.state = RxState::Word;
                }
            }

            (RxState::Word, Signal::Separator) => {
                // A repeated separator chord spans several windows; only
                // the first one after a data vote commits a byte.
                if self.voted {
                    self.voted = false;
                    if self.pending.len() >= self.config.phy_mtu {
                        self.state = RxState::Discarding;
                    } else {
                        let byte = self.vote_winner();
                        log::debug!("data byte {byte:#04x}");
                        self.pending.push(byte);
                    }
                    self.votes = [0; 256];
                }
            }

            (RxState::Word, Signal::Post) => {
                log::debug!("post, frame of {} bytes", self.pending.len());
                if !self.pending.is_empty() {
                    let frame = std::mem::take(&mut self.pending);
                    if self.frames.push(frame).is_err() {
                        log::warn!("frame ring full, dropping completed frame");
                    }
                }
                self.votes = [0; 256];
                self.voted = false;
                self.state = RxState::Preamble;
            }
            (RxState::Preamble, Signal::Post) | (RxState::Discarding, Signal::Post) => {
                self.pending.clear();
                self.state = RxState::Preamble;
            }

            // Spurious preamble mid-word, data outside a word, separators
            // anywhere else, unknown symbols: all ignored.
            _ => {}
        }
    }

    fn vote_winner(&self) -> u8 {
        let mut winner = 0usize;
        let mut best = 0u32;
        for (byte, &count) in self.votes.iter().enumerate() {
            if count > best {
                best = count;
                winner = byte;
            }
        }
        winner as u8
    }
}

/// Half-duplex octet frame socket over an audio backend.
pub struct PhysicalSocket<B: AudioBackend> {
    config: ModemConfig,
    backend: B,
    frames: HeapConsumer<Vec<u8>>,
}

impl<B: AudioBackend> PhysicalSocket<B> {
    /// Build the receive pipeline inside the backend's capture callback
    /// and start the device.
    pub fn new(config: ModemConfig, mut backend: B) -> Result<Self> {
        config.validate()?;

        let ring = HeapRb::new(config.max_frames);
        let (producer, consumer) = ring.split();
        let mut assembler = FrameAssembler::new(config.clone(), producer);
        backend.set_capture_sink(Box::new(move |samples| assembler.ingest(samples)));
        backend.start()?;

        Ok(Self {
            config,
            backend,
            frames: consumer,
        })
    }

    pub fn config(&self) -> &ModemConfig {
        &self.config
    }

    /// Sound the frame. Blocks until the sequence has fully played.
    pub fn send(&mut self, frame: &[u8]) -> Result<()> {
        let sounds = frame_sounds(frame, &self.config)?;
        self.backend.play_sounds(&sounds)
    }

    /// Copy of the head frame without consuming it. Blocking peeks poll
    /// in one-second ticks up to the configured receive timeout.
    pub fn peek(&mut self, blocking: bool) -> Result<Option<Vec<u8>>> {
        for tick in 0..=self.config.recv_timeout_secs {
            if tick > 0 {
                thread::sleep(Duration::from_secs(1));
            }
            if let Some(frame) = self.frames.iter().next() {
                return Ok(Some(frame.clone()));
            }
            if !blocking {
                return Ok(None);
            }
        }

        log::error!("timed out waiting for a frame");
        Err(ModemError::Timeout {
            seconds: self.config.recv_timeout_secs,
        })
    }

    /// Drop the head frame. No-op when nothing is ready.
    pub fn pop(&mut self) -> bool {
        self.frames.pop().is_some()
    }

    /// Blocking receive of one frame.
    pub fn recv(&mut self) -> Result<Vec<u8>> {
        match self.peek(true)? {
            Some(frame) => {
                self.pop();
                Ok(frame)
            }
            // Blocking peek either returns a frame or times out.
            None => Err(ModemError::Timeout {
                seconds: self.config.recv_timeout_secs,
            }),
        }
    }
}

impl<B: AudioBackend> FrameTransport for PhysicalSocket<B> {
    fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.send(frame)
    }

    fn peek_frame(&mut self, blocking: bool) -> Result<Option<Vec<u8>>> {
        self.peek(blocking)
    }

    fn pop_frame(&mut self) -> bool {
        self.pop()
    }

    fn recv_frame(&mut self) -> Result<Vec<u8>> {
        self.recv()
    }
}

impl<B: AudioBackend> Drop for PhysicalSocket<B> {
    fn drop(&mut self) {
        self.backend.stop();
    }
}
