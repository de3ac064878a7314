//! Real duplex audio device backed by cpal.
//!
//! Capture runs on the device's own thread and feeds the registered sink;
//! playback drains a sample queue filled by `play_sounds`, which blocks
//! until the output callback reports the queue empty. While a playback is
//! in flight the capture callback drops its input, keeping the modem
//! half-duplex so it never decodes its own speaker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;

use chirp_core::audio::{synthesize_sounds, AudioBackend, CaptureSink, PlaybackQueue, Sound};
use chirp_core::errors::{ModemError, Result};

type SharedSink = Arc<Mutex<Option<CaptureSink>>>;

pub struct CpalBackend {
    sample_rate: u32,
    sink: SharedSink,
    playing: Arc<AtomicBool>,
    playback: Arc<Mutex<PlaybackQueue>>,
    input: Option<cpal::Stream>,
    output: Option<cpal::Stream>,
}

impl CpalBackend {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            sink: Arc::new(Mutex::new(None)),
            playing: Arc::new(AtomicBool::new(false)),
            playback: Arc::new(Mutex::new(PlaybackQueue::new())),
            input: None,
            output: None,
        }
    }

    fn stream_config(&self) -> cpal::StreamConfig {
        cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        }
    }
}

impl AudioBackend for CpalBackend {
    fn set_capture_sink(&mut self, sink: CaptureSink) {
        *self.sink.lock() = Some(sink);
    }

    fn start(&mut self) -> Result<()> {
        let host = cpal::default_host();
        let config = self.stream_config();

        let input_device = host
            .default_input_device()
            .ok_or_else(|| ModemError::backend("no default input device"))?;
        let output_device = host
            .default_output_device()
            .ok_or_else(|| ModemError::backend("no default output device"))?;
        log::debug!(
            "input: {:?}, output: {:?}",
            input_device.name().unwrap_or_else(|_| "unknown".into()),
            output_device.name().unwrap_or_else(|_| "unknown".into()),
        );

        let sink = self.sink.clone();
        let playing = self.playing.clone();
        let input = input_device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    // Half-duplex: drop capture while the speaker is ours.
                    if playing.load(Ordering::Acquire) {
                        return;
                    }
                    if let Some(sink) = sink.lock().as_mut() {
                        sink(data);
                    }
                },
                |err| log::error!("capture stream error: {err}"),
                None,
            )
            .map_err(|err| ModemError::backend(format!("building capture stream: {err}")))?;

        let playback = self.playback.clone();
        let output = output_device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    playback.lock().fill(data);
                },
                |err| log::error!("playback stream error: {err}"),
                None,
            )
            .map_err(|err| ModemError::backend(format!("building playback stream: {err}")))?;

        input
            .play()
            .map_err(|err| ModemError::backend(format!("starting capture: {err}")))?;
        output
            .play()
            .map_err(|err| ModemError::backend(format!("starting playback: {err}")))?;

        self.input = Some(input);
        self.output = Some(output);
        Ok(())
    }

    fn stop(&mut self) {
        self.playback.lock().abort();
        self.input = None;
        self.output = None;
    }

    fn play_sounds(&mut self, sounds: &[Sound]) -> Result<()> {
        if self.output.is_none() {
            return Err(ModemError::backend("backend not started"));
        }

        let samples = synthesize_sounds(sounds, self.sample_rate);
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(1);

        self.playing.store(true, Ordering::Release);
        self.playback.lock().load(
            samples,
            Box::new(move || {
                let _ = done_tx.send(());
            }),
        );

        let result = done_rx
            .recv()
            .map_err(|_| ModemError::backend("playback interrupted"));
        self.playing.store(false, Ordering::Release);
        result
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        self.stop();
    }
}
