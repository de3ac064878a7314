//! Modem configuration: the frequency plan and every protocol tunable.

use serde::{Deserialize, Serialize};

use crate::errors::{ModemError, Result};
use crate::symbols::{choose, SIGNAL_LIMIT};

/// The full tunables record for one modem stack. `Default` is the
/// reference plan; every field can be overridden from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModemConfig {
    /// Lowest frequency of the plan in Hz (the bottom of channel 0's band).
    pub base_freq_hz: u32,
    /// Width of one channel band in Hz.
    pub band_width_hz: u32,
    /// Number of frequency channels.
    pub channels: u32,
    /// Number of channels sounded simultaneously per chord.
    pub concurrent: u32,
    /// Minimum FFT magnitude considered "heard".
    pub magnitude_threshold: f32,
    /// Maximum physical frame size in bytes.
    pub phy_mtu: usize,
    /// Capture/playback sample rate in Hz.
    pub sample_rate: u32,
    /// Samples per FFT window.
    pub fft_frame: usize,
    /// Duration of a data chord in milliseconds.
    pub symbol_ms: u32,
    /// Duration of the preamble chord in milliseconds.
    pub preamble_ms: u32,
    /// Duration of the post chord in milliseconds.
    pub post_ms: u32,
    /// Duration of the separator chord in milliseconds.
    pub sep_ms: u32,
    /// Completed frames buffered by the receiver before the oldest ones
    /// start blocking new frames out.
    pub max_frames: usize,
    /// Blocking receive timeout in seconds.
    pub recv_timeout_secs: u32,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            base_freq_hz: 100,
            band_width_hz: 150,
            channels: 13,
            concurrent: 3,
            magnitude_threshold: 0.1,
            phy_mtu: 9,
            sample_rate: 48_000,
            fft_frame: 3_600,
            symbol_ms: 150,
            preamble_ms: 300,
            post_ms: 300,
            sep_ms: 150,
            max_frames: 50,
            recv_timeout_secs: 6,
        }
    }
}

impl ModemConfig {
    /// Number of distinct symbol values one chord can carry.
    pub fn symbol_capacity(&self) -> u64 {
        choose(u64::from(self.channels), u64::from(self.concurrent))
    }

    /// Maximum link packet size in bytes, header included.
    pub fn link_mtu(&self) -> usize {
        256 * (self.phy_mtu - 1)
    }

    /// Centre frequency of `channel` in Hz.
    pub fn channel_frequency(&self, channel: u32) -> u32 {
        self.base_freq_hz + channel * self.band_width_hz + self.band_width_hz / 2
    }

    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 || self.concurrent == 0 || self.concurrent > self.channels {
            return Err(ModemError::invalid(format!(
                "need 0 < concurrent <= channels, got {}/{}",
                self.concurrent, self.channels
            )));
        }
        if self.symbol_capacity() < SIGNAL_LIMIT {
            return Err(ModemError::invalid(format!(
                "frequency plan carries {} symbols, control signals need {}",
                self.symbol_capacity(),
                SIGNAL_LIMIT
            )));
        }
        if self.band_width_hz == 0 {
            return Err(ModemError::invalid("band width must be positive"));
        }
        if self.phy_mtu < 2 {
            // The link layer spends one byte per frame on its sequence.
            return Err(ModemError::invalid(format!(
                "physical MTU {} leaves no room for payload",
                self.phy_mtu
            )));
        }
        if self.sample_rate == 0 || self.fft_frame == 0 {
            return Err(ModemError::invalid("sample rate and FFT frame must be positive"));
        }
        let top = self.channel_frequency(self.channels - 1);
        if 2 * top >= self.sample_rate {
            return Err(ModemError::invalid(format!(
                "top channel at {} Hz violates Nyquist for {} Hz sampling",
                top, self.sample_rate
            )));
        }
        if self.symbol_ms == 0 || self.sep_ms == 0 || self.preamble_ms == 0 || self.post_ms == 0 {
            return Err(ModemError::invalid("chord durations must be positive"));
        }
        if self.max_frames == 0 {
            return Err(ModemError::invalid("frame ring needs at least one slot"));
        }
        if !self.magnitude_threshold.is_finite() || self.magnitude_threshold <= 0.0 {
            return Err(ModemError::invalid(format!(
                "magnitude threshold {} must be finite and positive",
                self.magnitude_threshold
            )));
        }
        Ok(())
    }
}
