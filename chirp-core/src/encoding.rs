//! Frequency encoder/decoder: symbol values to chord frequencies and back.
//!
//! The decoder picks the strongest channels out of a magnitude spectrum
//! rather than testing fixed per-band thresholds. Ranking by peak magnitude
//! is insensitive to the absolute gain of the microphone, and "the K
//! loudest channels present" is exactly the shape the combinatorial codec
//! ranks.

use crate::config::ModemConfig;
use crate::errors::{ModemError, Result};
use crate::spectrum::FrequencyBin;
use crate::symbols;

/// Encode a symbol value into the chord frequencies that sound it.
pub fn encode_frequencies(value: u64, config: &ModemConfig) -> Result<Vec<u32>> {
    let channels = symbols::encode_channels(value, config.channels, config.concurrent)?;
    Ok(channels
        .into_iter()
        .map(|channel| config.channel_frequency(channel))
        .collect())
}

/// Nearest channel index for a bin frequency, or `None` when the bin falls
/// outside the plan.
fn frequency_to_channel(frequency: f32, config: &ModemConfig) -> Option<u32> {
    let width = config.band_width_hz as f32;
    let base = (config.base_freq_hz as f32 / width).round() as i64;
    let index = (frequency / width).round() as i64 - base;
    if (0..i64::from(config.channels)).contains(&index) {
        Some(index as u32)
    } else {
        None
    }
}

/// Decode a magnitude spectrum into a symbol value.
///
/// Returns `Ok(None)` (quiet) when fewer than `concurrent` channels rise
/// above the magnitude threshold; bins mapping outside the plan or onto an
/// already-selected channel (noise, harmonics, colliding senders) are
/// skipped.
pub fn decode_frequencies(bins: &[FrequencyBin], config: &ModemConfig) -> Result<Option<u64>> {
    let wanted = config.concurrent as usize;
    if bins.len() < wanted {
        return Err(ModemError::invalid(format!(
            "spectrum of {} bins cannot hold {} channels",
            bins.len(),
            wanted
        )));
    }

    let mut ordered: Vec<&FrequencyBin> = bins.iter().collect();
    ordered.sort_by(|a, b| b.magnitude.total_cmp(&a.magnitude));

    // Not even K loud bins in the whole spectrum: the channel is quiet.
    if ordered[wanted - 1].magnitude <= config.magnitude_threshold {
        return Ok(None);
    }

    let mut channels: Vec<u32> = Vec::with_capacity(wanted);
    for bin in ordered {
        if channels.len() == wanted {
            break;
        }
        if bin.magnitude <= config.magnitude_threshold {
            log::trace!("sound died out at {:.0} Hz", bin.frequency);
            break;
        }

        let channel = match frequency_to_channel(bin.frequency, config) {
            Some(channel) => channel,
            None => continue,
        };
        if channels.contains(&channel) {
            log::trace!("channel {} seen twice, skipping collision", channel);
            continue;
        }
        channels.push(channel);
    }

    if channels.len() < wanted {
        return Ok(None);
    }

    symbols::decode_channels(&channels, config.channels).map(Some)
}
