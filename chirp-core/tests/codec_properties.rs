//! Property-based invariants of the symbol and frequency codecs.

use chirp_core::config::ModemConfig;
use chirp_core::encoding::{decode_frequencies, encode_frequencies};
use chirp_core::errors::ModemError;
use chirp_core::spectrum::FrequencyBin;
use chirp_core::symbols::{choose, decode_channels, encode_channels};
use proptest::prelude::*;

/// Synthetic spectrum with unit magnitude at the given frequencies and
/// silence everywhere else, on the reference bin grid.
fn unit_bins(frequencies: &[u32], config: &ModemConfig) -> Vec<FrequencyBin> {
    let bin_hz = config.sample_rate as f32 / config.fft_frame as f32;
    (0..=config.fft_frame / 2)
        .map(|i| {
            let frequency = i as f32 * bin_hz;
            let lit = frequencies
                .iter()
                .any(|&f| (frequency - f as f32).abs() <= bin_hz / 2.0);
            FrequencyBin {
                frequency,
                magnitude: if lit { 1.0 } else { 0.0 },
            }
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig {
        max_global_rejects: 8192,
        ..ProptestConfig::default()
    })]

    /// decode(encode(v)) == v over the whole reference symbol space.
    #[test]
    fn symbol_roundtrip(value in 0u64..286) {
        let set = encode_channels(value, 13, 3).unwrap();
        prop_assert_eq!(decode_channels(&set, 13).unwrap(), value);
    }

    /// encode always yields strictly ascending channels inside the plan.
    #[test]
    fn encoded_sets_strictly_ascend(value in 0u64..286) {
        let set = encode_channels(value, 13, 3).unwrap();
        prop_assert_eq!(set.len(), 3);
        prop_assert!(set.iter().all(|&c| c < 13));
        prop_assert!(set.windows(2).all(|w| w[0] < w[1]));
    }

    /// encode(decode(S)) == S for every canonical channel set.
    #[test]
    fn channel_set_roundtrip(a in 0u32..11, b in 0u32..12, c in 0u32..13) {
        prop_assume!(a < b && b < c);
        let set = vec![a, b, c];
        let value = decode_channels(&set, 13).unwrap();
        prop_assert_eq!(encode_channels(value, 13, 3).unwrap(), set);
    }

    /// The ranking stays a bijection on other plan geometries.
    #[test]
    fn roundtrip_on_arbitrary_plans(total in 3u32..16, count in 1u32..5, raw in any::<u64>()) {
        prop_assume!(count <= total);
        let capacity = choose(u64::from(total), u64::from(count));
        let value = raw % capacity;
        let set = encode_channels(value, total, count).unwrap();
        prop_assert_eq!(decode_channels(&set, total).unwrap(), value);
    }

    /// Chord frequencies survive the spectrum round trip.
    #[test]
    fn frequency_roundtrip(value in 0u64..286) {
        let config = ModemConfig::default();
        let frequencies = encode_frequencies(value, &config).unwrap();
        let bins = unit_bins(&frequencies, &config);
        prop_assert_eq!(decode_frequencies(&bins, &config).unwrap(), Some(value));
    }
}

#[test]
fn capacity_boundary() {
    assert!(encode_channels(285, 13, 3).is_ok());
    match encode_channels(286, 13, 3) {
        Err(ModemError::OutOfRange { value, capacity }) => {
            assert_eq!(value, 286);
            assert_eq!(capacity, 286);
        }
        other => panic!("expected OutOfRange, got {other:?}"),
    }
}

#[test]
fn quiet_when_too_few_loud_bins() {
    let config = ModemConfig::default();
    let bins = unit_bins(&[175, 325], &config);
    assert_eq!(decode_frequencies(&bins, &config).unwrap(), None);

    let silent = unit_bins(&[], &config);
    assert_eq!(decode_frequencies(&silent, &config).unwrap(), None);
}
