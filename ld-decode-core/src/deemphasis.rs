// LD Decode RS
// Copyright (c) 2024 The LD Decode RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Charge compensator / deemphasis stage applied after FM demodulation
//! (spec.md §4.3), and the final 16-bit luma quantiser.

use crate::filter::Filter;
use crate::units::{LUMA_CODE_RANGE, LUMA_FREQ_HIGH, LUMA_FREQ_LOW};

const RUNNING_MEAN_TAPS: usize = 16;
const ADJ_DIVISOR: f64 = 400_000.0;
const ADJ_EXPONENT: f64 = 0.60;
const CHARGE_DECAY: f64 = 0.88;
const F_BASE: f64 = 0.85;
const F_SLOPE: f64 = 0.50;

/// Single-sample-feedback deemphasis filter. Maintains `charge`/`prev`
/// scalars and a 16-tap running-mean filter on `|n - prev|`.
pub struct ChargeCompensator {
    charge: f64,
    prev: f64,
    c_avg: Filter,
}

impl Default for ChargeCompensator {
    fn default() -> Self {
        let tap = 1.0 / RUNNING_MEAN_TAPS as f64;
        ChargeCompensator {
            charge: 0.0,
            prev: 8_700_000.0,
            c_avg: Filter::fir(&vec![tap; RUNNING_MEAN_TAPS]),
        }
    }
}

impl ChargeCompensator {
    pub fn new() -> ChargeCompensator {
        ChargeCompensator::default()
    }

    /// Apply deemphasis to one non-muted demodulated-frequency sample. Muted
    /// samples (value `0.0`) must not be passed here; quantise them to `0`
    /// directly instead (spec.md §4.3's "muted samples pass through as 0").
    pub fn feed(&mut self, n: f64) -> f64 {
        let adj = (self.c_avg.feed((n - self.prev).abs()) / ADJ_DIVISOR).powf(ADJ_EXPONENT);
        self.charge += n - self.prev;
        self.prev = n;

        let f = (F_BASE - F_SLOPE * adj).max(0.0);
        let adjusted = n - self.charge * f;
        self.charge *= CHARGE_DECAY;

        adjusted
    }
}

/// Quantise a deemphasised frequency sample (or `0.0` for a muted sample) to
/// the final 16-bit luma code (spec.md §3/§4.3).
pub fn quantize_luma(n: f64) -> u16 {
    if n == 0.0 {
        return 0;
    }

    let mut scaled = (n - LUMA_FREQ_LOW) / (LUMA_FREQ_HIGH - LUMA_FREQ_LOW);
    if scaled < 0.0 {
        scaled = 0.0;
    }

    let code = 1.0 + (scaled * LUMA_CODE_RANGE).round();
    code.clamp(1.0, 65535.0) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn muted_sample_quantises_to_zero() {
        assert_eq!(quantize_luma(0.0), 0);
    }

    #[test]
    fn low_edge_quantises_to_one() {
        assert_eq!(quantize_luma(LUMA_FREQ_LOW), 1);
    }

    #[test]
    fn high_edge_quantises_to_max() {
        assert_eq!(quantize_luma(LUMA_FREQ_HIGH), 65535);
    }

    #[test]
    fn compensator_tracks_constant_input_without_drift() {
        let mut comp = ChargeCompensator::new();
        let mut last = 0.0;
        for _ in 0..200 {
            last = comp.feed(8_700_000.0);
        }
        assert!((last - 8_700_000.0).abs() < 1.0);
    }
}
