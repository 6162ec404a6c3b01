// LD Decode RS
// Copyright (c) 2024 The LD Decode RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Multi-heterodyne FM demodulator (spec.md §4.2).

use crate::coeffs::{BOOST40, LPF50_16};
use crate::filter::Filter;
use crate::units::{CHZ, LUMA_FREQ_LOW};

const AGC_BINS: usize = 40;
const AGC_BIN_HZ: f64 = 200_000.0;
const AGC_INITIAL_LEVEL: f64 = 30.0;
const AGC_DECAY: f64 = 0.9;
const AGC_GAIN: f64 = 0.1;
const MUTE_RATIO: f64 = 0.3;

/// A small-angle rational `atan2` approximation, `|error| < 0.005` rad
/// (spec.md Glossary/§9).
pub fn fast_atan2(y: f64, x: f64) -> f64 {
    use std::f64::consts::{FRAC_PI_2, PI};

    if x == 0.0 {
        return if y > 0.0 {
            FRAC_PI_2
        } else if y == 0.0 {
            0.0
        } else {
            -FRAC_PI_2
        };
    }

    let z = y / x;
    if z.abs() < 1.0 {
        let atan = z / (1.0 + 0.28 * z * z);
        if x < 0.0 {
            if y < 0.0 {
                atan - PI
            } else {
                atan + PI
            }
        } else {
            atan
        }
    } else {
        let atan = FRAC_PI_2 - z / (z * z + 0.28);
        if y < 0.0 {
            atan - PI
        } else {
            atan
        }
    }
}

fn wrap_pi(mut delta: f64) -> f64 {
    use std::f64::consts::PI;
    if delta > PI {
        delta -= 2.0 * PI;
    } else if delta < -PI {
        delta += 2.0 * PI;
    }
    delta
}

/// Configuration for [`FmDemod`].
pub struct FmDemodConfig {
    /// Samples per processing chunk.
    pub line_len: usize,
    /// Candidate demodulation frequencies in Hz.
    pub candidates: Vec<f64>,
    /// FIRs applied in series to every input sample before mixing.
    pub prefilters: Vec<Filter>,
    /// Template I/Q lowpass, cloned once per candidate frequency.
    pub candidate_lpf: Filter,
    /// Optional post-filter applied to the chosen instantaneous-frequency
    /// output.
    pub post_filter: Option<Filter>,
    /// Leading warm-up region whose outputs are suppressed.
    pub min_offset: usize,
}

impl Default for FmDemodConfig {
    fn default() -> Self {
        FmDemodConfig {
            line_len: 2048,
            candidates: vec![8_100_000.0, 8_700_000.0, 9_300_000.0],
            prefilters: vec![Filter::fir(&BOOST40)],
            candidate_lpf: Filter::fir(&LPF50_16),
            post_filter: None,
            min_offset: 128,
        }
    }
}

/// Per-sample heterodyne FM demodulator with peak-frequency selection and an
/// AGC-driven mute gate.
pub struct FmDemod {
    line_len: usize,
    min_offset: usize,
    candidates: Vec<f64>,
    prefilters: Vec<Filter>,
    iq: Vec<(Filter, Filter)>,
    post_filter: Option<Filter>,
    phasors: Vec<Vec<(f64, f64)>>,
    avg_level: [f64; AGC_BINS],
}

impl FmDemod {
    pub fn new(config: FmDemodConfig) -> FmDemod {
        let phasors = config
            .candidates
            .iter()
            .map(|&f| {
                let fmult = f / CHZ;
                (0..config.line_len)
                    .map(|k| {
                        let angle = k as f64 * 2.0 * std::f64::consts::PI * fmult;
                        (angle.sin(), angle.cos())
                    })
                    .collect()
            })
            .collect();

        let iq = config
            .candidates
            .iter()
            .map(|_| (config.candidate_lpf.clone(), config.candidate_lpf.clone()))
            .collect();

        FmDemod {
            line_len: config.line_len,
            min_offset: config.min_offset,
            candidates: config.candidates,
            prefilters: config.prefilters,
            iq,
            post_filter: config.post_filter,
            phasors,
            avg_level: [AGC_INITIAL_LEVEL; AGC_BINS],
        }
    }

    /// Demodulate one chunk of samples. Returns an empty vector if `input` is
    /// shorter than `line_len`. Filter histories persist across calls.
    pub fn process(&mut self, input: &[f64]) -> Vec<f64> {
        if input.len() < self.line_len {
            return Vec::new();
        }

        let mut out = Vec::with_capacity(input.len().saturating_sub(self.min_offset));
        // The reference demodulator resets its phase-tracking state to zero at
        // the start of every chunk rather than carrying it from the previous
        // call; reproduced here for fidelity to the reference's per-chunk
        // phase-delta computation.
        let mut phase = vec![0.0_f64; self.candidates.len()];

        for (i, &raw) in input.iter().enumerate() {
            let mut n = raw;
            for pf in self.prefilters.iter_mut() {
                n = pf.feed(n);
            }

            let mut peak_abs_delta = f64::INFINITY;
            let mut peak_freq = 0.0;
            let mut peak_level = 0.0;

            for (j, &f) in self.candidates.iter().enumerate() {
                let (sin_jk, cos_jk) = self.phasors[j][i];
                let fci = self.iq[j].0.feed(n * sin_jk);
                let fcq = self.iq[j].1.feed(-n * cos_jk);

                let theta = fast_atan2(fci, fcq);
                let delta = wrap_pi(theta - phase[j]);
                let level = (fci * fci + fcq * fcq).sqrt();
                let f_hat = f + (f / 2.0) * delta;

                phase[j] = theta;

                if delta.abs() < peak_abs_delta {
                    peak_abs_delta = delta.abs();
                    peak_freq = f_hat;
                    peak_level = level;
                }
            }

            let mut this_out = peak_freq;
            if let Some(pf) = &mut self.post_filter {
                this_out = pf.feed(peak_freq);
            }

            if i >= self.min_offset {
                let bin = (((this_out - LUMA_FREQ_LOW) / AGC_BIN_HZ).max(0.0) as usize)
                    .min(AGC_BINS - 1);
                self.avg_level[bin] = self.avg_level[bin] * AGC_DECAY + peak_level * AGC_GAIN;

                if peak_level / self.avg_level[bin] > MUTE_RATIO {
                    out.push(this_out);
                } else {
                    out.push(0.0);
                }
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_input_returns_empty() {
        let mut demod = FmDemod::new(FmDemodConfig { line_len: 2048, ..Default::default() });
        let out = demod.process(&vec![128.0; 100]);
        assert!(out.is_empty());
    }

    #[test]
    fn constant_midscale_input_is_muted() {
        let mut demod = FmDemod::new(FmDemodConfig::default());
        let input = vec![128.0_f64; 4096];
        let out = demod.process(&input);
        assert!(!out.is_empty());
        assert!(out.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn cosine_at_8_7mhz_converges_near_carrier() {
        let mut demod = FmDemod::new(FmDemodConfig::default());
        let n = 4096;
        let freq = 8_700_000.0_f64;
        let amplitude = 60.0; // IRE-ish units, well above the mute floor
        let offset = 128.0;
        let input: Vec<f64> = (0..n)
            .map(|i| offset + amplitude * (2.0 * std::f64::consts::PI * freq * i as f64 / CHZ).cos())
            .collect();

        let out = demod.process(&input);
        assert!(!out.is_empty());

        let steady = &out[256.min(out.len() - 1)..];
        let nonzero: Vec<f64> = steady.iter().copied().filter(|&v| v != 0.0).collect();
        assert!(!nonzero.is_empty(), "expected unmuted steady-state output");
        let avg = nonzero.iter().sum::<f64>() / nonzero.len() as f64;
        assert!((avg - freq).abs() < 50_000.0, "avg={avg}");
    }

    #[test]
    fn fast_atan2_matches_std_within_tolerance() {
        for i in -100..=100 {
            for j in -100..=100 {
                if i == 0 && j == 0 {
                    continue;
                }
                let y = i as f64 / 10.0;
                let x = j as f64 / 10.0;
                let got = fast_atan2(y, x);
                let want = y.atan2(x);
                assert!((got - want).abs() < 0.02, "y={y} x={x} got={got} want={want}");
            }
        }
    }
}
