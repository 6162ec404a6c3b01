// LD Decode RS
// Copyright (c) 2024 The LD Decode RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Generic direct-form FIR/IIR filter kernel (spec.md §4.1).
//!
//! Every DSP block in this crate — the FM demodulator's I/Q mixers, the
//! deemphasis running-mean, the comb decoder's color LPFs and noise-reduction
//! high-pass filters — is built out of one of these.

/// A direct-form filter with `order + 1` numerator taps `b` and, for IIR
/// filters, the same number of denominator taps `a`. `a = [1]` (the FIR case)
/// is the default.
///
/// `Filter` is a value type: [`Clone`] duplicates the coefficients but resets
/// the sliding input/output histories, matching spec.md §4.1 exactly.
#[derive(Debug)]
pub struct Filter {
    a: Vec<f64>,
    b: Vec<f64>,
    x: Vec<f64>,
    y: Vec<f64>,
}

impl Filter {
    /// Construct a pure-FIR filter from its numerator taps.
    pub fn fir(b: &[f64]) -> Filter {
        let order = b.len();
        Filter { a: vec![1.0], b: b.to_vec(), x: vec![0.0; order], y: vec![0.0; order] }
    }

    /// Construct an IIR filter from numerator taps `b` and denominator taps
    /// `a` (`a.len()` must equal `b.len()`).
    pub fn iir(a: &[f64], b: &[f64]) -> Filter {
        assert_eq!(a.len(), b.len(), "IIR filter requires matching a/b lengths");
        let order = b.len();
        Filter { a: a.to_vec(), b: b.to_vec(), x: vec![0.0; order], y: vec![0.0; order] }
    }

    fn is_iir(&self) -> bool {
        self.a.len() > 1
    }

    /// Fill both histories with `val`.
    pub fn clear(&mut self, val: f64) {
        for slot in self.x.iter_mut() {
            *slot = val;
        }
        for slot in self.y.iter_mut() {
            *slot = val;
        }
    }

    /// Advance the filter by one sample and return the new output.
    pub fn feed(&mut self, val: f64) -> f64 {
        let order = self.b.len();

        self.x.copy_within(0..order - 1, 1);
        if self.is_iir() {
            self.y.copy_within(0..order - 1, 1);
        }
        self.x[0] = val;

        let a0 = self.a[0];
        let mut y0 = 0.0;

        if self.is_iir() {
            for o in 0..order {
                y0 += (self.b[o] / a0) * self.x[o];
                if o > 0 {
                    y0 -= (self.a[o] / a0) * self.y[o];
                }
            }
        } else {
            for o in 0..order {
                y0 += self.b[o] * self.x[o];
            }
        }

        self.y[0] = y0;
        y0
    }

    /// The most recently produced output, without advancing the filter.
    pub fn val(&self) -> f64 {
        self.y[0]
    }
}

impl Clone for Filter {
    fn clone(&self) -> Filter {
        let order = self.b.len();
        Filter { a: self.a.clone(), b: self.b.clone(), x: vec![0.0; order], y: vec![0.0; order] }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn fir_clear_sets_both_histories() {
        let mut f = Filter::fir(&[1.0, 0.5, 0.25]);
        f.clear(3.0);
        assert_eq!(f.val(), 3.0);
    }

    #[test]
    fn clone_resets_state_but_keeps_coefficients() {
        let mut f = Filter::fir(&[0.5, 0.5]);
        f.feed(10.0);
        f.feed(20.0);
        let cloned = f.clone();
        assert_eq!(cloned.val(), 0.0);

        let mut a = Filter::fir(&[0.25, 0.75]);
        let mut b = a.clone();
        for n in [1.0, 2.0, 3.0, -4.0, 5.5] {
            assert_eq!(a.feed(n), b.feed(n));
        }
    }

    #[test]
    fn fir_matches_manual_convolution() {
        let b = [0.2, 0.3, 0.5];
        let mut f = Filter::fir(&b);
        let input = [1.0, 2.0, 3.0, 4.0];
        let mut hist = [0.0, 0.0, 0.0];
        for &n in &input {
            let got = f.feed(n);
            hist.copy_within(0..2, 1);
            hist[0] = n;
            let want: f64 = b.iter().zip(hist.iter()).map(|(bi, xi)| bi * xi).sum();
            assert!((got - want).abs() < 1e-12);
        }
    }

    #[test]
    fn iir_a0_one_matches_fir_when_other_a_zero() {
        let b = [0.1, 0.2, 0.3, 0.1];
        let a = [1.0, 0.0, 0.0, 0.0];
        let mut iir = Filter::iir(&a, &b);
        let mut fir = Filter::fir(&b);
        for n in [1.0, -1.0, 2.5, 0.0, -3.0] {
            let y_iir = iir.feed(n);
            let y_fir = fir.feed(n);
            assert!((y_iir - y_fir).abs() < 1e-12);
        }
    }

    #[test]
    fn linearity_holds_for_synchronised_clones() {
        let mut rng = SmallRng::seed_from_u64(42);
        let b: Vec<f64> = (0..9).map(|_| rng.gen_range(-1.0..1.0)).collect();

        let mut fx = Filter::fir(&b);
        let mut fy = Filter::fir(&b);
        let mut fcomb = Filter::fir(&b);

        let a_coef = 2.0;
        let b_coef = -0.5;

        for _ in 0..2000 {
            let x: f64 = rng.gen_range(-1.0..1.0);
            let y: f64 = rng.gen_range(-1.0..1.0);

            let out_x = fx.feed(x);
            let out_y = fy.feed(y);
            let out_comb = fcomb.feed(a_coef * x + b_coef * y);

            assert!((out_comb - (a_coef * out_x + b_coef * out_y)).abs() < 1e-9);
        }
    }
}
