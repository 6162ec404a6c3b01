// LD Decode RS
// Copyright (c) 2024 The LD Decode RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-line comb splitters and the denoise/group-delay-compensation stages
//! that run between them (spec.md §4.4.3-4.4.9).
//!
//! Every function here takes plain slices/scalars rather than a
//! [`crate::ring::FrameSlot`] so the optical-flow pre-pass (§4.4.7) can run
//! the same [`adjust_y`]/[`do_ynr`]/[`do_cnr`] logic against a scratch copy
//! of a slot's YIQ buffer instead of the slot itself.

use crate::coeffs::{COLOR_LPF_I, COLOR_LPF_Q};
use crate::comb::CombConfig;
use crate::filter::Filter;
use crate::ring::{FrameRing, Plane, Yiq};

/// Tracks the per-line phase-invert toggle described in spec.md §4.4.2.
/// Reconstructed fresh at the top of every splitter pass, matching
/// `comb.cpp`'s local `topInvertphase`/`bottomInvertphase` booleans.
struct PhaseToggle {
    top: bool,
    bottom: bool,
}

impl PhaseToggle {
    fn new(first_field_phase_id: u8, second_field_phase_id: u8) -> PhaseToggle {
        PhaseToggle {
            top: matches!(first_field_phase_id, 2 | 3),
            bottom: matches!(second_field_phase_id, 1 | 4),
        }
    }

    fn next(&mut self, line: usize) -> bool {
        if line % 2 == 0 {
            self.top = !self.top;
            self.top
        } else {
            self.bottom = !self.bottom;
            self.bottom
        }
    }
}

/// 1D chroma split (spec.md §4.4.3). Writes `clpbuffer[0]`/`combk[0]` for
/// every active pixel of every visible line.
pub fn split1d(config: &CombConfig, raw: &[u16], clp0: &mut Plane, combk0: &mut Plane, first_field_phase_id: u8, second_field_phase_id: u8) {
    const F_TOFFSET: usize = 16;
    let frame_height = config.frame_height();
    let mut phase = PhaseToggle::new(first_field_phase_id, second_field_phase_id);

    for line in config.first_visible_frame_line..frame_height {
        let invert = phase.next(line);
        let mut f_i = Filter::fir(&COLOR_LPF_I);
        let mut f_q = Filter::fir(&COLOR_LPF_Q);
        let row = &raw[line * config.field_width..(line + 1) * config.field_width];

        for h in config.active_video_start..config.active_video_end {
            let mut tc1 = (row[h + 2] as f64 + row[h - 2] as f64) / 2.0 - row[h] as f64;
            if !invert {
                tc1 = -tc1;
            }

            let mut tc1f;
            match h % 4 {
                0 => tc1f = f_i.feed(tc1),
                1 => tc1f = -f_q.feed(-tc1),
                2 => tc1f = -f_i.feed(-tc1),
                3 => tc1f = f_q.feed(tc1),
                _ => unreachable!(),
            }

            if !invert {
                tc1 = -tc1;
                tc1f = -tc1f;
            }

            clp0.set(line, h, tc1);
            if config.filter_depth == 1 {
                clp0.set(line, h - F_TOFFSET, tc1f);
            }
            combk0.set(line, h, 1.0);
        }
    }
}

/// 2D chroma split (spec.md §4.4.4), reading the already-populated
/// `clpbuffer[0]` and writing `clpbuffer[1]`/`combk[1]`, then folding
/// `combk[2]` into `combk[1]`/`combk[0]`.
pub fn split2d(config: &CombConfig, clp0: &Plane, clp1: &mut Plane, combk0: &mut Plane, combk1: &mut Plane, combk2: &Plane) {
    let frame_height = config.frame_height();
    let p_2drange = 45.0 * config.irescale();

    for line in config.first_visible_frame_line..frame_height {
        if line >= 4 && line < frame_height - 1 {
            for h in config.active_video_start..config.active_video_end {
                let c = clp0.get(line, h).abs();
                let c1 = clp0.get(line, h - 1).abs();
                let p = clp0.get(line - 2, h).abs();
                let p1 = clp0.get(line - 2, h - 1).abs();
                let n = clp0.get(line + 2, h).abs();
                let n1 = clp0.get(line + 2, h - 1).abs();

                let mut kp = (c - p).abs() + (c1 - p1).abs() - (c + c1) * 0.10;
                let mut kn = (c - n).abs() + (c1 - n1).abs() - (c + n1) * 0.10;
                kp /= 2.0;
                kn /= 2.0;

                kp = (1.0 - kp / p_2drange).clamp(0.0, 1.0);
                kn = (1.0 - kn / p_2drange).clamp(0.0, 1.0);

                if !config.adaptive_2d {
                    kp = 1.0;
                    kn = 1.0;
                }

                let mut sc = 1.0;
                if kn > 0.0 || kp > 0.0 {
                    if kn > 3.0 * kp {
                        kp = 0.0;
                    } else if kp > 3.0 * kn {
                        kn = 0.0;
                    }
                    sc = 2.0 / (kn + kp);
                    if sc < 1.0 {
                        sc = 1.0;
                    }
                } else if (p - n).abs() - (clp0.get(line - 2, h) + clp0.get(line + 2, h)).abs() * 0.2 <= 0.0 {
                    kn = 1.0;
                    kp = 1.0;
                }

                let mut tc1 = (clp0.get(line, h) - clp0.get(line - 2, h)) * kp * sc;
                tc1 += (clp0.get(line, h) - clp0.get(line + 2, h)) * kn * sc;
                tc1 /= 4.0;

                clp1.set(line, h, tc1);
                combk1.set(line, h, 1.0);
            }
        }

        for h in config.active_video_start..config.active_video_end {
            if line >= 2 && line <= frame_height - 2 {
                let v = combk1.get(line, h) * (1.0 - combk2.get(line, h));
                combk1.set(line, h, v);
            }
            let v0 = 1.0 - combk2.get(line, h) - combk1.get(line, h);
            combk0.set(line, h, v0);
        }
    }
}

/// 3D chroma split (spec.md §4.4.5), consulted only when `filterDepth == 3`.
/// Reads raw samples out of ring slots 0/2 (oldest/newest neighbours of the
/// currently-processed slot 1) and writes `clpbuffer[2]`/`combk[*]` for slot
/// 1 in place.
pub fn split3d(config: &CombConfig, ring: &mut FrameRing, opt_flow: bool, p_3dcore: f64, p_3drange: f64) {
    use crate::coeffs::HAMMING17_3D;

    const TARGET: usize = 1;
    let frame_height = config.frame_height();
    let width = config.field_width;

    for line in config.first_visible_frame_line..frame_height {
        let mut k = vec![0.0_f64; width];
        let mut lp3d = Filter::fir(&HAMMING17_3D);

        let row = |slot: usize| -> Vec<u16> { ring.slot(slot).raw_line(line).to_vec() };
        let f0_row = row(0);
        let f1_row = row(TARGET);
        let f2_row = row(2);

        for h in config.active_video_start..config.active_video_end {
            let f0 = f0_row[h] as f64;
            let f1 = f1_row[h] as f64;
            let f2 = f2_row[h] as f64;

            let kk = (f0 - f2).abs() + ((f1 - f2) - (f1 - f0)).abs();

            if h > 12 {
                k[h - 8] = lp3d.feed(kk);
            }
            if h >= 836 {
                k[h] = kk;
            }
        }

        for h in config.active_video_start..config.active_video_end {
            let p3 = f0_row[h] as f64;
            let n3 = f2_row[h] as f64;
            let cur = f1_row[h] as f64;

            let slot = ring.slot_mut(TARGET);
            if opt_flow {
                slot.clp[2].set(line, h, p3 - cur);
            } else {
                slot.clp[2].set(line, h, (p3 + n3) / 2.0 - cur);
                let combk2 = (1.0 - (k[h] - p_3dcore) / p_3drange).clamp(0.0, 1.0);
                slot.combk[2].set(line, h, combk2);
            }

            if line >= 2 && line <= frame_height - 2 {
                let v1 = 1.0 - slot.combk[2].get(line, h);
                slot.combk[1].set(line, h, v1);
            }
            let v0 = 1.0 - slot.combk[2].get(line, h) - slot.combk[1].get(line, h);
            slot.combk[0].set(line, h, v0);
        }
    }
}

/// IQ demodulation (spec.md §4.4.6): mixes the three weighted chroma
/// estimates down to `(Y, I, Q)` per active pixel.
pub fn split_iq(
    config: &CombConfig,
    raw: &[u16],
    clp: &[Plane; 3],
    combk: &[Plane; 3],
    yiq: &mut [Yiq],
    first_field_phase_id: u8,
    second_field_phase_id: u8,
    black_and_white: bool,
) {
    let frame_height = config.frame_height();
    let width = config.field_width;
    yiq.iter_mut().for_each(|p| *p = Yiq::default());

    let mut phase = PhaseToggle::new(first_field_phase_id, second_field_phase_id);
    for line in config.first_visible_frame_line..frame_height {
        let invert = phase.next(line);
        for h in config.active_video_start..config.active_video_end {
            let mut cavg = combk[2].get(line, h) * clp[2].get(line, h)
                + combk[1].get(line, h) * clp[1].get(line, h)
                + combk[0].get(line, h) * clp[0].get(line, h);
            cavg /= 2.0;
            if !invert {
                cavg = -cavg;
            }

            let (mut i, mut q) = match h % 4 {
                0 => (cavg, 0.0),
                1 => (0.0, -cavg),
                2 => (-cavg, 0.0),
                3 => (0.0, cavg),
                _ => unreachable!(),
            };

            if black_and_white {
                i = 0.0;
                q = 0.0;
            }

            yiq[line * width + h] = Yiq { y: raw[line * width + h] as f64, i, q };
        }
    }
}

/// Luma cleanup (spec.md §4.4.9): cancels chroma that leaked into the
/// composite luma channel, shifting the whole pixel record left by 2 samples
/// (`h+2 -> h`) to compensate the comb filters' group delay.
pub fn adjust_y(config: &CombConfig, yiq: &mut [Yiq], first_field_phase_id: u8, second_field_phase_id: u8) {
    let frame_height = config.frame_height();
    let width = config.field_width;
    let mut phase = PhaseToggle::new(first_field_phase_id, second_field_phase_id);

    for line in config.first_visible_frame_line..frame_height {
        let invert = phase.next(line);
        for h in config.active_video_start..config.active_video_end {
            let src = yiq[line * width + h + 2];
            let mut comp = match h % 4 {
                0 => src.i,
                1 => -src.q,
                2 => -src.i,
                3 => src.q,
                _ => unreachable!(),
            };
            if invert {
                comp = -comp;
            }

            let mut dst = src;
            dst.y += comp;
            yiq[line * width + h] = dst;
        }
    }
}

/// Chroma low-pass (spec.md §4.4.8, `filterIQ`). A fresh filter pair is
/// built per line; output is written `qoffset=2` samples earlier than it was
/// read, to compensate the filters' own group delay.
pub fn filter_iq(config: &CombConfig, yiq: &mut [Yiq]) {
    const QOFFSET: usize = 2;
    let frame_height = config.frame_height();
    let width = config.field_width;

    for line in config.first_visible_frame_line..frame_height {
        let mut f_i = Filter::fir(&COLOR_LPF_I);
        let mut f_q = Filter::fir(if config.color_lpf_hq { &COLOR_LPF_I } else { &COLOR_LPF_Q });
        let mut filti = 0.0;
        let mut filtq = 0.0;

        for h in config.active_video_start..config.active_video_end {
            match h % 4 {
                0 => filti = f_i.feed(yiq[line * width + h].i),
                1 => filtq = f_q.feed(yiq[line * width + h].q),
                2 => filti = f_i.feed(yiq[line * width + h].i),
                3 => filtq = f_q.feed(yiq[line * width + h].q),
                _ => unreachable!(),
            }

            let dst = &mut yiq[line * width + h - QOFFSET];
            dst.i = filti;
            dst.q = filtq;
        }
    }
}

/// Y noise reduction (spec.md §4.4.8, `doYNR`). `hp` feeds continuously
/// across the whole call (not reset per line), matching the reference's
/// single persistent filter instance.
pub fn do_ynr(hp: &mut Filter, threshold: &mut f64, config: &CombConfig, yiq: &mut [Yiq], min: f64) {
    if *threshold < min {
        *threshold = min;
    }
    if *threshold <= 0.0 {
        return;
    }

    let frame_height = config.frame_height();
    let width = config.field_width;

    for line in config.first_visible_frame_line..frame_height {
        let mut filtered = vec![0.0_f64; width + 32];
        for h in config.active_video_start..=config.active_video_end {
            filtered[h] = hp.feed(yiq[line * width + h].y);
        }
        for h in config.active_video_start..config.active_video_end {
            let mut a = filtered[h + 12];
            if a.abs() > *threshold {
                a = if a > 0.0 { *threshold } else { -*threshold };
            }
            yiq[line * width + h].y -= a;
        }
    }
}

/// Chroma noise reduction (spec.md §4.4.8, `doCNR`). Same persistent-filter
/// shape as [`do_ynr`], applied independently to the I and Q channels.
pub fn do_cnr(hp_i: &mut Filter, hp_q: &mut Filter, threshold: &mut f64, config: &CombConfig, yiq: &mut [Yiq], min: f64) {
    if *threshold < min {
        *threshold = min;
    }
    if *threshold <= 0.0 {
        return;
    }

    let frame_height = config.frame_height();
    let width = config.field_width;

    for line in config.first_visible_frame_line..frame_height {
        let mut filtered_i = vec![0.0_f64; width + 32];
        let mut filtered_q = vec![0.0_f64; width + 32];
        for h in config.active_video_start..=config.active_video_end {
            filtered_i[h] = hp_i.feed(yiq[line * width + h].i);
            filtered_q[h] = hp_q.feed(yiq[line * width + h].q);
        }
        for h in config.active_video_start..config.active_video_end {
            let mut ai = filtered_i[h + 12];
            let mut aq = filtered_q[h + 12];
            if ai.abs() > *threshold {
                ai = if ai > 0.0 { *threshold } else { -*threshold };
            }
            if aq.abs() > *threshold {
                aq = if aq > 0.0 { *threshold } else { -*threshold };
            }
            yiq[line * width + h].i -= ai;
            yiq[line * width + h].q -= aq;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::FrameRing;

    fn flat_config() -> CombConfig {
        CombConfig { field_width: 40 + 64, field_height: 30, ..CombConfig::default() }
    }

    #[test]
    fn split1d_is_zero_for_flat_line() {
        let config = flat_config();
        let width = config.field_width;
        let frame_height = config.frame_height();
        let raw = vec![1000u16; width * frame_height];
        let mut clp0 = Plane::new(width, frame_height);
        let mut combk0 = Plane::new(width, frame_height);
        split1d(&config, &raw, &mut clp0, &mut combk0, 1, 1);
        for h in config.active_video_start..config.active_video_end {
            assert!((clp0.get(config.first_visible_frame_line, h)).abs() < 1e-9);
            assert_eq!(combk0.get(config.first_visible_frame_line, h), 1.0);
        }
    }

    #[test]
    fn split_iq_is_zero_for_constant_field() {
        let config = flat_config();
        let width = config.field_width;
        let frame_height = config.frame_height();
        let raw = vec![30000u16; width * frame_height];
        let clp = [Plane::new(width, frame_height), Plane::new(width, frame_height), Plane::new(width, frame_height)];
        let mut combk0 = Plane::new(width, frame_height);
        combk0.fill(1.0);
        let combk = [combk0, Plane::new(width, frame_height), Plane::new(width, frame_height)];
        let mut yiq = vec![Yiq::default(); width * frame_height];
        split_iq(&config, &raw, &clp, &combk, &mut yiq, 1, 1, false);
        for h in config.active_video_start..config.active_video_end {
            let p = yiq[config.first_visible_frame_line * width + h];
            assert_eq!(p.i, 0.0);
            assert_eq!(p.q, 0.0);
            assert_eq!(p.y, 30000.0);
        }
    }

    #[test]
    fn combk_sums_to_one_after_2d_fold() {
        let config = flat_config();
        let width = config.field_width;
        let frame_height = config.frame_height();
        let raw: Vec<u16> = (0..width * frame_height).map(|i| (1000 + (i % 37) * 13) as u16).collect();
        let mut clp0 = Plane::new(width, frame_height);
        let mut combk0 = Plane::new(width, frame_height);
        split1d(&config, &raw, &mut clp0, &mut combk0, 1, 1);

        let mut clp1 = Plane::new(width, frame_height);
        let mut combk1 = Plane::new(width, frame_height);
        let combk2 = Plane::new(width, frame_height);
        split2d(&config, &clp0, &mut clp1, &mut combk0, &mut combk1, &combk2);

        for line in 4..frame_height - 1 {
            for h in config.active_video_start..config.active_video_end {
                let sum = combk0.get(line, h) + combk1.get(line, h) + combk2.get(line, h);
                assert!((sum - 1.0).abs() < 1e-9, "line={line} h={h} sum={sum}");
            }
        }
    }

    #[test]
    fn split3d_reads_across_ring_slots() {
        let config = flat_config();
        let width = config.field_width;
        let frame_height = config.frame_height();
        let mut ring = FrameRing::new(width, frame_height);
        ring.slot_mut(0).raw.iter_mut().for_each(|v| *v = 1000);
        ring.slot_mut(1).raw.iter_mut().for_each(|v| *v = 1000);
        ring.slot_mut(2).raw.iter_mut().for_each(|v| *v = 1000);

        split3d(&config, &mut ring, false, 0.0, 0.5);

        let line = config.first_visible_frame_line;
        for h in config.active_video_start..config.active_video_end {
            assert_eq!(ring.slot(1).clp[2].get(line, h), 0.0);
        }
    }
}
