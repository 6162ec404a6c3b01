// LD Decode RS
// Copyright (c) 2024 The LD Decode RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! NTSC composite-to-RGB comb decoder (spec.md §4.4/§4.5).
//!
//! [`CombDecoder::process`] drives the full pipeline: frame ingestion,
//! adaptive 1D/2D/3D chroma separation (optionally optical-flow-gated), IQ
//! demodulation, luma cleanup, colour low-pass and noise reduction, and
//! YIQ-to-RGB conversion.

mod rgb;
mod split;

use log::{debug, trace};

use crate::coeffs::{CNR_HP, YNR_HP};
use crate::errors::{config_error, Result};
use crate::field::Field;
use crate::filter::Filter;
use crate::flow::{DenseFlow, Flow2D, LucasKanadeFlow};
use crate::ring::{FrameRing, Plane};
use crate::units::{MAX_X, MAX_Y};

/// Tunable comb-decoder parameters, defaults matching the reference
/// decoder's constructor (`Comb::Comb()`).
#[derive(Debug, Clone)]
pub struct CombConfig {
    pub field_width: usize,
    pub field_height: usize,
    pub active_video_start: usize,
    pub active_video_end: usize,
    pub first_visible_frame_line: usize,
    pub black_and_white: bool,
    pub adaptive_2d: bool,
    pub color_lpf: bool,
    pub color_lpf_hq: bool,
    pub optical_flow: bool,
    /// `1`, `2`, or `3`; only those three values are meaningful.
    pub filter_depth: u8,
    pub black_ire: f64,
    pub white_ire: f64,
}

impl Default for CombConfig {
    fn default() -> Self {
        CombConfig {
            field_width: 910,
            field_height: 263,
            active_video_start: 40,
            active_video_end: 840,
            first_visible_frame_line: 43,
            black_and_white: false,
            adaptive_2d: true,
            color_lpf: true,
            color_lpf_hq: true,
            optical_flow: true,
            filter_depth: 2,
            black_ire: 15360.0,
            white_ire: 51200.0,
        }
    }
}

impl CombConfig {
    pub fn frame_height(&self) -> usize {
        self.field_height * 2 - 1
    }

    pub fn irescale(&self) -> f64 {
        (self.white_ire - self.black_ire) / 100.0
    }

    /// `(p_3dcore, p_3drange)`, per `postConfigurationTasks`'s
    /// optical-flow-dependent defaults.
    fn p3d_params(&self) -> (f64, f64) {
        if self.optical_flow {
            (0.0, 0.5)
        } else {
            (1.25 * self.irescale(), 5.5 * self.irescale())
        }
    }

    /// Validates the three configuration-time checks from spec.md §7.1.
    pub fn validate(&self) -> Result<()> {
        if self.field_width > MAX_X {
            return config_error("fieldWidth exceeds max_x");
        }
        if self.active_video_start < 16 {
            return config_error("activeVideoStart must be >= 16");
        }
        if self.frame_height() > MAX_Y {
            return config_error("fieldHeight*2-1 exceeds max_y");
        }
        Ok(())
    }
}

const OPTICAL_FLOW_ROWS: usize = 252;

struct OpticalFlowState {
    flow: Box<dyn DenseFlow>,
    prev: [Option<Plane>; 2],
    seed: [Option<Flow2D>; 2],
    calls: u32,
}

impl OpticalFlowState {
    fn new(flow: Box<dyn DenseFlow>) -> OpticalFlowState {
        OpticalFlowState { flow, prev: [None, None], seed: [None, None], calls: 0 }
    }
}

/// Stateful NTSC comb decoder. Owns the depth-3 frame ring and every
/// persistent filter/threshold that survives across `process` calls.
pub struct CombDecoder {
    config: CombConfig,
    ring: FrameRing,
    frame_counter: u64,
    nr_y: f64,
    nr_c: f64,
    aburstlev: f64,
    y_hp: Filter,
    i_hp: Filter,
    q_hp: Filter,
    flow_state: OpticalFlowState,
}

impl CombDecoder {
    pub fn new(config: CombConfig) -> Result<CombDecoder> {
        CombDecoder::with_flow(config, Box::new(LucasKanadeFlow::default()))
    }

    /// Construct with a caller-supplied dense-flow backend, e.g. a real
    /// Farneback binding in place of the reference [`LucasKanadeFlow`].
    pub fn with_flow(config: CombConfig, flow: Box<dyn DenseFlow>) -> Result<CombDecoder> {
        config.validate()?;
        let frame_height = config.frame_height();
        let irescale = config.irescale();

        Ok(CombDecoder {
            ring: FrameRing::new(config.field_width, frame_height),
            frame_counter: 0,
            nr_y: 1.0 * irescale,
            nr_c: 0.0,
            aburstlev: -1.0,
            y_hp: Filter::fir(&YNR_HP),
            i_hp: Filter::fir(&CNR_HP),
            q_hp: Filter::fir(&CNR_HP),
            flow_state: OpticalFlowState::new(flow),
            config,
        })
    }

    /// Process one field pair into an RGB frame, or `None` while the 3D
    /// filter's two-frame warm-up is still filling (spec.md §7.2).
    pub fn process(&mut self, top: &Field, bottom: &Field) -> Option<Vec<u8>> {
        debug_assert_eq!(top.width, self.config.field_width);
        debug_assert_eq!(bottom.width, self.config.field_width);

        let frame_height = self.config.frame_height();
        let width = self.config.field_width;
        let current = if self.config.filter_depth == 3 { 1 } else { 0 };

        self.ingest(top, bottom);

        {
            let slot0 = self.ring.slot_mut(0);
            split::split1d(&self.config, &slot0.raw, &mut slot0.clp[0], &mut slot0.combk[0], slot0.first_field_phase_id, slot0.second_field_phase_id);
        }
        if self.config.filter_depth >= 2 {
            let slot0 = self.ring.slot_mut(0);
            let clp0_snapshot = slot0.clp[0].clone();
            let combk2_snapshot = slot0.combk[2].clone();
            let (combk0, combk1) = slot0.combk.split_at_mut(1);
            split::split2d(&self.config, &clp0_snapshot, &mut slot0.clp[1], &mut combk0[0], &mut combk1[0], &combk2_snapshot);
        }
        self.split_iq_into(0);

        if self.config.filter_depth == 3 {
            if self.config.optical_flow && self.frame_counter >= 1 {
                self.run_optical_flow_prepass();
            }

            if self.frame_counter < 2 {
                debug!("comb decoder warming up 3D filter depth, frame {}", self.frame_counter);
                self.frame_counter += 1;
                return None;
            }

            let (p_3dcore, p_3drange) = self.config.p3d_params();
            split::split3d(&self.config, &mut self.ring, self.config.optical_flow, p_3dcore, p_3drange);
        }

        self.split_iq_into(current);

        let slot = self.ring.slot(current);
        let mut temp = slot.yiq.clone();
        let (ffid, sfid) = (slot.first_field_phase_id, slot.second_field_phase_id);
        let burst_level = slot.burst_level;

        split::adjust_y(&self.config, &mut temp, ffid, sfid);
        if self.config.color_lpf {
            split::filter_iq(&self.config, &mut temp);
        }
        split::do_ynr(&mut self.y_hp, &mut self.nr_y, &self.config, &mut temp, 0.0);
        split::do_cnr(&mut self.i_hp, &mut self.q_hp, &mut self.nr_c, &self.config, &mut temp, 0.0);

        let rgb = rgb::yiq_to_rgb_frame(&self.config, &temp, burst_level, &mut self.aburstlev);
        trace!("emitted rgb frame {}x{} from slot {current}", width, frame_height);
        self.frame_counter += 1;

        Some(rgb)
    }

    fn ingest(&mut self, top: &Field, bottom: &Field) {
        let field_height = self.config.field_height;
        let width = self.config.field_width;
        let frame_height = self.config.frame_height();
        let burst_level = (top.burst_median_ire + bottom.burst_median_ire) / 2.0 / 2.0;

        let slot0 = self.ring.advance();
        for k in 0..field_height {
            let top_line = 2 * k;
            if top_line < frame_height {
                slot0.raw[top_line * width..(top_line + 1) * width].copy_from_slice(top.line(k));
            }
            let bottom_line = 2 * k + 1;
            if bottom_line < frame_height {
                slot0.raw[bottom_line * width..(bottom_line + 1) * width].copy_from_slice(bottom.line(k));
            }
        }
        slot0.burst_level = burst_level;
        slot0.first_field_phase_id = top.phase_id;
        slot0.second_field_phase_id = bottom.phase_id;
    }

    fn split_iq_into(&mut self, slot_idx: usize) {
        let black_and_white = self.config.black_and_white;
        let slot = self.ring.slot_mut(slot_idx);
        split::split_iq(
            &self.config,
            &slot.raw,
            &slot.clp,
            &slot.combk,
            &mut slot.yiq,
            slot.first_field_phase_id,
            slot.second_field_phase_id,
            black_and_white,
        );
    }

    /// Optical-flow motion gating (spec.md §4.4.7), run against a scratch
    /// copy of slot 0's YIQ buffer before slot 1's 3D split.
    fn run_optical_flow_prepass(&mut self) {
        let slot0 = self.ring.slot(0);
        let mut temp = slot0.yiq.clone();
        let (ffid, sfid) = (slot0.first_field_phase_id, slot0.second_field_phase_id);

        split::adjust_y(&self.config, &mut temp, ffid, sfid);
        split::do_ynr(&mut self.y_hp, &mut self.nr_y, &self.config, &mut temp, 4.0);
        split::do_cnr(&mut self.i_hp, &mut self.q_hp, &mut self.nr_c, &self.config, &mut temp, 4.0);

        let width = self.config.field_width;
        let cxsize = width - 70;
        let frame_height = self.config.frame_height();

        let mut images = [Plane::new(cxsize, OPTICAL_FLOW_ROWS), Plane::new(cxsize, OPTICAL_FLOW_ROWS)];
        for (field, image) in images.iter_mut().enumerate() {
            for y in 0..OPTICAL_FLOW_ROWS {
                let line = 23 + field + y * 2;
                if line >= frame_height {
                    continue;
                }
                for x in 0..cxsize {
                    image.set(y, x, temp[line * width + 70 + x].y);
                }
            }
        }

        let had_prior = self.flow_state.calls > 0;
        for field in 0..2 {
            if had_prior {
                let seed = if self.flow_state.calls > 1 { self.flow_state.seed[field].as_ref() } else { None };
                let prev = self.flow_state.prev[field].as_ref().expect("prior image recorded when calls > 0");
                let computed = self.flow_state.flow.compute(prev, &images[field], seed);
                self.flow_state.seed[field] = Some(computed);
            }
            self.flow_state.prev[field] = Some(images[field].clone());
        }

        if had_prior {
            let (p_3dcore, p_3drange) = self.config.p3d_params();
            let slot1 = self.ring.slot_mut(1);
            for y in 0..OPTICAL_FLOW_ROWS {
                for x in 0..cxsize {
                    let f0 = self.flow_state.seed[0].as_ref().unwrap().get(y, x);
                    let f1 = self.flow_state.seed[1].as_ref().unwrap().get(y, x);
                    let m0 = (f0.y * f0.y + (2.0 * f0.x).powi(2)).sqrt();
                    let m1 = (f1.y * f1.y + (2.0 * f1.x).powi(2)).sqrt();
                    let c0 = 1.0 - ((m0 - p_3dcore) / p_3drange).clamp(0.0, 1.0);
                    let c1 = 1.0 - ((m1 - p_3dcore) / p_3drange).clamp(0.0, 1.0);
                    let c = c0.min(c1);

                    let top_line = y * 2;
                    let bottom_line = y * 2 + 1;
                    if top_line < frame_height {
                        slot1.combk[2].set(top_line, 70 + x, c);
                    }
                    if bottom_line < frame_height {
                        slot1.combk[2].set(bottom_line, 70 + x, c);
                    }
                }
            }
        }

        self.flow_state.calls += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;

    fn flat_config() -> CombConfig {
        CombConfig { field_width: 40 + 64, field_height: 30, filter_depth: 2, ..CombConfig::default() }
    }

    fn flat_field(config: &CombConfig, is_even: bool, phase_id: u8) -> Field {
        Field::new(config.field_width, config.field_height, vec![32768; config.field_width * config.field_height], is_even, phase_id, 50.0)
    }

    #[test]
    fn depth_two_returns_frame_immediately() {
        let config = flat_config();
        let mut decoder = CombDecoder::new(config.clone()).unwrap();
        let top = flat_field(&config, true, 1);
        let bottom = flat_field(&config, false, 3);
        let out = decoder.process(&top, &bottom);
        assert!(out.is_some());
    }

    #[test]
    fn constant_field_yields_grey_frame() {
        let config = flat_config();
        let mut decoder = CombDecoder::new(config.clone()).unwrap();
        let top = flat_field(&config, true, 1);
        let bottom = flat_field(&config, false, 3);
        let out = decoder.process(&top, &bottom).unwrap();

        let width = config.field_width;
        let row_base = config.first_visible_frame_line * width * 3 * 2;
        let o = config.active_video_start * 3;
        let r = u16::from_le_bytes([out[row_base + o * 2], out[row_base + o * 2 + 1]]);
        let g = u16::from_le_bytes([out[row_base + (o + 1) * 2], out[row_base + (o + 1) * 2 + 1]]);
        let b = u16::from_le_bytes([out[row_base + (o + 2) * 2], out[row_base + (o + 2) * 2 + 1]]);
        assert_eq!(r, g);
        assert_eq!(g, b);
    }

    #[test]
    fn depth_three_warms_up_for_exactly_two_frames() {
        let config = CombConfig { filter_depth: 3, optical_flow: false, ..flat_config() };
        let mut decoder = CombDecoder::new(config.clone()).unwrap();
        let top = flat_field(&config, true, 1);
        let bottom = flat_field(&config, false, 3);

        assert!(decoder.process(&top, &bottom).is_none());
        assert!(decoder.process(&top, &bottom).is_none());
        assert!(decoder.process(&top, &bottom).is_some());
        assert!(decoder.process(&top, &bottom).is_some());
    }

    #[test]
    fn rejects_oversized_field_width() {
        let config = CombConfig { field_width: MAX_X + 1, ..CombConfig::default() };
        assert!(CombDecoder::new(config).is_err());
    }

    #[test]
    fn rejects_active_video_start_below_sixteen() {
        let config = CombConfig { active_video_start: 10, ..CombConfig::default() };
        assert!(CombDecoder::new(config).is_err());
    }
}
