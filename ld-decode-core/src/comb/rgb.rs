// LD Decode RS
// Copyright (c) 2024 The LD Decode RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! YIQ-to-RGB conversion (spec.md §4.4.10).
//!
//! The reference decoder's exact decode matrix lives in `rgb.h`, which fell
//! outside `original_source`'s retrieval cap; this uses the standard NTSC
//! YIQ decode matrix instead (see `DESIGN.md`).

use crate::comb::CombConfig;
use crate::ring::Yiq;

const MATRIX: [[f64; 3]; 3] = [
    [1.0, 0.956, 0.621],
    [1.0, -0.272, -0.647],
    [1.0, -1.106, 1.703],
];

fn normalize(value: f64, black_ire: f64, white_ire: f64) -> u16 {
    let norm = (value - black_ire) / (white_ire - black_ire);
    (norm.clamp(0.0, 1.0) * 65535.0).round().clamp(0.0, 65535.0) as u16
}

fn decode_pixel(pixel: Yiq, burst_gain: f64, black_ire: f64, white_ire: f64) -> [u16; 3] {
    let i = pixel.i * burst_gain;
    let q = pixel.q * burst_gain;
    [
        normalize(pixel.y + MATRIX[0][1] * i + MATRIX[0][2] * q, black_ire, white_ire),
        normalize(pixel.y + MATRIX[1][1] * i + MATRIX[1][2] * q, black_ire, white_ire),
        normalize(pixel.y + MATRIX[2][1] * i + MATRIX[2][2] * q, black_ire, white_ire),
    ]
}

/// Render one frame's worth of active-video YIQ samples to the final
/// row-major, 16-bit-per-channel RGB byte layout (spec.md §6). `aburstlev`
/// is the caller's persistent exponential-smoothing state; `-1.0` means
/// "uninitialised" and is seeded from the first `burst_level > 3` frame.
pub fn yiq_to_rgb_frame(config: &CombConfig, yiq: &[Yiq], burst_level: f64, aburstlev: &mut f64) -> Vec<u8> {
    let frame_height = config.frame_height();
    let width = config.field_width;
    let mut out = vec![0u8; width * frame_height * 3 * 2];

    if burst_level > 3.0 {
        if *aburstlev < 0.0 {
            *aburstlev = burst_level;
        }
        *aburstlev = *aburstlev * 0.99 + burst_level * 0.01;
    }

    let burst_gain = 10.0 / *aburstlev;

    for line in config.first_visible_frame_line..frame_height {
        let row_base = line * width * 3 * 2;
        let mut o = config.active_video_start * 3;
        for h in config.active_video_start..config.active_video_end {
            let rgb = decode_pixel(yiq[line * width + h], burst_gain, config.black_ire, config.white_ire);
            for channel in rgb {
                let idx = row_base + o * 2;
                out[idx..idx + 2].copy_from_slice(&channel.to_le_bytes());
                o += 1;
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grey_pixel_yields_equal_channels() {
        let config = CombConfig { field_width: 40 + 64, field_height: 30, ..CombConfig::default() };
        let width = config.field_width;
        let frame_height = config.frame_height();
        let mut yiq = vec![Yiq::default(); width * frame_height];
        for h in config.active_video_start..config.active_video_end {
            yiq[config.first_visible_frame_line * width + h] = Yiq { y: 32768.0, i: 0.0, q: 0.0 };
        }
        let mut aburstlev = 50.0;
        let out = yiq_to_rgb_frame(&config, &yiq, 50.0, &mut aburstlev);

        let row_base = config.first_visible_frame_line * width * 3 * 2;
        let o = config.active_video_start * 3;
        let r = u16::from_le_bytes([out[row_base + o * 2], out[row_base + o * 2 + 1]]);
        let g = u16::from_le_bytes([out[row_base + (o + 1) * 2], out[row_base + (o + 1) * 2 + 1]]);
        let b = u16::from_le_bytes([out[row_base + (o + 2) * 2], out[row_base + (o + 2) * 2 + 1]]);
        assert_eq!(r, g);
        assert_eq!(g, b);
    }

    #[test]
    fn outside_active_video_is_zero() {
        let config = CombConfig { field_width: 40 + 64, field_height: 30, ..CombConfig::default() };
        let width = config.field_width;
        let frame_height = config.frame_height();
        let yiq = vec![Yiq { y: 40000.0, i: 5.0, q: -5.0 }; width * frame_height];
        let mut aburstlev = 50.0;
        let out = yiq_to_rgb_frame(&config, &yiq, 50.0, &mut aburstlev);

        let row_base = config.first_visible_frame_line * width * 3 * 2;
        for k in 0..config.active_video_start * 3 * 2 {
            assert_eq!(out[row_base + k], 0);
        }
    }
}
