// LD Decode RS
// Copyright (c) 2024 The LD Decode RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fixed constants shared by both pipeline stages (spec.md §6).

/// Capture rate in Hz: `1_000_000 * (315/88) * 8`, an integer multiple of the
/// NTSC chroma subcarrier.
pub const CHZ: f64 = 1_000_000.0 * (315.0 / 88.0) * 8.0;

/// Maximum field width in samples.
pub const MAX_X: usize = 910;

/// Maximum frame height in lines (`2 * 263 - 1`).
pub const MAX_Y: usize = 525;

/// Default field width in samples.
pub const DEFAULT_FIELD_WIDTH: usize = 910;

/// Default field height in lines.
pub const DEFAULT_FIELD_HEIGHT: usize = 263;

/// First column of active video; comb 1D taps reach `x - 2 ..= x + 2` so this
/// must never go below 16 (spec.md §3 invariants, §9 open question).
pub const ACTIVE_VIDEO_START: usize = 40;

/// One-past-the-last column of active video.
pub const ACTIVE_VIDEO_END: usize = 840;

/// First visible line of the interleaved frame.
pub const FIRST_VISIBLE_FRAME_LINE: usize = 43;

/// Lower edge of the demodulated frequency window, in Hz.
pub const LUMA_FREQ_LOW: f64 = 7_600_000.0;

/// Upper edge of the demodulated frequency window, in Hz.
pub const LUMA_FREQ_HIGH: f64 = 9_300_000.0;

/// Number of distinct 16-bit luma codes above the reserved mute value 0.
pub const LUMA_CODE_RANGE: f64 = 57_344.0;
