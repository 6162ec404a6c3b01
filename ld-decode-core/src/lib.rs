// LD Decode RS
// Copyright (c) 2024 The LD Decode RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Signal-processing core for a LaserDisc decoding toolkit.
//!
//! Two independent stages live here: an RF-to-luma FM demodulator
//! ([`fm`]/[`deemphasis`]) and an NTSC composite-to-RGB comb decoder
//! ([`comb`]). Both are built on the same direct-form [`filter`] kernel.

pub mod coeffs;
pub mod comb;
pub mod deemphasis;
pub mod errors;
pub mod field;
pub mod filter;
pub mod flow;
pub mod fm;
pub mod ring;
pub mod units;

pub use errors::{Error, Result};
