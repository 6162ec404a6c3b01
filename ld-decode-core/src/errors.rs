// LD Decode RS
// Copyright (c) 2024 The LD Decode RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `errors` module defines the core's error type.
//!
//! Only two error kinds exist here (the third kind in spec.md §7,
//! "under-buffered", is not an error at all and is modeled by
//! [`crate::comb::CombDecoder::process`] returning `None`).

use std::fmt;
use std::io;

/// `Error` enumerates the fallible outcomes of the core.
#[derive(Debug)]
pub enum Error {
    /// A configuration value failed validation at construction time, e.g.
    /// `fieldWidth` exceeding `max_x`, or `activeVideoStart < 16`.
    Config(&'static str),
    /// An I/O error occurred while reading or writing a driver-layer stream.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "invalid configuration: {}", msg),
            Error::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(_) => None,
            Error::Io(err) => Some(err),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Convenience function to create a configuration error.
pub fn config_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::Config(msg))
}
