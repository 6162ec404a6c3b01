// LD Decode RS
// Copyright (c) 2024 The LD Decode RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

//! NTSC composite-to-RGB comb decoding driver (spec.md §4.5/§6).
//!
//! spec.md defines the per-field and per-frame byte layouts but not a
//! multi-field container format for a batch CLI (see `DESIGN.md`). Fields
//! are read here as a length-prefixed header (parity, phase ID, burst IRE,
//! raw sample count) followed by the raw little-endian luma samples;
//! top/bottom fields alternate. RGB frames are written to stdout in the
//! exact row-major layout spec.md §6 mandates.

use std::fs::File;
use std::io::{self, Read, Write};

use clap::Parser;
use log::{debug, info};

use ld_decode_core::comb::{CombConfig, CombDecoder};
use ld_decode_core::field::Field;

#[derive(Parser)]
#[command(name = "ld-decode-comb", version, about = "Decode NTSC composite fields into RGB frames")]
struct Cli {
    /// Input file, or `-`/omitted for stdin.
    #[arg(default_value = "-")]
    input: String,

    #[arg(long, default_value_t = 910)]
    field_width: usize,

    #[arg(long, default_value_t = 263)]
    field_height: usize,

    #[arg(long, default_value_t = 2)]
    filter_depth: u8,

    #[arg(long)]
    black_and_white: bool,

    #[arg(long)]
    no_adaptive_2d: bool,

    #[arg(long)]
    no_color_lpf: bool,

    #[arg(long)]
    no_color_lpf_hq: bool,

    #[arg(long)]
    no_optical_flow: bool,
}

impl Cli {
    fn comb_config(&self) -> CombConfig {
        CombConfig {
            field_width: self.field_width,
            field_height: self.field_height,
            filter_depth: self.filter_depth,
            black_and_white: self.black_and_white,
            adaptive_2d: !self.no_adaptive_2d,
            color_lpf: !self.no_color_lpf,
            color_lpf_hq: !self.no_color_lpf_hq,
            optical_flow: !self.no_optical_flow,
            ..CombConfig::default()
        }
    }
}

enum Source {
    File(File),
    Stdin(io::Stdin),
}

impl Source {
    fn open(path: &str) -> io::Result<Source> {
        if path == "-" {
            Ok(Source::Stdin(io::stdin()))
        }
        else {
            Ok(Source::File(File::open(path)?))
        }
    }
}

impl Read for Source {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Source::File(f) => f.read(buf),
            Source::Stdin(stdin) => stdin.read(buf),
        }
    }
}

/// `is_even(1) | phase_id(1) | burst_median_ire(8, LE f64) | sample_count(4, LE u32)`.
const FIELD_HEADER_LEN: usize = 1 + 1 + 8 + 4;

/// Reads one length-prefixed field record. Returns `Ok(None)` on a clean
/// end-of-stream (no bytes read for the header); any other short read is an
/// I/O error.
fn read_field(source: &mut Source, width: usize, height: usize) -> io::Result<Option<Field>> {
    let mut header = [0u8; FIELD_HEADER_LEN];
    let mut read_so_far = 0;
    while read_so_far < header.len() {
        let n = source.read(&mut header[read_so_far..])?;
        if n == 0 {
            if read_so_far == 0 {
                return Ok(None);
            }
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated field header"));
        }
        read_so_far += n;
    }

    let is_even = header[0] != 0;
    let phase_id = header[1];
    let burst_median_ire = f64::from_le_bytes(header[2..10].try_into().unwrap());
    let sample_count = u32::from_le_bytes(header[10..14].try_into().unwrap()) as usize;

    let mut raw = vec![0u8; sample_count * 2];
    source.read_exact(&mut raw)?;

    let samples: Vec<u16> =
        raw.chunks_exact(2).map(|pair| u16::from_le_bytes([pair[0], pair[1]])).collect();

    if samples.len() != width * height {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("field sample count {} does not match {}x{}", samples.len(), width, height),
        ));
    }

    Ok(Some(Field::new(width, height, samples, is_even, phase_id, burst_median_ire)))
}

fn run(cli: &Cli) -> io::Result<()> {
    let config = cli.comb_config();
    let (width, height) = (config.field_width, config.field_height);
    let mut decoder = CombDecoder::new(config)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err.to_string()))?;

    let mut source = Source::open(&cli.input)?;
    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());

    let mut frames = 0u64;
    loop {
        let top = match read_field(&mut source, width, height)? {
            Some(field) => field,
            None => break,
        };
        let bottom = match read_field(&mut source, width, height)? {
            Some(field) => field,
            None => {
                debug!("trailing unpaired field, stopping");
                break;
            }
        };

        if let Some(rgb) = decoder.process(&top, &bottom) {
            out.write_all(&rgb)?;
            frames += 1;
        }
    }

    out.flush()?;
    info!("emitted {frames} frames");
    Ok(())
}

fn main() {
    pretty_env_logger::init();
    let cli = Cli::parse();

    if let Err(err) = run(&cli) {
        eprintln!("ld-decode-comb: {}", err);
        std::process::exit(1);
    }
}
