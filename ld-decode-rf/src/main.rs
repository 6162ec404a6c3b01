// LD Decode RS
// Copyright (c) 2024 The LD Decode RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

//! RF-to-luma demodulation driver (spec.md §4.5/§6).
//!
//! Reads an 8-bit RF capture from a file or stdin, demodulates it chunk by
//! chunk, and writes little-endian 16-bit luma samples to stdout.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

use clap::Parser;
use log::{debug, info};

use ld_decode_core::deemphasis::{quantize_luma, ChargeCompensator};
use ld_decode_core::fm::{FmDemod, FmDemodConfig};

const CHUNK_SAMPLES: usize = 2048;

#[derive(Parser)]
#[command(name = "ld-decode-rf", version, about = "Demodulate an RF capture to 16-bit luma samples")]
struct Cli {
    /// Input file, or `-`/omitted for stdin.
    #[arg(default_value = "-")]
    input: String,

    /// Byte offset to seek to before demodulating. Ignored for stdin beyond
    /// discarding that many leading bytes.
    #[arg(default_value_t = 0)]
    byte_offset: u64,

    /// Maximum number of input bytes to consume. `0` means unbounded.
    #[arg(default_value_t = 0)]
    max_bytes: u64,
}

/// Either a seekable file or stdin, read uniformly by the chunking loop
/// below.
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

    /// Seek forward `offset` bytes. Stdin has no seek; discard instead.
    fn skip(&mut self, offset: u64) -> io::Result<()> {
        if offset == 0 {
            return Ok(());
        }
        match self {
            Source::File(f) => {
                f.seek(SeekFrom::Start(offset))?;
                Ok(())
            }
            Source::Stdin(stdin) => {
                io::copy(&mut stdin.lock().take(offset), &mut io::sink())?;
                Ok(())
            }
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

/// Fill `buf` completely by repeated `read` calls, tolerating short
/// individual reads. Returns the number of bytes actually filled, which is
/// less than `buf.len()` only at end of stream.
fn fill_as_much_as_possible(source: &mut Source, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

fn run(cli: &Cli) -> io::Result<()> {
    let mut source = Source::open(&cli.input)?;
    source.skip(cli.byte_offset)?;

    let mut demod = FmDemod::new(FmDemodConfig::default());
    let mut compensator = ChargeCompensator::new();

    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());

    let mut raw = vec![0u8; CHUNK_SAMPLES];
    let mut bytes_remaining = if cli.max_bytes > 0 { Some(cli.max_bytes) } else { None };
    let mut chunks = 0u64;

    loop {
        let want = match bytes_remaining {
            Some(0) => break,
            Some(remaining) => CHUNK_SAMPLES.min(remaining as usize),
            None => CHUNK_SAMPLES,
        };

        let filled = fill_as_much_as_possible(&mut source, &mut raw[..want])?;
        if filled < CHUNK_SAMPLES {
            debug!("short read ({filled} of {CHUNK_SAMPLES} bytes), stopping");
            break;
        }

        if let Some(remaining) = &mut bytes_remaining {
            *remaining -= filled as u64;
        }

        let samples: Vec<f64> = raw.iter().map(|&b| b as f64).collect();
        let demodulated = demod.process(&samples);

        for freq in demodulated {
            let luma = if freq == 0.0 { 0 } else { quantize_luma(compensator.feed(freq)) };
            out.write_all(&luma.to_le_bytes())?;
        }

        chunks += 1;
    }

    out.flush()?;
    info!("processed {chunks} chunks");
    Ok(())
}

fn main() {
    pretty_env_logger::init();
    let cli = Cli::parse();

    if let Err(err) = run(&cli) {
        eprintln!("ld-decode-rf: {}", err);
        std::process::exit(1);
    }
}
