// LD Decode RS
// Copyright (c) 2024 The LD Decode RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

//! PSNR comparison tool between a target and reference RGB frame stream
//! (spec.md §6's "defined PSNR threshold").
//!
//! Both streams are the raw row-major 16-bit-per-channel output of
//! `ld-decode-comb`, concatenated frame after frame with no framing.

use std::fs::File;
use std::io::{self, Read};

use clap::Parser;
use log::warn;
use serde::Serialize;

use ld_decode_core::comb::CombConfig;

#[derive(Parser)]
#[command(name = "ld-decode-check", version, about = "Compare two RGB frame streams by PSNR")]
struct Cli {
    /// Target (decoder-under-test) RGB stream.
    target: String,

    /// Reference RGB stream.
    reference: String,

    #[arg(long, default_value_t = 910)]
    field_width: usize,

    #[arg(long, default_value_t = 263)]
    field_height: usize,

    /// Minimum acceptable PSNR in dB.
    #[arg(long, default_value_t = 40.0)]
    threshold: f64,

    /// Emit the report as JSON instead of plain text.
    #[arg(long)]
    json: bool,

    /// Only print the final report, not per-frame PSNR.
    #[arg(long, short = 'q')]
    quiet: bool,
}

#[derive(Default, Serialize)]
struct CheckReport {
    n_frames: u64,
    n_failed_frames: u64,
    min_psnr_db: f64,
    mean_psnr_db: f64,
    tgt_unchecked_bytes: u64,
    ref_unchecked_bytes: u64,
    pass: bool,
}

fn frame_byte_len(config: &CombConfig) -> usize {
    config.field_width * config.frame_height() * 3 * 2
}

fn read_frame(file: &mut File, buf: &mut [u8]) -> io::Result<bool> {
    let mut read_so_far = 0;
    while read_so_far < buf.len() {
        let n = file.read(&mut buf[read_so_far..])?;
        if n == 0 {
            break;
        }
        read_so_far += n;
    }
    Ok(read_so_far == buf.len())
}

fn frame_psnr(target: &[u8], reference: &[u8]) -> f64 {
    debug_assert_eq!(target.len(), reference.len());

    let mut sum_sq_err = 0.0_f64;
    let mut n = 0u64;
    for (t, r) in target.chunks_exact(2).zip(reference.chunks_exact(2)) {
        let tv = u16::from_le_bytes([t[0], t[1]]) as f64;
        let rv = u16::from_le_bytes([r[0], r[1]]) as f64;
        let err = tv - rv;
        sum_sq_err += err * err;
        n += 1;
    }

    if sum_sq_err == 0.0 {
        return f64::INFINITY;
    }

    let mse = sum_sq_err / n as f64;
    20.0 * 65535.0_f64.log10() - 10.0 * mse.log10()
}

fn run(cli: &Cli) -> io::Result<CheckReport> {
    let config = CombConfig { field_width: cli.field_width, field_height: cli.field_height, ..CombConfig::default() };
    let frame_len = frame_byte_len(&config);

    let mut tgt_file = File::open(&cli.target)?;
    let mut ref_file = File::open(&cli.reference)?;

    let mut tgt_buf = vec![0u8; frame_len];
    let mut ref_buf = vec![0u8; frame_len];

    let mut report = CheckReport::default();
    let mut psnr_sum = 0.0_f64;

    loop {
        let tgt_full = read_frame(&mut tgt_file, &mut tgt_buf)?;
        let ref_full = read_frame(&mut ref_file, &mut ref_buf)?;

        if !tgt_full || !ref_full {
            if tgt_full != ref_full {
                warn!("target and reference streams ended at different frame boundaries");
            }
            break;
        }

        let psnr = frame_psnr(&tgt_buf, &ref_buf);
        if !cli.quiet {
            println!("frame {:>6}: psnr={:.2} dB", report.n_frames, psnr);
        }

        if psnr < cli.threshold {
            report.n_failed_frames += 1;
        }
        if report.n_frames == 0 || psnr < report.min_psnr_db {
            report.min_psnr_db = psnr;
        }
        psnr_sum += psnr;
        report.n_frames += 1;
    }

    // Account for a final partial frame on either stream as unchecked bytes.
    report.tgt_unchecked_bytes = io::copy(&mut tgt_file, &mut io::sink())?;
    report.ref_unchecked_bytes = io::copy(&mut ref_file, &mut io::sink())?;

    report.mean_psnr_db = if report.n_frames > 0 { psnr_sum / report.n_frames as f64 } else { 0.0 };
    report.pass = report.n_frames > 0 && report.n_failed_frames == 0;

    Ok(report)
}

fn main() {
    pretty_env_logger::init();
    let cli = Cli::parse();

    let report = match run(&cli) {
        Ok(report) => report,
        Err(err) => {
            eprintln!("ld-decode-check: {}", err);
            std::process::exit(2);
        }
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report).unwrap());
    }
    else {
        println!();
        println!("Check Results");
        println!("=================================================");
        println!();
        println!("  Failed/Total Frames: {:>8}/{:>8}", report.n_failed_frames, report.n_frames);
        println!("  Minimum PSNR:        {:>8.2} dB", report.min_psnr_db);
        println!("  Mean PSNR:           {:>8.2} dB", report.mean_psnr_db);
        println!();
        println!("  Remaining Target Bytes:    {:>10}", report.tgt_unchecked_bytes);
        println!("  Remaining Reference Bytes: {:>10}", report.ref_unchecked_bytes);
        println!();
        println!("{}", if report.pass { "PASS" } else { "FAIL" });
    }

    std::process::exit(if report.pass { 0 } else { 1 });
}
