// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use log::{debug, info, warn};
use sicklms::{args::Args, SickLms};
use std::time::Instant;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    env_logger::init();

    let mut lms = SickLms::new(&args.device);
    lms.initialize(args.baud)?;

    let status = *lms.operating_status()?;
    info!("operating mode: {:?}", status.operating_mode);
    info!("measuring mode: {:?}", status.measuring_mode);
    info!("measuring units: {}", status.measuring_units);
    info!("scan resolution: {}°", status.scan_resolution_deg);
    info!("scan angle: {}°", status.scan_angle_deg);
    info!("max distance: {} m", status.measuring_mode.max_distance_m());
    if let Some(hz) = args.baud.nominal_scan_hz() {
        info!("nominal update rate: {} Hz", hz);
    }

    if !args.poll {
        lms.start_stream()?;
    }

    let result = scan_loop(&mut lms, args.scans);

    // Teardown failures on a dead link must not replace the root cause.
    if !args.poll && lms.is_initialized() {
        if let Err(err) = lms.stop_stream() {
            warn!("failed to stop streaming: {}", err);
        }
    }
    if lms.is_initialized() {
        if let Err(err) = lms.uninitialize() {
            warn!("failed to close session: {}", err);
        }
    }
    result
}

/// Read scans, logging a running average rate like `scan #12 @ 5.0 Hz`.
fn scan_loop(lms: &mut SickLms, limit: u64) -> Result<(), Box<dyn std::error::Error>> {
    let mut num_scans: u64 = 0;
    let mut sum_hz = 0.0;

    while limit == 0 || num_scans < limit {
        let t0 = Instant::now();
        let scan = lms.get_scan()?;
        let elapsed = t0.elapsed().as_secs_f64();

        num_scans += 1;
        if elapsed > 0.0 {
            sum_hz += 1.0 / elapsed;
        }
        let avg_hz = sum_hz / num_scans as f64;

        info!("scan #{} @ {:.1} Hz ({} values)", num_scans, avg_hz, scan.len());
        debug!("scan: {:?}", scan.values());
    }

    Ok(())
}
