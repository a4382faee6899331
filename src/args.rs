// SPDX-License-Identifier: Apache-2.0

use crate::lms::Baud;
use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Serial device path for the LMS 2xx (e.g. /dev/ttyUSB0)
    #[arg(env)]
    pub device: String,

    /// Session baud rate to negotiate with the device
    #[arg(long, env, default_value = "38400")]
    pub baud: Baud,

    /// Number of scans to capture before exiting (0 runs until interrupted)
    #[arg(long, env, default_value = "0")]
    pub scans: u64,

    /// Poll each scan with an explicit request instead of streaming
    #[arg(long, env, default_value = "false")]
    pub poll: bool,
}
