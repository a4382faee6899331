// SPDX-License-Identifier: Apache-2.0

//! SICK LMS 2xx LIDAR Driver Library
//!
//! This library provides a native driver for the SICK LMS 2xx family of
//! scanning laser rangefinders over RS-232/RS-422.
//!
//! # Architecture
//!
//! The driver uses a **per-handle scan buffer** pattern: every [`SickLms`]
//! handle owns its transport, telegram parser, and scan storage, so multiple
//! devices in one process never share state.
//!
//! ```text
//! ┌──────────────────┐     ┌────────────────┐     ┌────────────────┐
//! │  Transport       │ ──► │ TelegramReader │ ──► │  SickLms       │
//! │  (serial/mock)   │     │ (frame + CRC)  │     │  (session)     │
//! └──────────────────┘     └────────────────┘     └────────┬───────┘
//!                                                          ▼
//!                                                 ┌────────────────┐
//!                                                 │  ScanBuffer    │
//!                                                 │  (per-handle)  │
//!                                                 └────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`lms`]: Common types, enumerations, and error handling
//! - [`lms200`]: The LMS 2xx session driver
//! - [`telegram`]: Telegram framing and the SICK CRC-16
//! - [`transport`]: Byte transport abstraction (serial, scripted mock)
//! - [`scan`]: Fixed-capacity scan storage
//!
//! # Example
//!
//! ```ignore
//! use sicklms::{Baud, SickLms};
//!
//! let mut lms = SickLms::new("/dev/ttyUSB0");
//! lms.initialize(Baud::B38400)?;
//!
//! println!("units: {}", lms.measuring_units()?);
//! println!("resolution: {}°", lms.scan_resolution()?);
//!
//! let scan = lms.get_scan()?;
//! for &range in scan.values() {
//!     // raw device units, flag bits already masked
//! }
//!
//! lms.uninitialize()?;
//! ```

pub mod args;
pub mod lms;
pub mod lms200;
pub mod scan;
pub mod telegram;
pub mod transport;

// Re-exports for convenience
pub use lms::{Baud, Error, MeasuringMode, MeasuringUnits, OperatingMode};
pub use lms200::{OperatingStatus, SickLms};
pub use scan::{ScanBuffer, MAX_MEASUREMENTS};
pub use transport::{MockTransport, SerialTransport, Transport};
