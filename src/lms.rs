// SPDX-License-Identifier: Apache-2.0

//! Common LMS 2xx types and error handling.
//!
//! This module provides the device enumerations (baud rate, measuring units,
//! operating mode, measuring mode) and the crate-wide error type. Enumeration
//! values match the constants the LMS 2xx reports on the wire.

use clap::ValueEnum;
use std::fmt;

/// Common error type for LMS operations
///
/// This enum consolidates the failure classes of a driver session: transport
/// faults, device timeouts, configuration misuse, and malformed telegrams.
#[derive(Debug)]
pub enum Error {
    /// I/O error (serial port, file operations)
    Io(std::io::Error),
    /// Serial port error from the underlying transport
    Serial(serialport::Error),
    /// Device did not answer within the message timeout
    Timeout(&'static str),
    /// Configuration error (bad parameters, operations on an uninitialized
    /// handle, refused mode switches)
    Config(String),
    /// Malformed or unexpected telegram data
    InvalidTelegram(String),
    /// Telegram checksum mismatch
    BadCrc { expected: u16, actual: u16 },
    /// System time error
    SystemTime(std::time::SystemTimeError),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Serial(err) => write!(f, "serial port error: {}", err),
            Error::Timeout(what) => write!(f, "timed out {}", what),
            Error::Config(msg) => write!(f, "configuration error: {}", msg),
            Error::InvalidTelegram(msg) => write!(f, "invalid telegram: {}", msg),
            Error::BadCrc { expected, actual } => {
                write!(
                    f,
                    "telegram CRC mismatch: expected {:#06x}, got {:#06x}",
                    expected, actual
                )
            }
            Error::SystemTime(err) => write!(f, "system time error: {}", err),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serialport::Error> for Error {
    fn from(err: serialport::Error) -> Self {
        Error::Serial(err)
    }
}

impl From<std::time::SystemTimeError> for Error {
    fn from(err: std::time::SystemTimeError) -> Self {
        Error::SystemTime(err)
    }
}

/// Session baud rate.
///
/// The discriminants are the codes the device accepts in a switch-baud
/// telegram. The LMS powers on at 9600 baud; 500K requires an RS-422 link.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Baud {
    /// 9600 baud (power-on default)
    #[value(name = "9600")]
    B9600 = 0x42,
    /// 19200 baud
    #[value(name = "19200")]
    B19200 = 0x41,
    /// 38400 baud
    #[default]
    #[value(name = "38400")]
    B38400 = 0x40,
    /// 500K baud (RS-422 only)
    #[value(name = "500k")]
    B500K = 0x48,
    /// Baud rate not yet negotiated
    #[value(skip)]
    Unknown = 0xFF,
}

impl Baud {
    /// All bauds the driver probes during detection, RS-232 rates fastest
    /// first, the RS-422-only rate last.
    pub const SUPPORTED: [Baud; 4] = [Baud::B38400, Baud::B19200, Baud::B9600, Baud::B500K];

    /// Wire code used in the switch-baud telegram.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Baud rate in bits per second, zero when unknown.
    pub fn bits_per_second(self) -> u32 {
        match self {
            Baud::B9600 => 9_600,
            Baud::B19200 => 19_200,
            Baud::B38400 => 38_400,
            Baud::B500K => 500_000,
            Baud::Unknown => 0,
        }
    }

    /// Nominal full scans per second the serial link sustains at this baud.
    ///
    /// Only the RS-232 rates have a defined figure; the device itself scans
    /// faster than any of these links can deliver.
    pub fn nominal_scan_hz(self) -> Option<f64> {
        match self {
            Baud::B9600 => Some(1.0),
            Baud::B19200 => Some(2.5),
            Baud::B38400 => Some(5.0),
            _ => None,
        }
    }
}

impl fmt::Display for Baud {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Baud::Unknown => write!(f, "unknown"),
            baud => write!(f, "{}", baud.bits_per_second()),
        }
    }
}

/// Measuring units reported in the device operating status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MeasuringUnits {
    /// Centimeters
    Cm = 0x00,
    /// Millimeters
    Mm = 0x01,
    /// Unrecognized units value
    #[default]
    Unknown = 0xFF,
}

impl From<u8> for MeasuringUnits {
    fn from(value: u8) -> Self {
        match value {
            0x00 => MeasuringUnits::Cm,
            0x01 => MeasuringUnits::Mm,
            _ => MeasuringUnits::Unknown,
        }
    }
}

impl fmt::Display for MeasuringUnits {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MeasuringUnits::Cm => write!(f, "cm"),
            MeasuringUnits::Mm => write!(f, "mm"),
            MeasuringUnits::Unknown => write!(f, "unknown"),
        }
    }
}

/// Device operating mode.
///
/// The monitor modes control when and how the device emits measurement
/// telegrams; installation mode is password-protected and used for
/// configuration changes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OperatingMode {
    Installation = 0x00,
    Diagnostic = 0x10,
    MonitorStreamMinValueForEachSegment = 0x20,
    MonitorTriggerMinValueOnObject = 0x21,
    MonitorStreamMinVertDistToObject = 0x22,
    MonitorTriggerMinVertDistToObject = 0x23,
    /// Continuous measurement streaming
    MonitorStreamValues = 0x24,
    /// Idle; measurements sent on request only
    MonitorRequestValues = 0x25,
    MonitorStreamMeanValues = 0x26,
    MonitorStreamValuesSubrange = 0x27,
    MonitorStreamMeanValuesSubrange = 0x28,
    MonitorStreamValuesWithFields = 0x29,
    MonitorStreamValuesFromPartialScan = 0x2A,
    MonitorStreamRangeAndReflectFromPartialScan = 0x2B,
    MonitorStreamMinValuesForEachSegmentSubrange = 0x2C,
    MonitorNavigation = 0x2E,
    MonitorStreamRangeAndReflect = 0x50,
    #[default]
    Unknown = 0xFF,
}

impl OperatingMode {
    /// Wire code used in the switch-mode telegram.
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl From<u8> for OperatingMode {
    fn from(value: u8) -> Self {
        match value {
            0x00 => OperatingMode::Installation,
            0x10 => OperatingMode::Diagnostic,
            0x20 => OperatingMode::MonitorStreamMinValueForEachSegment,
            0x21 => OperatingMode::MonitorTriggerMinValueOnObject,
            0x22 => OperatingMode::MonitorStreamMinVertDistToObject,
            0x23 => OperatingMode::MonitorTriggerMinVertDistToObject,
            0x24 => OperatingMode::MonitorStreamValues,
            0x25 => OperatingMode::MonitorRequestValues,
            0x26 => OperatingMode::MonitorStreamMeanValues,
            0x27 => OperatingMode::MonitorStreamValuesSubrange,
            0x28 => OperatingMode::MonitorStreamMeanValuesSubrange,
            0x29 => OperatingMode::MonitorStreamValuesWithFields,
            0x2A => OperatingMode::MonitorStreamValuesFromPartialScan,
            0x2B => OperatingMode::MonitorStreamRangeAndReflectFromPartialScan,
            0x2C => OperatingMode::MonitorStreamMinValuesForEachSegmentSubrange,
            0x2E => OperatingMode::MonitorNavigation,
            0x50 => OperatingMode::MonitorStreamRangeAndReflect,
            _ => OperatingMode::Unknown,
        }
    }
}

/// Device measuring mode.
///
/// Determines the maximum range and which high bits of each measurement
/// carry field/reflector flags instead of distance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MeasuringMode {
    Mode8Or80FaFbDazzle = 0x00,
    Mode8Or80Reflector = 0x01,
    Mode8Or80FaFbFc = 0x02,
    Mode16Reflector = 0x03,
    Mode16FaFb = 0x04,
    Mode32Reflector = 0x05,
    Mode32Fa = 0x06,
    Mode32Immediate = 0x0F,
    Reflectivity = 0x3F,
    #[default]
    Unknown = 0xFF,
}

impl From<u8> for MeasuringMode {
    fn from(value: u8) -> Self {
        match value {
            0x00 => MeasuringMode::Mode8Or80FaFbDazzle,
            0x01 => MeasuringMode::Mode8Or80Reflector,
            0x02 => MeasuringMode::Mode8Or80FaFbFc,
            0x03 => MeasuringMode::Mode16Reflector,
            0x04 => MeasuringMode::Mode16FaFb,
            0x05 => MeasuringMode::Mode32Reflector,
            0x06 => MeasuringMode::Mode32Fa,
            0x0F => MeasuringMode::Mode32Immediate,
            0x3F => MeasuringMode::Reflectivity,
            _ => MeasuringMode::Unknown,
        }
    }
}

impl MeasuringMode {
    /// Bitmask isolating the distance bits of a raw measurement.
    ///
    /// The 8/80 m modes use 13 distance bits, the 16 m modes 14, and the
    /// 32 m modes 15; the remaining high bits are field and reflector flags.
    /// Reflectivity mode carries no distance at all, so the full word is
    /// returned unmasked.
    pub fn range_mask(self) -> u16 {
        match self {
            MeasuringMode::Mode8Or80FaFbDazzle
            | MeasuringMode::Mode8Or80Reflector
            | MeasuringMode::Mode8Or80FaFbFc => 0x1FFF,
            MeasuringMode::Mode16Reflector | MeasuringMode::Mode16FaFb => 0x3FFF,
            MeasuringMode::Mode32Reflector
            | MeasuringMode::Mode32Fa
            | MeasuringMode::Mode32Immediate => 0x7FFF,
            MeasuringMode::Reflectivity | MeasuringMode::Unknown => 0xFFFF,
        }
    }

    /// Maximum measurable distance in meters, zero when not a ranging mode.
    pub fn max_distance_m(self) -> f64 {
        match self {
            MeasuringMode::Mode8Or80FaFbDazzle
            | MeasuringMode::Mode8Or80Reflector
            | MeasuringMode::Mode8Or80FaFbFc => 8.0,
            MeasuringMode::Mode16Reflector | MeasuringMode::Mode16FaFb => 16.0,
            MeasuringMode::Mode32Reflector
            | MeasuringMode::Mode32Fa
            | MeasuringMode::Mode32Immediate => 32.0,
            MeasuringMode::Reflectivity | MeasuringMode::Unknown => 0.0,
        }
    }
}

/// Get current timestamp in nanoseconds.
///
/// On Linux, uses `CLOCK_MONOTONIC_RAW` for best accuracy.
/// On other platforms, falls back to `SystemTime`.
#[cfg(target_os = "linux")]
pub fn timestamp() -> Result<u64, Error> {
    let mut tp = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    let err = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC_RAW, &mut tp) };
    if err != 0 {
        return Err(std::io::Error::last_os_error().into());
    }

    Ok(tp.tv_sec as u64 * 1_000_000_000 + tp.tv_nsec as u64)
}

#[cfg(not(target_os = "linux"))]
pub fn timestamp() -> Result<u64, Error> {
    let now = std::time::SystemTime::now();
    let duration = now.duration_since(std::time::UNIX_EPOCH)?;
    Ok(duration.as_nanos() as u64)
}
