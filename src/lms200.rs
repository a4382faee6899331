// SPDX-License-Identifier: Apache-2.0

//! SICK LMS 2xx driver implementation.
//!
//! The LMS 2xx is a 180° scanning laser rangefinder speaking a framed
//! request/reply protocol over RS-232/RS-422 (see [`crate::telegram`]).
//! A session looks like:
//!
//! 1. [`SickLms::initialize`] - probe the link to find the device's current
//!    baud, negotiate the session baud, read the operating status, and park
//!    the device in monitor-request mode.
//! 2. [`SickLms::get_scan`] - fetch one range scan, either by explicit
//!    request or by reading the stream when streaming is active.
//! 3. [`SickLms::uninitialize`] - restore the 9600 power-on baud and end the
//!    session.
//!
//! Each handle owns its own [`ScanBuffer`]; nothing is shared between
//! handles, so independent devices can be driven from one process.

use crate::{
    lms::{timestamp, Baud, Error, MeasuringMode, MeasuringUnits, OperatingMode},
    scan::ScanBuffer,
    telegram::{Frame, Telegram, TelegramReader},
    transport::{SerialTransport, Transport},
};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Switch operating mode (also carries baud codes)
const CMD_SWITCH_MODE: u8 = 0x20;

/// Request measured values (single scan)
const CMD_REQUEST_SCAN: u8 = 0x30;

/// Request device operating status
const CMD_REQUEST_STATUS: u8 = 0x31;

/// Reply to a mode or baud switch
const REPLY_MODE: u8 = 0xA0;

/// Measurement telegram
const REPLY_SCAN: u8 = 0xB0;

/// Operating status telegram
const REPLY_STATUS: u8 = 0xB1;

/// Password appended when entering installation mode
const INSTALLATION_PASSWORD: &[u8; 8] = b"SICK_LMS";

/// How long to wait for the single-byte acknowledgement
const ACK_TIMEOUT: Duration = Duration::from_secs(1);

/// How long to wait for a reply telegram
const MESSAGE_TIMEOUT: Duration = Duration::from_secs(2);

/// Telegram send attempts before giving up (initial send plus resends on
/// NACK or silence)
const SEND_ATTEMPTS: u32 = 3;

/// UART settle time after a baud change
const BAUD_SETTLE: Duration = Duration::from_millis(150);

/// Idle backoff while polling an empty link
const POLL_BACKOFF: Duration = Duration::from_millis(1);

// Operating status (0xB1) payload layout, offsets relative to the payload
// start (payload[0] is the 0xB1 code byte).
const STATUS_MIN_PAYLOAD: usize = 114;
const STATUS_NUM_MOTOR_REVS: usize = 67; // u16 LE
const STATUS_OPERATING_MODE: usize = 102;
const STATUS_DEVICE_STATUS: usize = 103;
const STATUS_LASER_MODE: usize = 104;
const STATUS_MEASURING_MODE: usize = 105;
const STATUS_SCAN_ANGLE: usize = 107; // u16 LE, whole degrees
const STATUS_SCAN_RESOLUTION: usize = 109; // u16 LE, 1/100 degree
const STATUS_MEASURING_UNITS: usize = 111;
const STATUS_ADDRESS: usize = 112;
const STATUS_VARIANT: usize = 113;

/// Device operating status, parsed from a 0xB1 reply.
#[derive(Clone, Copy, Debug)]
pub struct OperatingStatus {
    pub operating_mode: OperatingMode,
    pub device_status: u8,
    pub laser_mode: u8,
    pub measuring_mode: MeasuringMode,
    /// Scan field of view in degrees (100 or 180)
    pub scan_angle_deg: f64,
    /// Angular resolution in degrees (0.25, 0.5, or 1.0)
    pub scan_resolution_deg: f64,
    pub measuring_units: MeasuringUnits,
    pub address: u8,
    pub variant: u8,
    pub num_motor_revs: u16,
}

/// Parse an operating status payload (code byte included).
fn parse_operating_status(payload: &[u8]) -> Result<OperatingStatus, Error> {
    if payload.len() < STATUS_MIN_PAYLOAD {
        return Err(Error::InvalidTelegram(format!(
            "status payload too short: {} bytes, expected at least {}",
            payload.len(),
            STATUS_MIN_PAYLOAD
        )));
    }

    let scan_angle = u16::from_le_bytes([
        payload[STATUS_SCAN_ANGLE],
        payload[STATUS_SCAN_ANGLE + 1],
    ]);
    let scan_resolution = u16::from_le_bytes([
        payload[STATUS_SCAN_RESOLUTION],
        payload[STATUS_SCAN_RESOLUTION + 1],
    ]);
    let num_motor_revs = u16::from_le_bytes([
        payload[STATUS_NUM_MOTOR_REVS],
        payload[STATUS_NUM_MOTOR_REVS + 1],
    ]);

    Ok(OperatingStatus {
        operating_mode: OperatingMode::from(payload[STATUS_OPERATING_MODE]),
        device_status: payload[STATUS_DEVICE_STATUS],
        laser_mode: payload[STATUS_LASER_MODE],
        measuring_mode: MeasuringMode::from(payload[STATUS_MEASURING_MODE]),
        scan_angle_deg: scan_angle as f64,
        scan_resolution_deg: scan_resolution as f64 / 100.0,
        measuring_units: MeasuringUnits::from(payload[STATUS_MEASURING_UNITS]),
        address: payload[STATUS_ADDRESS],
        variant: payload[STATUS_VARIANT],
        num_motor_revs,
    })
}

/// SICK LMS 2xx driver handle.
///
/// One handle corresponds to one device on one serial link. The handle owns
/// the transport, the telegram parser state, and the scan buffer.
pub struct SickLms {
    device_path: String,
    transport: Option<Box<dyn Transport>>,
    reader: TelegramReader,
    /// Bytes read from the transport but not yet fed to the parser
    pending: VecDeque<u8>,
    session_baud: Baud,
    status: Option<OperatingStatus>,
    scan: ScanBuffer,
    next_scan_id: u32,
    streaming: bool,
    initialized: bool,
    ack_timeout: Duration,
    message_timeout: Duration,
}

impl SickLms {
    /// Create a handle for the device at the given serial path.
    ///
    /// The port is not opened until [`Self::initialize`] is called.
    pub fn new(device_path: impl Into<String>) -> Self {
        Self {
            device_path: device_path.into(),
            transport: None,
            reader: TelegramReader::new(),
            pending: VecDeque::new(),
            session_baud: Baud::Unknown,
            status: None,
            scan: ScanBuffer::new(),
            next_scan_id: 0,
            streaming: false,
            initialized: false,
            ack_timeout: ACK_TIMEOUT,
            message_timeout: MESSAGE_TIMEOUT,
        }
    }

    /// Create a handle over an existing transport.
    ///
    /// Used for testing against a scripted transport and for non-serial
    /// links; the device path is only used in log messages.
    pub fn with_transport(transport: Box<dyn Transport>) -> Self {
        let mut lms = Self::new("(in-memory)");
        lms.transport = Some(transport);
        lms
    }

    /// Override the acknowledgement and reply timeouts.
    pub fn set_timeouts(&mut self, ack: Duration, message: Duration) {
        self.ack_timeout = ack;
        self.message_timeout = message;
    }

    /// Whether [`Self::initialize`] has completed on this handle.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// The negotiated session baud, [`Baud::Unknown`] before initialization.
    pub fn session_baud(&self) -> Baud {
        self.session_baud
    }

    /// Establish a session with the device.
    ///
    /// Opens the serial port if needed, probes the supported bauds until the
    /// device answers a status request, switches the device to the requested
    /// session baud, and parks it in monitor-request mode.
    pub fn initialize(&mut self, baud: Baud) -> Result<(), Error> {
        if self.initialized {
            return Err(Error::Config("device already initialized".into()));
        }
        if baud == Baud::Unknown {
            return Err(Error::Config("session baud must be specified".into()));
        }

        if self.transport.is_none() {
            let serial = SerialTransport::open(&self.device_path, baud)?;
            self.transport = Some(Box::new(serial));
        }

        log::debug!("selected baud: {}", baud);
        let (detected, status) = self.detect(baud)?;
        if detected != baud {
            log::info!("device answered at {} baud, switching to {}", detected, baud);
            self.switch_session_baud(baud)?;
        } else {
            self.session_baud = baud;
        }

        log::debug!("operating mode: {:?}", status.operating_mode);
        log::debug!("measuring mode: {:?}", status.measuring_mode);
        log::debug!("measuring units: {}", status.measuring_units);
        log::debug!("scan resolution: {}", status.scan_resolution_deg);
        log::debug!("scan angle: {}", status.scan_angle_deg);
        log::debug!("max distance: {} m", status.measuring_mode.max_distance_m());

        self.status = Some(status);
        self.switch_operating_mode(OperatingMode::MonitorRequestValues)?;
        self.initialized = true;
        Ok(())
    }

    /// Fetch one range scan.
    ///
    /// In monitor-request mode this issues a request-measured-values command
    /// and waits for the reply; in streaming mode it reads the next
    /// measurement telegram off the link. The returned buffer is owned by
    /// this handle and overwritten by the next call.
    pub fn get_scan(&mut self) -> Result<&ScanBuffer, Error> {
        self.ensure_initialized()?;
        if !self.streaming {
            self.send_with_ack(&[CMD_REQUEST_SCAN, 0x01], SEND_ATTEMPTS)?;
        }
        let reply = self.recv_reply(REPLY_SCAN)?;
        self.parse_scan(&reply.payload)?;
        Ok(&self.scan)
    }

    /// Put the device into continuous measurement streaming.
    ///
    /// While streaming, [`Self::get_scan`] consumes telegrams as the device
    /// emits them instead of requesting each scan.
    pub fn start_stream(&mut self) -> Result<(), Error> {
        self.ensure_initialized()?;
        self.switch_operating_mode(OperatingMode::MonitorStreamValues)
    }

    /// Stop streaming and return the device to monitor-request mode.
    pub fn stop_stream(&mut self) -> Result<(), Error> {
        self.ensure_initialized()?;
        self.switch_operating_mode(OperatingMode::MonitorRequestValues)
    }

    /// End the session.
    ///
    /// Stops any streaming, restores the 9600 power-on baud so the next
    /// session starts from a known link state, and marks the handle
    /// uninitialized. The port itself stays open until the handle drops.
    pub fn uninitialize(&mut self) -> Result<(), Error> {
        self.ensure_initialized()?;
        if self.streaming {
            self.switch_operating_mode(OperatingMode::MonitorRequestValues)?;
        }
        if self.session_baud != Baud::B9600 {
            self.switch_session_baud(Baud::B9600)?;
        }
        self.transport_mut()?.flush()?;
        self.initialized = false;
        log::info!("session on {} closed", self.device_path);
        Ok(())
    }

    /// Full operating status read during initialization.
    pub fn operating_status(&self) -> Result<&OperatingStatus, Error> {
        self.ensure_initialized()?;
        self.status
            .as_ref()
            .ok_or_else(|| Error::Config("operating status unavailable".into()))
    }

    /// Current device operating mode.
    pub fn operating_mode(&self) -> Result<OperatingMode, Error> {
        Ok(self.operating_status()?.operating_mode)
    }

    /// Device measuring mode.
    pub fn measuring_mode(&self) -> Result<MeasuringMode, Error> {
        Ok(self.operating_status()?.measuring_mode)
    }

    /// Units of the measurements (cm or mm).
    pub fn measuring_units(&self) -> Result<MeasuringUnits, Error> {
        Ok(self.operating_status()?.measuring_units)
    }

    /// Angular resolution in degrees.
    pub fn scan_resolution(&self) -> Result<f64, Error> {
        Ok(self.operating_status()?.scan_resolution_deg)
    }

    /// Scan field of view in degrees.
    pub fn scan_angle(&self) -> Result<f64, Error> {
        Ok(self.operating_status()?.scan_angle_deg)
    }

    /// Maximum measurable distance in meters for the device's measuring mode.
    pub fn max_distance_m(&self) -> Result<f64, Error> {
        Ok(self.operating_status()?.measuring_mode.max_distance_m())
    }

    fn ensure_initialized(&self) -> Result<(), Error> {
        if self.initialized {
            Ok(())
        } else {
            Err(Error::Config("device not initialized".into()))
        }
    }

    fn transport_mut(&mut self) -> Result<&mut (dyn Transport + 'static), Error> {
        self.transport
            .as_deref_mut()
            .ok_or_else(|| Error::Config("no transport attached".into()))
    }

    /// Probe the link until the device answers a status request.
    ///
    /// The requested baud is tried first since a previous session usually
    /// left the device there, then the remaining supported rates.
    fn detect(&mut self, requested: Baud) -> Result<(Baud, OperatingStatus), Error> {
        let mut candidates = vec![requested];
        candidates.extend(Baud::SUPPORTED.iter().copied().filter(|b| *b != requested));

        for candidate in candidates {
            let transport = self.transport_mut()?;
            transport.set_baud(candidate)?;
            transport.drain_input()?;
            self.pending.clear();
            self.reader.reset();

            match self.transact(&[CMD_REQUEST_STATUS], REPLY_STATUS, 1) {
                Ok(reply) => {
                    log::debug!("device detected at {} baud", candidate);
                    return Ok((candidate, parse_operating_status(&reply.payload)?));
                }
                Err(Error::Timeout(_))
                | Err(Error::BadCrc { .. })
                | Err(Error::InvalidTelegram(_)) => {
                    log::debug!("no answer at {} baud", candidate);
                }
                Err(err) => return Err(err),
            }
        }

        Err(Error::Timeout("detecting device baud"))
    }

    /// Switch the device (and then the local port) to a new session baud.
    fn switch_session_baud(&mut self, baud: Baud) -> Result<(), Error> {
        let reply = self.transact(&[CMD_SWITCH_MODE, baud.code()], REPLY_MODE, SEND_ATTEMPTS)?;
        if reply.payload.get(1).copied() != Some(0x00) {
            return Err(Error::Config(format!("device refused baud switch to {}", baud)));
        }

        self.transport_mut()?.set_baud(baud)?;
        std::thread::sleep(BAUD_SETTLE);
        self.session_baud = baud;
        Ok(())
    }

    /// Switch the device operating mode, appending the installation password
    /// when required.
    fn switch_operating_mode(&mut self, mode: OperatingMode) -> Result<(), Error> {
        let mut payload = vec![CMD_SWITCH_MODE, mode.code()];
        if mode == OperatingMode::Installation {
            payload.extend_from_slice(INSTALLATION_PASSWORD);
        }

        let reply = self.transact(&payload, REPLY_MODE, SEND_ATTEMPTS)?;
        if reply.payload.get(1).copied() != Some(0x00) {
            return Err(Error::Config(format!("device refused switch to {:?}", mode)));
        }

        if let Some(status) = self.status.as_mut() {
            status.operating_mode = mode;
        }
        self.streaming = mode == OperatingMode::MonitorStreamValues;
        Ok(())
    }

    /// Send a command and wait for its reply telegram.
    fn transact(&mut self, payload: &[u8], reply_code: u8, attempts: u32) -> Result<Telegram, Error> {
        self.send_with_ack(payload, attempts)?;
        self.recv_reply(reply_code)
    }

    /// Send a command telegram, resending on NACK or silence.
    fn send_with_ack(&mut self, payload: &[u8], attempts: u32) -> Result<(), Error> {
        let bytes = Telegram::command(payload).encode();

        for attempt in 0..attempts {
            if attempt > 0 {
                log::debug!(
                    "resending telegram {:#04x} (attempt {} of {})",
                    payload[0],
                    attempt + 1,
                    attempts
                );
            }

            {
                let transport = self.transport_mut()?;
                transport.write_all(&bytes)?;
                transport.flush()?;
            }

            match self.await_ack() {
                Ok(true) => return Ok(()),
                Ok(false) => continue, // NACK: resend
                Err(Error::Timeout(_)) if attempt + 1 < attempts => continue,
                Err(err) => return Err(err),
            }
        }

        Err(Error::Timeout("waiting for acknowledgement"))
    }

    /// Wait for an ACK (true) or NACK (false) within the ack timeout.
    ///
    /// Telegrams arriving in the meantime (e.g. stream measurements still in
    /// flight) are dropped.
    fn await_ack(&mut self) -> Result<bool, Error> {
        let deadline = Instant::now() + self.ack_timeout;
        while let Some(byte) = self.next_byte(deadline)? {
            match self.reader.push(byte)? {
                Some(Frame::Ack) => return Ok(true),
                Some(Frame::Nack) => return Ok(false),
                Some(Frame::Telegram(t)) => {
                    log::debug!("dropping telegram {:#04x} while awaiting ack", t.code());
                }
                None => {}
            }
        }
        Err(Error::Timeout("waiting for acknowledgement"))
    }

    /// Wait for a reply telegram with the given code, skipping others.
    fn recv_reply(&mut self, code: u8) -> Result<Telegram, Error> {
        let deadline = Instant::now() + self.message_timeout;
        while let Some(byte) = self.next_byte(deadline)? {
            match self.reader.push(byte)? {
                Some(Frame::Telegram(t)) if t.code() == code => return Ok(t),
                Some(Frame::Telegram(t)) => {
                    log::debug!("skipping unexpected telegram {:#04x}", t.code());
                }
                Some(_) => {} // stray ack/nack
                None => {}
            }
        }
        Err(Error::Timeout("waiting for device reply"))
    }

    /// Next byte from the link, or `None` once the deadline passes.
    fn next_byte(&mut self, deadline: Instant) -> Result<Option<u8>, Error> {
        if let Some(byte) = self.pending.pop_front() {
            return Ok(Some(byte));
        }

        let mut chunk = [0u8; 512];
        loop {
            let n = self.transport_mut()?.read(&mut chunk)?;
            if n > 0 {
                self.pending.extend(&chunk[..n]);
                return Ok(self.pending.pop_front());
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            std::thread::sleep(POLL_BACKOFF);
        }
    }

    /// Parse a measurement (0xB0) payload into the scan buffer.
    fn parse_scan(&mut self, payload: &[u8]) -> Result<(), Error> {
        if payload.len() < 3 {
            return Err(Error::InvalidTelegram(
                "measurement payload too short".into(),
            ));
        }

        // Count is 10 bits; the remaining flag bits carry the partial scan
        // index and a units override we take from the operating status.
        let count = payload[1] as usize | ((payload[2] & 0x03) as usize) << 8;
        let partial_index = (payload[2] >> 3) & 0x03;
        log::trace!("measurement telegram: {} values, partial {}", count, partial_index);

        let needed = 3 + count * 2;
        if payload.len() < needed {
            return Err(Error::InvalidTelegram(format!(
                "measurement telegram truncated: {} values need {} bytes, got {}",
                count,
                needed,
                payload.len()
            )));
        }
        if count > self.scan.capacity() {
            return Err(Error::InvalidTelegram(format!(
                "too many measurements: {} exceeds capacity {}",
                count,
                self.scan.capacity()
            )));
        }

        let mask = self
            .status
            .as_ref()
            .map(|s| s.measuring_mode.range_mask())
            .unwrap_or(0xFFFF);

        self.scan.clear();
        for i in 0..count {
            let offset = 3 + i * 2;
            let raw = u16::from_le_bytes([payload[offset], payload[offset + 1]]);
            self.scan.push(raw & mask);
        }

        self.scan.stamp(timestamp().unwrap_or(0), self.next_scan_id);
        self.next_scan_id = self.next_scan_id.wrapping_add(1);
        Ok(())
    }
}

impl Drop for SickLms {
    fn drop(&mut self) {
        if self.initialized {
            if let Err(err) = self.uninitialize() {
                log::warn!("failed to uninitialize {}: {}", self.device_path, err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    /// Build a well-formed status payload with the interesting fields set.
    fn status_payload(
        operating_mode: u8,
        measuring_mode: u8,
        units: u8,
        angle: u16,
        resolution: u16,
    ) -> Vec<u8> {
        let mut payload = vec![0u8; STATUS_MIN_PAYLOAD];
        payload[0] = REPLY_STATUS;
        payload[STATUS_NUM_MOTOR_REVS..STATUS_NUM_MOTOR_REVS + 2]
            .copy_from_slice(&1500u16.to_le_bytes());
        payload[STATUS_OPERATING_MODE] = operating_mode;
        payload[STATUS_DEVICE_STATUS] = 0x00;
        payload[STATUS_LASER_MODE] = 0x01;
        payload[STATUS_MEASURING_MODE] = measuring_mode;
        payload[STATUS_SCAN_ANGLE..STATUS_SCAN_ANGLE + 2].copy_from_slice(&angle.to_le_bytes());
        payload[STATUS_SCAN_RESOLUTION..STATUS_SCAN_RESOLUTION + 2]
            .copy_from_slice(&resolution.to_le_bytes());
        payload[STATUS_MEASURING_UNITS] = units;
        payload[STATUS_ADDRESS] = 0x00;
        payload[STATUS_VARIANT] = 0x01;
        payload
    }

    #[test]
    fn test_parse_operating_status() {
        let payload = status_payload(0x25, 0x00, 0x00, 180, 50);
        let status = parse_operating_status(&payload).unwrap();

        assert_eq!(status.operating_mode, OperatingMode::MonitorRequestValues);
        assert_eq!(status.measuring_mode, MeasuringMode::Mode8Or80FaFbDazzle);
        assert_eq!(status.measuring_units, MeasuringUnits::Cm);
        assert_eq!(status.scan_angle_deg, 180.0);
        assert_eq!(status.scan_resolution_deg, 0.5);
        assert_eq!(status.num_motor_revs, 1500);
    }

    #[test]
    fn test_parse_operating_status_too_short() {
        let result = parse_operating_status(&[REPLY_STATUS, 0x00, 0x00]);
        assert!(matches!(result, Err(Error::InvalidTelegram(_))));
    }

    #[test]
    fn test_parse_scan_masks_flag_bits() {
        let mut lms = SickLms::with_transport(Box::new(MockTransport::new()));
        lms.status =
            Some(parse_operating_status(&status_payload(0x25, 0x00, 0x01, 180, 50)).unwrap());

        // Two measurements; the second has reflector flag bits set above the
        // 13-bit distance field of the 8/80 m mode.
        let payload = vec![REPLY_SCAN, 0x02, 0x00, 0x34, 0x12, 0xFF, 0xFF];
        lms.parse_scan(&payload).unwrap();

        assert_eq!(lms.scan.values(), &[0x1234, 0x1FFF]);
        assert_eq!(lms.scan.scan_id(), 0);

        // Next scan id increments.
        lms.parse_scan(&payload).unwrap();
        assert_eq!(lms.scan.scan_id(), 1);
    }

    #[test]
    fn test_parse_scan_truncated() {
        let mut lms = SickLms::with_transport(Box::new(MockTransport::new()));
        // Claims 4 values but carries only one.
        let payload = vec![REPLY_SCAN, 0x04, 0x00, 0x34, 0x12];
        let result = lms.parse_scan(&payload);
        assert!(matches!(result, Err(Error::InvalidTelegram(_))));
    }

    #[test]
    fn test_parse_scan_count_exceeds_capacity() {
        let mut lms = SickLms::with_transport(Box::new(MockTransport::new()));
        let count = (lms.scan.capacity() + 1) as u16;
        let mut payload = vec![REPLY_SCAN, count.to_le_bytes()[0], count.to_le_bytes()[1]];
        payload.resize(3 + count as usize * 2, 0);
        let result = lms.parse_scan(&payload);
        assert!(matches!(result, Err(Error::InvalidTelegram(_))));
    }

    #[test]
    fn test_accessors_require_initialization() {
        let lms = SickLms::with_transport(Box::new(MockTransport::new()));
        assert!(matches!(lms.operating_mode(), Err(Error::Config(_))));
        assert!(matches!(lms.measuring_units(), Err(Error::Config(_))));
        assert!(matches!(lms.scan_angle(), Err(Error::Config(_))));
        assert!(matches!(lms.scan_resolution(), Err(Error::Config(_))));
    }

    #[test]
    fn test_get_scan_requires_initialization() {
        let mut lms = SickLms::with_transport(Box::new(MockTransport::new()));
        assert!(matches!(lms.get_scan(), Err(Error::Config(_))));
    }

    #[test]
    fn test_initialize_rejects_unknown_baud() {
        let mut lms = SickLms::with_transport(Box::new(MockTransport::new()));
        assert!(matches!(
            lms.initialize(Baud::Unknown),
            Err(Error::Config(_))
        ));
    }
}
