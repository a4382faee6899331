// SPDX-License-Identifier: Apache-2.0

//! Byte transport abstraction for the LMS serial link.
//!
//! The driver talks to the device through the [`Transport`] trait, enabling:
//!
//! - **Live operation**: an RS-232/RS-422 serial port
//! - **Testing**: a scripted in-memory transport replaying a conversation
//!
//! Reads are polling-style: `Ok(0)` means no data arrived within the
//! transport's internal timeout, not end of stream.

use crate::lms::{Baud, Error};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Poll interval for serial reads. Short enough that the driver's own
/// message deadlines dominate the observed latency.
const READ_POLL_TIMEOUT: Duration = Duration::from_millis(20);

/// Trait for LMS byte transports.
pub trait Transport: Send {
    /// Read available bytes into `buf`, returning the count.
    ///
    /// Returns `Ok(0)` when no data arrived before the poll timeout.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error>;

    /// Write the entire buffer.
    fn write_all(&mut self, data: &[u8]) -> Result<(), Error>;

    /// Flush pending output to the device.
    fn flush(&mut self) -> Result<(), Error>;

    /// Change the link speed.
    fn set_baud(&mut self, baud: Baud) -> Result<(), Error>;

    /// Discard any unread input (stale telegrams, line noise).
    fn drain_input(&mut self) -> Result<(), Error>;
}

/// Serial port transport for live device operation.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open a serial port at the given baud, 8N1 with no flow control as the
    /// LMS 2xx expects.
    ///
    /// # Arguments
    /// * `path` - Serial port path (e.g. "/dev/ttyUSB0")
    /// * `baud` - Initial link speed
    pub fn open(path: &str, baud: Baud) -> Result<Self, Error> {
        if baud == Baud::Unknown {
            return Err(Error::Config("cannot open port at unknown baud".into()));
        }

        let port = serialport::new(path, baud.bits_per_second())
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(READ_POLL_TIMEOUT)
            .open()?;

        log::info!("opened serial port {} at {} baud", path, baud);

        Ok(Self { port })
    }
}

impl Transport for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), Error> {
        self.port.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Error> {
        self.port.flush()?;
        Ok(())
    }

    fn set_baud(&mut self, baud: Baud) -> Result<(), Error> {
        if baud == Baud::Unknown {
            return Err(Error::Config("cannot switch to unknown baud".into()));
        }
        self.port.set_baud_rate(baud.bits_per_second())?;
        Ok(())
    }

    fn drain_input(&mut self) -> Result<(), Error> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }
}

/// Scripted in-memory transport for testing driver logic without hardware.
///
/// The read side replays a pre-loaded byte stream (the device's half of the
/// conversation); the write side records everything the driver sends along
/// with every baud change, so tests can assert on the exact telegrams issued.
/// Injected bytes may be gated on a baud, modelling a device that only
/// answers once the port speed matches its own. Clones share the same
/// buffers, letting a test keep a handle while the driver owns the transport.
#[derive(Clone, Debug, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    input: VecDeque<(Option<Baud>, u8)>,
    written: Vec<u8>,
    baud_changes: Vec<Baud>,
    current_baud: Option<Baud>,
}

impl MockTransport {
    /// Create an empty mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes readable at any baud.
    pub fn inject(&self, data: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        inner.input.extend(data.iter().map(|&b| (None, b)));
    }

    /// Queue bytes readable only while the port is at `baud`.
    pub fn inject_at(&self, baud: Baud, data: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        inner.input.extend(data.iter().map(|&b| (Some(baud), b)));
    }

    /// All bytes the driver has written so far.
    pub fn written(&self) -> Vec<u8> {
        self.inner.lock().unwrap().written.clone()
    }

    /// Baud changes the driver has requested, in order.
    pub fn baud_changes(&self) -> Vec<Baud> {
        self.inner.lock().unwrap().baud_changes.clone()
    }

    /// Number of unread scripted bytes remaining.
    pub fn remaining(&self) -> usize {
        self.inner.lock().unwrap().input.len()
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let mut inner = self.inner.lock().unwrap();
        let current = inner.current_baud;
        let mut n = 0;
        while n < buf.len() {
            match inner.input.front() {
                Some(&(gate, byte)) if gate.is_none() || gate == current => {
                    inner.input.pop_front();
                    buf[n] = byte;
                    n += 1;
                }
                // Empty, or the next byte is gated on a different baud.
                _ => break,
            }
        }
        Ok(n)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), Error> {
        self.inner.lock().unwrap().written.extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn set_baud(&mut self, baud: Baud) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();
        inner.baud_changes.push(baud);
        inner.current_baud = Some(baud);
        Ok(())
    }

    fn drain_input(&mut self) -> Result<(), Error> {
        // Scripted input is a conversation, not line noise; keep it.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_read_write() {
        let mut mock = MockTransport::new();
        mock.inject(&[1, 2, 3, 4, 5]);

        let mut buf = [0u8; 3];
        assert_eq!(mock.read(&mut buf).unwrap(), 3);
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(mock.remaining(), 2);

        assert_eq!(mock.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[4, 5]);

        // Exhausted: polls return zero, like a quiet serial line.
        assert_eq!(mock.read(&mut buf).unwrap(), 0);

        mock.write_all(&[0x02, 0x00]).unwrap();
        mock.write_all(&[0x31]).unwrap();
        assert_eq!(mock.written(), vec![0x02, 0x00, 0x31]);
    }

    #[test]
    fn test_mock_records_baud_changes() {
        let mut mock = MockTransport::new();
        mock.set_baud(Baud::B9600).unwrap();
        mock.set_baud(Baud::B38400).unwrap();
        assert_eq!(mock.baud_changes(), vec![Baud::B9600, Baud::B38400]);
    }

    #[test]
    fn test_mock_gates_input_on_baud() {
        let mut mock = MockTransport::new();
        mock.inject_at(Baud::B9600, &[0x06]);
        mock.inject(&[0x15]);

        // Silent until the port reaches the gated baud.
        let mut buf = [0u8; 4];
        assert_eq!(mock.read(&mut buf).unwrap(), 0);
        mock.set_baud(Baud::B38400).unwrap();
        assert_eq!(mock.read(&mut buf).unwrap(), 0);

        mock.set_baud(Baud::B9600).unwrap();
        assert_eq!(mock.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[0x06, 0x15]);
    }
}
