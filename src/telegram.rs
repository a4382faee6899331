// SPDX-License-Identifier: Apache-2.0

//! LMS 2xx telegram framing.
//!
//! Every telegram in either direction has the same shape:
//!
//! ```text
//! STX (0x02) | address | length u16 LE | payload | CRC-16 LE
//! ```
//!
//! The CRC covers everything from STX through the last payload byte and uses
//! the SICK CRC-16 (generator polynomial 0x8005, fed byte pairs). Telegrams
//! from the host carry address 0x00; device replies carry 0x80. Command
//! replies are preceded by a single ACK (0x06) or NACK (0x15) byte.

use crate::lms::Error;

/// Start-of-telegram byte
pub const STX: u8 = 0x02;

/// Positive acknowledgement byte sent before a command reply
pub const ACK: u8 = 0x06;

/// Negative acknowledgement byte; the host must resend
pub const NACK: u8 = 0x15;

/// Address of the host in outgoing telegrams
pub const HOST_ADDRESS: u8 = 0x00;

/// Address carried by device reply telegrams
pub const DEVICE_ADDRESS: u8 = 0x80;

/// Payload size limit for incoming telegrams. The largest legitimate payload
/// is a measurement telegram with 721 values (1445 bytes including the code
/// and count header); anything claiming more is corruption.
pub const MAX_PAYLOAD: usize = 1445;

/// CRC-16 generator polynomial used by all SICK LMS telegrams
const CRC_POLY: u16 = 0x8005;

/// Compute the SICK CRC-16 over a byte slice.
///
/// The algorithm shifts the running CRC before folding in the current and
/// previous data bytes as a 16-bit word, which is the scheme the device
/// firmware uses; it is not one of the common tabulated CRC-16 variants.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    let mut prev: u8 = 0;

    for &byte in data {
        if crc & 0x8000 != 0 {
            crc = (crc & 0x7FFF) << 1;
            crc ^= CRC_POLY;
        } else {
            crc <<= 1;
        }
        crc ^= u16::from_le_bytes([byte, prev]);
        prev = byte;
    }

    crc
}

/// A single framed telegram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Telegram {
    /// Source or destination address (0x00 host, 0x80 device)
    pub address: u8,
    /// Command or reply payload; the first byte is the telegram code
    pub payload: Vec<u8>,
}

impl Telegram {
    /// Build a host-to-device telegram with the given payload.
    pub fn command(payload: &[u8]) -> Self {
        Self {
            address: HOST_ADDRESS,
            payload: payload.to_vec(),
        }
    }

    /// Telegram code (first payload byte), 0 for an empty payload.
    pub fn code(&self) -> u8 {
        self.payload.first().copied().unwrap_or(0)
    }

    /// Encode the telegram into its wire representation.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(6 + self.payload.len());
        buf.push(STX);
        buf.push(self.address);
        buf.extend_from_slice(&(self.payload.len() as u16).to_le_bytes());
        buf.extend_from_slice(&self.payload);
        let crc = crc16(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }
}

/// A framing event recovered from the byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Single-byte positive acknowledgement
    Ack,
    /// Single-byte negative acknowledgement
    Nack,
    /// Complete, CRC-checked telegram
    Telegram(Telegram),
}

/// Incremental telegram parser.
///
/// Fed one byte at a time from the serial stream; yields a [`Frame`] whenever
/// an ACK, NACK, or complete telegram has been recognized. Bytes outside a
/// telegram that are not ACK/NACK are line noise and silently dropped.
#[derive(Debug, Default)]
pub struct TelegramReader {
    buf: Vec<u8>,
    /// Expected total telegram size once the length field is known
    expected: usize,
}

impl TelegramReader {
    /// Create a new reader in the idle state.
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(MAX_PAYLOAD + 6),
            expected: 0,
        }
    }

    /// Discard any partially accumulated telegram.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.expected = 0;
    }

    /// Push one byte from the stream.
    ///
    /// # Returns
    /// - `Ok(Some(frame))` when the byte completes an ACK, NACK, or telegram
    /// - `Ok(None)` when more bytes are needed
    /// - `Err` on an oversized length field or CRC mismatch
    pub fn push(&mut self, byte: u8) -> Result<Option<Frame>, Error> {
        if self.buf.is_empty() {
            return match byte {
                STX => {
                    self.buf.push(byte);
                    Ok(None)
                }
                ACK => Ok(Some(Frame::Ack)),
                NACK => Ok(Some(Frame::Nack)),
                _ => Ok(None), // line noise between telegrams
            };
        }

        self.buf.push(byte);

        // Header complete: STX, address, and the two length bytes.
        if self.buf.len() == 4 {
            let len = u16::from_le_bytes([self.buf[2], self.buf[3]]) as usize;
            if len > MAX_PAYLOAD {
                self.reset();
                return Err(Error::InvalidTelegram(format!(
                    "telegram length {} exceeds maximum {}",
                    len, MAX_PAYLOAD
                )));
            }
            self.expected = 4 + len + 2;
            return Ok(None);
        }

        if self.buf.len() < 4 || self.buf.len() < self.expected {
            return Ok(None);
        }

        // Full telegram accumulated: verify the trailing CRC.
        let crc_pos = self.expected - 2;
        let actual = u16::from_le_bytes([self.buf[crc_pos], self.buf[crc_pos + 1]]);
        let expected = crc16(&self.buf[..crc_pos]);
        if expected != actual {
            self.reset();
            return Err(Error::BadCrc { expected, actual });
        }

        let telegram = Telegram {
            address: self.buf[1],
            payload: self.buf[4..crc_pos].to_vec(),
        };
        self.reset();
        Ok(Some(Frame::Telegram(telegram)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feed a byte slice through a reader, collecting frames.
    fn feed(reader: &mut TelegramReader, bytes: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        for &b in bytes {
            if let Some(frame) = reader.push(b).unwrap() {
                frames.push(frame);
            }
        }
        frames
    }

    #[test]
    fn test_crc16_status_request() {
        // Request-status telegram worked out by hand against the CRC scheme:
        // 02 00 01 00 31 -> 0x1215
        assert_eq!(crc16(&[0x02, 0x00, 0x01, 0x00, 0x31]), 0x1215);
    }

    #[test]
    fn test_encode_status_request() {
        let telegram = Telegram::command(&[0x31]);
        assert_eq!(
            telegram.encode(),
            vec![0x02, 0x00, 0x01, 0x00, 0x31, 0x15, 0x12]
        );
    }

    #[test]
    fn test_reader_roundtrip() {
        let telegram = Telegram {
            address: DEVICE_ADDRESS,
            payload: vec![0xB0, 0x02, 0x00, 0x10, 0x00, 0x20, 0x00],
        };

        let mut reader = TelegramReader::new();
        let frames = feed(&mut reader, &telegram.encode());
        assert_eq!(frames, vec![Frame::Telegram(telegram)]);
    }

    #[test]
    fn test_reader_skips_leading_noise() {
        let telegram = Telegram::command(&[0x31]);
        let mut bytes = vec![0xFF, 0x00, 0x7E];
        bytes.extend_from_slice(&telegram.encode());

        let mut reader = TelegramReader::new();
        let frames = feed(&mut reader, &bytes);
        assert_eq!(frames, vec![Frame::Telegram(telegram)]);
    }

    #[test]
    fn test_reader_ack_nack() {
        let mut reader = TelegramReader::new();
        assert_eq!(reader.push(ACK).unwrap(), Some(Frame::Ack));
        assert_eq!(reader.push(NACK).unwrap(), Some(Frame::Nack));
    }

    #[test]
    fn test_reader_bad_crc() {
        let mut bytes = Telegram::command(&[0x31]).encode();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        let mut reader = TelegramReader::new();
        let mut result = Ok(None);
        for &b in &bytes {
            result = reader.push(b);
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(Error::BadCrc { .. })));

        // Reader recovers after the error.
        let telegram = Telegram::command(&[0x31]);
        let frames = feed(&mut reader, &telegram.encode());
        assert_eq!(frames, vec![Frame::Telegram(telegram)]);
    }

    #[test]
    fn test_reader_rejects_oversized_length() {
        let mut reader = TelegramReader::new();
        let header = [STX, 0x00, 0xFF, 0xFF];
        let mut result = Ok(None);
        for &b in &header {
            result = reader.push(b);
        }
        assert!(matches!(result, Err(Error::InvalidTelegram(_))));
    }

    #[test]
    fn test_reader_accepts_largest_scan_telegram() {
        // 721 values: a 180 degree scan at 0.25 degree resolution.
        let mut payload = vec![0xB0, 0xD1, 0x02];
        for i in 0..721u16 {
            payload.extend_from_slice(&i.to_le_bytes());
        }
        let telegram = Telegram {
            address: DEVICE_ADDRESS,
            payload,
        };

        let mut reader = TelegramReader::new();
        let frames = feed(&mut reader, &telegram.encode());
        assert_eq!(frames, vec![Frame::Telegram(telegram)]);
    }

    #[test]
    fn test_back_to_back_telegrams() {
        let first = Telegram::command(&[0x31]);
        let second = Telegram::command(&[0x30, 0x01]);
        let mut bytes = first.encode();
        bytes.extend_from_slice(&second.encode());

        let mut reader = TelegramReader::new();
        let frames = feed(&mut reader, &bytes);
        assert_eq!(
            frames,
            vec![Frame::Telegram(first), Frame::Telegram(second)]
        );
    }
}
