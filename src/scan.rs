// SPDX-License-Identifier: Apache-2.0

//! Per-handle scan storage.
//!
//! Each [`crate::lms200::SickLms`] handle owns exactly one [`ScanBuffer`];
//! scan storage is never shared between handles, so multiple devices in one
//! process cannot alias each other's measurements. The buffer is allocated
//! once at construction and overwritten in place on every scan request.

/// Maximum measurements in a single LMS 2xx scan.
///
/// A 180 degree scan at 0.25 degree resolution produces 721 values, the
/// largest profile the device can emit.
pub const MAX_MEASUREMENTS: usize = 721;

/// Pre-allocated buffer holding one range scan.
///
/// Measurements are raw device units (cm or mm depending on the device's
/// measuring units) with the field/reflector flag bits already masked off.
/// Memory is allocated once at construction; refilling a scan performs no
/// allocations.
#[derive(Debug, Clone)]
pub struct ScanBuffer {
    values: Vec<u16>,
    len: usize,
    timestamp: u64,
    scan_id: u32,
}

impl ScanBuffer {
    /// Create a buffer sized for the largest possible scan.
    pub fn new() -> Self {
        Self::with_capacity(MAX_MEASUREMENTS)
    }

    /// Create a buffer with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: vec![0; capacity],
            len: 0,
            timestamp: 0,
            scan_id: 0,
        }
    }

    /// Returns the number of valid measurements in the buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the buffer contains no measurements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the maximum capacity of the buffer.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.values.len()
    }

    /// Clear all measurements, resetting length to zero.
    ///
    /// The underlying memory is not zeroed; the length tracks validity.
    #[inline]
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Append a measurement.
    ///
    /// # Panics
    ///
    /// Panics in debug mode if the buffer is full. In release mode,
    /// measurements beyond capacity are silently ignored.
    #[inline]
    pub fn push(&mut self, value: u16) {
        debug_assert!(
            self.len < self.capacity(),
            "ScanBuffer overflow: {} >= {}",
            self.len,
            self.capacity()
        );

        if self.len < self.capacity() {
            self.values[self.len] = value;
            self.len += 1;
        }
    }

    /// Returns a slice of the valid measurements.
    #[inline]
    pub fn values(&self) -> &[u16] {
        &self.values[..self.len]
    }

    /// Timestamp in nanoseconds at which the scan telegram was parsed.
    #[inline]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Sequence number of the scan within this session (wraps at `u32::MAX`).
    #[inline]
    pub fn scan_id(&self) -> u32 {
        self.scan_id
    }

    /// Stamp the buffer with scan metadata. Called by the driver when a
    /// measurement telegram has been fully parsed.
    #[inline]
    pub(crate) fn stamp(&mut self, timestamp: u64, scan_id: u32) {
        self.timestamp = timestamp;
        self.scan_id = scan_id;
    }
}

impl Default for ScanBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_buffer_basic() {
        let mut buf = ScanBuffer::with_capacity(100);
        assert_eq!(buf.len(), 0);
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), 100);

        buf.push(512);
        assert_eq!(buf.len(), 1);
        assert!(!buf.is_empty());
        assert_eq!(buf.values()[0], 512);

        buf.push(8191);
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.values(), &[512, 8191]);

        buf.clear();
        assert_eq!(buf.len(), 0);
        assert!(buf.is_empty());
        // Capacity unchanged
        assert_eq!(buf.capacity(), 100);
    }

    #[test]
    fn test_scan_buffer_default_capacity() {
        let buf = ScanBuffer::new();
        assert_eq!(buf.capacity(), MAX_MEASUREMENTS);
    }

    #[test]
    fn test_scan_buffer_metadata() {
        let mut buf = ScanBuffer::new();
        buf.stamp(1_000_000_000, 42);
        assert_eq!(buf.timestamp(), 1_000_000_000);
        assert_eq!(buf.scan_id(), 42);
    }

    #[test]
    #[cfg_attr(debug_assertions, ignore)]
    fn test_scan_buffer_overflow_ignored() {
        // This test only runs in release mode since debug_assert! panics in debug
        let mut buf = ScanBuffer::with_capacity(2);
        buf.push(1);
        buf.push(2);
        // Third push exceeds capacity - silently ignored in release
        buf.push(3);

        assert_eq!(buf.len(), 2);
        assert_eq!(buf.values(), &[1, 2]);
    }
}
