//! Host read port.
//!
//! The host bus strobes are active-low on the wire. [`HostBus`] carries the
//! raw levels; everything past [`HostBus::is_read_active`] reasons in plain
//! booleans. The address lines and write strobe are sampled but unused: the
//! port serves from its own read pointer, one word per active cycle.

use tracing::trace;

use super::PointerManager;
use crate::buffer::ScanBuffer;
use crate::{CHANNEL_COUNT, HOST_ADDRESS_MASK};

/// Raw host bus levels for one cycle (`_n` = active low).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostBus {
    pub chip_select_n: bool,
    pub read_strobe_n: bool,
    pub write_strobe_n: bool,
    /// 10-bit address, ignored by the read path
    pub address: u16,
}

impl HostBus {
    /// Bus released: chip select and both strobes high.
    pub fn idle() -> Self {
        HostBus { chip_select_n: true, read_strobe_n: true, write_strobe_n: true, address: 0 }
    }

    /// Chip select and read strobe asserted.
    pub fn read() -> Self {
        HostBus { chip_select_n: false, read_strobe_n: false, ..Self::idle() }
    }

    pub fn with_address(mut self, address: u16) -> Self {
        self.address = address & HOST_ADDRESS_MASK;
        self
    }

    #[inline]
    pub fn is_read_active(&self) -> bool {
        !self.chip_select_n && !self.read_strobe_n
    }

    #[inline]
    pub fn is_write_active(&self) -> bool {
        !self.chip_select_n && !self.write_strobe_n
    }
}

impl Default for HostBus {
    fn default() -> Self {
        Self::idle()
    }
}

/// A word served to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostWord {
    /// Buffer address the word came from
    pub address: usize,
    /// Channel position within its scan (`address % 24`)
    pub channel: usize,
    pub word: u16,
}

pub struct HostReadPort {
    /// Completed read transactions since reset
    pub transactions: u64,
    /// Cycles where the host asserted the write strobe (no effect)
    pub ignored_writes: u64,
}

impl HostReadPort {
    pub fn new() -> Self {
        HostReadPort { transactions: 0, ignored_writes: 0 }
    }

    pub fn reset(&mut self) {
        *self = HostReadPort::new();
    }

    /// Advance the read path by one clock edge. Returns the served word, or
    /// `None` (bus driven to zero, read pointer untouched) when no read is active.
    pub fn step(&mut self, bus: &HostBus, buffer: &ScanBuffer, pointers: &mut PointerManager) -> Option<HostWord> {
        if bus.is_write_active() {
            self.ignored_writes += 1;
        }
        if !bus.is_read_active() {
            return None;
        }
        let address = pointers.advance_read();
        let word = buffer.read(address);
        self.transactions += 1;
        trace!(address, word, "host read");
        Some(HostWord { address, channel: address % CHANNEL_COUNT, word })
    }
}

impl Default for HostReadPort {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AcquisitionConfig;

    #[test]
    fn test_polarity_normalization() {
        assert!(!HostBus::idle().is_read_active());
        assert!(HostBus::read().is_read_active());
        let cs_only = HostBus { chip_select_n: false, ..HostBus::idle() };
        assert!(!cs_only.is_read_active());
        assert_eq!(HostBus::read().with_address(0xFFFF).address, 0x3FF);
    }

    #[test]
    fn test_inactive_bus_leaves_pointer() {
        let cfg = AcquisitionConfig::with_buffer_scans(2);
        let buf = ScanBuffer::new(2);
        let mut p = PointerManager::new(&cfg);
        let mut port = HostReadPort::new();
        for _ in 0..10 {
            assert_eq!(port.step(&HostBus::idle(), &buf, &mut p), None);
        }
        assert_eq!(p.read_pointer, 0);
        assert_eq!(port.transactions, 0);
    }

    #[test]
    fn test_serves_buffer_at_read_pointer() {
        let cfg = AcquisitionConfig::with_buffer_scans(2);
        let mut buf = ScanBuffer::new(2);
        for a in 0..48 { buf.write(a, a as u16 * 3); }
        let mut p = PointerManager::new(&cfg);
        p.read_pointer = 25;
        let mut port = HostReadPort::new();
        let w = port.step(&HostBus::read(), &buf, &mut p);
        assert_eq!(w, Some(HostWord { address: 25, channel: 1, word: 75 }));
        assert_eq!(p.read_pointer, 26);
    }
}
