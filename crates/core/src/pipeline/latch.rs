//! Channel latch.
//!
//! Capture is all-or-nothing: the 24 words are copied only on an edge where
//! all three devices assert data valid. A partial set (e.g. `0b011`) leaves
//! the registers untouched.

use crate::converter::ConverterInputs;
use crate::CHANNEL_COUNT;

pub struct ChannelLatch {
    /// Most recently latched scan, channel order 0..23
    pub registers: [u16; CHANNEL_COUNT],
    /// Number of successful captures since reset
    pub captures: u64,
}

impl ChannelLatch {
    pub fn new() -> Self {
        ChannelLatch { registers: [0; CHANNEL_COUNT], captures: 0 }
    }

    pub fn reset(&mut self) {
        *self = ChannelLatch::new();
    }

    /// Latch the channel words if every device is valid. Returns true on capture.
    pub fn try_capture(&mut self, inputs: &ConverterInputs) -> bool {
        if !inputs.all_valid() {
            return false;
        }
        self.registers = inputs.channels;
        self.captures += 1;
        true
    }

    #[inline]
    pub fn get(&self, channel: usize) -> u16 {
        self.registers.get(channel).copied().unwrap_or(0)
    }

    /// Capture state for save state.
    pub fn save_state(&self) -> crate::savestate::LatchSave {
        crate::savestate::LatchSave { registers: self.registers, captures: self.captures }
    }

    /// Restore state from save state.
    pub fn load_state(&mut self, s: &crate::savestate::LatchSave) {
        self.registers = s.registers;
        self.captures = s.captures;
    }
}

impl Default for ChannelLatch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::DeviceLines;

    #[test]
    fn test_partial_valid_does_not_latch() {
        let mut latch = ChannelLatch::new();
        let mut inputs = ConverterInputs::valid_scan([7; CHANNEL_COUNT]);
        inputs.data_valid = DeviceLines::from_bits(0b011);
        assert!(!latch.try_capture(&inputs));
        assert_eq!(latch.registers, [0; CHANNEL_COUNT]);
        assert_eq!(latch.captures, 0);
    }

    #[test]
    fn test_full_valid_latches_all_channels() {
        let mut latch = ChannelLatch::new();
        let mut channels = [0u16; CHANNEL_COUNT];
        for (i, c) in channels.iter_mut().enumerate() { *c = i as u16 + 1; }
        assert!(latch.try_capture(&ConverterInputs::valid_scan(channels)));
        assert_eq!(latch.get(0), 1);
        assert_eq!(latch.get(23), 24);
        assert_eq!(latch.get(24), 0);
        assert_eq!(latch.captures, 1);
    }
}
