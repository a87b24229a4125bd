//! Converter-side boundary: three synchronized 8-channel converters.
//!
//! Only the two status lines of each device (busy, data valid) and its eight
//! 16-bit result words cross this boundary. Conversion timing, input ranges
//! and the converter wire protocol live on the far side. Raw three-bit
//! vectors are normalized into [`DeviceLines`] here so the sequencer only
//! asks named questions (`is_converting`, `all_valid`).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{CHANNEL_COUNT, DEVICE_COUNT};

/// One boolean line per converter device, index = device number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DeviceLines(pub [bool; DEVICE_COUNT]);

impl DeviceLines {
    pub const NONE: DeviceLines = DeviceLines([false; DEVICE_COUNT]);
    pub const ALL: DeviceLines = DeviceLines([true; DEVICE_COUNT]);

    /// Build from a bit vector, bit i = device i. Bits above the device count are ignored.
    pub fn from_bits(bits: u8) -> Self {
        let mut lines = [false; DEVICE_COUNT];
        for (i, line) in lines.iter_mut().enumerate() {
            *line = bits & (1 << i) != 0;
        }
        DeviceLines(lines)
    }

    pub fn bits(&self) -> u8 {
        self.0.iter().enumerate()
            .fold(0u8, |acc, (i, &b)| acc | ((b as u8) << i))
    }

    #[inline]
    pub fn get(&self, device: usize) -> bool {
        self.0.get(device).copied().unwrap_or(false)
    }

    pub fn set(&mut self, device: usize, level: bool) {
        if let Some(line) = self.0.get_mut(device) {
            *line = level;
        }
    }

    #[inline]
    pub fn all(&self) -> bool {
        self.0.iter().all(|&b| b)
    }

    #[inline]
    pub fn any(&self) -> bool {
        self.0.iter().any(|&b| b)
    }

    /// Line-wise OR.
    pub fn union(self, other: DeviceLines) -> DeviceLines {
        let mut out = self;
        for (a, b) in out.0.iter_mut().zip(other.0.iter()) {
            *a |= *b;
        }
        out
    }

    /// Line-wise AND with the complement of `mask`.
    pub fn without(self, mask: DeviceLines) -> DeviceLines {
        let mut out = self;
        for (a, b) in out.0.iter_mut().zip(mask.0.iter()) {
            *a &= !*b;
        }
        out
    }
}

impl fmt::Display for DeviceLines {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0b{:03b}", self.bits())
    }
}

/// Inputs sampled from the converters on one clock edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConverterInputs {
    pub busy: DeviceLines,
    pub data_valid: DeviceLines,
    /// Channel words, device d owns channels `d*8 .. d*8+8`
    pub channels: [u16; CHANNEL_COUNT],
}

impl ConverterInputs {
    /// All devices idle, nothing valid, zero data.
    pub fn new() -> Self {
        ConverterInputs {
            busy: DeviceLines::NONE,
            data_valid: DeviceLines::NONE,
            channels: [0; CHANNEL_COUNT],
        }
    }

    /// All three devices presenting `channels` with data valid asserted.
    pub fn valid_scan(channels: [u16; CHANNEL_COUNT]) -> Self {
        ConverterInputs {
            busy: DeviceLines::NONE,
            data_valid: DeviceLines::ALL,
            channels,
        }
    }

    /// True while any device still reports busy.
    #[inline]
    pub fn is_converting(&self) -> bool {
        self.busy.any()
    }

    /// True only when every device asserts data valid on this edge.
    #[inline]
    pub fn all_valid(&self) -> bool {
        self.data_valid.all()
    }
}

impl Default for ConverterInputs {
    fn default() -> Self {
        Self::new()
    }
}

/// Lines driven towards the converters on one clock edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConverterOutputs {
    /// One-cycle conversion start pulse
    pub convert_start: DeviceLines,
    /// Device reset, held inactive except while the controller is faulted
    pub reset: DeviceLines,
}
