//! Controller configuration.
//!
//! Every field has a default matching the reference hardware (1024-scan
//! buffer, 10-cycle settle delay), so a partial JSON document is enough to
//! override one value.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{CHANNEL_COUNT, DEFAULT_BUFFER_SCANS, DEFAULT_SETTLE_CYCLES};

/// Largest accepted buffer, in scans (keeps word addresses well inside u32).
pub const MAX_BUFFER_SCANS: usize = 1 << 20;
/// Default bound on the busy and data-valid waits, in cycles.
pub const DEFAULT_WAIT_TIMEOUT: u32 = 100_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Circular buffer capacity in scans; each scan is 24 words
    pub buffer_scans: usize,
    /// Cycles spent in WRITE_DELAY after each scan (at least one cycle elapses)
    pub settle_cycles: u32,
    /// Cycles WAIT_FOR_CONVERSION may wait for busy to clear; `None` waits forever
    pub conversion_timeout: Option<u32>,
    /// Cycles READ_DATA may wait for all three valid lines; `None` waits forever
    pub data_valid_timeout: Option<u32>,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        AcquisitionConfig {
            buffer_scans: DEFAULT_BUFFER_SCANS,
            settle_cycles: DEFAULT_SETTLE_CYCLES,
            conversion_timeout: Some(DEFAULT_WAIT_TIMEOUT),
            data_valid_timeout: Some(DEFAULT_WAIT_TIMEOUT),
        }
    }
}

impl AcquisitionConfig {
    /// Configuration with the given buffer size and defaults elsewhere.
    pub fn with_buffer_scans(buffer_scans: usize) -> Self {
        AcquisitionConfig { buffer_scans, ..Default::default() }
    }

    /// Scans per half-buffer.
    pub fn half_scans(&self) -> usize {
        self.buffer_scans / 2
    }

    /// Buffer length in words.
    pub fn total_words(&self) -> usize {
        self.buffer_scans * CHANNEL_COUNT
    }

    /// Half-buffer length in words.
    pub fn half_words(&self) -> usize {
        self.half_scans() * CHANNEL_COUNT
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_scans < 2 {
            return Err(ConfigError::BufferTooSmall(self.buffer_scans));
        }
        if self.buffer_scans > MAX_BUFFER_SCANS {
            return Err(ConfigError::BufferTooLarge(self.buffer_scans));
        }
        if self.buffer_scans % 2 != 0 {
            return Err(ConfigError::OddBufferScans(self.buffer_scans));
        }
        if self.conversion_timeout == Some(0) {
            return Err(ConfigError::ZeroTimeout("conversion_timeout"));
        }
        if self.data_valid_timeout == Some(0) {
            return Err(ConfigError::ZeroTimeout("data_valid_timeout"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    BufferTooSmall(usize),
    BufferTooLarge(usize),
    OddBufferScans(usize),
    ZeroTimeout(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::BufferTooSmall(n) => {
                write!(f, "buffer_scans={} (need at least 2 for two halves)", n)
            }
            ConfigError::BufferTooLarge(n) => {
                write!(f, "buffer_scans={} exceeds {}", n, MAX_BUFFER_SCANS)
            }
            ConfigError::OddBufferScans(n) => {
                write!(f, "buffer_scans={} must be even to split into halves", n)
            }
            ConfigError::ZeroTimeout(name) => {
                write!(f, "{}=0 would fault immediately; use null to disable", name)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_geometry() {
        let cfg = AcquisitionConfig::default();
        assert_eq!(cfg.total_words(), 24576);
        assert_eq!(cfg.half_words(), 512 * 24);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_buffers() {
        assert_eq!(
            AcquisitionConfig::with_buffer_scans(0).validate(),
            Err(ConfigError::BufferTooSmall(0))
        );
        assert_eq!(
            AcquisitionConfig::with_buffer_scans(7).validate(),
            Err(ConfigError::OddBufferScans(7))
        );
        let cfg = AcquisitionConfig { conversion_timeout: Some(0), ..Default::default() };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroTimeout("conversion_timeout")));
    }
}
