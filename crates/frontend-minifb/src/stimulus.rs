//! Converter model driving the controller's converter-side inputs.
//!
//! Each device reacts to its convert-start line by holding busy for
//! `busy_cycles` edges, then presents its eight result words with data valid
//! for exactly one edge. The data valid edge lands one edge after busy drops,
//! which is when the sequencer is sitting in READ_DATA.
//!
//! Fault injection:
//! - a stuck device reports busy forever (conversion timeout)
//! - skewed valid staggers the devices so their strobes never coincide
//!   (data-valid timeout)

use adc_pingpong_core::{
    ConverterInputs, ConverterOutputs, DeviceLines, CHANNELS_PER_DEVICE, CHANNEL_COUNT,
    DEVICE_COUNT,
};

/// Edges between consecutive device strobes when skewed.
const SKEW_STEP: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    /// Busy for this many more edges (including the current one)
    Busy(u32),
    /// Quiet edges left before data valid
    Settling(u32),
}

#[derive(Debug, Clone)]
pub struct ConverterModel {
    busy_cycles: u32,
    stuck_device: Option<usize>,
    skew_valid: bool,
    phases: [Phase; DEVICE_COUNT],
    /// Conversions started per device; selects the waveform sample
    conversions: [u64; DEVICE_COUNT],
    /// Reset line state seen on the last edge
    in_reset: bool,
}

impl ConverterModel {
    pub fn new(busy_cycles: u32) -> Self {
        ConverterModel {
            busy_cycles,
            stuck_device: None,
            skew_valid: false,
            phases: [Phase::Idle; DEVICE_COUNT],
            conversions: [0; DEVICE_COUNT],
            in_reset: false,
        }
    }

    pub fn with_stuck_device(mut self, device: Option<usize>) -> Self {
        self.stuck_device = device;
        self
    }

    pub fn with_skewed_valid(mut self, skew: bool) -> Self {
        self.skew_valid = skew;
        self
    }

    /// Remove injected faults: no stuck device, simultaneous valid strobes.
    pub fn repair(&mut self) {
        self.stuck_device = None;
        self.skew_valid = false;
    }

    pub fn conversions(&self) -> u64 {
        self.conversions.iter().copied().min().unwrap_or(0)
    }

    fn valid_offset(&self, device: usize) -> u32 {
        if self.skew_valid { device as u32 * SKEW_STEP } else { 0 }
    }

    /// Levels presented to the controller on the next edge.
    pub fn inputs(&mut self) -> ConverterInputs {
        let mut inputs = ConverterInputs::new();
        for device in 0..DEVICE_COUNT {
            let base = device * CHANNELS_PER_DEVICE;
            for local in 0..CHANNELS_PER_DEVICE {
                inputs.channels[base + local] = sample(base + local, self.conversions[device]);
            }
            if self.stuck_device == Some(device) {
                inputs.busy.set(device, true);
                continue;
            }
            self.phases[device] = match self.phases[device] {
                Phase::Idle => Phase::Idle,
                Phase::Busy(n) => {
                    inputs.busy.set(device, true);
                    if n > 1 { Phase::Busy(n - 1) } else { Phase::Settling(1 + self.valid_offset(device)) }
                }
                Phase::Settling(0) => {
                    inputs.data_valid.set(device, true);
                    Phase::Idle
                }
                Phase::Settling(k) => Phase::Settling(k - 1),
            };
        }
        inputs
    }

    /// React to the lines the controller drove on the last edge.
    pub fn observe(&mut self, out: &ConverterOutputs) {
        if out.reset.any() {
            // held in reset: abort any conversion in flight
            self.phases = [Phase::Idle; DEVICE_COUNT];
            self.in_reset = true;
            return;
        }
        self.in_reset = false;
        for device in 0..DEVICE_COUNT {
            if !out.convert_start.get(device) || self.stuck_device == Some(device) {
                continue;
            }
            self.conversions[device] += 1;
            self.phases[device] = if self.busy_cycles == 0 {
                Phase::Settling(1 + self.valid_offset(device))
            } else {
                Phase::Busy(self.busy_cycles)
            };
        }
    }

    pub fn in_reset(&self) -> bool {
        self.in_reset
    }

    pub fn busy_devices(&self) -> DeviceLines {
        let mut lines = DeviceLines::NONE;
        for (device, phase) in self.phases.iter().enumerate() {
            lines.set(device, matches!(phase, Phase::Busy(_)) || self.stuck_device == Some(device));
        }
        lines
    }
}

/// Synthetic waveform: even channels ramp, odd channels triangle, each with
/// a channel-dependent period.
pub fn sample(channel: usize, n: u64) -> u16 {
    let period = 64 + 16 * (channel % CHANNEL_COUNT) as u64;
    let phase = n % period;
    let level = if channel % 2 == 0 {
        phase * 0xFFFF / (period - 1)
    } else {
        let half = period / 2;
        let up = if phase < half { phase } else { period - phase };
        up * 0xFFFF / half
    };
    level.min(0xFFFF) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start_all() -> ConverterOutputs {
        ConverterOutputs { convert_start: DeviceLines::ALL, reset: DeviceLines::NONE }
    }

    #[test]
    fn test_busy_then_single_valid_edge() {
        let mut m = ConverterModel::new(3);
        m.observe(&start_all());
        for _ in 0..3 {
            let i = m.inputs();
            assert_eq!(i.busy, DeviceLines::ALL);
            assert!(!i.data_valid.any());
        }
        let quiet = m.inputs();
        assert!(!quiet.busy.any() && !quiet.data_valid.any());
        let valid = m.inputs();
        assert!(valid.all_valid());
        assert!(!m.inputs().data_valid.any());
    }

    #[test]
    fn test_stuck_device_stays_busy() {
        let mut m = ConverterModel::new(1).with_stuck_device(Some(2));
        m.observe(&start_all());
        for _ in 0..10 {
            assert!(m.inputs().busy.get(2));
        }
        m.repair();
        assert!(!m.inputs().busy.get(2));
    }

    #[test]
    fn test_skewed_valid_never_coincides() {
        let mut m = ConverterModel::new(0).with_skewed_valid(true);
        m.observe(&start_all());
        let mut seen = DeviceLines::NONE;
        for _ in 0..10 {
            let i = m.inputs();
            assert!(!i.all_valid());
            seen = seen.union(i.data_valid);
        }
        assert_eq!(seen, DeviceLines::ALL);
    }

    #[test]
    fn test_reset_aborts_conversion() {
        let mut m = ConverterModel::new(5);
        m.observe(&start_all());
        m.observe(&ConverterOutputs { convert_start: DeviceLines::NONE, reset: DeviceLines::ALL });
        assert!(m.in_reset());
        assert!(!m.inputs().busy.any());
    }

    #[test]
    fn test_waveforms() {
        assert_eq!(sample(0, 0), 0);
        assert_eq!(sample(0, 63), 0xFFFF);
        assert_eq!(sample(1, 0), 0);
        assert_eq!(sample(1, 40), 0xFFFF);
        assert_ne!(sample(2, 10), sample(4, 10));
    }
}
