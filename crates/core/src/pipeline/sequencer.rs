//! Acquisition sequencer.
//!
//! ```text
//!  IDLE ──▶ WAIT_FOR_CONVERSION ──▶ READ_DATA ──▶ WRITE_DATA ──▶ WRITE_DELAY ──▶ IDLE
//!                 │ timeout              │ timeout
//!                 ▼                      ▼
//!               FAULT ◀──────────────────┘        (acknowledge_fault ──▶ IDLE)
//! ```
//!
//! - **IDLE**: one-cycle convert-start pulse to every device that is not busy.
//! - **WAIT_FOR_CONVERSION**: wait until no device reports busy.
//! - **READ_DATA**: wait for all three data-valid lines on the same edge, then
//!   latch the 24 words and rewind the scan writer.
//! - **WRITE_DATA**: 24 single-word writes, then one cycle that disables the
//!   write port and performs the pointer/flag update.
//! - **WRITE_DELAY**: `settle_cycles` cycles before the next scan (minimum one).
//! - **FAULT**: a bounded wait expired. No starts, no writes, converter reset
//!   lines asserted until the fault is acknowledged.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use super::{ChannelLatch, PointerManager, ScanWriter, WriteStep};
use crate::buffer::{Half, ScanBuffer};
use crate::config::AcquisitionConfig;
use crate::converter::{ConverterInputs, DeviceLines};

/// Why the sequencer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaultKind {
    /// Busy never cleared; `busy` holds the devices still busy at expiry
    ConversionTimeout { busy: DeviceLines },
    /// Data valid never arrived on all devices at once; `valid` holds every
    /// device seen valid at some point during the wait
    DataValidTimeout { valid: DeviceLines },
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::ConversionTimeout { busy } => {
                write!(f, "conversion timeout (busy={})", busy)
            }
            FaultKind::DataValidTimeout { valid } => {
                write!(f, "data-valid timeout (seen={})", valid)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SequencerState {
    Idle,
    WaitForConversion,
    ReadData,
    WriteData,
    WriteDelay,
    Fault(FaultKind),
}

impl SequencerState {
    /// Number of distinct states (fault payloads collapsed).
    pub const COUNT: usize = 6;

    /// Dense index for per-state histograms.
    pub fn index(&self) -> usize {
        match self {
            SequencerState::Idle => 0,
            SequencerState::WaitForConversion => 1,
            SequencerState::ReadData => 2,
            SequencerState::WriteData => 3,
            SequencerState::WriteDelay => 4,
            SequencerState::Fault(_) => 5,
        }
    }

    pub fn name(&self) -> &'static str {
        Self::name_of(self.index())
    }

    pub fn name_of(index: usize) -> &'static str {
        match index {
            0 => "IDLE",
            1 => "WAIT_FOR_CONVERSION",
            2 => "READ_DATA",
            3 => "WRITE_DATA",
            4 => "WRITE_DELAY",
            5 => "FAULT",
            _ => "?",
        }
    }
}

/// What the write path drove on one edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SequencerOutput {
    pub convert_start: DeviceLines,
    pub converter_reset: DeviceLines,
    /// Buffer write performed this cycle: (address, old word, new word)
    pub write: Option<(usize, u16, u16)>,
    /// Set on the cycle the pointer update runs
    pub scan_done: bool,
    /// Half completed by this cycle's pointer update
    pub completed_half: Option<Half>,
    /// This scan began overwriting an undrained half
    pub overrun: bool,
    /// Fault entered on this edge
    pub fault: Option<FaultKind>,
}

pub struct Sequencer {
    pub state: SequencerState,
    settle_cycles: u32,
    conversion_timeout: Option<u32>,
    data_valid_timeout: Option<u32>,
    /// Cycles spent in the current wait state
    wait_cycles: u32,
    /// Cycles spent in WRITE_DELAY
    settle_count: u32,
    /// Devices seen valid during the current READ_DATA wait
    valid_seen: DeviceLines,
    pub scans_completed: u64,
    pub faults: u64,
}

impl Sequencer {
    pub fn new(config: &AcquisitionConfig) -> Self {
        Sequencer {
            state: SequencerState::Idle,
            settle_cycles: config.settle_cycles,
            conversion_timeout: config.conversion_timeout,
            data_valid_timeout: config.data_valid_timeout,
            wait_cycles: 0,
            settle_count: 0,
            valid_seen: DeviceLines::NONE,
            scans_completed: 0,
            faults: 0,
        }
    }

    pub fn reset(&mut self) {
        self.state = SequencerState::Idle;
        self.wait_cycles = 0;
        self.settle_count = 0;
        self.valid_seen = DeviceLines::NONE;
        self.scans_completed = 0;
        self.faults = 0;
    }

    pub fn fault(&self) -> Option<FaultKind> {
        match self.state {
            SequencerState::Fault(kind) => Some(kind),
            _ => None,
        }
    }

    /// Leave FAULT and restart from IDLE. Returns the cleared fault.
    pub fn acknowledge_fault(&mut self) -> Option<FaultKind> {
        let kind = self.fault()?;
        debug!(%kind, "fault acknowledged");
        self.enter(SequencerState::Idle);
        Some(kind)
    }

    fn enter(&mut self, next: SequencerState) {
        if next != self.state {
            debug!(from = self.state.name(), to = next.name(), "sequencer");
        }
        self.state = next;
        self.wait_cycles = 0;
        self.settle_count = 0;
        self.valid_seen = DeviceLines::NONE;
    }

    fn raise(&mut self, kind: FaultKind, out: &mut SequencerOutput) {
        warn!(%kind, "acquisition fault");
        self.faults += 1;
        out.fault = Some(kind);
        self.enter(SequencerState::Fault(kind));
    }

    /// True once `wait_cycles` unsatisfied cycles reach the bound.
    fn expired(&self, bound: Option<u32>) -> bool {
        bound.map_or(false, |b| self.wait_cycles >= b)
    }

    /// Advance the write path by one clock edge.
    pub fn step(
        &mut self,
        inputs: &ConverterInputs,
        latch: &mut ChannelLatch,
        writer: &mut ScanWriter,
        buffer: &mut ScanBuffer,
        pointers: &mut PointerManager,
    ) -> SequencerOutput {
        let mut out = SequencerOutput::default();
        match self.state {
            SequencerState::Idle => {
                // a device still busy from a previous start is not retriggered
                out.convert_start = DeviceLines::ALL.without(inputs.busy);
                self.enter(SequencerState::WaitForConversion);
            }
            SequencerState::WaitForConversion => {
                if !inputs.is_converting() {
                    self.enter(SequencerState::ReadData);
                } else {
                    self.wait_cycles = self.wait_cycles.saturating_add(1);
                    if self.expired(self.conversion_timeout) {
                        self.raise(FaultKind::ConversionTimeout { busy: inputs.busy }, &mut out);
                    }
                }
            }
            SequencerState::ReadData => {
                if latch.try_capture(inputs) {
                    writer.start();
                    self.enter(SequencerState::WriteData);
                } else {
                    self.valid_seen = self.valid_seen.union(inputs.data_valid);
                    self.wait_cycles = self.wait_cycles.saturating_add(1);
                    if self.expired(self.data_valid_timeout) {
                        let valid = self.valid_seen;
                        self.raise(FaultKind::DataValidTimeout { valid }, &mut out);
                    }
                }
            }
            SequencerState::WriteData => {
                if writer.at_scan_start() {
                    out.overrun = pointers.begin_scan();
                }
                match writer.step(latch, pointers.write_pointer, buffer) {
                    WriteStep::Word { addr, old, word } => out.write = Some((addr, old, word)),
                    WriteStep::Done => {
                        out.completed_half = pointers.complete_scan();
                        out.scan_done = true;
                        self.scans_completed += 1;
                        self.enter(SequencerState::WriteDelay);
                    }
                }
            }
            SequencerState::WriteDelay => {
                self.settle_count += 1;
                if self.settle_count >= self.settle_cycles {
                    self.enter(SequencerState::Idle);
                }
            }
            SequencerState::Fault(_) => {
                out.converter_reset = DeviceLines::ALL;
            }
        }
        out
    }

    /// Capture state for save state.
    pub fn save_state(&self) -> crate::savestate::SequencerSave {
        crate::savestate::SequencerSave {
            state: self.state,
            wait_cycles: self.wait_cycles,
            settle_count: self.settle_count,
            valid_seen: self.valid_seen,
            scans_completed: self.scans_completed,
            faults: self.faults,
        }
    }

    /// Restore state from save state.
    pub fn load_state(&mut self, s: &crate::savestate::SequencerSave) {
        self.state = s.state;
        self.wait_cycles = s.wait_cycles;
        self.settle_count = s.settle_count;
        self.valid_seen = s.valid_seen;
        self.scans_completed = s.scans_completed;
        self.faults = s.faults;
    }
}
