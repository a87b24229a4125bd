//! # adc-pingpong-core
//!
//! Cycle-accurate model of a 24-channel acquisition controller: three
//! synchronized 8-channel converters are sampled once per acquisition cycle
//! and each scan (24 × 16-bit words) is written into a circular ping-pong
//! buffer that a host drains over a narrow register-mapped bus.
//!
//! ## Architecture
//!
//! - [`AcquisitionController`]: Top-level controller that wires the blocks together and steps them per clock edge
//! - [`AcquisitionConfig`]: Buffer size, settle delay, bounded-wait timeouts
//! - [`converter`]: Converter boundary signals (busy, data valid, start, reset)
//! - [`pipeline`]: Sequencer, channel latch, scan writer, pointer manager, host read port
//! - [`buffer`]: The flat scan buffer and its two halves
//! - [`profiler`]: Per-state cycle histogram and scan period statistics
//! - [`monitor`]: Buffer watchpoints, scan and diff viewers
//! - [`savestate`]: Compressed save/restore of the whole controller
//!
//! ## Clocking
//!
//! One call to [`AcquisitionController::tick`] is one clock edge. The write
//! path (sequencer → latch → writer → write pointer) is evaluated first, then
//! the read path (host port → read pointer). The read port is transparent, so
//! a word written on an edge is readable on the same edge, and when both paths
//! touch the same interrupt flag on one edge the read path's clear wins.
//!
//! ## Half-ready flags
//!
//! `upper_half_ready` rises when the writer enters the upper half and
//! announces that the **lower** half is complete; `lower_half_ready`
//! announces the upper half. Use [`AcquisitionController::ready_half`] rather
//! than the raw flags when deciding what to drain.

pub mod config;
pub mod error;
pub mod converter;
pub mod buffer;
pub mod pipeline;
pub mod profiler;
pub mod monitor;
pub mod savestate;

use std::path::Path;
use tracing::debug;

pub use buffer::{Half, ScanBuffer};
pub use config::{AcquisitionConfig, ConfigError};
pub use converter::{ConverterInputs, ConverterOutputs, DeviceLines};
pub use error::{Error, Result};
pub use pipeline::{FaultKind, HostBus, HostWord, SequencerState};

/// Converter devices
pub const DEVICE_COUNT: usize = 3;
/// Channels per converter device
pub const CHANNELS_PER_DEVICE: usize = 8;
/// Channels per scan (= words per scan)
pub const CHANNEL_COUNT: usize = DEVICE_COUNT * CHANNELS_PER_DEVICE;
/// Default buffer capacity in scans
pub const DEFAULT_BUFFER_SCANS: usize = 1024;
/// Default WRITE_DELAY length in cycles
pub const DEFAULT_SETTLE_CYCLES: u32 = 10;
/// Host address bus width
pub const HOST_ADDRESS_BITS: u32 = 10;
pub const HOST_ADDRESS_MASK: u16 = (1 << HOST_ADDRESS_BITS) - 1;

/// Everything the controller drives on one clock edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickOutput {
    pub converter: ConverterOutputs,
    /// Host data bus: served word while a read is active, else 0
    pub data: u16,
    /// Host read served this edge
    pub host_word: Option<HostWord>,
    pub upper_half_ready: bool,
    pub lower_half_ready: bool,
    /// Buffer write port activity: (address, word)
    pub write_strobe: Option<(usize, u16)>,
    /// Set on the edge a scan's pointer update ran
    pub scan_done: bool,
    /// Half completed by this edge's pointer update
    pub completed_half: Option<Half>,
    /// Sequencer is faulted
    pub alarm: bool,
    /// Sticky overrun status
    pub overrun: bool,
}

/// Top-level acquisition controller combining all blocks.
pub struct AcquisitionController {
    config: AcquisitionConfig,
    pub sequencer: pipeline::Sequencer,
    pub latch: pipeline::ChannelLatch,
    pub writer: pipeline::ScanWriter,
    pub pointers: pipeline::PointerManager,
    pub host: pipeline::HostReadPort,
    pub buffer: ScanBuffer,
    /// Per-state cycle profiler (records only when enabled)
    pub profiler: profiler::Profiler,
    /// Buffer watchpoints
    pub monitor: monitor::Monitor,
    cycles: u64,
}

impl AcquisitionController {
    /// Create a controller with all blocks in reset state.
    pub fn new(config: AcquisitionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: AcquisitionConfig) -> Self {
        AcquisitionController {
            sequencer: pipeline::Sequencer::new(&config),
            latch: pipeline::ChannelLatch::new(),
            writer: pipeline::ScanWriter::new(),
            pointers: pipeline::PointerManager::new(&config),
            host: pipeline::HostReadPort::new(),
            buffer: ScanBuffer::new(config.buffer_scans),
            profiler: profiler::Profiler::new(),
            monitor: monitor::Monitor::new(),
            cycles: 0,
            config,
        }
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    /// Clock edges since reset.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Advance one clock edge: write path first, then read path.
    pub fn tick(&mut self, inputs: &ConverterInputs, bus: HostBus) -> TickOutput {
        let state_before = self.sequencer.state;
        let seq = self.sequencer.step(
            inputs,
            &mut self.latch,
            &mut self.writer,
            &mut self.buffer,
            &mut self.pointers,
        );
        let host_word = self.host.step(&bus, &self.buffer, &mut self.pointers);

        if self.monitor.is_active() {
            if let Some((addr, old, word)) = seq.write {
                self.monitor.observe(monitor::BufferAccess::Write { addr, old, word }, self.cycles);
            }
            if let Some(hw) = host_word {
                self.monitor.observe(monitor::BufferAccess::Read(hw), self.cycles);
            }
        }
        if self.profiler.enabled {
            self.profiler.record_cycle(state_before);
            if seq.scan_done { self.profiler.record_scan(self.cycles); }
            if seq.fault.is_some() { self.profiler.record_fault(); }
            if seq.overrun { self.profiler.record_overrun(); }
        }
        self.cycles += 1;

        TickOutput {
            converter: ConverterOutputs {
                convert_start: seq.convert_start,
                reset: seq.converter_reset,
            },
            data: host_word.map_or(0, |w| w.word),
            host_word,
            upper_half_ready: self.pointers.upper_half_ready,
            lower_half_ready: self.pointers.lower_half_ready,
            write_strobe: seq.write.map(|(addr, _, word)| (addr, word)),
            scan_done: seq.scan_done,
            completed_half: seq.completed_half,
            alarm: self.sequencer.fault().is_some(),
            overrun: self.pointers.overrun,
        }
    }

    /// Tick `n` edges with constant inputs. Returns the last output.
    pub fn run_cycles(&mut self, n: u64, inputs: &ConverterInputs, bus: HostBus) -> TickOutput {
        let mut out = TickOutput::default();
        for _ in 0..n {
            out = self.tick(inputs, bus);
        }
        out
    }

    /// Reset every block to power-on state. The buffer is cleared.
    pub fn reset(&mut self) {
        debug!("controller reset");
        self.sequencer.reset();
        self.latch.reset();
        self.writer.reset();
        self.pointers.reset();
        self.host.reset();
        self.buffer.clear();
        self.cycles = 0;
    }

    pub fn state(&self) -> SequencerState {
        self.sequencer.state
    }

    pub fn fault(&self) -> Option<FaultKind> {
        self.sequencer.fault()
    }

    /// Clear a latched fault and restart acquisition from IDLE.
    pub fn acknowledge_fault(&mut self) -> Option<FaultKind> {
        self.sequencer.acknowledge_fault()
    }

    pub fn write_pointer(&self) -> usize {
        self.pointers.write_pointer
    }

    pub fn read_pointer(&self) -> usize {
        self.pointers.read_pointer
    }

    pub fn current_half(&self) -> Half {
        self.pointers.current_half
    }

    pub fn upper_half_ready(&self) -> bool {
        self.pointers.upper_half_ready
    }

    pub fn lower_half_ready(&self) -> bool {
        self.pointers.lower_half_ready
    }

    /// Half announced as safe to drain by the raised flag.
    pub fn ready_half(&self) -> Option<Half> {
        self.pointers.ready_half()
    }

    pub fn half_status(&self, half: Half) -> pipeline::HalfStatus {
        self.pointers.half_status(half)
    }

    pub fn overruns(&self) -> u64 {
        self.pointers.overruns()
    }

    pub fn clear_overrun(&mut self) {
        self.pointers.clear_overrun();
    }

    /// Last word written per channel (diagnostic shadow, not the read source).
    pub fn debug_shadow(&self) -> &[u16; CHANNEL_COUNT] {
        &self.writer.last_written
    }

    /// Words of scan `index` as currently stored.
    pub fn scan(&self, index: usize) -> Option<&[u16]> {
        self.buffer.scan(index)
    }

    /// Capture the full controller state.
    pub fn save_state(&self) -> savestate::SaveState {
        savestate::SaveState {
            config: self.config.clone(),
            cycles: self.cycles,
            sequencer: self.sequencer.save_state(),
            latch: self.latch.save_state(),
            writer: self.writer.save_state(),
            pointers: self.pointers.save_state(),
            host_transactions: self.host.transactions,
            buffer: self.buffer.words().to_vec(),
        }
    }

    /// Restore a captured state. The buffer geometry must match; timeouts
    /// and settle delay are taken from the saved configuration.
    pub fn load_state(&mut self, s: &savestate::SaveState) -> Result<()> {
        s.config.validate()?;
        if s.config.buffer_scans != self.config.buffer_scans {
            return Err(Error::StateMismatch {
                field: "buffer_scans",
                saved: s.config.buffer_scans as u64,
                current: self.config.buffer_scans as u64,
            });
        }
        if s.buffer.len() != self.buffer.len() {
            return Err(Error::StateMismatch {
                field: "buffer_words",
                saved: s.buffer.len() as u64,
                current: self.buffer.len() as u64,
            });
        }
        self.config = s.config.clone();
        self.sequencer = pipeline::Sequencer::new(&self.config);
        self.sequencer.load_state(&s.sequencer);
        self.latch.load_state(&s.latch);
        self.writer.load_state(&s.writer);
        self.pointers.load_state(&s.pointers);
        self.host.reset();
        self.host.transactions = s.host_transactions;
        self.buffer.restore(&s.buffer);
        self.cycles = s.cycles;
        Ok(())
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        savestate::save_to_file(&self.save_state(), path)
    }

    pub fn load_from_file(&mut self, path: &Path) -> Result<()> {
        let s = savestate::load_from_file(path, Some(self.config.buffer_scans))?;
        self.load_state(&s)
    }
}

impl Default for AcquisitionController {
    fn default() -> Self {
        Self::build(AcquisitionConfig::default())
    }
}
