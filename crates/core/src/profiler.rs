//! Acquisition profiler.
//!
//! Tracks per-cycle sequencer statistics:
//! - Cycles spent in each sequencer state
//! - Scan count and scan period (min / max / mean cycles between completions)
//! - Fault and overrun counts
//!
//! Disabled by default; [`crate::AcquisitionController::tick`] only records
//! while `enabled` is set.

use crate::pipeline::SequencerState;

pub struct Profiler {
    pub enabled: bool,
    state_cycles: [u64; SequencerState::COUNT],
    pub total_cycles: u64,
    pub scans: u64,
    pub faults: u64,
    pub overruns: u64,
    last_scan_cycle: Option<u64>,
    min_period: u64,
    max_period: u64,
    period_sum: u64,
    periods: u64,
}

impl Profiler {
    pub fn new() -> Self {
        Profiler {
            enabled: false,
            state_cycles: [0; SequencerState::COUNT],
            total_cycles: 0,
            scans: 0,
            faults: 0,
            overruns: 0,
            last_scan_cycle: None,
            min_period: u64::MAX,
            max_period: 0,
            period_sum: 0,
            periods: 0,
        }
    }

    /// Start or restart profiling, clearing all accumulated data.
    pub fn start(&mut self) {
        *self = Profiler::new();
        self.enabled = true;
    }

    /// Record one clock edge spent in `state`.
    #[inline]
    pub fn record_cycle(&mut self, state: SequencerState) {
        self.state_cycles[state.index()] += 1;
        self.total_cycles += 1;
    }

    /// Record a completed scan at controller cycle `cycle`.
    pub fn record_scan(&mut self, cycle: u64) {
        self.scans += 1;
        if let Some(prev) = self.last_scan_cycle {
            let period = cycle.saturating_sub(prev);
            self.min_period = self.min_period.min(period);
            self.max_period = self.max_period.max(period);
            self.period_sum += period;
            self.periods += 1;
        }
        self.last_scan_cycle = Some(cycle);
    }

    pub fn record_fault(&mut self) {
        self.faults += 1;
    }

    pub fn record_overrun(&mut self) {
        self.overruns += 1;
    }

    pub fn cycles_in(&self, state: SequencerState) -> u64 {
        self.state_cycles[state.index()]
    }

    /// (min, max, mean) cycles between consecutive scans, once two scans exist.
    pub fn scan_period(&self) -> Option<(u64, u64, f64)> {
        if self.periods == 0 { return None; }
        Some((self.min_period, self.max_period, self.period_sum as f64 / self.periods as f64))
    }

    /// Format a full profiling report.
    pub fn report(&self) -> String {
        let mut s = String::new();
        s.push_str("=== Acquisition Profile ===\n");
        s.push_str(&format!("Cycles: {}\n", self.total_cycles));
        s.push_str(&format!("Scans: {}\n", self.scans));
        s.push_str(&format!("Faults: {}  Overruns: {}\n", self.faults, self.overruns));
        if let Some((min, max, mean)) = self.scan_period() {
            s.push_str(&format!("Scan period: min {}  max {}  mean {:.1} cycles\n", min, max, mean));
        }

        s.push_str("\n--- Cycles per State ---\n");
        for (i, &cycles) in self.state_cycles.iter().enumerate() {
            let pct = if self.total_cycles > 0 {
                cycles as f64 / self.total_cycles as f64 * 100.0
            } else { 0.0 };
            s.push_str(&format!("{:>20}  {:>10}  {:>6.2}%\n", SequencerState::name_of(i), cycles, pct));
        }
        s
    }
}

impl Default for Profiler {
    fn default() -> Self { Self::new() }
}
