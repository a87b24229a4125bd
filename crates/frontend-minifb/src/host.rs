//! Draining host.
//!
//! Watches the half-ready flags for rising edges. When a flag announces the
//! half the read pointer currently sits at, the host holds chip select and
//! read strobe low for one half-buffer of consecutive edges and collects the
//! words. A flag announcing the other half is ignored; the reader is either
//! behind (overrun pending) or already past it.

use adc_pingpong_core::{AcquisitionController, Half, HostBus, TickOutput};
use tracing::{debug, warn};

/// One completely drained half.
#[derive(Debug, Clone)]
pub struct DrainedHalf {
    pub half: Half,
    /// Writer generation of the half when the drain started
    pub generation: u64,
    pub words: Vec<u16>,
}

pub struct DrainingHost {
    pub enabled: bool,
    prev_upper: bool,
    prev_lower: bool,
    /// Read edges left in the current drain
    remaining: usize,
    draining: Option<(Half, u64)>,
    current: Vec<u16>,
    /// Most recent complete drain
    pub last: Option<DrainedHalf>,
    pub halves_drained: u64,
    pub words_read: u64,
    /// Drains during which the writer completed the same half again
    pub stale_drains: u64,
}

impl DrainingHost {
    pub fn new(enabled: bool) -> Self {
        DrainingHost {
            enabled,
            prev_upper: false,
            prev_lower: false,
            remaining: 0,
            draining: None,
            current: Vec::new(),
            last: None,
            halves_drained: 0,
            words_read: 0,
            stale_drains: 0,
        }
    }

    /// Bus levels for the next edge.
    pub fn bus(&self) -> HostBus {
        if self.remaining > 0 { HostBus::read() } else { HostBus::idle() }
    }

    /// Consume the outputs of the edge just ticked.
    pub fn observe(&mut self, out: &TickOutput, ctl: &AcquisitionController) {
        if let Some(hw) = out.host_word {
            self.current.push(hw.word);
            self.words_read += 1;
            self.remaining = self.remaining.saturating_sub(1);
            if self.remaining == 0 {
                self.finish(ctl);
            }
        }

        let upper_rose = out.upper_half_ready && !self.prev_upper;
        let lower_rose = out.lower_half_ready && !self.prev_lower;
        self.prev_upper = out.upper_half_ready;
        self.prev_lower = out.lower_half_ready;
        if !self.enabled || self.remaining > 0 {
            return;
        }

        let half_words = ctl.config().half_words();
        let next = Half::of(ctl.read_pointer(), half_words);
        let announced = match (upper_rose, lower_rose) {
            (true, _) => Half::Lower,
            (_, true) => Half::Upper,
            _ => return,
        };
        if announced != next {
            return;
        }
        let generation = ctl.half_status(announced).generation;
        debug!(half = ?announced, generation, "host drain start");
        self.draining = Some((announced, generation));
        self.current = Vec::with_capacity(half_words);
        self.remaining = half_words;
    }

    fn finish(&mut self, ctl: &AcquisitionController) {
        let Some((half, generation)) = self.draining.take() else { return };
        let now = ctl.half_status(half).generation;
        if now != generation {
            self.stale_drains += 1;
            warn!(?half, started = generation, now, "half rewritten during drain");
        }
        self.halves_drained += 1;
        debug!(?half, words = self.current.len(), "host drain done");
        self.last = Some(DrainedHalf { half, generation, words: std::mem::take(&mut self.current) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stimulus::ConverterModel;
    use adc_pingpong_core::AcquisitionConfig;

    fn run(ctl: &mut AcquisitionController, model: &mut ConverterModel, host: &mut DrainingHost, edges: usize) {
        for _ in 0..edges {
            let inputs = model.inputs();
            let out = ctl.tick(&inputs, host.bus());
            model.observe(&out.converter);
            host.observe(&out, ctl);
        }
    }

    #[test]
    fn test_drains_halves_in_order() {
        let mut ctl = AcquisitionController::new(AcquisitionConfig::with_buffer_scans(4)).unwrap();
        let mut model = ConverterModel::new(3);
        let mut host = DrainingHost::new(true);
        run(&mut ctl, &mut model, &mut host, 2_000);
        assert!(host.halves_drained >= 4);
        assert_eq!(ctl.overruns(), 0);
        assert_eq!(host.stale_drains, 0);
        let last = host.last.as_ref().unwrap();
        assert_eq!(last.words.len(), 48);
    }

    #[test]
    fn test_disabled_host_never_reads() {
        let mut ctl = AcquisitionController::new(AcquisitionConfig::with_buffer_scans(4)).unwrap();
        let mut model = ConverterModel::new(3);
        let mut host = DrainingHost::new(false);
        run(&mut ctl, &mut model, &mut host, 1_000);
        assert_eq!(host.words_read, 0);
        assert_eq!(ctl.read_pointer(), 0);
        assert!(ctl.overruns() > 0);
    }
}
