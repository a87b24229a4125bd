//! Scan writer.
//!
//! Serializes the latched scan into the buffer through the single write
//! port: one word per cycle, channel 0 first, never batched. The cycle after
//! the 24th word reports [`WriteStep::Done`] with the write port idle.
//!
//! Every written word is mirrored into `last_written` (per-channel shadow).
//! The shadow is diagnostic only; the host read path serves the buffer.

use tracing::trace;

use super::ChannelLatch;
use crate::buffer::ScanBuffer;
use crate::CHANNEL_COUNT;

/// Result of one writer cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStep {
    /// Word written this cycle; `old` is the value it replaced
    Word { addr: usize, old: u16, word: u16 },
    /// All 24 words written, write port disabled
    Done,
}

pub struct ScanWriter {
    /// Next channel to write (0..=24)
    pub counter: usize,
    /// Last value written per channel
    pub last_written: [u16; CHANNEL_COUNT],
    /// Total words written since reset
    pub words_written: u64,
}

impl ScanWriter {
    pub fn new() -> Self {
        ScanWriter { counter: 0, last_written: [0; CHANNEL_COUNT], words_written: 0 }
    }

    pub fn reset(&mut self) {
        *self = ScanWriter::new();
    }

    /// Rewind the counter to channel 0 for a freshly latched scan.
    pub fn start(&mut self) {
        self.counter = 0;
    }

    /// True before the first word of a scan has been written.
    pub fn at_scan_start(&self) -> bool {
        self.counter == 0
    }

    /// Advance one cycle, writing `latch[counter]` to `buffer[base + counter]`.
    pub fn step(&mut self, latch: &ChannelLatch, base: usize, buffer: &mut ScanBuffer) -> WriteStep {
        if self.counter >= CHANNEL_COUNT {
            self.counter = 0;
            return WriteStep::Done;
        }
        let channel = self.counter;
        let addr = base + channel;
        let word = latch.get(channel);
        let old = buffer.write(addr, word).unwrap_or(0);
        self.last_written[channel] = word;
        self.counter += 1;
        self.words_written += 1;
        trace!(addr, channel, word, "buffer write");
        WriteStep::Word { addr, old, word }
    }

    /// Capture state for save state.
    pub fn save_state(&self) -> crate::savestate::WriterSave {
        crate::savestate::WriterSave {
            counter: self.counter,
            last_written: self.last_written,
            words_written: self.words_written,
        }
    }

    /// Restore state from save state.
    pub fn load_state(&mut self, s: &crate::savestate::WriterSave) {
        self.counter = s.counter.min(CHANNEL_COUNT);
        self.last_written = s.last_written;
        self.words_written = s.words_written;
    }
}

impl Default for ScanWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::ConverterInputs;

    fn latched(values: impl Fn(usize) -> u16) -> ChannelLatch {
        let mut channels = [0u16; CHANNEL_COUNT];
        for (i, c) in channels.iter_mut().enumerate() { *c = values(i); }
        let mut latch = ChannelLatch::new();
        latch.try_capture(&ConverterInputs::valid_scan(channels));
        latch
    }

    #[test]
    fn test_writes_one_word_per_step_in_channel_order() {
        let latch = latched(|i| 100 + i as u16);
        let mut buf = ScanBuffer::new(4);
        let mut w = ScanWriter::new();
        w.start();
        for ch in 0..CHANNEL_COUNT {
            match w.step(&latch, 48, &mut buf) {
                WriteStep::Word { addr, word, .. } => {
                    assert_eq!(addr, 48 + ch);
                    assert_eq!(word, 100 + ch as u16);
                }
                WriteStep::Done => panic!("finished early at channel {}", ch),
            }
        }
        assert_eq!(w.step(&latch, 48, &mut buf), WriteStep::Done);
        assert!(w.at_scan_start());
        assert_eq!(&buf.words()[48..72], &latch.registers[..]);
        assert_eq!(buf.read(47), 0);
        assert_eq!(buf.read(72), 0);
        assert_eq!(w.words_written, 24);
        assert_eq!(w.last_written, latch.registers);
    }

    #[test]
    fn test_reports_replaced_word() {
        let latch = latched(|_| 9);
        let mut buf = ScanBuffer::new(2);
        buf.write(0, 3);
        let mut w = ScanWriter::new();
        assert_eq!(w.step(&latch, 0, &mut buf), WriteStep::Word { addr: 0, old: 3, word: 9 });
    }
}
