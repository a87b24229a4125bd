//! Buffer monitoring.
//!
//! - **Watchpoints**: matched against every buffer access the controller
//!   reports through [`Monitor::observe`] (writer stores and host reads)
//! - **Scan viewer**: one line per scan, address + 24 words in hex
//! - **Diff viewer**: words that differ between two buffer images, e.g. a
//!   saved state and the live buffer

use std::fmt;

use crate::pipeline::HostWord;
use crate::CHANNEL_COUNT;

/// Hits kept until drained; later hits are only counted.
const MAX_PENDING_HITS: usize = 1024;

/// One access to the scan buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferAccess {
    /// Scan-writer store; `old` is the word it replaced
    Write { addr: usize, old: u16, word: u16 },
    /// Host read transaction
    Read(HostWord),
}

impl BufferAccess {
    pub fn addr(&self) -> usize {
        match *self {
            BufferAccess::Write { addr, .. } => addr,
            BufferAccess::Read(hw) => hw.address,
        }
    }

    /// Word stored (writes) or served (reads).
    pub fn word(&self) -> u16 {
        match *self {
            BufferAccess::Write { word, .. } => word,
            BufferAccess::Read(hw) => hw.word,
        }
    }
}

impl fmt::Display for BufferAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            BufferAccess::Write { addr, old, word } => write!(f,
                "write 0x{:05X} ch{:2}: {:04X} -> {:04X}", addr, addr % CHANNEL_COUNT, old, word),
            BufferAccess::Read(hw) => write!(f,
                "read  0x{:05X} ch{:2}: {:04X}", hw.address, hw.channel, hw.word),
        }
    }
}

/// Which accesses a watchpoint reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKind {
    Write,
    Read,
    Any,
}

/// A buffer-word watchpoint, optionally restricted to one word value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watchpoint {
    pub addr: usize,
    pub kind: WatchKind,
    pub value: Option<u16>,
    pub hits: u64,
}

impl Watchpoint {
    pub fn new(addr: usize, kind: WatchKind) -> Self {
        Watchpoint { addr, kind, value: None, hits: 0 }
    }

    pub fn with_value(mut self, value: u16) -> Self {
        self.value = Some(value);
        self
    }

    fn matches(&self, access: &BufferAccess) -> bool {
        let kind_ok = match (self.kind, access) {
            (WatchKind::Any, _) => true,
            (WatchKind::Write, BufferAccess::Write { .. }) => true,
            (WatchKind::Read, BufferAccess::Read(_)) => true,
            _ => false,
        };
        kind_ok && access.addr() == self.addr && self.value.map_or(true, |v| v == access.word())
    }
}

/// A watchpoint firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchHit {
    /// Watchpoint index
    pub index: usize,
    pub access: BufferAccess,
    /// Controller cycle of the access
    pub cycle: u64,
}

#[derive(Default)]
pub struct Monitor {
    watchpoints: Vec<Watchpoint>,
    pending: Vec<WatchHit>,
    /// Hits lost because `pending` was full
    pub dropped: u64,
}

impl Monitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        !self.watchpoints.is_empty()
    }

    /// Install a watchpoint. Returns its index.
    pub fn watch(&mut self, wp: Watchpoint) -> usize {
        self.watchpoints.push(wp);
        self.watchpoints.len() - 1
    }

    pub fn watchpoints(&self) -> &[Watchpoint] {
        &self.watchpoints
    }

    /// Match one buffer access against every watchpoint.
    pub fn observe(&mut self, access: BufferAccess, cycle: u64) {
        for (index, wp) in self.watchpoints.iter_mut().enumerate() {
            if !wp.matches(&access) { continue; }
            wp.hits += 1;
            if self.pending.len() < MAX_PENDING_HITS {
                self.pending.push(WatchHit { index, access, cycle });
            } else {
                self.dropped += 1;
            }
        }
    }

    /// Hand over all hits recorded since the last call.
    pub fn drain_hits(&mut self) -> Vec<WatchHit> {
        std::mem::take(&mut self.pending)
    }

    pub fn list_watchpoints(&self) -> String {
        if self.watchpoints.is_empty() { return "No watchpoints set.\n".into(); }
        let mut s = String::new();
        for (i, wp) in self.watchpoints.iter().enumerate() {
            let value = wp.value.map(|v| format!(" =0x{:04X}", v)).unwrap_or_default();
            s.push_str(&format!("  [{}] 0x{:05X} (scan {}, ch {:2}) {:?}{}  hits={}\n",
                i, wp.addr, wp.addr / CHANNEL_COUNT, wp.addr % CHANNEL_COUNT, wp.kind, value, wp.hits));
        }
        if self.dropped > 0 {
            s.push_str(&format!("  ({} hits not reported)\n", self.dropped));
        }
        s
    }
}

// ─── Scan Viewer ────────────────────────────────────────────────────────────

/// Format `count` scans starting at scan `first`, one line per scan.
pub fn dump_scans(words: &[u16], first: usize, count: usize) -> String {
    let mut s = String::new();
    let scans = words.len() / CHANNEL_COUNT;
    for scan in first..(first + count).min(scans) {
        let base = scan * CHANNEL_COUNT;
        s.push_str(&format!("{:05X} #{:<5}", base, scan));
        for (ch, w) in words[base..base + CHANNEL_COUNT].iter().enumerate() {
            if ch % 8 == 0 { s.push_str(" |"); }
            s.push_str(&format!(" {:04X}", w));
        }
        s.push('\n');
    }
    s
}

/// Format the words that differ between two buffer images, at most `limit` lines.
pub fn dump_diff(old: &[u16], new: &[u16], limit: usize) -> String {
    let mut s = String::new();
    let mut changed = 0usize;
    for (i, (&a, &b)) in old.iter().zip(new.iter()).enumerate() {
        if a == b { continue; }
        if changed < limit {
            s.push_str(&format!("  0x{:05X} scan {:<5} ch{:2}: {:04X} -> {:04X}\n",
                i, i / CHANNEL_COUNT, i % CHANNEL_COUNT, a, b));
        }
        changed += 1;
    }
    if changed == 0 {
        s.push_str("  (no changes)\n");
    } else if changed > limit {
        s.push_str(&format!("  ... {} more\n", changed - limit));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(address: usize, word: u16) -> BufferAccess {
        BufferAccess::Read(HostWord { address, channel: address % CHANNEL_COUNT, word })
    }

    #[test]
    fn test_dump_scans() {
        let mut words = vec![0u16; 48];
        words[0] = 0x0001;
        words[23] = 0xBEEF;
        words[24] = 0x00FF;
        let dump = dump_scans(&words, 0, 5);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("00000 #0"));
        assert!(lines[0].contains("0001"));
        assert!(lines[0].ends_with("BEEF"));
        assert!(lines[1].starts_with("00018 #1"));
    }

    #[test]
    fn test_value_watch_fires_only_on_matching_word() {
        let mut mon = Monitor::new();
        let idx = mon.watch(Watchpoint::new(30, WatchKind::Write).with_value(0x55));
        mon.observe(BufferAccess::Write { addr: 30, old: 0, word: 0x44 }, 1);
        assert!(mon.drain_hits().is_empty());
        mon.observe(BufferAccess::Write { addr: 30, old: 0x44, word: 0x55 }, 2);
        let hits = mon.drain_hits();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].index, idx);
        assert_eq!(hits[0].cycle, 2);
        assert_eq!(hits[0].access.to_string(), "write 0x0001E ch 6: 0044 -> 0055");
        assert_eq!(mon.watchpoints()[idx].hits, 1);
        assert!(mon.list_watchpoints().contains("=0x0055"));
    }

    #[test]
    fn test_kind_filters_and_same_edge_hits() {
        let mut mon = Monitor::new();
        mon.watch(Watchpoint::new(3, WatchKind::Read));
        mon.watch(Watchpoint::new(3, WatchKind::Any));
        mon.observe(BufferAccess::Write { addr: 3, old: 0, word: 1 }, 7);
        mon.observe(read(3, 1), 7);
        let hits = mon.drain_hits();
        // any-watch sees both, read-watch only the read
        assert_eq!(hits.iter().map(|h| h.index).collect::<Vec<_>>(), vec![1, 0, 1]);
        assert_eq!(hits[1].access.addr(), 3);
    }

    #[test]
    fn test_pending_hits_are_bounded() {
        let mut mon = Monitor::new();
        mon.watch(Watchpoint::new(0, WatchKind::Any));
        for cycle in 0..(MAX_PENDING_HITS as u64 + 5) {
            mon.observe(read(0, 0), cycle);
        }
        assert_eq!(mon.drain_hits().len(), MAX_PENDING_HITS);
        assert_eq!(mon.dropped, 5);
        assert_eq!(mon.watchpoints()[0].hits, MAX_PENDING_HITS as u64 + 5);
    }

    #[test]
    fn test_dump_diff() {
        let old = vec![0u16; 48];
        let mut new = old.clone();
        new[25] = 7;
        new[40] = 9;
        let d = dump_diff(&old, &new, 10);
        assert!(d.contains("0x00019 scan 1     ch 1: 0000 -> 0007"));
        assert!(dump_diff(&old, &old, 10).contains("no changes"));
        assert!(dump_diff(&old, &new, 1).contains("... 1 more"));
    }
}
