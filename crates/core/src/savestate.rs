//! Save state for the acquisition controller.
//!
//! Captures the full controller (configuration, sequencer, latch, writer,
//! pointers, buffer) using bincode serialization with deflate compression.
//!
//! ## File format
//!
//! ```text
//! +------------------+
//! | Magic "ADPS"     |  4 bytes
//! +------------------+
//! | Format version   |  u32 little-endian (currently 1)
//! +------------------+
//! | Buffer scans     |  u32 little-endian
//! +------------------+
//! | Compressed data  |  deflate-compressed bincode payload
//! +------------------+
//! ```

use bincode::Options;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::buffer::Half;
use crate::config::{AcquisitionConfig, MAX_BUFFER_SCANS};
use crate::converter::DeviceLines;
use crate::error::{Error, Result};
use crate::pipeline::SequencerState;
use crate::CHANNEL_COUNT;

/// Magic bytes identifying a save state file.
const MAGIC: &[u8; 4] = b"ADPS";
/// Current save state format version.
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 12;
/// Payload bytes allowed beyond the buffer words (all other fields).
const PAYLOAD_SLACK: usize = 4096;

/// Largest payload a state with `scans` scans can legitimately decode from.
fn payload_limit(scans: usize) -> usize {
    scans * CHANNEL_COUNT * std::mem::size_of::<u16>() + PAYLOAD_SLACK
}

/// bincode settings matching `bincode::serialize`, plus a size bound.
fn codec(limit: usize) -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .with_limit(limit as u64)
}

// ─── Per-component state structs ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencerSave {
    pub state: SequencerState,
    pub wait_cycles: u32,
    pub settle_count: u32,
    pub valid_seen: DeviceLines,
    pub scans_completed: u64,
    pub faults: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatchSave {
    pub registers: [u16; CHANNEL_COUNT],
    pub captures: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriterSave {
    pub counter: usize,
    pub last_written: [u16; CHANNEL_COUNT],
    pub words_written: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointerSave {
    pub write_pointer: usize,
    pub read_pointer: usize,
    pub current_half: Half,
    pub upper_half_ready: bool,
    pub lower_half_ready: bool,
    pub pending: [bool; 2],
    pub generations: [u64; 2],
    pub overruns: u64,
    pub overrun: bool,
}

// ─── Top-level save state ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveState {
    pub config: AcquisitionConfig,
    pub cycles: u64,
    pub sequencer: SequencerSave,
    pub latch: LatchSave,
    pub writer: WriterSave,
    pub pointers: PointerSave,
    pub host_transactions: u64,
    pub buffer: Vec<u16>,
}

// ─── Encoding ───────────────────────────────────────────────────────────────

/// Encode a state with header and deflate compression.
pub fn to_bytes(state: &SaveState) -> Result<Vec<u8>> {
    let payload = codec(payload_limit(state.config.buffer_scans)).serialize(state)?;
    let compressed = miniz_oxide::deflate::compress_to_vec(&payload, 6);
    let scans = u32::try_from(state.config.buffer_scans)
        .map_err(|_| Error::StateFormat(format!("buffer_scans {} too large", state.config.buffer_scans)))?;

    let mut out = Vec::with_capacity(HEADER_LEN + compressed.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&scans.to_le_bytes());
    out.extend_from_slice(&compressed);
    Ok(out)
}

/// Decode a state, verifying magic, version and (if given) buffer geometry.
pub fn from_bytes(data: &[u8], expected_scans: Option<usize>) -> Result<SaveState> {
    if data.len() < HEADER_LEN {
        return Err(Error::StateFormat("file too small".into()));
    }
    if &data[0..4] != MAGIC {
        return Err(Error::StateFormat("bad magic".into()));
    }
    let version = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    if version != FORMAT_VERSION {
        return Err(Error::StateFormat(format!(
            "unsupported version {} (expected {})", version, FORMAT_VERSION)));
    }
    let scans = u32::from_le_bytes([data[8], data[9], data[10], data[11]]) as usize;
    if let Some(expected) = expected_scans {
        if scans != expected {
            return Err(Error::StateMismatch {
                field: "buffer_scans", saved: scans as u64, current: expected as u64,
            });
        }
    }

    if scans > MAX_BUFFER_SCANS {
        return Err(Error::StateFormat(format!("buffer_scans {} exceeds {}", scans, MAX_BUFFER_SCANS)));
    }

    let limit = payload_limit(scans);
    let decompressed = miniz_oxide::inflate::decompress_to_vec_with_limit(&data[HEADER_LEN..], limit)
        .map_err(|e| Error::StateFormat(format!("decompress: {:?}", e)))?;
    let state: SaveState = codec(limit).deserialize(&decompressed)?;

    if state.config.buffer_scans != scans {
        return Err(Error::StateFormat("header and payload disagree on buffer_scans".into()));
    }
    if state.buffer.len() != state.config.total_words() {
        return Err(Error::StateFormat(format!(
            "buffer holds {} words, expected {}", state.buffer.len(), state.config.total_words())));
    }
    Ok(state)
}

pub fn save_to_file(state: &SaveState, path: &Path) -> Result<()> {
    std::fs::write(path, to_bytes(state)?)?;
    Ok(())
}

pub fn load_from_file(path: &Path, expected_scans: Option<usize>) -> Result<SaveState> {
    let data = std::fs::read(path)?;
    from_bytes(&data, expected_scans)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SaveState {
        let config = AcquisitionConfig::with_buffer_scans(2);
        let mut buffer = vec![0u16; config.total_words()];
        buffer[3] = 0xABCD;
        SaveState {
            config,
            cycles: 77,
            sequencer: SequencerSave {
                state: SequencerState::WriteDelay,
                wait_cycles: 0,
                settle_count: 4,
                valid_seen: DeviceLines::NONE,
                scans_completed: 1,
                faults: 0,
            },
            latch: LatchSave { registers: [1; CHANNEL_COUNT], captures: 1 },
            writer: WriterSave { counter: 0, last_written: [1; CHANNEL_COUNT], words_written: 24 },
            pointers: PointerSave {
                write_pointer: 24,
                read_pointer: 0,
                current_half: Half::Upper,
                upper_half_ready: true,
                lower_half_ready: false,
                pending: [true, false],
                generations: [1, 0],
                overruns: 0,
                overrun: false,
            },
            host_transactions: 0,
            buffer,
        }
    }

    #[test]
    fn test_header_layout() {
        let bytes = to_bytes(&sample()).unwrap();
        assert_eq!(&bytes[0..4], b"ADPS");
        assert_eq!(u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), 1);
        assert_eq!(u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]), 2);
        assert_eq!(from_bytes(&bytes, Some(2)).unwrap(), sample());
    }

    #[test]
    fn test_rejects_geometry_mismatch() {
        let bytes = to_bytes(&sample()).unwrap();
        match from_bytes(&bytes, Some(1024)) {
            Err(Error::StateMismatch { field, saved, current }) => {
                assert_eq!(field, "buffer_scans");
                assert_eq!((saved, current), (2, 1024));
            }
            other => panic!("unexpected {:?}", other.map(|s| s.cycles)),
        }
    }

    fn forged(scans: u32, payload: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&scans.to_le_bytes());
        bytes.extend_from_slice(&miniz_oxide::deflate::compress_to_vec(payload, 6));
        bytes
    }

    #[test]
    fn test_rejects_oversized_payload() {
        // deflates to a few KiB but would inflate far past a 2-scan state
        let bomb = vec![0u8; 4 << 20];
        assert!(matches!(from_bytes(&forged(2, &bomb), None), Err(Error::StateFormat(_))));
        assert!(matches!(from_bytes(&forged(u32::MAX, &[]), None), Err(Error::StateFormat(_))));
    }

    #[test]
    fn test_rejects_oversized_length_prefix() {
        // a buffer length field claiming far more words than the limit allows
        let mut payload = bincode::serialize(&sample()).unwrap();
        let buffer_len_at = payload.len() - 2 * 48 - 8;
        payload[buffer_len_at..buffer_len_at + 8].copy_from_slice(&(1u64 << 40).to_le_bytes());
        assert!(from_bytes(&forged(2, &payload), None).is_err());
    }

    #[test]
    fn test_rejects_bad_magic_and_truncation() {
        let mut bytes = to_bytes(&sample()).unwrap();
        assert!(matches!(from_bytes(&bytes[..8], None), Err(Error::StateFormat(_))));
        bytes[0] = b'X';
        assert!(matches!(from_bytes(&bytes, None), Err(Error::StateFormat(_))));
    }
}
