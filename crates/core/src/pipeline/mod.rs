//! Clocked blocks of the acquisition pipeline.
//!
//! - [`Sequencer`]: acquisition state machine (start, busy wait, latch, write, settle)
//! - [`ChannelLatch`]: 24-word register set captured on simultaneous data valid
//! - [`ScanWriter`]: one-word-per-cycle serializer from the latch into the buffer
//! - [`PointerManager`]: write/read pointers, half-ready flags, overrun tracking
//! - [`HostReadPort`]: register-mapped host read transaction
//!
//! Each block is a plain struct stepped once per clock edge by
//! [`crate::AcquisitionController::tick`].

mod latch;
mod writer;
mod pointers;
mod sequencer;
mod host_port;

pub use latch::ChannelLatch;
pub use writer::{ScanWriter, WriteStep};
pub use pointers::{HalfStatus, PointerManager};
pub use sequencer::{FaultKind, Sequencer, SequencerOutput, SequencerState};
pub use host_port::{HostBus, HostReadPort, HostWord};
