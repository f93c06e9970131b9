//! Inbound ISO-TP reassembly: buffers First Frame + Consecutive Frames back into one payload,
//! emitting the Flow Control frames that pace the sender.
//!
//! Driven entirely by [`Reassembler::poll`] ticks carrying a `Duration` delta, so the module
//! never samples the wall clock itself and is deterministically testable.

use super::pci::{FlowStatus, PciFrame};
use super::{IsoTpError, IsoTpSettings};
use std::time::Duration;

/// N_cr: time allowed between Consecutive Frames before the reassembly is abandoned.
const N_CR_TIMEOUT: Duration = Duration::from_millis(1000);

#[derive(Debug)]
enum ReState {
    Idle,
    Reassembling {
        total_len: usize,
        buf: Vec<u8>,
        expected_seq: u8,
        since_last_cf: Duration,
    },
}

/// Result of feeding one incoming ISO-TP frame to the reassembler.
pub enum ReAction {
    /// Nothing complete yet; keep polling/feeding frames.
    Pending,
    /// Send this Flow Control frame back to the peer immediately.
    SendFlowControl(Vec<u8>),
    /// A full payload has been reassembled.
    Complete(Vec<u8>),
    /// Reassembly aborted (malformed, out-of-sequence, or timed out).
    Failed(IsoTpError),
}

/// Inbound reassembly state machine, one per physical (or functional) channel.
#[derive(Debug)]
pub struct Reassembler {
    settings: IsoTpSettings,
    state: ReState,
}

impl Reassembler {
    /// Builds a reassembler which will hand out Flow Control frames using `settings`.
    pub fn new(settings: IsoTpSettings) -> Self {
        Self {
            settings,
            state: ReState::Idle,
        }
    }

    /// True while a multi-frame receive is in progress (used to gate functional-frame drops).
    pub fn is_receiving(&self) -> bool {
        matches!(self.state, ReState::Reassembling { .. })
    }

    /// Advances the separation-time watchdog. Call once per transport tick.
    pub fn poll(&mut self, dt: Duration) -> ReAction {
        if let ReState::Reassembling {
            since_last_cf, ..
        } = &mut self.state
        {
            *since_last_cf += dt;
            if *since_last_cf > N_CR_TIMEOUT {
                self.state = ReState::Idle;
                return ReAction::Failed(IsoTpError::ConsecutiveFrameTimeout);
            }
        }
        ReAction::Pending
    }

    /// Feeds one raw (already-depadded is not required; PCI decode ignores trailing pad) ISO-TP frame.
    pub fn on_frame(&mut self, raw: &[u8]) -> ReAction {
        let Some(pci) = PciFrame::decode(raw) else {
            return ReAction::Failed(IsoTpError::MalformedPci);
        };
        match pci {
            PciFrame::Single { data } => {
                self.state = ReState::Idle;
                ReAction::Complete(data)
            }
            PciFrame::First { total_len, data } => {
                let fc = PciFrame::FlowControl {
                    status: FlowStatus::ContinueToSend,
                    block_size: self.settings.block_size,
                    st_min: self.settings.st_min,
                }
                .encode();
                self.state = ReState::Reassembling {
                    total_len: total_len as usize,
                    buf: data,
                    expected_seq: 1,
                    since_last_cf: Duration::ZERO,
                };
                ReAction::SendFlowControl(super::pci::pad_frame(fc, 0xAA))
            }
            PciFrame::Consecutive { seq, data } => {
                let ReState::Reassembling {
                    total_len,
                    buf,
                    expected_seq,
                    since_last_cf,
                } = &mut self.state
                else {
                    return ReAction::Failed(IsoTpError::UnexpectedConsecutiveFrame);
                };
                if seq != (*expected_seq & 0x0F) {
                    self.state = ReState::Idle;
                    return ReAction::Failed(IsoTpError::SequenceMismatch);
                }
                buf.extend_from_slice(&data);
                *since_last_cf = Duration::ZERO;
                *expected_seq = expected_seq.wrapping_add(1);
                if buf.len() >= *total_len {
                    buf.truncate(*total_len);
                    let out = std::mem::take(buf);
                    self.state = ReState::Idle;
                    ReAction::Complete(out)
                } else {
                    ReAction::Pending
                }
            }
            PciFrame::FlowControl { .. } => {
                // Flow control belongs to the Segmenter side; nothing to do here.
                ReAction::Pending
            }
        }
    }
}
