//! Outbound ISO-TP segmentation: chunks one payload into First Frame + Consecutive Frames,
//! honoring the peer's negotiated Block Size / STmin from its Flow Control reply.

use super::pci::{pad_frame, FlowStatus, PciFrame};
use super::IsoTpError;
use std::time::Duration;

const SF_MAX_LEN: usize = 7;
const FF_FIRST_CHUNK: usize = 6;
const CF_CHUNK: usize = 7;
/// N_bs: time allowed to wait for a Flow Control frame before giving up.
const N_BS_TIMEOUT: Duration = Duration::from_millis(1000);

#[derive(Debug)]
enum SegState {
    Idle,
    /// Multi-frame transfer: First Frame has been queued, waiting for the peer's Flow Control.
    AwaitFlowControl { waited: Duration },
    /// Flow Control received; still have bytes to send as Consecutive Frames.
    Sending {
        block_size: u8,
        st_min: Duration,
        frames_in_block: u8,
        since_last_cf: Duration,
    },
    Done,
    Error(IsoTpError),
}

/// One outbound segmentation attempt. A fresh `Segmenter` is created per request.
#[derive(Debug)]
pub struct Segmenter {
    payload: Vec<u8>,
    pos: usize,
    seq: u8,
    state: SegState,
}

/// What the transport should do this tick.
pub enum SegAction {
    /// Nothing to send or wait for right now.
    Idle,
    /// Send this raw (unpadded) frame payload.
    SendFrame(Vec<u8>),
    /// Transfer finished successfully.
    Done,
    /// Transfer aborted.
    Failed(IsoTpError),
}

impl Segmenter {
    /// Starts a new segmentation. Returns the first action to take immediately
    /// (either the whole Single Frame, or the First Frame of a multi-frame transfer).
    pub fn start(payload: Vec<u8>) -> (Self, SegAction) {
        if payload.len() <= SF_MAX_LEN {
            let frame = PciFrame::Single {
                data: payload.clone(),
            }
            .encode();
            return (
                Self {
                    payload,
                    pos: 0,
                    seq: 1,
                    state: SegState::Done,
                },
                SegAction::SendFrame(pad_frame(frame, 0xAA)),
            );
        }
        let first_chunk = payload[..FF_FIRST_CHUNK].to_vec();
        let frame = PciFrame::First {
            total_len: payload.len() as u16,
            data: first_chunk,
        }
        .encode();
        (
            Self {
                payload,
                pos: FF_FIRST_CHUNK,
                seq: 1,
                state: SegState::AwaitFlowControl {
                    waited: Duration::ZERO,
                },
            },
            SegAction::SendFrame(pad_frame(frame, 0xAA)),
        )
    }

    /// Feeds a Flow Control frame received from the peer while awaiting one.
    pub fn on_flow_control(&mut self, block_size: u8, st_min_raw: u8, status: FlowStatus) {
        if !matches!(self.state, SegState::AwaitFlowControl { .. }) {
            return;
        }
        match status {
            FlowStatus::Overflow => {
                self.state = SegState::Error(IsoTpError::FlowControlOverflow);
            }
            FlowStatus::Wait => {
                // Stay in AwaitFlowControl; reset the wait clock.
                self.state = SegState::AwaitFlowControl {
                    waited: Duration::ZERO,
                };
            }
            FlowStatus::ContinueToSend => {
                let st_min = decode_st_min(st_min_raw);
                self.state = SegState::Sending {
                    block_size,
                    st_min,
                    frames_in_block: 0,
                    since_last_cf: st_min,
                };
            }
        }
    }

    /// Advances time by `dt` and returns the next action. Call every transport tick.
    pub fn poll(&mut self, dt: Duration) -> SegAction {
        match &mut self.state {
            SegState::Idle | SegState::Done => SegAction::Idle,
            SegState::Error(e) => SegAction::Failed(e.clone()),
            SegState::AwaitFlowControl { waited } => {
                *waited += dt;
                if *waited > N_BS_TIMEOUT {
                    self.state = SegState::Error(IsoTpError::FlowControlTimeout);
                    SegAction::Failed(IsoTpError::FlowControlTimeout)
                } else {
                    SegAction::Idle
                }
            }
            SegState::Sending {
                block_size,
                st_min,
                frames_in_block,
                since_last_cf,
            } => {
                *since_last_cf += dt;
                if *since_last_cf < *st_min {
                    return SegAction::Idle;
                }
                if *block_size != 0 && *frames_in_block >= *block_size {
                    // Exhausted the negotiated block; wait for another Flow Control.
                    self.state = SegState::AwaitFlowControl {
                        waited: Duration::ZERO,
                    };
                    return SegAction::Idle;
                }
                if self.pos >= self.payload.len() {
                    self.state = SegState::Done;
                    return SegAction::Done;
                }
                let end = (self.pos + CF_CHUNK).min(self.payload.len());
                let chunk = self.payload[self.pos..end].to_vec();
                let frame = PciFrame::Consecutive {
                    seq: self.seq & 0x0F,
                    data: chunk,
                }
                .encode();
                self.pos = end;
                self.seq = self.seq.wrapping_add(1);
                *frames_in_block += 1;
                *since_last_cf = Duration::ZERO;
                if self.pos >= self.payload.len() {
                    self.state = SegState::Done;
                }
                SegAction::SendFrame(pad_frame(frame, 0xAA))
            }
        }
    }

    /// True once the transfer has fully completed (all bytes sent and acknowledged by pacing).
    pub fn is_done(&self) -> bool {
        matches!(self.state, SegState::Done)
    }
}

fn decode_st_min(raw: u8) -> Duration {
    match raw {
        0x00..=0x7F => Duration::from_millis(raw as u64),
        0xF1..=0xF9 => Duration::from_micros(100 * (raw - 0xF0) as u64),
        _ => Duration::ZERO,
    }
}
