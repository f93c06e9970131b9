//! Glues [`crate::frame::FrameIo`] to the [`super::segmenter::Segmenter`] /
//! [`super::reassembler::Reassembler`] state machines, and enforces the physical/functional
//! addressing rules from the spec (§4.1, §8): a physical segmented receive in progress drops
//! any incoming functional frame.

use super::pci::PciFrame;
use super::reassembler::{ReAction, Reassembler};
use super::segmenter::{SegAction, Segmenter};
use super::IsoTpSettings;
use crate::frame::{CanFrame, FrameIo, PollStatus};
use std::collections::VecDeque;
use std::time::Duration;

/// One ISO-TP endpoint: a physical request/response pair, plus an optional functional
/// (broadcast) receive channel. Used by both the client (functional = send-only, handled by
/// the caller addressing a different frame directly) and the server (functional = receive-only).
pub struct IsoTpTransport<F: FrameIo> {
    io: F,
    tx_id: u32,
    rx_id_phys: u32,
    rx_id_func: Option<u32>,
    reassembler_phys: Reassembler,
    reassembler_func: Reassembler,
    segmenter: Option<Segmenter>,
    pending_rx: VecDeque<Vec<u8>>,
    last_error: bool,
}

impl<F: FrameIo> IsoTpTransport<F> {
    /// Builds a new transport. `rx_id_func` is `None` on the client (it only ever sends
    /// functional requests, never receives them) and `Some(id)` on the server.
    pub fn new(io: F, tx_id: u32, rx_id_phys: u32, rx_id_func: Option<u32>, settings: IsoTpSettings) -> Self {
        Self {
            io,
            tx_id,
            rx_id_phys,
            rx_id_func,
            reassembler_phys: Reassembler::new(settings),
            reassembler_func: Reassembler::new(settings),
            segmenter: None,
            pending_rx: VecDeque::new(),
            last_error: false,
        }
    }

    /// Queues `payload` for transmission. Returns immediately; completion is observed via
    /// [`Self::poll`] reporting an empty status (segmenter cleared) with no `TPORT_ERR`.
    ///
    /// `is_functional` sends a one-shot broadcast (only Single Frame payloads are meaningful
    /// over a functional address per ISO 15765-2/14229; larger payloads are rejected).
    pub fn send(&mut self, payload: Vec<u8>, is_functional: bool) -> Result<(), crate::error::ChannelError> {
        if is_functional {
            if payload.len() > 7 {
                return Err(crate::error::ChannelError::BufferFull);
            }
            let frame = PciFrame::Single { data: payload }.encode();
            return self
                .io
                .send_frame(&CanFrame::new(self.tx_id, super::pci::pad_frame(frame, 0xAA)));
        }
        let (seg, first_action) = Segmenter::start(payload);
        self.segmenter = Some(seg);
        self.apply_seg_action(first_action)
    }

    /// True while an outbound segmented send is still in flight.
    pub fn is_sending(&self) -> bool {
        self.segmenter.is_some()
    }

    /// Advances timers, pumps incoming frames, and drives outbound segmentation.
    pub fn poll(&mut self, dt: Duration) -> PollStatus {
        let mut status = PollStatus::empty();

        match self.io.poll_frames() {
            Ok(frames) => {
                for frame in frames {
                    self.handle_incoming(frame);
                }
            }
            Err(_) => {
                self.last_error = true;
            }
        }

        if let ReAction::Failed(_) = self.reassembler_phys.poll(dt) {
            self.last_error = true;
        }
        if let ReAction::Failed(_) = self.reassembler_func.poll(dt) {
            // Functional reassembly timing out is not fatal to the physical transaction.
            log::debug!("functional reassembly timed out");
        }

        if let Some(seg) = &mut self.segmenter {
            let action = seg.poll(dt);
            if let Err(_) = self.apply_seg_action(action) {
                self.last_error = true;
            }
        }

        if self.last_error {
            status |= PollStatus::TPORT_ERR;
            self.last_error = false;
        }
        if !self.pending_rx.is_empty() {
            status |= PollStatus::FRAME_AVAILABLE;
        }
        status
    }

    /// Pops one fully reassembled payload received on the physical channel, if any.
    pub fn take_received(&mut self) -> Option<Vec<u8>> {
        self.pending_rx.pop_front()
    }

    fn apply_seg_action(&mut self, action: SegAction) -> Result<(), crate::error::ChannelError> {
        match action {
            SegAction::Idle | SegAction::Done => {
                if matches!(action, SegAction::Done) {
                    self.segmenter = None;
                }
                Ok(())
            }
            SegAction::SendFrame(raw) => self.io.send_frame(&CanFrame::new(self.tx_id, raw)),
            SegAction::Failed(e) => {
                log::warn!("ISO-TP segmentation failed: {e}");
                self.segmenter = None;
                Err(crate::error::ChannelError::WriteTimeout)
            }
        }
    }

    fn handle_incoming(&mut self, frame: CanFrame) {
        let is_functional = self.rx_id_func == Some(frame.id) && frame.id != self.rx_id_phys;
        if frame.id != self.rx_id_phys && !is_functional {
            return;
        }
        if is_functional && self.reassembler_phys.is_receiving() {
            log::debug!("dropping functional frame 0x{:X} during active physical segmented receive", frame.id);
            return;
        }
        let Some(pci) = PciFrame::decode(&frame.data) else {
            self.last_error = true;
            return;
        };
        if let PciFrame::FlowControl {
            status,
            block_size,
            st_min,
        } = pci
        {
            if let Some(seg) = &mut self.segmenter {
                seg.on_flow_control(block_size, st_min, status);
            }
            return;
        }
        let reassembler = if is_functional {
            &mut self.reassembler_func
        } else {
            &mut self.reassembler_phys
        };
        match reassembler.on_frame(&frame.data) {
            ReAction::SendFlowControl(fc) => {
                let _ = self.io.send_frame(&CanFrame::new(self.tx_id, fc));
            }
            ReAction::Complete(payload) => self.pending_rx.push_back(payload),
            ReAction::Failed(_) => self.last_error = true,
            ReAction::Pending => {}
        }
    }
}
