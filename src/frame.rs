//! Frame I/O: the boundary between this crate and a real CAN driver.
//!
//! CAN driver integration is explicitly out of scope (§1 of the spec); this module defines
//! only the two callback seams the ISO-TP layer needs, modeled on the teacher's
//! `channel::BaseChannel` trait but narrowed to raw CAN frames (no ISO-TP offload — that
//! segmentation happens in [`crate::isotp`], inside this crate).

use crate::error::ChannelError;
use bitflags::bitflags;

/// A raw CAN data frame (classic CAN, 11-bit identifiers by default).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanFrame {
    /// CAN arbitration ID this frame was sent to / received on.
    pub id: u32,
    /// Frame payload, 0-8 bytes for classic CAN.
    pub data: Vec<u8>,
}

impl CanFrame {
    /// Builds a new frame, padding is the caller's responsibility (ISO-TP pads to 8 bytes).
    pub fn new(id: u32, data: Vec<u8>) -> Self {
        Self { id, data }
    }
}

bitflags! {
    /// Status bits returned by [`FrameIo::poll`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PollStatus: u8 {
        /// At least one full frame is available to read this tick.
        const FRAME_AVAILABLE = 0b0000_0001;
        /// A transport-level error occurred (write failure, queue overflow, ...).
        const TPORT_ERR       = 0b0000_0010;
    }
}

/// Frame-level I/O, isolated behind two callbacks per the spec: enqueue received frames,
/// emit outgoing frames. A real implementation wraps a CAN socket; [`crate::isotp::LoopbackFrameIo`]
/// is the in-process test double.
pub trait FrameIo: Send {
    /// Emits a single CAN frame onto the bus.
    fn send_frame(&mut self, frame: &CanFrame) -> Result<(), ChannelError>;

    /// Non-blocking drain of frames that have arrived since the last poll.
    fn poll_frames(&mut self) -> Result<Vec<CanFrame>, ChannelError>;
}

impl FrameIo for Box<dyn FrameIo> {
    fn send_frame(&mut self, frame: &CanFrame) -> Result<(), ChannelError> {
        (**self).send_frame(frame)
    }

    fn poll_frames(&mut self) -> Result<Vec<CanFrame>, ChannelError> {
        (**self).poll_frames()
    }
}

/// Wraps a real [`FrameIo`] so receives flow through a bounded queue fed by a separate
/// producer thread (§5: the driver callback runs in its own, possibly interrupt, context;
/// `send_frame` still reaches the underlying IO directly since writes originate from the
/// consumer thread itself).
pub struct QueuedFrameIo<F: FrameIo> {
    io: std::sync::Arc<std::sync::Mutex<F>>,
    rx: std::sync::mpsc::Receiver<CanFrame>,
}

impl<F: FrameIo> QueuedFrameIo<F> {
    /// Wraps `io`, returning the queued front-end plus the raw pieces a producer thread needs
    /// to feed it: the shared IO handle and the bounded channel's sender.
    pub fn new(
        io: F,
        queue_depth: usize,
    ) -> (Self, std::sync::Arc<std::sync::Mutex<F>>, std::sync::mpsc::SyncSender<CanFrame>) {
        let io = std::sync::Arc::new(std::sync::Mutex::new(io));
        let (tx, rx) = std::sync::mpsc::sync_channel(queue_depth);
        (Self { io: io.clone(), rx }, io, tx)
    }
}

impl<F: FrameIo> FrameIo for QueuedFrameIo<F> {
    fn send_frame(&mut self, frame: &CanFrame) -> Result<(), ChannelError> {
        self.io.lock().unwrap().send_frame(frame)
    }

    fn poll_frames(&mut self) -> Result<Vec<CanFrame>, ChannelError> {
        Ok(self.rx.try_iter().collect())
    }
}
