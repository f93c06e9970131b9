//! In-process [`FrameIo`] test double: two [`LoopbackFrameIo`] ends sharing a pair of
//! `VecDeque`s, standing in for a CAN bus in integration tests. Modeled on the teacher's
//! `UdsSimEcu`/fake channel used in `tests/uds_sim_ecu.rs`.

use crate::error::ChannelError;
use crate::frame::{CanFrame, FrameIo};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// One end of an in-process loopback bus. Frames sent on one end land in the other's
/// inbound queue; everything else on the bus (other CAN IDs) is simply never polled by
/// someone not listening for it, exactly like a real bus.
pub struct LoopbackFrameIo {
    outbound: Arc<Mutex<VecDeque<CanFrame>>>,
    inbound: Arc<Mutex<VecDeque<CanFrame>>>,
}

impl LoopbackFrameIo {
    /// Builds a connected pair: `(a, b)`, where frames `a` sends arrive at `b`'s poll and
    /// vice versa.
    pub fn pair() -> (Self, Self) {
        let ab = Arc::new(Mutex::new(VecDeque::new()));
        let ba = Arc::new(Mutex::new(VecDeque::new()));
        (
            Self {
                outbound: ab.clone(),
                inbound: ba.clone(),
            },
            Self {
                outbound: ba,
                inbound: ab,
            },
        )
    }
}

impl FrameIo for LoopbackFrameIo {
    fn send_frame(&mut self, frame: &CanFrame) -> Result<(), ChannelError> {
        self.outbound.lock().unwrap().push_back(frame.clone());
        Ok(())
    }

    fn poll_frames(&mut self) -> Result<Vec<CanFrame>, ChannelError> {
        let mut q = self.inbound.lock().unwrap();
        Ok(q.drain(..).collect())
    }
}
