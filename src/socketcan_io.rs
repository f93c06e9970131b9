//! [`FrameIo`] binding over a raw `SocketCAN` interface (Linux only). This crate performs its
//! own ISO-TP segmentation in [`crate::isotp`]; this module only ferries raw CAN frames, non-
//! blocking, the way [`crate::frame::FrameIo`] requires.

use crate::error::ChannelError;
use crate::frame::{CanFrame, FrameIo};
use socketcan::{CanFrame as SocketCanFrame, EmbeddedFrame, Frame, Socket};

/// A [`FrameIo`] backed by a non-blocking `SocketCAN` socket.
pub struct SocketCanIo {
    socket: socketcan::CanSocket,
}

impl SocketCanIo {
    /// Opens `iface` (e.g. `"vcan0"`, `"can0"`) and puts the socket in non-blocking mode.
    pub fn open(iface: &str) -> Result<Self, ChannelError> {
        let socket = socketcan::CanSocket::open(iface).map_err(ChannelError::Io)?;
        socket.set_nonblocking(true).map_err(ChannelError::Io)?;
        Ok(Self { socket })
    }
}

impl FrameIo for SocketCanIo {
    fn send_frame(&mut self, frame: &CanFrame) -> Result<(), ChannelError> {
        let id = socketcan::StandardId::new(frame.id as u16).ok_or(ChannelError::BufferFull)?;
        let can_frame = SocketCanFrame::new(id, &frame.data).ok_or(ChannelError::BufferFull)?;
        self.socket.write_frame(&can_frame).map_err(ChannelError::Io)?;
        Ok(())
    }

    fn poll_frames(&mut self) -> Result<Vec<CanFrame>, ChannelError> {
        let mut frames = Vec::new();
        loop {
            match self.socket.read_frame() {
                Ok(frame) => frames.push(CanFrame::new(frame.raw_id(), frame.data().to_vec())),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(ChannelError::Io(e)),
            }
        }
        Ok(frames)
    }
}
