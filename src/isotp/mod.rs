//! ISO 15765-2 (ISO-TP) segmentation over a CAN transport.
//!
//! This layer is in-scope for the crate (unlike the raw CAN driver binding in [`crate::frame`]):
//! it owns First/Consecutive Frame pacing, Flow Control, and the physical/functional addressing
//! split required by the spec.

pub mod loopback;
pub mod pci;
pub mod reassembler;
pub mod segmenter;
pub mod transport;

pub use loopback::LoopbackFrameIo;
pub use transport::IsoTpTransport;

/// ISO-TP tunable parameters. Defaults favor throughput in a trusted bench setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct IsoTpSettings {
    /// Block size this endpoint asks the peer to use when sending to us. 0 = unlimited.
    pub block_size: u8,
    /// Minimum separation time (ms, 0-127) this endpoint asks the peer to respect.
    pub st_min: u8,
    /// Pad short frames to 8 bytes.
    pub pad_frame: bool,
}

impl Default for IsoTpSettings {
    fn default() -> Self {
        Self {
            block_size: 0,
            st_min: 0,
            pad_frame: true,
        }
    }
}

/// Errors raised by the ISO-TP segmentation/reassembly state machines.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IsoTpError {
    /// No Flow Control arrived from the peer within N_bs.
    #[error("timed out waiting for flow control")]
    FlowControlTimeout,
    /// The peer's Flow Control reported overflow (cannot accept our First Frame length).
    #[error("peer flow control reported overflow")]
    FlowControlOverflow,
    /// A Consecutive Frame did not arrive within N_cr.
    #[error("timed out waiting for a consecutive frame")]
    ConsecutiveFrameTimeout,
    /// A Consecutive Frame's sequence number did not match what was expected.
    #[error("consecutive frame sequence mismatch")]
    SequenceMismatch,
    /// A Consecutive Frame arrived with no First Frame in progress.
    #[error("unexpected consecutive frame")]
    UnexpectedConsecutiveFrame,
    /// A frame's PCI byte(s) could not be parsed.
    #[error("malformed ISO-TP PCI byte")]
    MalformedPci,
    /// The underlying CAN channel reported an error.
    #[error("underlying channel error")]
    ChannelError,
}
