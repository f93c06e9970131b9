//! Crate-wide error types.
//!
//! Replaces the teacher's hand-rolled `Display`/`Error` impls on `DiagError` with
//! `thiserror`, which the teacher already depended on but never actually used.

use crate::isotp::IsoTpError;
use crate::nrc::Nrc;

/// Result alias used throughout the crate.
pub type DiagServerResult<T> = std::result::Result<T, DiagError>;

/// Error produced by a communication channel (the Frame I/O layer).
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Underlying IO error with the channel.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Timeout writing data to the channel.
    #[error("timeout writing to channel")]
    WriteTimeout,
    /// Timeout reading data from the channel.
    #[error("timeout reading from channel")]
    ReadTimeout,
    /// The channel's rx buffer was empty.
    #[error("channel's receive buffer is empty")]
    BufferEmpty,
    /// The channel's tx buffer is full.
    #[error("channel's transmit buffer is full")]
    BufferFull,
    /// The interface was not open.
    #[error("channel's interface is not open")]
    InterfaceNotOpen,
}

/// Top level diagnostic server/client error.
#[derive(Debug, thiserror::Error)]
pub enum DiagError {
    /// The request is not supported in this configuration.
    #[error("request not supported")]
    NotSupported,
    /// The peer replied with a negative response.
    #[error("peer returned negative response: {nrc}")]
    Nrc {
        /// Raw NRC byte returned by the peer.
        nrc: Nrc,
    },
    /// The peer's response was empty.
    #[error("peer provided an empty response")]
    EmptyResponse,
    /// The peer responded, but not to the outstanding request.
    #[error("peer response did not match the outstanding request")]
    WrongMessage,
    /// The response was a valid PDU but of unexpected length.
    #[error("peer response message had invalid length")]
    InvalidResponseLength,
    /// A transaction timed out waiting for `response_received`.
    #[error("transaction timed out after {0}ms")]
    Timeout(u32),
    /// A parameter given to a function was invalid.
    #[error("parameter invalid: {0}")]
    ParameterInvalid(String),
    /// Underlying communication channel error.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),
    /// Underlying ISO-TP layer error.
    #[error("ISO-TP error: {0}")]
    IsoTp(#[from] IsoTpError),
    /// Underlying filesystem error (file transfer engine).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The background worker/server thread is no longer running.
    #[error("diagnostic server is not running")]
    ServerNotRunning,
}

impl From<Nrc> for DiagError {
    fn from(nrc: Nrc) -> Self {
        DiagError::Nrc { nrc }
    }
}
