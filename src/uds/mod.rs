//! UDS (Unified Diagnostic Services, ISO 14229) protocol core: service identifiers, PDU
//! framing helpers, and the client/server entities built on top of them.
//!
//! Theoretically this module is compliant with any ECU which implements UDS (any ECU produced
//! after 2006 typically supports it), though this crate only implements the subset of services
//! named below.

use crate::error::{DiagError, DiagServerResult};
use crate::nrc::Nrc;

pub mod client;
pub mod event;
pub mod server;

/// UDS service identifiers this crate implements.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, strum_macros::Display)]
pub enum Sid {
    /// Diagnostic session control. See [`server::services::session_control`].
    DiagnosticSessionControl = 0x10,
    /// ECU reset. See [`server::services::ecu_reset`].
    EcuReset = 0x11,
    /// Read data by identifier.
    ReadDataByIdentifier = 0x22,
    /// Security access (seed/key). See [`server::services::security_access`].
    SecurityAccess = 0x27,
    /// Communication control.
    CommunicationControl = 0x28,
    /// Write data by identifier.
    WriteDataByIdentifier = 0x2E,
    /// IO control by identifier.
    IoControlByIdentifier = 0x2F,
    /// Routine control (used here for the remote-console sub-engine).
    RoutineControl = 0x31,
    /// Transfer data (block-wise upload/download payload).
    TransferData = 0x36,
    /// Request transfer exit.
    RequestTransferExit = 0x37,
    /// Request download/upload of a file.
    RequestFileTransfer = 0x38,
    /// Tester present (heartbeat).
    TesterPresent = 0x3E,
}

impl Sid {
    /// The positive-response SID for this request SID (`SID + 0x40`).
    pub fn positive_response_sid(self) -> u8 {
        self as u8 + 0x40
    }

    /// Recovers a `Sid` from a raw request SID byte.
    pub fn from_request_byte(b: u8) -> Option<Self> {
        match b {
            0x10 => Some(Sid::DiagnosticSessionControl),
            0x11 => Some(Sid::EcuReset),
            0x22 => Some(Sid::ReadDataByIdentifier),
            0x27 => Some(Sid::SecurityAccess),
            0x28 => Some(Sid::CommunicationControl),
            0x2E => Some(Sid::WriteDataByIdentifier),
            0x2F => Some(Sid::IoControlByIdentifier),
            0x31 => Some(Sid::RoutineControl),
            0x36 => Some(Sid::TransferData),
            0x37 => Some(Sid::RequestTransferExit),
            0x38 => Some(Sid::RequestFileTransfer),
            0x3E => Some(Sid::TesterPresent),
            _ => None,
        }
    }

    /// Recovers a `Sid` from a raw positive-response SID byte (`SID + 0x40`).
    pub fn from_response_byte(b: u8) -> Option<Self> {
        b.checked_sub(0x40).and_then(Self::from_request_byte)
    }
}

/// Negative response marker byte, per ISO 14229: `[0x7F, SID, NRC]`.
pub const NEGATIVE_RESPONSE_SID: u8 = 0x7F;

/// Builds a positive response PDU: `[SID + 0x40, body...]`.
pub fn build_positive_response(sid: Sid, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + body.len());
    out.push(sid.positive_response_sid());
    out.extend_from_slice(body);
    out
}

/// Builds a negative response PDU: `[0x7F, SID, NRC]`.
pub fn build_negative_response(sid: Sid, nrc: Nrc) -> Vec<u8> {
    vec![NEGATIVE_RESPONSE_SID, sid as u8, nrc.to_byte()]
}

/// A parsed response PDU, classified as positive or negative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedResponse<'a> {
    /// Positive response: `sid` is the *request* SID it answers, `body` is everything after
    /// the response SID byte.
    Positive { sid: u8, body: &'a [u8] },
    /// Negative response, carrying the request SID it answers and the NRC.
    Negative { sid: u8, nrc: Nrc },
}

/// Parses `raw` (a full reassembled UDS response payload) into a [`ParsedResponse`].
pub fn parse_response(raw: &[u8]) -> DiagServerResult<ParsedResponse<'_>> {
    if raw.is_empty() {
        return Err(DiagError::EmptyResponse);
    }
    if raw[0] == NEGATIVE_RESPONSE_SID {
        if raw.len() != 3 {
            return Err(DiagError::InvalidResponseLength);
        }
        return Ok(ParsedResponse::Negative {
            sid: raw[1],
            nrc: Nrc::from(raw[2]),
        });
    }
    Ok(ParsedResponse::Positive {
        sid: raw[0].wrapping_sub(0x40),
        body: &raw[1..],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_response_sid_roundtrips() {
        assert_eq!(Sid::DiagnosticSessionControl.positive_response_sid(), 0x50);
        assert_eq!(Sid::from_response_byte(0x50), Some(Sid::DiagnosticSessionControl));
    }

    #[test]
    fn parses_negative_response() {
        let raw = build_negative_response(Sid::SecurityAccess, Nrc::InvalidKey);
        match parse_response(&raw).unwrap() {
            ParsedResponse::Negative { sid, nrc } => {
                assert_eq!(sid, 0x27);
                assert_eq!(nrc, Nrc::InvalidKey);
            }
            _ => panic!("expected negative response"),
        }
    }

    #[test]
    fn parses_positive_response() {
        let raw = build_positive_response(Sid::WriteDataByIdentifier, &[0x00, 0x01]);
        match parse_response(&raw).unwrap() {
            ParsedResponse::Positive { sid, body } => {
                assert_eq!(sid, 0x2E);
                assert_eq!(body, &[0x00, 0x01]);
            }
            _ => panic!("expected positive response"),
        }
    }
}
