//! Negative Response Codes (NRC), the third byte of a `0x7F SID NRC` reply.
//!
//! This mirrors the closed set used by the teacher's hand-rolled `uds::UDSError`,
//! trimmed to exactly the codes this crate's service handlers can emit (ISO 14229-1 Table A.1).

use strum_macros::Display;

/// A UDS Negative Response Code.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Display)]
pub enum Nrc {
    /// 0x11 - The service is not supported by the ECU in any session.
    ServiceNotSupported,
    /// 0x12 - The sub-function is not supported by the service.
    SubFunctionNotSupported,
    /// 0x13 - Request length or format is invalid.
    IncorrectMessageLengthOrInvalidFormat,
    /// 0x22 - Prerequisite conditions for the request are not met.
    ConditionsNotCorrect,
    /// 0x24 - The request was sent out of the required sequence.
    RequestSequenceError,
    /// 0x31 - The request contains data outside of a valid range.
    RequestOutOfRange,
    /// 0x33 - Security access is required and has not been granted.
    SecurityAccessDenied,
    /// 0x35 - The key sent to unlock a security level did not match.
    InvalidKey,
    /// 0x72 - A programming operation (write, erase, transfer) failed.
    GeneralProgrammingFailure,
    /// 0x78 - Request received, response pending. Extends P2 to P2\*.
    RequestCorrectlyReceivedResponsePending,
    /// 0x7E - The sub-function is not supported in the active diagnostic session.
    SubFunctionNotSupportedInActiveSession,
    /// 0x7F - The service is not supported in the active diagnostic session.
    ServiceNotSupportedInActiveSession,
    /// Any other ISO-SAE reserved or manufacturer-specific NRC, kept verbatim.
    Other(u8),
}

impl Nrc {
    /// Encodes this NRC to its wire byte value.
    pub fn to_byte(self) -> u8 {
        match self {
            Nrc::ServiceNotSupported => 0x11,
            Nrc::SubFunctionNotSupported => 0x12,
            Nrc::IncorrectMessageLengthOrInvalidFormat => 0x13,
            Nrc::ConditionsNotCorrect => 0x22,
            Nrc::RequestSequenceError => 0x24,
            Nrc::RequestOutOfRange => 0x31,
            Nrc::SecurityAccessDenied => 0x33,
            Nrc::InvalidKey => 0x35,
            Nrc::GeneralProgrammingFailure => 0x72,
            Nrc::RequestCorrectlyReceivedResponsePending => 0x78,
            Nrc::SubFunctionNotSupportedInActiveSession => 0x7E,
            Nrc::ServiceNotSupportedInActiveSession => 0x7F,
            Nrc::Other(x) => x,
        }
    }
}

impl From<u8> for Nrc {
    fn from(p: u8) -> Self {
        match p {
            0x11 => Nrc::ServiceNotSupported,
            0x12 => Nrc::SubFunctionNotSupported,
            0x13 => Nrc::IncorrectMessageLengthOrInvalidFormat,
            0x22 => Nrc::ConditionsNotCorrect,
            0x24 => Nrc::RequestSequenceError,
            0x31 => Nrc::RequestOutOfRange,
            0x33 => Nrc::SecurityAccessDenied,
            0x35 => Nrc::InvalidKey,
            0x72 => Nrc::GeneralProgrammingFailure,
            0x78 => Nrc::RequestCorrectlyReceivedResponsePending,
            0x7E => Nrc::SubFunctionNotSupportedInActiveSession,
            0x7F => Nrc::ServiceNotSupportedInActiveSession,
            x => Nrc::Other(x),
        }
    }
}
