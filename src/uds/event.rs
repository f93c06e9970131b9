//! Server-side event kinds and the payloads carried with them. The dispatcher in
//! [`crate::uds::server::dispatch`] binds ordered chains of service nodes per [`EventKind`];
//! handlers are passed the matching [`EventPayload`] variant.

/// The closed set of events the server dispatcher can route. Used as the array index into
/// the event table, so new variants must be appended (never reordered) to keep stable indices.
#[derive(Debug, Copy, Clone, PartialEq, Eq, strum_macros::Display, strum_macros::EnumCount)]
pub enum EventKind {
    /// 0x10 DiagnosticSessionControl.
    SessionControl,
    /// 0x11 ECUReset.
    EcuReset,
    /// Deferred physical reset, fired after `power_down_time_ms` following an accepted ECUReset.
    DoScheduledReset,
    /// 0x22 ReadDataByIdentifier.
    ReadDataByIdentifier,
    /// 0x2E WriteDataByIdentifier.
    WriteDataByIdentifier,
    /// 0x27 SecurityAccess, odd sub-function (request seed).
    SecurityRequestSeed,
    /// 0x27 SecurityAccess, even sub-function (validate key).
    SecurityValidateKey,
    /// 0x28 CommunicationControl.
    CommunicationControl,
    /// 0x2F IOControlByIdentifier.
    IoControl,
    /// 0x31 RoutineControl.
    RoutineControl,
    /// 0x38 RequestFileTransfer.
    RequestFileTransfer,
    /// 0x36 TransferData.
    TransferData,
    /// 0x37 RequestTransferExit.
    RequestTransferExit,
    /// 0x3E TesterPresent.
    TesterPresent,
    /// Fired when P2/P2* elapses with no activity and the session must revert to Default.
    SessionTimeout,
}

/// Number of [`EventKind`] variants, for sizing the flat event table.
pub const EVENT_KIND_COUNT: usize = <EventKind as strum::EnumCount>::COUNT;

/// The payload handed to service nodes for a given [`EventKind`]. One variant per event that
/// actually carries request data; events with no payload use `None`.
#[derive(Debug, Clone)]
pub enum EventPayload {
    /// Raw sub-function byte for DiagnosticSessionControl.
    SessionControl { sub_function: u8 },
    /// Raw sub-function byte for ECUReset.
    EcuReset { sub_function: u8 },
    /// No payload; handler reads `power_down_time_ms` off the server.
    DoScheduledReset,
    /// One or more 16-bit DIDs requested.
    ReadDataByIdentifier { dids: Vec<u16> },
    /// One DID and the bytes to write.
    WriteDataByIdentifier { did: u16, data: Vec<u8> },
    /// Requested security level (already decoded from the odd sub-function).
    SecurityRequestSeed { level: u8 },
    /// Paired security level and the key bytes supplied by the client.
    SecurityValidateKey { level: u8, key: Vec<u8> },
    /// Raw CommunicationControl request body (ctrl, comm, optional node id).
    CommunicationControl {
        control_type: u8,
        comm_type: u8,
        node_id: Option<u16>,
    },
    /// IOControl request: DID, action byte, and state/mask bytes.
    IoControl { did: u16, action: u8, data: Vec<u8> },
    /// RoutineControl request: sub-function, RID, option bytes.
    RoutineControl { sub_function: u8, rid: u16, options: Vec<u8> },
    /// RequestFileTransfer request body.
    RequestFileTransfer { mode: u8, path: String, file_size: Option<u64> },
    /// TransferData request: sequence counter and payload (empty on a read request).
    TransferData { sequence: u8, data: Vec<u8> },
    /// RequestTransferExit request body (optional expected CRC for uploads).
    RequestTransferExit { data: Vec<u8> },
    /// TesterPresent sub-function byte (bit 0x80 signals suppress-positive-response).
    TesterPresent { sub_function: u8 },
    /// No payload.
    SessionTimeout,
}
