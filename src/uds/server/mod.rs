//! The UDS server entity: session/security/comm-control state, the event dispatch table, and
//! the two-thread concurrency model (interrupt-context receive producer + consumer thread).

pub mod dispatch;
pub mod services;

use crate::config::Config;
use crate::console::{ConsoleSink, StdoutSink};
use crate::frame::{FrameIo, PollStatus};
use crate::isotp::IsoTpTransport;
use crate::nrc::Nrc;
use crate::shell_exec::{ShellExecutor, SystemShellExecutor};
use crate::uds::event::{EventKind, EventPayload};
use crate::uds::{build_negative_response, build_positive_response, Sid};
use dispatch::{dispatch, DispatchResult, EventTable};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Diagnostic session type (ISO 14229 Table 17, the three this crate implements).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionType {
    /// 0x01 - the session active after power-on / any reset.
    Default,
    /// 0x02 - required for flashing/memory operations.
    Programming,
    /// 0x03 - relaxed timing, required for most write/control services.
    Extended,
}

/// Communication-control state for one channel (normal messages, or network management).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CommState {
    /// Both receive and transmit enabled.
    EnableRxTx,
    /// Receive enabled, transmit disabled.
    EnableRxDisableTx,
    /// Receive disabled, transmit enabled.
    DisableRxEnableTx,
    /// Both receive and transmit disabled.
    DisableRxTx,
}

/// One security-access level instance: seed/key state for a single odd sub-function level.
pub struct SecurityInstance {
    /// The odd sub-function level this instance answers for (e.g. 0x01, 0x03, ...).
    pub supported_level: u8,
    /// Shared secret combined with the seed by `algorithm` to produce the expected key.
    pub secret_key: Vec<u8>,
    /// Outstanding seed; 0 means "no seed pending".
    pub current_seed: u32,
    /// The seed/key algorithm for this level.
    pub algorithm: Box<dyn SeedKeyAlgorithm>,
}

/// Pluggable seed-to-key transform for SecurityAccess. The crypto is a plug-point per the
/// spec's own caveat; implementers should document pre-image resistance properties.
pub trait SeedKeyAlgorithm: Send {
    /// Computes the expected key for `seed` given the level's shared secret.
    fn compute_key(&self, seed: u32, secret: &[u8]) -> Vec<u8>;
}

/// Demonstration-only XOR seed/key algorithm. **Not cryptographically secure** — documented
/// here exactly as the spec requires of any implementer of this plug-point.
#[derive(Debug, Default, Clone, Copy)]
pub struct XorDemoAlgorithm;

impl SeedKeyAlgorithm for XorDemoAlgorithm {
    fn compute_key(&self, seed: u32, secret: &[u8]) -> Vec<u8> {
        let secret_word = secret
            .iter()
            .fold(0u32, |acc, &b| acc.rotate_left(8) ^ b as u32);
        (seed ^ secret_word).to_be_bytes().to_vec()
    }
}

/// One IO node: a DID bound to a hardware handler, plus whether UDS currently overrides it.
pub struct IoNode {
    /// The DID this node answers for.
    pub did: u16,
    /// Invoked with the requested action and payload; returns the response state bytes.
    pub handler: Box<dyn FnMut(IoAction, &[u8]) -> Vec<u8> + Send>,
    /// Set by ShortTermAdjustment/FreezeCurrentState, cleared by ReturnControl/ResetToDefault
    /// and by session-timeout.
    pub is_overridden: bool,
}

/// IOControlByIdentifier action, decoded from the request's action byte.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IoAction {
    /// 0x00 - release UDS's hold on the signal.
    ReturnControlToEcu,
    /// 0x01 - drive the signal per the supplied state bytes, until released.
    ShortTermAdjustment,
    /// 0x02 - freeze the signal at its current value.
    FreezeCurrentState,
    /// 0x03 - restore the signal's default (non-diagnostic) behavior.
    ResetToDefault,
}

impl IoAction {
    pub(crate) fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(IoAction::ReturnControlToEcu),
            0x01 => Some(IoAction::ResetToDefault),
            0x02 => Some(IoAction::FreezeCurrentState),
            0x03 => Some(IoAction::ShortTermAdjustment),
            _ => None,
        }
    }
}

/// File-transfer session mode.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum FileSessionMode {
    /// No transfer in progress.
    #[default]
    Idle,
    /// Client is uploading (writing) to `current_path`.
    Writing,
    /// Client is downloading (reading) from `current_path`.
    Reading,
}

/// State for the at-most-one active file transfer.
#[derive(Default)]
pub struct FileSession {
    /// The open file, if a transfer is active.
    pub fd: Option<std::fs::File>,
    /// Current mode.
    pub mode: FileSessionMode,
    /// Total expected size (client-declared for upload, stat'd for download).
    pub total_size: u64,
    /// Bytes transferred so far.
    pub current_pos: u64,
    /// Path of the file currently being transferred.
    pub current_path: String,
    /// Running CRC-32 (reflected, ISO-HDLC) over the bytes written/read so far.
    pub current_crc: u32,
    /// Negotiated max block length for TransferData payloads.
    pub max_block_len: usize,
}

impl FileSession {
    /// Resets transfer state to idle, releasing the open file descriptor if any.
    pub(crate) fn close(&mut self) {
        self.fd = None;
        self.mode = FileSessionMode::Idle;
        self.current_pos = 0;
        self.total_size = 0;
        self.current_crc = 0;
    }
}

/// A backend from which RDBI/WDBI resolve DID reads/writes. Dispatcher tries "extended"
/// before "general" (§4.4); either may report `RequestOutOfRange` to fall through.
pub trait DataIdentifierBackend: Send {
    /// Reads the current value for `did`, or `None` if this backend doesn't own it.
    fn read(&mut self, did: u16) -> Option<Vec<u8>>;
    /// Writes `data` to `did`; `Ok(())` on success, `Err(())` if this backend doesn't own it
    /// or the write was rejected.
    fn write(&mut self, did: u16, data: &[u8]) -> Result<(), ()>;
}

/// Trivial in-memory DID backend, handy for tests and as a default.
#[derive(Default)]
pub struct MapDataIdentifierBackend {
    values: std::collections::HashMap<u16, Vec<u8>>,
}

impl MapDataIdentifierBackend {
    /// Builds an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an initial value for `did`.
    pub fn set(&mut self, did: u16, data: Vec<u8>) {
        self.values.insert(did, data);
    }
}

impl DataIdentifierBackend for MapDataIdentifierBackend {
    fn read(&mut self, did: u16) -> Option<Vec<u8>> {
        self.values.get(&did).cloned()
    }

    fn write(&mut self, did: u16, data: &[u8]) -> Result<(), ()> {
        self.values.insert(did, data.to_vec());
        Ok(())
    }
}

/// The UDS server entity. Owns one transport binding, all protocol state, and the event
/// dispatch table. Mutated only from the consumer thread (§5); service handlers run on that
/// same thread and therefore need no locking against each other.
pub struct UdsServer {
    transport: IsoTpTransport<Box<dyn FrameIo>>,
    dispatch_table: EventTable,

    /// Current diagnostic session.
    pub session: SessionType,
    /// Current security level; 0 = locked.
    pub security_level: u8,
    /// Client-facing P2 timeout (ms), sent in DiagnosticSessionControl's positive response.
    pub p2_ms: u32,
    /// Client-facing P2* timeout (ms), extended via `0x78`.
    pub p2_star_ms: u32,
    /// Normal-message communication-control state.
    pub comm_normal: CommState,
    /// Network-management-message communication-control state.
    pub comm_nm: CommState,
    /// This server's configured node id, for CommunicationControl 0x04/0x05 scoping.
    pub node_id: u16,

    /// Configured delay between an accepted ECUReset and `DoScheduledReset` firing.
    pub power_down_time_ms: u32,
    pending_reset: Option<(Duration, u8)>,
    /// Invoked by `DoScheduledReset` with the accepted ECUReset sub-function; the actual
    /// physical reset (hardware watchdog, process restart, ...) is a plug-point. Defaults to
    /// logging only.
    pub reset_hook: Box<dyn FnMut(u8) + Send>,

    /// Registered IO nodes (0x2F IOControlByIdentifier).
    pub io_nodes: Vec<IoNode>,
    /// Registered security levels (0x27 SecurityAccess).
    pub security_instances: Vec<SecurityInstance>,
    /// "Extended" DID backend, tried before `data_general`.
    pub data_extended: Box<dyn DataIdentifierBackend>,
    /// "General" DID backend, tried if `data_extended` reports out-of-range.
    pub data_general: Box<dyn DataIdentifierBackend>,
    /// At most one active file-transfer session.
    pub file_session: FileSession,

    /// Console sink currently in effect; swapped for a [`crate::console::CaptureGuard`]
    /// during a remote-console invocation.
    pub console_sink: Box<dyn ConsoleSink>,
    /// External collaborator that actually executes remote-console commands.
    pub shell_executor: Box<dyn ShellExecutor>,
    /// Routine id that triggers the remote console (default 0xF000).
    pub remote_console_rid: u16,
    /// Minimum session required to invoke the remote console.
    pub remote_console_min_session: SessionType,
    /// Minimum unlocked security level required (0 = none).
    pub remote_console_min_security: u8,

    session_timer: Duration,
    /// Idle time after which the session auto-reverts to Default, releasing all overrides.
    pub session_timeout: Duration,

    /// Set by a handler (TesterPresent's suppress-positive-response bit) to discard the
    /// response this request would otherwise produce. Consumed and reset on every request.
    pub suppress_response: bool,
}

/// Depth of the bounded receive queue between the producer thread and the consumer thread
/// (§5.1); frames beyond this are dropped and logged, relying on ISO-TP retransmit timers.
const RECEIVE_QUEUE_DEPTH: usize = 64;

impl UdsServer {
    /// Builds a server directly over a ready [`IsoTpTransport`] — used for in-process
    /// ([`crate::isotp::LoopbackFrameIo`]) tests where the two-thread producer/consumer split
    /// in [`Self::spawn_over_io`] isn't needed.
    pub fn new(transport: IsoTpTransport<Box<dyn FrameIo>>) -> Self {
        let mut dispatch_table = EventTable::new();
        services::register_defaults(&mut dispatch_table);
        Self {
            transport,
            dispatch_table,
            session: SessionType::Default,
            security_level: 0,
            p2_ms: 50,
            p2_star_ms: 2000,
            comm_normal: CommState::EnableRxTx,
            comm_nm: CommState::EnableRxTx,
            node_id: 0,
            power_down_time_ms: 50,
            pending_reset: None,
            reset_hook: Box::new(|sub_function| {
                log::warn!("no reset_hook installed; ignoring reset request 0x{sub_function:02X}")
            }),
            io_nodes: Vec::new(),
            security_instances: Vec::new(),
            data_extended: Box::new(MapDataIdentifierBackend::new()),
            data_general: Box::new(MapDataIdentifierBackend::new()),
            file_session: FileSession::default(),
            console_sink: Box::new(StdoutSink),
            shell_executor: Box::new(SystemShellExecutor),
            remote_console_rid: 0xF000,
            remote_console_min_session: SessionType::Extended,
            remote_console_min_security: 1,
            session_timer: Duration::ZERO,
            session_timeout: Duration::from_secs(5),
            suppress_response: false,
        }
    }
}

/// Builds and spawns a server over a real [`FrameIo`] (e.g. a `socketcan` binding), wiring up
/// the full two-thread model from §5: a receive-producer thread polling the driver and
/// forwarding frames into a bounded queue (dropping on full), and a consumer thread owning the
/// [`UdsServer`] that drains the queue via [`UdsServer::server_poll`].
pub fn spawn_over_io(io: impl FrameIo + 'static, cfg: &Config) -> ServerHandle {
    let (queued, shared_io, tx) = crate::frame::QueuedFrameIo::new(io, RECEIVE_QUEUE_DEPTH);
    let transport = IsoTpTransport::new(
        Box::new(queued) as Box<dyn FrameIo>,
        cfg.addresses.phys_target,
        cfg.addresses.phys_source,
        Some(cfg.addresses.func_source),
        cfg.isotp,
    );
    let running = Arc::new(AtomicBool::new(true));
    let running_producer = running.clone();
    let producer = thread::spawn(move || {
        while running_producer.load(Ordering::Relaxed) {
            let frames = shared_io.lock().unwrap().poll_frames();
            match frames {
                Ok(frames) => {
                    for frame in frames {
                        if tx.try_send(frame).is_err() {
                            log::warn!("receive queue full, dropping frame");
                        }
                    }
                }
                Err(e) => log::error!("frame io error: {e}"),
            }
            thread::sleep(Duration::from_millis(1));
        }
    });

    let mut server = UdsServer::new(transport);
    let running_consumer = running.clone();
    let consumer = thread::spawn(move || {
        let mut last_sleep = Duration::from_millis(10);
        while running_consumer.load(Ordering::Relaxed) {
            server.server_poll(last_sleep);
            last_sleep = if server.transport.is_sending() {
                Duration::ZERO
            } else {
                Duration::from_millis(10)
            };
            if last_sleep > Duration::ZERO {
                thread::sleep(last_sleep);
            } else {
                thread::yield_now();
            }
        }
    });

    ServerHandle {
        running,
        join: Some(producer),
        join2: Some(consumer),
    }
}

impl UdsServer {
    /// Drives one tick: pumps the transport, handles any reassembled request, advances the
    /// scheduled-reset and session-timeout timers.
    pub fn server_poll(&mut self, dt: Duration) {
        let status = self.transport.poll(dt);
        if status.contains(PollStatus::TPORT_ERR) {
            log::error!("server transport error");
        }
        while let Some(payload) = self.transport.take_received() {
            self.handle_request(&payload);
            self.session_timer = Duration::ZERO;
        }

        self.session_timer += dt;
        if self.session_timer > self.session_timeout && self.session != SessionType::Default {
            log::info!("session timeout, reverting to Default");
            self.fire_session_timeout();
            self.session_timer = Duration::ZERO;
        }

        if let Some((remaining, sub_function)) = &mut self.pending_reset {
            if *remaining > dt {
                *remaining -= dt;
            } else {
                let sub_function = *sub_function;
                self.pending_reset = None;
                let _ = dispatch(
                    self,
                    EventKind::DoScheduledReset,
                    EventPayload::EcuReset { sub_function },
                );
            }
        }
    }

    fn fire_session_timeout(&mut self) {
        self.session = SessionType::Default;
        for node in &mut self.io_nodes {
            node.is_overridden = false;
        }
        for sec in &mut self.security_instances {
            sec.current_seed = 0;
        }
        self.file_session.close();
        let _ = dispatch(self, EventKind::SessionTimeout, EventPayload::SessionTimeout);
    }

    /// Schedules `DoScheduledReset` to fire after [`Self::power_down_time_ms`].
    pub fn schedule_reset(&mut self, sub_function: u8) {
        self.pending_reset = Some((Duration::from_millis(self.power_down_time_ms as u64), sub_function));
    }

    fn handle_request(&mut self, raw: &[u8]) {
        if raw.is_empty() {
            return;
        }
        let sid_byte = raw[0];
        let Some(sid) = Sid::from_request_byte(sid_byte) else {
            self.reply_nrc_raw(sid_byte, Nrc::ServiceNotSupported);
            return;
        };
        let result = match build_event(sid, &raw[1..]) {
            Ok((event, payload)) => dispatch(self, event, payload),
            Err(nrc) => DispatchResult::Nrc(nrc),
        };
        if std::mem::take(&mut self.suppress_response) {
            return;
        }
        match result {
            DispatchResult::Positive(body) => self.reply_positive(sid, &body),
            DispatchResult::ResponsePending => self.reply_nrc(sid, Nrc::RequestCorrectlyReceivedResponsePending),
            DispatchResult::Nrc(nrc) => self.reply_nrc(sid, nrc),
        }
    }

    /// Sends a positive response for `sid` with `body`.
    pub fn reply_positive(&mut self, sid: Sid, body: &[u8]) {
        let pdu = build_positive_response(sid, body);
        if let Err(e) = self.transport.send(pdu, false) {
            log::warn!("failed to send response: {e}");
        }
    }

    fn reply_nrc(&mut self, sid: Sid, nrc: Nrc) {
        let pdu = build_negative_response(sid, nrc);
        if let Err(e) = self.transport.send(pdu, false) {
            log::warn!("failed to send negative response: {e}");
        }
    }

    fn reply_nrc_raw(&mut self, sid_byte: u8, nrc: Nrc) {
        let pdu = vec![crate::uds::NEGATIVE_RESPONSE_SID, sid_byte, nrc.to_byte()];
        if let Err(e) = self.transport.send(pdu, false) {
            log::warn!("failed to send negative response: {e}");
        }
    }
}

/// Handle to a running [`spawn_over_io`] producer/consumer thread pair. Dropping it stops
/// both threads.
pub struct ServerHandle {
    running: Arc<AtomicBool>,
    join: Option<thread::JoinHandle<()>>,
    join2: Option<thread::JoinHandle<()>>,
}

impl ServerHandle {
    /// Stops both threads and waits for them to exit.
    pub fn stop(mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
        if let Some(j) = self.join2.take() {
            let _ = j.join();
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
        if let Some(j) = self.join2.take() {
            let _ = j.join();
        }
    }
}

/// Decodes a raw request body into the `(EventKind, EventPayload)` pair the dispatcher needs.
fn build_event(sid: Sid, body: &[u8]) -> Result<(EventKind, EventPayload), Nrc> {
    match sid {
        Sid::DiagnosticSessionControl => {
            let sub_function = *body.first().ok_or(Nrc::IncorrectMessageLengthOrInvalidFormat)?;
            Ok((EventKind::SessionControl, EventPayload::SessionControl { sub_function }))
        }
        Sid::EcuReset => {
            let sub_function = *body.first().ok_or(Nrc::IncorrectMessageLengthOrInvalidFormat)?;
            Ok((EventKind::EcuReset, EventPayload::EcuReset { sub_function }))
        }
        Sid::ReadDataByIdentifier => {
            if body.is_empty() || body.len() % 2 != 0 {
                return Err(Nrc::IncorrectMessageLengthOrInvalidFormat);
            }
            let dids = body.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect();
            Ok((EventKind::ReadDataByIdentifier, EventPayload::ReadDataByIdentifier { dids }))
        }
        Sid::WriteDataByIdentifier => {
            if body.len() < 2 {
                return Err(Nrc::IncorrectMessageLengthOrInvalidFormat);
            }
            let did = u16::from_be_bytes([body[0], body[1]]);
            Ok((
                EventKind::WriteDataByIdentifier,
                EventPayload::WriteDataByIdentifier { did, data: body[2..].to_vec() },
            ))
        }
        Sid::SecurityAccess => {
            let sub_function = *body.first().ok_or(Nrc::IncorrectMessageLengthOrInvalidFormat)?;
            if sub_function % 2 == 1 {
                Ok((
                    EventKind::SecurityRequestSeed,
                    EventPayload::SecurityRequestSeed { level: sub_function },
                ))
            } else {
                Ok((
                    EventKind::SecurityValidateKey,
                    EventPayload::SecurityValidateKey {
                        level: sub_function - 1,
                        key: body[1..].to_vec(),
                    },
                ))
            }
        }
        Sid::CommunicationControl => {
            if body.len() < 2 {
                return Err(Nrc::IncorrectMessageLengthOrInvalidFormat);
            }
            let control_type = body[0];
            let comm_type = body[1];
            let node_id = if body.len() >= 4 {
                Some(u16::from_be_bytes([body[2], body[3]]))
            } else {
                None
            };
            Ok((
                EventKind::CommunicationControl,
                EventPayload::CommunicationControl { control_type, comm_type, node_id },
            ))
        }
        Sid::IoControlByIdentifier => {
            if body.len() < 3 {
                return Err(Nrc::IncorrectMessageLengthOrInvalidFormat);
            }
            let did = u16::from_be_bytes([body[0], body[1]]);
            let action = body[2];
            Ok((
                EventKind::IoControl,
                EventPayload::IoControl { did, action, data: body[3..].to_vec() },
            ))
        }
        Sid::RoutineControl => {
            if body.len() < 3 {
                return Err(Nrc::IncorrectMessageLengthOrInvalidFormat);
            }
            let sub_function = body[0];
            let rid = u16::from_be_bytes([body[1], body[2]]);
            Ok((
                EventKind::RoutineControl,
                EventPayload::RoutineControl { sub_function, rid, options: body[3..].to_vec() },
            ))
        }
        Sid::RequestFileTransfer => {
            if body.is_empty() {
                return Err(Nrc::IncorrectMessageLengthOrInvalidFormat);
            }
            let mode = body[0];
            let path_len = *body.get(1).ok_or(Nrc::IncorrectMessageLengthOrInvalidFormat)? as usize;
            let path_bytes = body.get(2..2 + path_len).ok_or(Nrc::IncorrectMessageLengthOrInvalidFormat)?;
            let path = String::from_utf8_lossy(path_bytes).into_owned();
            let rest = &body[2 + path_len..];
            let file_size = parse_declared_file_size(rest);
            Ok((EventKind::RequestFileTransfer, EventPayload::RequestFileTransfer { mode, path, file_size }))
        }
        Sid::TransferData => {
            let sequence = *body.first().ok_or(Nrc::IncorrectMessageLengthOrInvalidFormat)?;
            Ok((EventKind::TransferData, EventPayload::TransferData { sequence, data: body[1..].to_vec() }))
        }
        Sid::RequestTransferExit => Ok((EventKind::RequestTransferExit, EventPayload::RequestTransferExit { data: body.to_vec() })),
        Sid::TesterPresent => {
            let sub_function = *body.first().ok_or(Nrc::IncorrectMessageLengthOrInvalidFormat)?;
            Ok((EventKind::TesterPresent, EventPayload::TesterPresent { sub_function }))
        }
    }
}

/// RequestFileTransfer carries `[dataFormatId, fileSizeParameterLength, fileSizeUnCompressed...]`
/// after the path for upload modes. Absent or zero-length means "unknown" (download side
/// determines size from `stat` instead).
fn parse_declared_file_size(rest: &[u8]) -> Option<u64> {
    if rest.len() < 2 {
        return None;
    }
    let size_len = rest[1] as usize;
    let size_bytes = rest.get(2..2 + size_len)?;
    let mut buf = [0u8; 8];
    let start = 8 - size_bytes.len().min(8);
    buf[start..].copy_from_slice(&size_bytes[size_bytes.len().saturating_sub(8)..]);
    Some(u64::from_be_bytes(buf))
}
