//! 0x38 RequestFileTransfer / 0x36 TransferData / 0x37 RequestTransferExit. At most one file
//! transfer is active at a time, tracked in `server.file_session`. A running CRC-32 (reflected,
//! ISO-HDLC, matching `crc32fast`'s default) is kept over the bytes written or read so far and
//! checked/returned on `RequestTransferExit`.

use crate::nrc::Nrc;
use crate::uds::event::{EventKind, EventPayload};
use crate::uds::server::dispatch::{priority, EventTable, HandlerOutcome, ServiceNode};
use crate::uds::server::{FileSessionMode, UdsServer};
use std::io::{Read, Seek, SeekFrom, Write};

const ADD_FILE: u8 = 0x01;
const DELETE_FILE: u8 = 0x02;
const REPLACE_FILE: u8 = 0x03;
const READ_FILE: u8 = 0x04;

/// Max bytes returned per TransferData response block, negotiated loosely: this crate simply
/// fixes it rather than parsing the client's requested block size out of RequestFileTransfer.
const DEFAULT_BLOCK_LEN: usize = 4093;

/// Registers the three file-transfer handlers.
pub fn register(table: &mut EventTable) {
    table.register(ServiceNode {
        event: EventKind::RequestFileTransfer,
        priority: priority::NORMAL,
        name: "request_file_transfer",
        handler: Box::new(|server, payload| {
            let EventPayload::RequestFileTransfer { mode, path, file_size } = payload else {
                return HandlerOutcome::NotMine;
            };
            handle_request_file_transfer(server, *mode, path, *file_size)
        }),
    });

    table.register(ServiceNode {
        event: EventKind::TransferData,
        priority: priority::NORMAL,
        name: "transfer_data",
        handler: Box::new(|server, payload| {
            let EventPayload::TransferData { sequence, data } = payload else {
                return HandlerOutcome::NotMine;
            };
            handle_transfer_data(server, *sequence, data)
        }),
    });

    table.register(ServiceNode {
        event: EventKind::RequestTransferExit,
        priority: priority::NORMAL,
        name: "request_transfer_exit",
        handler: Box::new(|server, payload| {
            let EventPayload::RequestTransferExit { data } = payload else {
                return HandlerOutcome::NotMine;
            };
            handle_request_transfer_exit(server, data)
        }),
    });
}

/// Folds `data` into a running CRC-32 (ISO-HDLC, reflected) continued from `prior`.
fn advance_crc(prior: u32, data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new_with_initial(prior);
    hasher.update(data);
    hasher.finalize()
}

fn handle_request_file_transfer(
    server: &mut UdsServer,
    mode: u8,
    path: &str,
    file_size: Option<u64>,
) -> HandlerOutcome {
    if server.file_session.mode != FileSessionMode::Idle {
        return HandlerOutcome::Nrc(Nrc::ConditionsNotCorrect);
    }

    match mode {
        ADD_FILE | REPLACE_FILE => {
            let file = std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path);
            let Ok(file) = file else {
                return HandlerOutcome::Nrc(Nrc::GeneralProgrammingFailure);
            };
            server.file_session.fd = Some(file);
            server.file_session.mode = FileSessionMode::Writing;
            server.file_session.current_path = path.to_string();
            server.file_session.current_pos = 0;
            server.file_session.total_size = file_size.unwrap_or(0);
            server.file_session.current_crc = 0;
            server.file_session.max_block_len = DEFAULT_BLOCK_LEN;

            let mut body = vec![mode];
            body.push(2);
            body.extend_from_slice(&(DEFAULT_BLOCK_LEN as u16).to_be_bytes());
            HandlerOutcome::Positive(body)
        }
        READ_FILE => {
            let file = std::fs::File::open(path);
            let Ok(mut file) = file else {
                return HandlerOutcome::Nrc(Nrc::RequestOutOfRange);
            };
            let Ok(size) = file.seek(SeekFrom::End(0)) else {
                return HandlerOutcome::Nrc(Nrc::GeneralProgrammingFailure);
            };
            if file.seek(SeekFrom::Start(0)).is_err() {
                return HandlerOutcome::Nrc(Nrc::GeneralProgrammingFailure);
            }
            server.file_session.fd = Some(file);
            server.file_session.mode = FileSessionMode::Reading;
            server.file_session.current_path = path.to_string();
            server.file_session.current_pos = 0;
            server.file_session.total_size = size;
            server.file_session.current_crc = 0;
            server.file_session.max_block_len = DEFAULT_BLOCK_LEN;

            let mut body = vec![mode];
            body.push(2);
            body.extend_from_slice(&(DEFAULT_BLOCK_LEN as u16).to_be_bytes());
            body.push(8);
            body.extend_from_slice(&size.to_be_bytes());
            HandlerOutcome::Positive(body)
        }
        DELETE_FILE => {
            if std::fs::remove_file(path).is_err() {
                return HandlerOutcome::Nrc(Nrc::RequestOutOfRange);
            }
            HandlerOutcome::Positive(vec![mode])
        }
        _ => HandlerOutcome::Nrc(Nrc::RequestOutOfRange),
    }
}

fn handle_transfer_data(server: &mut UdsServer, sequence: u8, data: &[u8]) -> HandlerOutcome {
    match server.file_session.mode {
        FileSessionMode::Writing => {
            let Some(fd) = server.file_session.fd.as_mut() else {
                return HandlerOutcome::Nrc(Nrc::RequestSequenceError);
            };
            if fd.write_all(data).is_err() {
                return HandlerOutcome::Nrc(Nrc::GeneralProgrammingFailure);
            }
            server.file_session.current_crc = advance_crc(server.file_session.current_crc, data);
            server.file_session.current_pos += data.len() as u64;
            HandlerOutcome::Positive(vec![sequence])
        }
        FileSessionMode::Reading => {
            let remaining = server.file_session.total_size.saturating_sub(server.file_session.current_pos);
            let chunk_len = remaining.min(server.file_session.max_block_len as u64) as usize;
            let mut buf = vec![0u8; chunk_len];
            let Some(fd) = server.file_session.fd.as_mut() else {
                return HandlerOutcome::Nrc(Nrc::RequestSequenceError);
            };
            if fd.read_exact(&mut buf).is_err() {
                return HandlerOutcome::Nrc(Nrc::GeneralProgrammingFailure);
            }
            server.file_session.current_crc = advance_crc(server.file_session.current_crc, &buf);
            server.file_session.current_pos += chunk_len as u64;
            let mut body = vec![sequence];
            body.extend_from_slice(&buf);
            HandlerOutcome::Positive(body)
        }
        FileSessionMode::Idle => HandlerOutcome::Nrc(Nrc::RequestSequenceError),
    }
}

fn handle_request_transfer_exit(server: &mut UdsServer, data: &[u8]) -> HandlerOutcome {
    if server.file_session.mode == FileSessionMode::Idle {
        return HandlerOutcome::Nrc(Nrc::RequestSequenceError);
    }
    let mode = server.file_session.mode;
    let crc = server.file_session.current_crc;

    if mode == FileSessionMode::Writing {
        if let Some(fd) = server.file_session.fd.as_mut() {
            let _ = fd.flush();
        }
        if data.len() >= 4 {
            let expected = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
            if expected != crc {
                let partial_path = server.file_session.current_path.clone();
                server.file_session.close();
                let _ = std::fs::remove_file(&partial_path);
                return HandlerOutcome::Nrc(Nrc::GeneralProgrammingFailure);
            }
        }
    }

    server.file_session.close();
    let mut body = Vec::new();
    if mode == FileSessionMode::Reading {
        body.extend_from_slice(&crc.to_be_bytes());
    }
    HandlerOutcome::Positive(body)
}
