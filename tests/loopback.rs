//! End-to-end client/server exercise over an in-process [`LoopbackFrameIo`] pair, standing in
//! for `tests/uds_sim_ecu.rs`'s fake-channel approach but driving the real client/server state
//! machines instead of a callback stub.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use uds_diag::frame::FrameIo;
use uds_diag::isotp::{IsoTpSettings, IsoTpTransport, LoopbackFrameIo};
use uds_diag::uds::client::{transaction, UdsClient, DEFAULT_TIMEOUT_MS};
use uds_diag::uds::server::UdsServer;

const TICK: Duration = Duration::from_millis(5);

fn build_pair() -> (UdsServer, UdsClient) {
    let (server_io, client_io) = LoopbackFrameIo::pair();
    let server_transport = IsoTpTransport::new(
        Box::new(server_io) as Box<dyn FrameIo>,
        0x7E8,
        0x7E0,
        Some(0x7DF),
        IsoTpSettings::default(),
    );
    let client_transport = IsoTpTransport::new(
        Box::new(client_io) as Box<dyn FrameIo>,
        0x7E0,
        0x7E8,
        None,
        IsoTpSettings::default(),
    );
    (UdsServer::new(server_transport), UdsClient::new(client_transport))
}

/// Spawns the server's poll loop on a background thread, returning a handle that stops it.
fn spawn_server(mut server: UdsServer) -> impl FnOnce() {
    let running = Arc::new(AtomicBool::new(true));
    let running_thread = running.clone();
    let join = thread::spawn(move || {
        while running_thread.load(Ordering::Relaxed) {
            server.server_poll(TICK);
            thread::sleep(TICK);
        }
    });
    move || {
        running.store(false, Ordering::Relaxed);
        join.join().unwrap();
    }
}

#[test]
fn read_data_by_identifier_round_trips_through_general_backend() {
    let (mut server, mut client) = build_pair();
    server
        .data_general
        .write(0xF190, b"VIN1234567890ABC")
        .unwrap();
    let stop = spawn_server(server);

    let resp = transaction(&mut client, "rdbi", DEFAULT_TIMEOUT_MS, |c| {
        c.send_read_data_by_identifier(&[0xF190])
    })
    .expect("rdbi should succeed");

    assert_eq!(&resp[1..3], &[0xF1, 0x90]);
    assert_eq!(&resp[3..], b"VIN1234567890ABC");
    stop();
}

#[test]
fn write_data_by_identifier_then_read_back() {
    let (server, mut client) = build_pair();
    let stop = spawn_server(server);

    transaction(&mut client, "wdbi", DEFAULT_TIMEOUT_MS, |c| {
        c.send_write_data_by_identifier(0x0100, b"hello")
    })
    .expect("wdbi should succeed");

    let resp = transaction(&mut client, "rdbi", DEFAULT_TIMEOUT_MS, |c| {
        c.send_read_data_by_identifier(&[0x0100])
    })
    .expect("rdbi should succeed");
    assert_eq!(&resp[3..], b"hello");
    stop();
}

#[test]
fn unknown_data_identifier_yields_request_out_of_range() {
    let (server, mut client) = build_pair();
    let stop = spawn_server(server);

    let err = transaction(&mut client, "rdbi", DEFAULT_TIMEOUT_MS, |c| {
        c.send_read_data_by_identifier(&[0xBEEF])
    })
    .unwrap_err();
    assert!(matches!(err, uds_diag::DiagError::Nrc { nrc: uds_diag::nrc::Nrc::RequestOutOfRange }));
    stop();
}

#[test]
fn session_control_changes_session_and_reports_timing() {
    let (server, mut client) = build_pair();
    let stop = spawn_server(server);

    let resp = transaction(&mut client, "session", DEFAULT_TIMEOUT_MS, |c| {
        c.send_session_control(0x03)
    })
    .expect("session change should succeed");
    assert_eq!(resp[1], 0x03);
    assert_eq!(client.p2_ms, u16::from_be_bytes([resp[2], resp[3]]) as u32);
    stop();
}

#[test]
fn security_access_rejects_wrong_key() {
    let (mut server, mut client) = build_pair();
    server.security_instances.push(uds_diag::uds::server::SecurityInstance {
        supported_level: 0x01,
        secret_key: b"secret".to_vec(),
        current_seed: 0,
        algorithm: Box::new(uds_diag::uds::server::XorDemoAlgorithm),
    });
    let stop = spawn_server(server);

    transaction(&mut client, "seed", DEFAULT_TIMEOUT_MS, |c| {
        c.send_security_request_seed(0x01)
    })
    .expect("seed request should succeed");

    let err = transaction(&mut client, "key", DEFAULT_TIMEOUT_MS, |c| {
        c.send_security_validate_key(0x01, b"wrong-key-bytes!")
    })
    .unwrap_err();
    assert!(matches!(err, uds_diag::DiagError::Nrc { nrc: uds_diag::nrc::Nrc::InvalidKey }));
    stop();
}

#[test]
fn security_access_succeeds_with_correct_key() {
    use uds_diag::uds::server::{SeedKeyAlgorithm, SecurityInstance, XorDemoAlgorithm};

    let (mut server, mut client) = build_pair();
    server.security_instances.push(SecurityInstance {
        supported_level: 0x01,
        secret_key: b"secret".to_vec(),
        current_seed: 0,
        algorithm: Box::new(XorDemoAlgorithm),
    });
    let stop = spawn_server(server);

    let seed_resp = transaction(&mut client, "seed", DEFAULT_TIMEOUT_MS, |c| {
        c.send_security_request_seed(0x01)
    })
    .expect("seed request should succeed");
    // Full raw response is [SID, level, seed bytes...].
    let seed = u32::from_be_bytes([seed_resp[2], seed_resp[3], seed_resp[4], seed_resp[5]]);
    assert_ne!(seed, 0, "a locked level must return a non-zero seed");

    let key = XorDemoAlgorithm.compute_key(seed, b"secret");
    let resp = transaction(&mut client, "key", DEFAULT_TIMEOUT_MS, |c| {
        c.send_security_validate_key(0x01, &key)
    })
    .expect("validate-key with the correct key should succeed");
    assert_eq!(resp[1], 0x02);
    stop();
}

#[test]
fn file_transfer_round_trip_preserves_bytes_and_crc() {
    let (server, mut client) = build_pair();
    let stop = spawn_server(server);

    let remote_path = std::env::temp_dir()
        .join("uds_diag_loopback_round_trip.bin")
        .to_string_lossy()
        .to_string();
    let payload = b"the quick brown fox jumps over the lazy dog, several times over".to_vec();

    let open = transaction(&mut client, "sy-open", DEFAULT_TIMEOUT_MS, |c| {
        c.send_request_file_transfer(0x01, &remote_path, Some(payload.len() as u64))
    })
    .expect("open-for-write should succeed");
    let negotiated_max = u16::from_be_bytes([open[3], open[4]]) as usize;
    let chunk_len = negotiated_max.saturating_sub(2).max(1);

    for (seq, chunk) in payload.chunks(chunk_len).enumerate() {
        transaction(&mut client, "sy-chunk", DEFAULT_TIMEOUT_MS, |c| {
            c.send_transfer_data(seq as u8, chunk)
        })
        .expect("transfer-data chunk should succeed");
    }
    let crc = crc32fast::hash(&payload);
    transaction(&mut client, "sy-exit", DEFAULT_TIMEOUT_MS, |c| {
        c.send_request_transfer_exit(&crc.to_be_bytes())
    })
    .expect("matching CRC should be accepted");
    assert_eq!(std::fs::read(&remote_path).unwrap(), payload);

    let open = transaction(&mut client, "ry-open", DEFAULT_TIMEOUT_MS, |c| {
        c.send_request_file_transfer(0x04, &remote_path, None)
    })
    .expect("open-for-read should succeed");
    assert!(open.len() >= 8);

    let mut out = Vec::new();
    let mut seq: u8 = 0;
    loop {
        let chunk = transaction(&mut client, "ry-chunk", DEFAULT_TIMEOUT_MS, |c| {
            c.send_transfer_data(seq, &[])
        })
        .expect("transfer-data read should succeed");
        let data = &chunk[2..];
        if data.is_empty() {
            break;
        }
        out.extend_from_slice(data);
        seq = seq.wrapping_add(1);
    }
    transaction(&mut client, "ry-exit", DEFAULT_TIMEOUT_MS, |c| {
        c.send_request_transfer_exit(&[])
    })
    .expect("read-side exit should succeed");

    assert_eq!(out, payload);
    let _ = std::fs::remove_file(&remote_path);
    stop();
}

#[test]
fn file_transfer_exit_with_bad_crc_deletes_partial_file() {
    let (server, mut client) = build_pair();
    let stop = spawn_server(server);

    let remote_path = std::env::temp_dir()
        .join("uds_diag_loopback_bad_crc.bin")
        .to_string_lossy()
        .to_string();

    transaction(&mut client, "sy-open", DEFAULT_TIMEOUT_MS, |c| {
        c.send_request_file_transfer(0x01, &remote_path, Some(4))
    })
    .expect("open-for-write should succeed");
    transaction(&mut client, "sy-chunk", DEFAULT_TIMEOUT_MS, |c| {
        c.send_transfer_data(0, b"data")
    })
    .expect("transfer-data chunk should succeed");

    let err = transaction(&mut client, "sy-exit", DEFAULT_TIMEOUT_MS, |c| {
        c.send_request_transfer_exit(&0xDEAD_BEEFu32.to_be_bytes())
    })
    .unwrap_err();
    assert!(matches!(
        err,
        uds_diag::DiagError::Nrc { nrc: uds_diag::nrc::Nrc::GeneralProgrammingFailure }
    ));
    assert!(!std::path::Path::new(&remote_path).exists());
    stop();
}

#[test]
fn tester_present_with_suppress_bit_yields_no_response() {
    use uds_diag::uds::client::ClientState;

    let (server, mut client) = build_pair();
    let stop = spawn_server(server);

    client.prepare();
    client
        .send_raw(vec![0x3E, 0x80], false)
        .expect("send should succeed");
    // The server discards its reply entirely; the client should sit in AwaitResponse
    // indefinitely rather than ever observing a response.
    for _ in 0..20 {
        client.poll(TICK);
        thread::sleep(TICK);
    }
    assert_eq!(client.state(), ClientState::AwaitResponse);
    stop();
}
