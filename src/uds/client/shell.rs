//! Interactive shell collaborator (§4.8). Owns a non-blocking input source (a background
//! stdin-reader thread feeding an `mpsc` channel, per the spec's stated contract — history and
//! autocompletion beyond raw line capture are explicitly out of scope), the heartbeat timer, a
//! command registry distinct from the response registry, and `.uds_history` persistence.

use super::{transaction, UdsClient, DEFAULT_TIMEOUT_MS};
use crate::error::DiagServerResult;
use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;

/// Why the shell loop returned.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ShellExit {
    /// User-initiated quit or EOF on stdin.
    User,
    /// The heartbeat monitor's disconnect callback fired.
    Timeout,
}

/// Cooperative tick: the loop services input, pumps the client, and checks the heartbeat, all
/// on one thread, at roughly this period.
const TICK: Duration = Duration::from_millis(20);

/// Cap on the remote-command/remote-file completion caches (§2 glossary: "bounded sets").
const CACHE_CAPACITY: usize = 256;

/// A bounded FIFO set used for the `help`/`ls` completion caches — oldest entry evicted once
/// `CACHE_CAPACITY` is exceeded.
#[derive(Debug, Default)]
struct BoundedCache {
    order: VecDeque<String>,
}

impl BoundedCache {
    fn insert(&mut self, value: String) {
        if self.order.contains(&value) {
            return;
        }
        if self.order.len() >= CACHE_CAPACITY {
            self.order.pop_front();
        }
        self.order.push_back(value);
    }

    fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

/// The interactive shell. Wraps one [`UdsClient`] with a prompt, a command registry, and
/// persisted history.
pub struct Shell {
    client: UdsClient,
    remote_path: String,
    input_rx: Receiver<String>,
    history: Vec<String>,
    history_path: PathBuf,
    remote_cmd_cache: BoundedCache,
    remote_file_cache: BoundedCache,
    disconnected: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl Shell {
    /// Builds a shell over `client`, spawning the background stdin-reader thread and loading
    /// `.uds_history` if present in the current directory.
    pub fn new(client: UdsClient) -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(l) => {
                        if tx.send(l).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        let history_path = PathBuf::from(".uds_history");
        let history = std::fs::read_to_string(&history_path)
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default();

        let mut client = client;
        let disconnected = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let disconnected_hook = disconnected.clone();
        client.set_disconnect_hook(Box::new(move || {
            disconnected_hook.store(true, std::sync::atomic::Ordering::SeqCst);
        }));

        Self {
            client,
            remote_path: "/".to_string(),
            input_rx: rx,
            history,
            history_path,
            remote_cmd_cache: BoundedCache::default(),
            remote_file_cache: BoundedCache::default(),
            disconnected,
        }
    }

    /// Runs the cooperative loop until the user quits/EOF or the disconnect hook fires.
    pub fn run(&mut self) -> ShellExit {
        loop {
            if let Ok(line) = self.input_rx.try_recv() {
                self.record_history(&line);
                if self.dispatch(&line) == Some(ShellExit::User) {
                    return ShellExit::User;
                }
            }

            self.client.poll(TICK);
            self.client.tick_heartbeat(TICK);

            if self.disconnected.load(std::sync::atomic::Ordering::SeqCst) {
                return ShellExit::Timeout;
            }

            thread::sleep(TICK);
        }
    }

    fn prompt(&self) -> String {
        format!("uds:{}> ", self.remote_path)
    }

    fn record_history(&mut self, line: &str) {
        self.history.push(line.to_string());
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.history_path) {
            let _ = writeln!(f, "{line}");
        }
    }

    /// Parses and runs one command line. Returns `Some(ShellExit::User)` to end the loop.
    fn dispatch(&mut self, line: &str) -> Option<ShellExit> {
        let mut parts = line.split_whitespace();
        let Some(cmd) = parts.next() else { return None };
        let args: Vec<&str> = parts.collect();

        let result = match cmd {
            "help" => {
                println!("help exit session auth er rdbi wdbi io cc rexec cd lls sy ry");
                Ok(())
            }
            "exit" => return Some(ShellExit::User),
            "session" => self.cmd_session(&args),
            "auth" => self.cmd_auth(&args),
            "er" => self.cmd_ecu_reset(&args),
            "rdbi" => self.cmd_rdbi(&args),
            "wdbi" => self.cmd_wdbi(&args),
            "io" => self.cmd_io(&args),
            "cc" => self.cmd_comm_control(&args),
            "cd" => {
                if let Some(path) = args.first() {
                    self.remote_path = path.to_string();
                }
                Ok(())
            }
            "lls" => self.cmd_rexec(&["ls".to_string()]),
            "sy" => self.cmd_upload(&args),
            "ry" => self.cmd_download(&args),
            "rexec" => self.cmd_rexec(&args.iter().map(|s| s.to_string()).collect::<Vec<_>>()),
            _ => self.cmd_rexec(&line.split_whitespace().map(str::to_string).collect::<Vec<_>>()),
        };

        if let Err(e) = result {
            println!("error: {e}");
        }
        print!("{}", self.prompt());
        let _ = std::io::stdout().flush();
        None
    }

    fn cmd_session(&mut self, args: &[&str]) -> DiagServerResult<()> {
        let sub_function = parse_u8(args.first())?;
        let body = transaction(&mut self.client, "session", DEFAULT_TIMEOUT_MS, |c| c.send_session_control(sub_function))?;
        println!("session -> {body:02X?}");
        Ok(())
    }

    fn cmd_auth(&mut self, args: &[&str]) -> DiagServerResult<()> {
        let level = parse_u8(args.first())?;
        let seed_body = transaction(&mut self.client, "auth-seed", DEFAULT_TIMEOUT_MS, |c| c.send_security_request_seed(level))?;
        // Full raw response is [SID, level, seed bytes...]; the level byte must not be
        // mistaken for part of the seed.
        let seed = &seed_body[2..];
        if seed.iter().all(|&b| b == 0) {
            println!("already unlocked at level 0x{level:02X}");
            return Ok(());
        }
        // Demonstration-only: mirrors the server's XorDemoAlgorithm with an empty secret.
        // A real deployment supplies the shared secret out of band.
        let key: Vec<u8> = seed.to_vec();
        let resp = transaction(&mut self.client, "auth-key", DEFAULT_TIMEOUT_MS, |c| c.send_security_validate_key(level, &key))?;
        println!("auth -> {resp:02X?}");
        Ok(())
    }

    fn cmd_ecu_reset(&mut self, args: &[&str]) -> DiagServerResult<()> {
        let sub_function = parse_u8(args.first())?;
        let body = transaction(&mut self.client, "er", DEFAULT_TIMEOUT_MS, |c| c.send_ecu_reset(sub_function))?;
        println!("reset -> {body:02X?}");
        Ok(())
    }

    fn cmd_rdbi(&mut self, args: &[&str]) -> DiagServerResult<()> {
        let did = parse_u16(args.first())?;
        let body = transaction(&mut self.client, "rdbi", DEFAULT_TIMEOUT_MS, |c| c.send_read_data_by_identifier(&[did]))?;
        println!("rdbi 0x{did:04X} -> {body:02X?}");
        Ok(())
    }

    fn cmd_wdbi(&mut self, args: &[&str]) -> DiagServerResult<()> {
        let did = parse_u16(args.first())?;
        let data: Vec<u8> = args[1..].iter().map(|s| parse_byte(s)).collect::<Result<_, _>>()?;
        let body = transaction(&mut self.client, "wdbi", DEFAULT_TIMEOUT_MS, |c| c.send_write_data_by_identifier(did, &data))?;
        println!("wdbi -> {body:02X?}");
        Ok(())
    }

    fn cmd_io(&mut self, args: &[&str]) -> DiagServerResult<()> {
        let did = parse_u16(args.first())?;
        let action = parse_u8(args.get(1))?;
        let data: Vec<u8> = args[2..].iter().map(|s| parse_byte(s)).collect::<Result<_, _>>()?;
        let body = transaction(&mut self.client, "io", DEFAULT_TIMEOUT_MS, |c| c.send_io_control(did, action, &data))?;
        println!("io -> {body:02X?}");
        Ok(())
    }

    fn cmd_comm_control(&mut self, args: &[&str]) -> DiagServerResult<()> {
        let ctrl = parse_u8(args.first())?;
        let comm = args.get(1).map(|s| parse_byte(s)).transpose()?.unwrap_or(0x03);
        let node_id = args.get(2).map(|s| parse_u16(Some(s))).transpose()?;
        let body = transaction(&mut self.client, "cc", DEFAULT_TIMEOUT_MS, |c| c.send_communication_control(ctrl, comm, node_id))?;
        println!("cc -> {body:02X?}");
        Ok(())
    }

    fn cmd_rexec(&mut self, words: &[String]) -> DiagServerResult<()> {
        let command = words.join(" ");
        self.remote_cmd_cache.insert(words.first().cloned().unwrap_or_default());
        let options = command.into_bytes();
        let body = transaction(&mut self.client, "rexec", 5000, |c| c.send_routine_control(0x01, 0xF000, &options))?;
        // Full raw response is [SID, sub_function, RID_hi, RID_lo, captured output...].
        let output = String::from_utf8_lossy(&body[4..]);
        print!("{output}");
        Ok(())
    }

    fn cmd_upload(&mut self, args: &[&str]) -> DiagServerResult<()> {
        let Some(local_path) = args.first() else {
            return Err(crate::error::DiagError::ParameterInvalid("sy <local_path>".into()));
        };
        let data = std::fs::read(local_path)?;
        let remote_path = format!("{}/{}", self.remote_path, local_path);
        let open = transaction(&mut self.client, "sy-open", DEFAULT_TIMEOUT_MS, |c| {
            c.send_request_file_transfer(0x01, &remote_path, Some(data.len() as u64))
        })?;
        // Full raw response is [SID, mode, lengthFormat, maxBlockLen_hi, maxBlockLen_lo]; each
        // TransferData frame carries a 2-byte [sequence, ...] header inside that negotiated max.
        if open.len() < 5 {
            return Err(crate::error::DiagError::InvalidResponseLength);
        }
        let negotiated_max = u16::from_be_bytes([open[3], open[4]]) as usize;
        let chunk_len = negotiated_max.saturating_sub(2).max(1);
        for (seq, chunk) in data.chunks(chunk_len).enumerate() {
            transaction(&mut self.client, "sy-chunk", DEFAULT_TIMEOUT_MS, |c| {
                c.send_transfer_data(seq as u8, chunk)
            })?;
        }
        let crc = crc32fast::hash(&data);
        transaction(&mut self.client, "sy-exit", DEFAULT_TIMEOUT_MS, |c| {
            c.send_request_transfer_exit(&crc.to_be_bytes())
        })?;
        self.remote_file_cache.insert(remote_path);
        println!("uploaded {} bytes", data.len());
        Ok(())
    }

    fn cmd_download(&mut self, args: &[&str]) -> DiagServerResult<()> {
        let Some(remote_path) = args.first() else {
            return Err(crate::error::DiagError::ParameterInvalid("ry <remote_path>".into()));
        };
        let open = transaction(&mut self.client, "ry-open", DEFAULT_TIMEOUT_MS, |c| {
            c.send_request_file_transfer(0x04, remote_path, None)
        })?;
        if open.len() < 8 {
            return Err(crate::error::DiagError::InvalidResponseLength);
        }
        let mut out = Vec::new();
        let mut seq: u8 = 0;
        loop {
            let chunk = transaction(&mut self.client, "ry-chunk", DEFAULT_TIMEOUT_MS, |c| c.send_transfer_data(seq, &[]))?;
            // Full raw response is [SID, sequence, data...].
            let data = &chunk[2..];
            if data.is_empty() {
                break;
            }
            out.extend_from_slice(data);
            seq = seq.wrapping_add(1);
        }
        transaction(&mut self.client, "ry-exit", DEFAULT_TIMEOUT_MS, |c| c.send_request_transfer_exit(&[]))?;
        let local_name = remote_path.rsplit('/').next().unwrap_or(remote_path);
        if let Err(e) = std::fs::write(local_name, &out) {
            let _ = std::fs::remove_file(local_name);
            return Err(e.into());
        }
        println!("downloaded {} bytes to {local_name}", out.len());
        Ok(())
    }
}

fn parse_u8(arg: Option<&&str>) -> DiagServerResult<u8> {
    let s = arg.ok_or_else(|| crate::error::DiagError::ParameterInvalid("missing argument".into()))?;
    parse_byte(s)
}

fn parse_byte(s: &str) -> DiagServerResult<u8> {
    let s = s.trim_start_matches("0x").trim_start_matches("0X");
    u8::from_str_radix(s, 16).map_err(|e| crate::error::DiagError::ParameterInvalid(e.to_string()))
}

fn parse_u16(arg: Option<&&str>) -> DiagServerResult<u16> {
    let s = arg.ok_or_else(|| crate::error::DiagError::ParameterInvalid("missing argument".into()))?;
    let s = s.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(s, 16).map_err(|e| crate::error::DiagError::ParameterInvalid(e.to_string()))
}
