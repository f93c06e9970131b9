//! `uds-server`: a thin binary wrapping [`uds_diag::uds::server::spawn_over_io`] over a real
//! `SocketCAN` interface.

use clap::Parser;
use uds_diag::config::{parse_can_id, Config};
use uds_diag::uds::server::spawn_over_io;

/// UDS diagnostic server (device under diagnosis side).
#[derive(Parser, Debug)]
#[command(name = "uds-server")]
struct Cli {
    /// CAN interface name (e.g. vcan0, can0).
    #[arg(short = 'i', long)]
    iface: Option<String>,
    /// The server's receive id (the client's physical source id), hex or decimal.
    #[arg(short = 's', long = "src")]
    rx_id: Option<String>,
    /// The server's send id (the client's physical target id), hex or decimal.
    #[arg(short = 't', long = "target")]
    tx_id: Option<String>,
    /// Functional (broadcast) request id the server also listens on.
    #[arg(short = 'f', long = "func")]
    func_id: Option<String>,
    /// Path to a TOML config file; CLI flags override individual fields.
    #[arg(long)]
    config: Option<String>,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let mut cfg = match &cli.config {
        Some(path) => match Config::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("failed to load config {path}: {e}");
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };

    if let Some(iface) = &cli.iface {
        cfg.interface_name = iface.clone();
    }
    if let Err(e) = apply_id_override(&cli.rx_id, &mut cfg.addresses.phys_source) {
        eprintln!("invalid -s value: {e}");
        std::process::exit(2);
    }
    if let Err(e) = apply_id_override(&cli.tx_id, &mut cfg.addresses.phys_target) {
        eprintln!("invalid -t value: {e}");
        std::process::exit(2);
    }
    if let Err(e) = apply_id_override(&cli.func_id, &mut cfg.addresses.func_source) {
        eprintln!("invalid -f value: {e}");
        std::process::exit(2);
    }

    #[cfg(feature = "socketcan")]
    let handle = {
        let io = match uds_diag::socketcan_io::SocketCanIo::open(&cfg.interface_name) {
            Ok(io) => io,
            Err(e) => {
                eprintln!("failed to open {}: {e}", cfg.interface_name);
                std::process::exit(1);
            }
        };
        spawn_over_io(io, &cfg)
    };
    #[cfg(not(feature = "socketcan"))]
    let handle = {
        eprintln!("this build has no CAN backend compiled in (enable the 'socketcan' feature)");
        std::process::exit(1);
    };

    log::info!(
        "uds-server listening on {} (rx 0x{:X}, tx 0x{:X}, func 0x{:X})",
        cfg.interface_name,
        cfg.addresses.phys_source,
        cfg.addresses.phys_target,
        cfg.addresses.func_source
    );

    // No signal-handling crate in the dependency stack; block forever and let Ctrl-C terminate
    // the process outright (the spawned threads exit with it). `handle` is kept alive so its
    // threads aren't joined and torn down by `Drop` while still parked here.
    std::mem::forget(handle);
    loop {
        std::thread::park();
    }
}

fn apply_id_override(raw: &Option<String>, slot: &mut u32) -> Result<(), std::num::ParseIntError> {
    if let Some(raw) = raw {
        *slot = parse_can_id(raw)?;
    }
    Ok(())
}
