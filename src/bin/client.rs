//! `uds-client`: an interactive tester shell wrapping [`uds_diag::uds::client`] over a real
//! `SocketCAN` interface.

use clap::Parser;
use uds_diag::config::{parse_can_id, AddressSet};
use uds_diag::frame::FrameIo;
use uds_diag::isotp::{IsoTpSettings, IsoTpTransport};
use uds_diag::uds::client::shell::{Shell, ShellExit};
use uds_diag::uds::client::UdsClient;

/// Interactive UDS tester shell.
#[derive(Parser, Debug)]
#[command(name = "uds-client")]
struct Cli {
    /// CAN interface name (e.g. vcan0, can0).
    #[arg(short = 'i', long, default_value = "vcan0")]
    iface: String,
    /// The tester's physical request id (what this client sends on), hex or decimal.
    #[arg(short = 's', long = "src", default_value = "0x7E0")]
    src_id: String,
    /// The ECU's physical response id this client listens on, hex or decimal.
    #[arg(short = 't', long = "target", default_value = "0x7E8")]
    target_id: String,
    /// Functional (broadcast) request id to send on, hex or decimal.
    #[arg(short = 'f', long = "func", default_value = "0x7DF")]
    func_id: String,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let src_id = match parse_can_id(&cli.src_id) {
        Ok(id) => id,
        Err(e) => {
            eprintln!("invalid -s value: {e}");
            std::process::exit(2);
        }
    };
    let target_id = match parse_can_id(&cli.target_id) {
        Ok(id) => id,
        Err(e) => {
            eprintln!("invalid -t value: {e}");
            std::process::exit(2);
        }
    };
    let func_id = match parse_can_id(&cli.func_id) {
        Ok(id) => id,
        Err(e) => {
            eprintln!("invalid -f value: {e}");
            std::process::exit(2);
        }
    };
    let addresses = AddressSet {
        phys_source: src_id,
        phys_target: target_id,
        func_source: func_id,
    };

    #[cfg(feature = "socketcan")]
    let io: Box<dyn FrameIo> = match uds_diag::socketcan_io::SocketCanIo::open(&cli.iface) {
        Ok(io) => Box::new(io),
        Err(e) => {
            eprintln!("failed to open {}: {e}", cli.iface);
            std::process::exit(1);
        }
    };
    #[cfg(not(feature = "socketcan"))]
    let io: Box<dyn FrameIo> = {
        eprintln!("this build has no CAN backend compiled in (enable the 'socketcan' feature)");
        std::process::exit(1);
    };

    let transport = IsoTpTransport::new(
        io,
        addresses.phys_source,
        addresses.phys_target,
        None,
        IsoTpSettings::default(),
    );
    let client = UdsClient::new(transport);
    let mut shell = Shell::new(client);

    println!("uds-client connected on {} (tx 0x{:X}, rx 0x{:X})", cli.iface, addresses.phys_source, addresses.phys_target);
    match shell.run() {
        ShellExit::User => std::process::exit(0),
        ShellExit::Timeout => {
            eprintln!("disconnected: heartbeat lost");
            std::process::exit(1);
        }
    }
}
