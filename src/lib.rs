#![deny(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_imports,
    unused_import_braces,
    unused_qualifications
)]

//! A crate implementing a bidirectional UDS (ISO 14229) diagnostic system over ISO-TP (ISO
//! 15765-2) on a CAN transport: a server (the device under diagnosis) and a client (the tester,
//! which also drives an interactive shell).
//!
//! ## Layout
//!
//! - [`frame`] — the raw CAN frame I/O boundary (`FrameIo`), isolated from any particular driver.
//! - [`isotp`] — ISO-TP segmentation/reassembly and the `IsoTpTransport` built on `frame`.
//! - [`uds`] — the UDS protocol core: PDU framing, the [`uds::server`] dispatcher and service
//!   handlers, and the [`uds::client`] transaction engine and interactive shell.
//! - [`config`] — `Config`/`AddressSet`/`IsoTpSettings` TOML (de)serialization shared by both
//!   binaries.
//! - [`console`] / [`shell_exec`] — the remote-console capture sink and shell-executor seams
//!   used by `RoutineControl` 0xF000.
//! - [`error`] / [`nrc`] — crate-wide error types and ISO 14229 Negative Response Codes.
//!
//! Two thin binaries, `uds-server` and `uds-client`, are layered on top of this library.

pub mod config;
pub mod console;
pub mod error;
pub mod frame;
pub mod isotp;
pub mod nrc;
pub mod shell_exec;
#[cfg(feature = "socketcan")]
pub mod socketcan_io;
pub mod uds;

pub use error::{DiagError, DiagServerResult};
