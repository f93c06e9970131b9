//! Default service node registration. Each submodule owns one or a few UDS services and
//! exposes a `register(table: &mut EventTable)` function; [`register_defaults`] wires all of
//! them into a fresh server's dispatch table at construction time.

pub mod communication_control;
pub mod data_identifier;
pub mod ecu_reset;
pub mod file_transfer;
pub mod io_control;
pub mod routine_control;
pub mod security_access;
pub mod session_control;
pub mod tester_present;

use super::dispatch::EventTable;

/// Registers every default service handler this crate implements.
pub fn register_defaults(table: &mut EventTable) {
    session_control::register(table);
    ecu_reset::register(table);
    data_identifier::register(table);
    security_access::register(table);
    communication_control::register(table);
    io_control::register(table);
    routine_control::register(table);
    file_transfer::register(table);
    tester_present::register(table);
}
