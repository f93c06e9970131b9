//! 0x11 ECUReset. Accepts HardReset/KeyOffOn/SoftReset, replies immediately, then schedules
//! `DoScheduledReset` after `power_down_time_ms` to perform the physical reset.

use crate::nrc::Nrc;
use crate::uds::event::{EventKind, EventPayload};
use crate::uds::server::dispatch::{priority, EventTable, HandlerOutcome, ServiceNode};

const HARD_RESET: u8 = 0x01;
const KEY_OFF_ON: u8 = 0x02;
const SOFT_RESET: u8 = 0x03;

/// Registers the ECUReset handler and the deferred scheduled-reset handler.
pub fn register(table: &mut EventTable) {
    table.register(ServiceNode {
        event: EventKind::EcuReset,
        priority: priority::NORMAL,
        name: "ecu_reset",
        handler: Box::new(|server, payload| {
            let EventPayload::EcuReset { sub_function } = payload else {
                return HandlerOutcome::NotMine;
            };
            match *sub_function {
                HARD_RESET | KEY_OFF_ON | SOFT_RESET => {
                    server.schedule_reset(*sub_function);
                    HandlerOutcome::Positive(vec![*sub_function])
                }
                _ => HandlerOutcome::Nrc(Nrc::SubFunctionNotSupported),
            }
        }),
    });

    table.register(ServiceNode {
        event: EventKind::DoScheduledReset,
        priority: priority::NORMAL,
        name: "do_scheduled_reset",
        handler: Box::new(|server, payload| {
            let EventPayload::EcuReset { sub_function } = payload else {
                return HandlerOutcome::NotMine;
            };
            log::info!("performing scheduled reset (sub-function 0x{sub_function:02X})");
            (server.reset_hook)(*sub_function);
            HandlerOutcome::Continue
        }),
    });
}
