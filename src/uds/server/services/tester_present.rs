//! 0x3E TesterPresent. Resets the session-timeout clock on every tick via the generic
//! `handle_request` path; this handler only deals with the suppress-positive-response bit.

use crate::nrc::Nrc;
use crate::uds::event::{EventKind, EventPayload};
use crate::uds::server::dispatch::{priority, EventTable, HandlerOutcome, ServiceNode};

const SUPPRESS_POSITIVE_RESPONSE: u8 = 0x80;
const ZERO_SUB_FUNCTION: u8 = 0x00;

/// Registers the TesterPresent handler.
pub fn register(table: &mut EventTable) {
    table.register(ServiceNode {
        event: EventKind::TesterPresent,
        priority: priority::NORMAL,
        name: "tester_present",
        handler: Box::new(|server, payload| {
            let EventPayload::TesterPresent { sub_function } = payload else {
                return HandlerOutcome::NotMine;
            };
            if sub_function & !SUPPRESS_POSITIVE_RESPONSE != ZERO_SUB_FUNCTION {
                return HandlerOutcome::Nrc(Nrc::SubFunctionNotSupported);
            }
            if sub_function & SUPPRESS_POSITIVE_RESPONSE != 0 {
                server.suppress_response = true;
            }
            HandlerOutcome::Positive(vec![ZERO_SUB_FUNCTION])
        }),
    });
}
