//! 0x22 ReadDataByIdentifier / 0x2E WriteDataByIdentifier.
//!
//! Lookup strategy: try the "extended" backend first; if it doesn't own the DID, fall through
//! to the "general" backend.

use crate::nrc::Nrc;
use crate::uds::event::{EventKind, EventPayload};
use crate::uds::server::dispatch::{priority, EventTable, HandlerOutcome, ServiceNode};

/// Registers the RDBI and WDBI handlers.
pub fn register(table: &mut EventTable) {
    table.register(ServiceNode {
        event: EventKind::ReadDataByIdentifier,
        priority: priority::NORMAL,
        name: "read_data_by_identifier",
        handler: Box::new(|server, payload| {
            let EventPayload::ReadDataByIdentifier { dids } = payload else {
                return HandlerOutcome::NotMine;
            };
            let mut body = Vec::new();
            for &did in dids {
                let value = server
                    .data_extended
                    .read(did)
                    .or_else(|| server.data_general.read(did));
                let Some(value) = value else {
                    return HandlerOutcome::Nrc(Nrc::RequestOutOfRange);
                };
                body.extend_from_slice(&did.to_be_bytes());
                body.extend_from_slice(&value);
            }
            HandlerOutcome::Positive(body)
        }),
    });

    table.register(ServiceNode {
        event: EventKind::WriteDataByIdentifier,
        priority: priority::NORMAL,
        name: "write_data_by_identifier",
        handler: Box::new(|server, payload| {
            let EventPayload::WriteDataByIdentifier { did, data } = payload else {
                return HandlerOutcome::NotMine;
            };
            if server.data_extended.write(*did, data).is_ok() || server.data_general.write(*did, data).is_ok() {
                HandlerOutcome::Positive(did.to_be_bytes().to_vec())
            } else {
                HandlerOutcome::Nrc(Nrc::RequestOutOfRange)
            }
        }),
    });
}
